//! Stateful adapter over the motor device
//!
//! [`FfDevice`] owns the single uploaded effect slot the driver allows and
//! the magnitude/amplitude/intensity state that surrounds it. All mutation
//! goes through the command dispatcher or, while a waveform is playing,
//! the playback worker; the adapter itself is not synchronized.

use std::path::Path;

use tracing::debug;
use vibrad_proto::{EffectStrength, Intensity, CALIB_VALUE_MAX};

use crate::backend::{DevInput, EffectUpload, FfBackend};
use crate::error::{FfError, FfResult};
use crate::sys::{self, FfFeatures, CUSTOM_DATA_LEN};

/// Weakest magnitude the service will drive the motor with; anything
/// below this band is not perceptible on the target hardware.
pub const LIGHT_MAGNITUDE: i16 = 0x3fff;
/// Magnitude of a medium-strength effect.
pub const MEDIUM_MAGNITUDE: i16 = 0x5fff;
/// Full driver magnitude.
pub const STRONG_MAGNITUDE: i16 = 0x7fff;
/// Largest client-visible amplitude.
pub const MAX_AMPLITUDE: u8 = 255;

/// Replay length passed for custom uploads. Any non-zero value selects the
/// play path; the driver reports the real duration for custom effects.
const CUSTOM_PLAY_LENGTH: u32 = u32::MAX;

/// Capability bits reported to clients.
pub mod caps {
    /// The motor amplitude can be controlled per effect.
    pub const AMPLITUDE_CONTROL: i32 = 1 << 0;
    /// The driver reports effect durations usable for completion callbacks.
    pub const PERFORM_CALLBACK: i32 = 1 << 1;
    /// Effects can be composed from primitives.
    pub const COMPOSE_EFFECTS: i32 = 1 << 2;
}

/// Map a client amplitude (0..=255) linearly into the perceptible
/// magnitude band.
pub fn amplitude_magnitude(amplitude: u8) -> i16 {
    let span = i32::from(STRONG_MAGNITUDE) - i32::from(LIGHT_MAGNITUDE);
    (i32::from(LIGHT_MAGNITUDE) + i32::from(amplitude) * span / i32::from(MAX_AMPLITUDE)) as i16
}

/// Magnitude for a named effect strength; `Default` keeps the current one.
pub fn strength_magnitude(strength: EffectStrength) -> Option<i16> {
    match strength {
        EffectStrength::Light => Some(LIGHT_MAGNITUDE),
        EffectStrength::Medium => Some(MEDIUM_MAGNITUDE),
        EffectStrength::Strong => Some(STRONG_MAGNITUDE),
        EffectStrength::Default => None,
    }
}

/// Apply the user intensity preference to a raw amplitude.
pub fn scale(amplitude: u8, intensity: Intensity) -> u8 {
    match intensity {
        Intensity::Low => (f32::from(amplitude) * 0.3) as u8,
        Intensity::Medium => (f32::from(amplitude) * 0.6) as u8,
        Intensity::High => amplitude,
        Intensity::Off => MAX_AMPLITUDE,
    }
}

/// Whether play requests are allowed at this intensity.
pub fn should_vibrate(intensity: Intensity) -> bool {
    intensity != Intensity::Off
}

/// The motor device with its surrounding state.
#[derive(Debug)]
pub struct FfDevice<B> {
    backend: B,
    features: FfFeatures,
    current_effect: Option<i16>,
    current_magnitude: i16,
    current_amplitude: u8,
    capabilities: i32,
    intensity: Intensity,
}

impl FfDevice<DevInput> {
    /// Open and probe the device node.
    pub fn open(path: &Path) -> FfResult<Self> {
        Self::probe(DevInput::open(path)?)
    }
}

impl<B: FfBackend> FfDevice<B> {
    /// Probe a backend: query its features, refuse devices that can play
    /// neither constant nor periodic effects, and derive the capability
    /// bitmask reported to clients.
    pub fn probe(mut backend: B) -> FfResult<Self> {
        let features = backend.features()?;
        if !features.has(sys::FF_CONSTANT) && !features.has(sys::FF_PERIODIC) {
            return Err(FfError::NoDevice(
                "neither constant nor periodic effects supported".into(),
            ));
        }
        let mut capabilities = 0;
        if features.has(sys::FF_CUSTOM) {
            capabilities |= caps::AMPLITUDE_CONTROL;
        }
        if features.has(sys::FF_GAIN) {
            capabilities |= caps::PERFORM_CALLBACK | caps::COMPOSE_EFFECTS;
        }
        debug!(
            "probed device: constant={} periodic={} custom={} gain={}",
            features.has(sys::FF_CONSTANT),
            features.has(sys::FF_PERIODIC),
            features.has(sys::FF_CUSTOM),
            features.has(sys::FF_GAIN),
        );
        Ok(Self {
            backend,
            features,
            current_effect: None,
            current_magnitude: STRONG_MAGNITUDE,
            current_amplitude: MAX_AMPLITUDE,
            capabilities,
            intensity: Intensity::default(),
        })
    }

    /// Upload an effect and start playing it, or stop when `timeout_ms`
    /// is zero.
    ///
    /// `Some(effect_id)` uploads a custom periodic effect and returns the
    /// driver-predicted play length; `None` uploads a constant effect for
    /// `timeout_ms`. The driver does not allow overlapping slots, so any
    /// held slot is removed first, and the slot is invalidated on every
    /// failure so the next command starts from a quiescent device.
    pub fn upload_and_start(&mut self, effect_id: Option<i32>, timeout_ms: u32) -> FfResult<i32> {
        if timeout_ms == 0 {
            if let Some(id) = self.current_effect.take() {
                self.backend.erase(id)?;
            }
            return Ok(0);
        }

        if let Some(id) = self.current_effect.take() {
            self.backend.erase(id)?;
        }

        let mut play_length = 0;
        let id = match effect_id {
            Some(effect) => {
                if !self.features.has(sys::FF_PERIODIC) || !self.features.has(sys::FF_CUSTOM) {
                    return Err(FfError::Unsupported("custom periodic effects"));
                }
                let mut data: [i16; CUSTOM_DATA_LEN] = [effect as i16, 0, 0];
                let id = self.backend.upload(EffectUpload::Custom {
                    magnitude: self.current_magnitude,
                    data: &mut data,
                })?;
                play_length = i32::from(data[1]) * 1000 + i32::from(data[2]);
                debug!("effect {effect} uploaded, predicted play length {play_length} ms");
                id
            }
            None => {
                if !self.features.has(sys::FF_CONSTANT) {
                    return Err(FfError::Unsupported("constant effects"));
                }
                self.backend.upload(EffectUpload::Constant {
                    level: self.current_magnitude,
                    length_ms: timeout_ms,
                })?
            }
        };
        self.current_effect = Some(id);

        if let Err(err) = self.backend.write_event(u32::from(id as u16), 1) {
            let _ = self.backend.erase(id);
            self.current_effect = None;
            return Err(err);
        }
        Ok(play_length)
    }

    /// Write a gain event for the given client amplitude and remember the
    /// resulting magnitude.
    pub fn set_gain(&mut self, amplitude: u8) -> FfResult<()> {
        let magnitude = amplitude_magnitude(amplitude);
        self.backend
            .write_event(u32::from(sys::FF_GAIN), i32::from(magnitude))?;
        self.current_magnitude = magnitude;
        Ok(())
    }

    /// Record the client-visible amplitude and apply it as gain.
    pub fn set_amplitude(&mut self, amplitude: u8) -> FfResult<()> {
        self.current_amplitude = amplitude;
        self.set_gain(amplitude)
    }

    /// Quiesce the motor.
    pub fn off(&mut self) -> FfResult<()> {
        self.upload_and_start(None, 0).map(|_| ())
    }

    /// Play a predefined effect at a named strength; returns the
    /// driver-predicted play length in milliseconds.
    pub fn play_predefined(&mut self, effect_id: i32, strength: EffectStrength) -> FfResult<i32> {
        if let Some(magnitude) = strength_magnitude(strength) {
            self.current_magnitude = magnitude;
        }
        self.upload_and_start(Some(effect_id), CUSTOM_PLAY_LENGTH)
    }

    /// Play a predefined effect at a fractional amplitude; returns the
    /// driver-predicted play length in milliseconds.
    pub fn play_primitive(&mut self, effect_id: i32, amplitude: f32) -> FfResult<i32> {
        let raw = (amplitude * f32::from(MAX_AMPLITUDE)) as u8;
        self.current_magnitude = amplitude_magnitude(raw);
        self.upload_and_start(Some(effect_id), CUSTOM_PLAY_LENGTH)
    }

    /// Read the motor calibration value.
    pub fn calibrate(&mut self) -> FfResult<[u8; CALIB_VALUE_MAX]> {
        let mut value = [0u8; CALIB_VALUE_MAX];
        self.backend.read_calibration(&mut value)?;
        Ok(value)
    }

    /// Write the motor calibration value.
    pub fn set_calib_value(&mut self, value: &[u8; CALIB_VALUE_MAX]) -> FfResult<()> {
        self.backend.write_calibration(value)
    }

    /// Capability bitmask computed at probe time.
    pub fn capabilities(&self) -> i32 {
        self.capabilities
    }

    /// Current intensity preference.
    pub fn intensity(&self) -> Intensity {
        self.intensity
    }

    /// Record a new intensity preference. Persistence is the caller's
    /// concern.
    pub fn set_intensity(&mut self, intensity: Intensity) {
        self.intensity = intensity;
    }

    /// Last client-visible amplitude.
    pub fn current_amplitude(&self) -> u8 {
        self.current_amplitude
    }

    /// Last driver magnitude.
    pub fn current_magnitude(&self) -> i16 {
        self.current_magnitude
    }

    /// Whether an effect slot is currently held.
    pub fn is_active(&self) -> bool {
        self.current_effect.is_some()
    }
}
