//! Command dispatcher
//!
//! Translates one decoded request into device and playback operations and
//! produces the reply. Validation happens before any device I/O, and a
//! device failure is converted into the negated errno the client sees in
//! the `result` field; nothing here terminates the daemon.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};
use vibrad_ff::{device, FfBackend, FfDevice};
use vibrad_proto::wire::{EffectTail, Reply, Request};
use vibrad_proto::{status, EffectStrength, Intensity, Interval, Waveform, WAVEFORM_MAX_NUM};

use crate::interval::IntervalRepeater;
use crate::playback::{self, WaveformPlayer};
use crate::props::PropertyStore;

/// Persistent property holding the user-selected intensity.
pub const INTENSITY_KEY: &str = "persist.vibrator_mode";

/// Result code plus reply body for one command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Response {
    /// Wire result code.
    pub result: i32,
    /// Reply body.
    pub reply: Reply,
}

impl Response {
    /// A result-only response.
    pub fn result(result: i32) -> Self {
        Self {
            result,
            reply: Reply::Result,
        }
    }
}

/// The command dispatcher. Owns the device, the waveform player, the
/// interval repeater and the property store.
pub struct Dispatcher<B> {
    device: Arc<Mutex<FfDevice<B>>>,
    player: WaveformPlayer,
    repeater: IntervalRepeater,
    props: PropertyStore,
}

impl<B: FfBackend + Send + 'static> Dispatcher<B> {
    /// Build a dispatcher, seeding the device intensity from the
    /// persistent store (Medium when nothing was ever stored).
    pub fn new(mut device: FfDevice<B>, props: PropertyStore) -> Self {
        let intensity = load_intensity(&props);
        device.set_intensity(intensity);
        debug!("restored intensity {intensity:?}");
        Self {
            device: Arc::new(Mutex::new(device)),
            player: WaveformPlayer::new(),
            repeater: IntervalRepeater::new(),
            props,
        }
    }

    /// Execute one command and produce its reply.
    ///
    /// Every dispatched command raises the worker's force-stop flag
    /// first; a running waveform yields the motor at its next step
    /// boundary no matter what arrives. Runs on the event loop; the only
    /// blocking path is the bounded condition-variable wait when a
    /// waveform preempts a waveform.
    pub fn handle(&mut self, request: Request) -> Response {
        self.player.request_stop();
        match request {
            Request::Waveform(wave) => Response::result(self.handle_waveform(wave)),
            Request::Interval(interval) => Response::result(self.handle_interval(interval)),
            Request::PredefinedEffect {
                effect_id,
                strength,
            } => self.handle_predefined(effect_id, strength),
            Request::Primitive {
                effect_id,
                amplitude,
            } => self.handle_primitive(effect_id, amplitude),
            Request::Start { timeout_ms } => Response::result(self.handle_start(timeout_ms)),
            Request::Stop => Response::result(self.handle_stop()),
            Request::SetAmplitude { amplitude } => {
                Response::result(self.handle_set_amplitude(amplitude))
            }
            Request::SetIntensity { intensity } => {
                Response::result(self.handle_set_intensity(intensity))
            }
            Request::GetIntensity => {
                let intensity = self.handle_get_intensity();
                Response {
                    result: status::OK,
                    reply: Reply::Intensity(intensity),
                }
            }
            Request::GetCapabilities => Response {
                result: status::OK,
                reply: Reply::Capabilities(self.device().capabilities()),
            },
            Request::Calibrate => self.handle_calibrate(),
            Request::SetCalibValue { value } => {
                Response::result(self.handle_set_calib_value(&value))
            }
            Request::Composition => Response::result(status::NOT_SUPPORTED),
        }
    }

    /// Stop all activity and quiesce the motor; used at daemon shutdown.
    pub fn shutdown(&mut self) {
        self.player.stop_and_wait();
        self.repeater.cancel();
        if let Err(err) = self.device().off() {
            warn!("failed to quiesce motor on shutdown: {err}");
        }
    }

    fn device(&self) -> MutexGuard<'_, FfDevice<B>> {
        crate::lock_device(&self.device)
    }

    fn intensity(&self) -> Intensity {
        self.device().intensity()
    }

    fn handle_waveform(&mut self, mut wave: Waveform) -> i32 {
        if wave.length == 0
            || usize::from(wave.length) > WAVEFORM_MAX_NUM
            || wave.repeat < -1
            || i16::from(wave.repeat) >= i16::from(wave.length)
        {
            return status::INVALID_ARGUMENT;
        }
        if !device::should_vibrate(self.intensity()) {
            return status::NOT_SUPPORTED;
        }
        // A repeat tail of zero-duration steps cannot drive the motor;
        // degrade to a one-shot instead of spawning a worker that spins.
        if wave.repeat >= 0 && !playback::should_repeat(&wave) {
            wave.repeat = -1;
        }
        self.player.start(wave, Arc::clone(&self.device));
        status::OK
    }

    fn handle_interval(&mut self, interval: Interval) -> i32 {
        if interval.duration_ms <= 0 || interval.interval_ms < 0 || interval.count < 0 {
            return status::INVALID_ARGUMENT;
        }
        if !device::should_vibrate(self.intensity()) {
            return status::NOT_SUPPORTED;
        }
        self.repeater.start(Arc::clone(&self.device), interval);
        status::OK
    }

    fn handle_predefined(&mut self, effect_id: i32, strength: EffectStrength) -> Response {
        let tail = EffectTail::Strength(strength);
        if !device::should_vibrate(self.intensity()) {
            return effect_response(status::NOT_SUPPORTED, effect_id, 0, tail);
        }
        match self.device().play_predefined(effect_id, strength) {
            Ok(play_length_ms) => effect_response(status::OK, effect_id, play_length_ms, tail),
            Err(err) => {
                warn!("predefined effect {effect_id} failed: {err}");
                effect_response(err.errno(), effect_id, 0, tail)
            }
        }
    }

    fn handle_primitive(&mut self, effect_id: i32, amplitude: f32) -> Response {
        let tail = EffectTail::Amplitude(amplitude);
        if !(0.0..=1.0).contains(&amplitude) {
            return effect_response(status::INVALID_ARGUMENT, effect_id, 0, tail);
        }
        if !device::should_vibrate(self.intensity()) {
            return effect_response(status::NOT_SUPPORTED, effect_id, 0, tail);
        }
        match self.device().play_primitive(effect_id, amplitude) {
            Ok(play_length_ms) => effect_response(status::OK, effect_id, play_length_ms, tail),
            Err(err) => {
                warn!("primitive effect {effect_id} failed: {err}");
                effect_response(err.errno(), effect_id, 0, tail)
            }
        }
    }

    fn handle_start(&mut self, timeout_ms: u32) -> i32 {
        if !device::should_vibrate(self.intensity()) {
            return status::NOT_SUPPORTED;
        }
        let mut dev = self.device();
        let amplitude = device::scale(dev.current_amplitude(), dev.intensity());
        // Enable first, then set the gain: many haptic drivers reset their
        // amplitude when enabled.
        if let Err(err) = dev.upload_and_start(None, timeout_ms) {
            warn!("constant vibration start failed: {err}");
        }
        match dev.set_gain(amplitude) {
            Ok(()) => status::OK,
            Err(err) => {
                warn!("gain update failed: {err}");
                err.errno()
            }
        }
    }

    fn handle_stop(&mut self) -> i32 {
        self.repeater.cancel();
        match self.device().off() {
            Ok(()) => status::OK,
            Err(err) => {
                warn!("stop failed: {err}");
                err.errno()
            }
        }
    }

    fn handle_set_amplitude(&mut self, amplitude: u8) -> i32 {
        match self.device().set_amplitude(amplitude) {
            Ok(()) => status::OK,
            Err(err) => {
                warn!("amplitude update failed: {err}");
                err.errno()
            }
        }
    }

    fn handle_set_intensity(&mut self, intensity: Intensity) -> i32 {
        self.device().set_intensity(intensity);
        match self.props.set_i32(INTENSITY_KEY, intensity as i32) {
            Ok(()) => status::OK,
            Err(err) => {
                warn!("failed to persist intensity: {err}");
                -err.raw_os_error().unwrap_or(libc::EIO)
            }
        }
    }

    fn handle_get_intensity(&mut self) -> Intensity {
        let intensity = load_intensity(&self.props);
        self.device().set_intensity(intensity);
        intensity
    }

    fn handle_calibrate(&mut self) -> Response {
        match self.device().calibrate() {
            Ok(value) => Response {
                result: status::OK,
                reply: Reply::Calibration(value),
            },
            Err(err) => {
                warn!("calibration read failed: {err}");
                Response {
                    result: err.errno(),
                    reply: Reply::Calibration([0; vibrad_proto::CALIB_VALUE_MAX]),
                }
            }
        }
    }

    fn handle_set_calib_value(&mut self, value: &[u8; vibrad_proto::CALIB_VALUE_MAX]) -> i32 {
        match self.device().set_calib_value(value) {
            Ok(()) => status::OK,
            Err(err) => {
                warn!("calibration write failed: {err}");
                err.errno()
            }
        }
    }
}

fn effect_response(result: i32, effect_id: i32, play_length_ms: i32, tail: EffectTail) -> Response {
    Response {
        result,
        reply: Reply::Effect {
            effect_id,
            play_length_ms,
            tail,
        },
    }
}

fn load_intensity(props: &PropertyStore) -> Intensity {
    let stored = props.get_i32(INTENSITY_KEY, Intensity::Medium as i32);
    u8::try_from(stored)
        .ok()
        .and_then(|value| Intensity::from_wire(value).ok())
        .unwrap_or(Intensity::Medium)
}
