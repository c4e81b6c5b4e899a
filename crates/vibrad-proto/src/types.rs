//! Command tags and payload value types

use crate::error::{ProtoError, ProtoResult};
use crate::wire;

/// Maximum number of steps in a waveform pattern.
pub const WAVEFORM_MAX_NUM: usize = 24;

/// Size of the raw motor calibration value in bytes.
pub const CALIB_VALUE_MAX: usize = 32;

/// Command tag carried in the `type` byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    /// Play a timing/amplitude sequence.
    Waveform = 1,
    /// Play a firmware-predefined effect at a named strength.
    PredefinedEffect = 2,
    /// Composite effect list; accepted but not supported.
    Composition = 3,
    /// Constant vibration for a number of milliseconds.
    Start = 4,
    /// Quiesce the motor.
    Stop = 5,
    /// Play a firmware-predefined effect at a fractional amplitude.
    Primitive = 6,
    /// Repeat (on, off) cycles a fixed number of times.
    Interval = 7,
    /// Set the client-visible amplitude (0..=255).
    SetAmplitude = 8,
    /// Query the capability bitmask discovered at startup.
    GetCapabilities = 9,
    /// Set and persist the user intensity preference.
    SetIntensity = 10,
    /// Reload and return the persisted intensity.
    GetIntensity = 11,
    /// Read the motor calibration value.
    Calibrate = 12,
    /// Write the motor calibration value.
    SetCalibValue = 13,
}

impl CommandKind {
    /// Parse the wire tag.
    pub fn from_wire(tag: u8) -> ProtoResult<Self> {
        match tag {
            1 => Ok(CommandKind::Waveform),
            2 => Ok(CommandKind::PredefinedEffect),
            3 => Ok(CommandKind::Composition),
            4 => Ok(CommandKind::Start),
            5 => Ok(CommandKind::Stop),
            6 => Ok(CommandKind::Primitive),
            7 => Ok(CommandKind::Interval),
            8 => Ok(CommandKind::SetAmplitude),
            9 => Ok(CommandKind::GetCapabilities),
            10 => Ok(CommandKind::SetIntensity),
            11 => Ok(CommandKind::GetIntensity),
            12 => Ok(CommandKind::Calibrate),
            13 => Ok(CommandKind::SetCalibValue),
            other => Err(ProtoError::UnknownCommand(other)),
        }
    }

    /// Bytes a request of this kind must carry.
    pub fn request_len(self) -> usize {
        match self {
            CommandKind::Waveform | CommandKind::Interval => {
                wire::MSG_HEADER + wire::WAVEFORM_PAYLOAD
            }
            CommandKind::PredefinedEffect | CommandKind::Primitive => {
                wire::MSG_HEADER + wire::EFFECT_PAYLOAD
            }
            CommandKind::Composition => wire::MSG_HEADER,
            CommandKind::Start => wire::MSG_HEADER + 4,
            CommandKind::Stop => wire::MSG_HEADER,
            CommandKind::SetAmplitude => wire::MSG_HEADER + 1,
            CommandKind::GetCapabilities | CommandKind::GetIntensity => wire::MSG_HEADER,
            // The peer's intensity enum is four bytes wide even though only
            // the first byte is meaningful.
            CommandKind::SetIntensity => wire::MSG_HEADER + 4,
            CommandKind::Calibrate => wire::MSG_HEADER,
            CommandKind::SetCalibValue => wire::MSG_HEADER + CALIB_VALUE_MAX,
        }
    }

    /// Bytes the server writes back for this kind.
    pub fn response_len(self) -> usize {
        match self {
            CommandKind::PredefinedEffect | CommandKind::Primitive => {
                wire::MSG_HEADER + wire::EFFECT_PAYLOAD
            }
            CommandKind::GetCapabilities | CommandKind::GetIntensity => wire::MSG_HEADER + 4,
            CommandKind::Calibrate => wire::MSG_HEADER + CALIB_VALUE_MAX,
            _ => wire::MSG_RESULT,
        }
    }
}

/// User intensity preference, also used as the master mute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Intensity {
    /// Amplitudes scaled to 30%.
    Low = 0,
    /// Amplitudes scaled to 60%.
    #[default]
    Medium = 1,
    /// Amplitudes unscaled.
    High = 2,
    /// All play requests are refused.
    Off = 3,
}

impl Intensity {
    /// Parse the wire byte.
    pub fn from_wire(value: u8) -> ProtoResult<Self> {
        match value {
            0 => Ok(Intensity::Low),
            1 => Ok(Intensity::Medium),
            2 => Ok(Intensity::High),
            3 => Ok(Intensity::Off),
            other => Err(ProtoError::OutOfRange {
                field: "intensity",
                value: i64::from(other),
            }),
        }
    }
}

/// Strength of a predefined effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EffectStrength {
    /// Light magnitude band.
    Light = 0,
    /// Medium magnitude band.
    Medium = 1,
    /// Full magnitude.
    Strong = 2,
    /// Keep whatever magnitude is currently in effect.
    Default = 3,
}

impl EffectStrength {
    /// Parse the wire byte.
    pub fn from_wire(value: u8) -> ProtoResult<Self> {
        match value {
            0 => Ok(EffectStrength::Light),
            1 => Ok(EffectStrength::Medium),
            2 => Ok(EffectStrength::Strong),
            3 => Ok(EffectStrength::Default),
            other => Err(ProtoError::OutOfRange {
                field: "effect strength",
                value: i64::from(other),
            }),
        }
    }
}

/// A timing/amplitude sequence with an optional repeat index.
///
/// Only the first `length` entries of `timings` and `amplitudes` are
/// meaningful. `repeat` is `-1` for a one-shot pattern or the index the
/// sequence loops back to after the last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waveform {
    /// Per-step durations in milliseconds; zero-duration steps are skipped.
    pub timings: [u32; WAVEFORM_MAX_NUM],
    /// Per-step amplitudes; zero means the motor rests for the step.
    pub amplitudes: [u8; WAVEFORM_MAX_NUM],
    /// Number of valid steps (1..=24).
    pub length: u8,
    /// Loop start index, or -1 to play once.
    pub repeat: i8,
}

impl Default for Waveform {
    fn default() -> Self {
        Self {
            timings: [0; WAVEFORM_MAX_NUM],
            amplitudes: [0; WAVEFORM_MAX_NUM],
            length: 0,
            repeat: -1,
        }
    }
}

/// A simple repetition pattern of (on, off) cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    /// Vibration time per cycle in milliseconds (> 0).
    pub duration_ms: i32,
    /// Rest time between cycles in milliseconds (>= 0).
    pub interval_ms: i32,
    /// Number of cycles (>= 0).
    pub count: i16,
}
