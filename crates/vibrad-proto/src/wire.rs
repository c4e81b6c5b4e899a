//! Frame encoding and decoding

use crate::error::{ProtoError, ProtoResult};
use crate::types::{
    CommandKind, EffectStrength, Intensity, Interval, Waveform, CALIB_VALUE_MAX, WAVEFORM_MAX_NUM,
};

/// Frame header size: `result: i32`, `type: u8`, `request_len: u8`,
/// `response_len: u8` and one pad byte.
pub const MSG_HEADER: usize = 8;

/// Size of a result-only reply.
pub const MSG_RESULT: usize = 4;

/// Packed waveform payload: `repeat: i8`, `length: u8`, `count: i16`,
/// 24 amplitudes, 24 32-bit timings.
pub const WAVEFORM_PAYLOAD: usize = 4 + WAVEFORM_MAX_NUM + WAVEFORM_MAX_NUM * 4;

/// Packed effect payload: `effect_id: i32`, `play_length: i32` and a
/// 4-byte tail holding either the strength byte or the f32 amplitude.
pub const EFFECT_PAYLOAD: usize = 12;

/// Largest frame either peer will ever produce.
pub const FRAME_MAX: usize = MSG_HEADER + WAVEFORM_PAYLOAD;

/// Offset of the command tag within the header.
pub const OFF_TYPE: usize = 4;

const OFF_PAYLOAD: usize = MSG_HEADER;
const OFF_WAVE_REPEAT: usize = 8;
const OFF_WAVE_LENGTH: usize = 9;
const OFF_WAVE_COUNT: usize = 10;
const OFF_WAVE_AMPLITUDES: usize = 12;
const OFF_WAVE_TIMINGS: usize = 36;
const OFF_EFFECT_ID: usize = 8;
const OFF_EFFECT_PLAY_LENGTH: usize = 12;
const OFF_EFFECT_TAIL: usize = 16;

/// A decoded client request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    /// Play a waveform pattern.
    Waveform(Waveform),
    /// Start interval repetitions.
    Interval(Interval),
    /// Play a predefined effect.
    PredefinedEffect {
        /// Firmware effect id.
        effect_id: i32,
        /// Requested strength band.
        strength: EffectStrength,
    },
    /// Play a predefined effect at a fractional amplitude.
    Primitive {
        /// Firmware effect id.
        effect_id: i32,
        /// Amplitude in 0.0..=1.0.
        amplitude: f32,
    },
    /// Constant vibration.
    Start {
        /// Vibration time in milliseconds; zero stops the motor.
        timeout_ms: u32,
    },
    /// Quiesce the motor.
    Stop,
    /// Set the client-visible amplitude.
    SetAmplitude {
        /// New amplitude.
        amplitude: u8,
    },
    /// Set and persist the intensity preference.
    SetIntensity {
        /// New intensity.
        intensity: Intensity,
    },
    /// Reload and return the persisted intensity.
    GetIntensity,
    /// Return the capability bitmask.
    GetCapabilities,
    /// Read the motor calibration value.
    Calibrate,
    /// Write the motor calibration value.
    SetCalibValue {
        /// Raw calibration bytes.
        value: [u8; CALIB_VALUE_MAX],
    },
    /// Composite effect list; recognized but never dispatched.
    Composition,
}

impl Request {
    /// The command tag this request travels under.
    pub fn kind(&self) -> CommandKind {
        match self {
            Request::Waveform(_) => CommandKind::Waveform,
            Request::Interval(_) => CommandKind::Interval,
            Request::PredefinedEffect { .. } => CommandKind::PredefinedEffect,
            Request::Primitive { .. } => CommandKind::Primitive,
            Request::Start { .. } => CommandKind::Start,
            Request::Stop => CommandKind::Stop,
            Request::SetAmplitude { .. } => CommandKind::SetAmplitude,
            Request::SetIntensity { .. } => CommandKind::SetIntensity,
            Request::GetIntensity => CommandKind::GetIntensity,
            Request::GetCapabilities => CommandKind::GetCapabilities,
            Request::Calibrate => CommandKind::Calibrate,
            Request::SetCalibValue { .. } => CommandKind::SetCalibValue,
            Request::Composition => CommandKind::Composition,
        }
    }
}

/// Payload tail of an effect reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectTail {
    /// Echo of the requested strength.
    Strength(EffectStrength),
    /// Echo of the requested amplitude.
    Amplitude(f32),
}

/// A server reply body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    /// Result code only.
    Result,
    /// Echo of an effect request with the driver-reported duration.
    Effect {
        /// Firmware effect id from the request.
        effect_id: i32,
        /// Predicted play length reported by the driver.
        play_length_ms: i32,
        /// Echo of the request tail.
        tail: EffectTail,
    },
    /// Current intensity.
    Intensity(Intensity),
    /// Capability bitmask.
    Capabilities(i32),
    /// Raw calibration value.
    Calibration([u8; CALIB_VALUE_MAX]),
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_i16(buf: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_f32(buf: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn write_i32(buf: &mut [u8], at: usize, value: i32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_i16(buf: &mut [u8], at: usize, value: i16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_f32(buf: &mut [u8], at: usize, value: f32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_header(buf: &mut [u8], result: i32, kind: CommandKind) {
    write_i32(buf, 0, result);
    buf[OFF_TYPE] = kind as u8;
    buf[5] = kind.request_len() as u8;
    buf[6] = kind.response_len() as u8;
    buf[7] = 0;
}

/// Decode a request frame.
///
/// The frame must hold at least [`CommandKind::request_len`] bytes for the
/// tag it declares; extra trailing bytes are ignored.
pub fn decode_request(buf: &[u8]) -> ProtoResult<Request> {
    if buf.len() < MSG_HEADER {
        return Err(ProtoError::Truncated {
            need: MSG_HEADER,
            got: buf.len(),
        });
    }
    let kind = CommandKind::from_wire(buf[OFF_TYPE])?;
    let need = kind.request_len();
    if buf.len() < need {
        return Err(ProtoError::Truncated {
            need,
            got: buf.len(),
        });
    }

    let request = match kind {
        CommandKind::Waveform => {
            let mut wave = Waveform {
                repeat: buf[OFF_WAVE_REPEAT] as i8,
                length: buf[OFF_WAVE_LENGTH],
                ..Waveform::default()
            };
            wave.amplitudes
                .copy_from_slice(&buf[OFF_WAVE_AMPLITUDES..OFF_WAVE_AMPLITUDES + WAVEFORM_MAX_NUM]);
            for (step, timing) in wave.timings.iter_mut().enumerate() {
                *timing = read_u32(buf, OFF_WAVE_TIMINGS + step * 4);
            }
            Request::Waveform(wave)
        }
        CommandKind::Interval => Request::Interval(Interval {
            duration_ms: read_i32(buf, OFF_WAVE_TIMINGS),
            interval_ms: read_i32(buf, OFF_WAVE_TIMINGS + 4),
            count: read_i16(buf, OFF_WAVE_COUNT),
        }),
        CommandKind::PredefinedEffect => Request::PredefinedEffect {
            effect_id: read_i32(buf, OFF_EFFECT_ID),
            strength: EffectStrength::from_wire(buf[OFF_EFFECT_TAIL])?,
        },
        CommandKind::Primitive => Request::Primitive {
            effect_id: read_i32(buf, OFF_EFFECT_ID),
            amplitude: read_f32(buf, OFF_EFFECT_TAIL),
        },
        CommandKind::Start => Request::Start {
            timeout_ms: read_u32(buf, OFF_PAYLOAD),
        },
        CommandKind::Stop => Request::Stop,
        CommandKind::SetAmplitude => Request::SetAmplitude {
            amplitude: buf[OFF_PAYLOAD],
        },
        CommandKind::SetIntensity => Request::SetIntensity {
            intensity: Intensity::from_wire(buf[OFF_PAYLOAD])?,
        },
        CommandKind::GetIntensity => Request::GetIntensity,
        CommandKind::GetCapabilities => Request::GetCapabilities,
        CommandKind::Calibrate => Request::Calibrate,
        CommandKind::SetCalibValue => {
            let mut value = [0u8; CALIB_VALUE_MAX];
            value.copy_from_slice(&buf[OFF_PAYLOAD..OFF_PAYLOAD + CALIB_VALUE_MAX]);
            Request::SetCalibValue { value }
        }
        CommandKind::Composition => Request::Composition,
    };
    Ok(request)
}

/// Encode a request frame, returning the number of bytes written
/// (`request_len` for the request's kind).
pub fn encode_request(request: &Request, buf: &mut [u8; FRAME_MAX]) -> usize {
    buf.fill(0);
    let kind = request.kind();
    write_header(buf, 0, kind);

    match request {
        Request::Waveform(wave) => {
            buf[OFF_WAVE_REPEAT] = wave.repeat as u8;
            buf[OFF_WAVE_LENGTH] = wave.length;
            buf[OFF_WAVE_AMPLITUDES..OFF_WAVE_AMPLITUDES + WAVEFORM_MAX_NUM]
                .copy_from_slice(&wave.amplitudes);
            for (step, timing) in wave.timings.iter().enumerate() {
                write_u32(buf, OFF_WAVE_TIMINGS + step * 4, *timing);
            }
        }
        Request::Interval(interval) => {
            write_i16(buf, OFF_WAVE_COUNT, interval.count);
            write_i32(buf, OFF_WAVE_TIMINGS, interval.duration_ms);
            write_i32(buf, OFF_WAVE_TIMINGS + 4, interval.interval_ms);
        }
        Request::PredefinedEffect {
            effect_id,
            strength,
        } => {
            write_i32(buf, OFF_EFFECT_ID, *effect_id);
            buf[OFF_EFFECT_TAIL] = *strength as u8;
        }
        Request::Primitive {
            effect_id,
            amplitude,
        } => {
            write_i32(buf, OFF_EFFECT_ID, *effect_id);
            write_f32(buf, OFF_EFFECT_TAIL, *amplitude);
        }
        Request::Start { timeout_ms } => write_u32(buf, OFF_PAYLOAD, *timeout_ms),
        Request::SetAmplitude { amplitude } => buf[OFF_PAYLOAD] = *amplitude,
        Request::SetIntensity { intensity } => buf[OFF_PAYLOAD] = *intensity as u8,
        Request::SetCalibValue { value } => {
            buf[OFF_PAYLOAD..OFF_PAYLOAD + CALIB_VALUE_MAX].copy_from_slice(value);
        }
        Request::Stop
        | Request::GetIntensity
        | Request::GetCapabilities
        | Request::Calibrate
        | Request::Composition => {}
    }
    kind.request_len()
}

/// Encode a reply frame for `kind`, returning the number of bytes written
/// (`response_len` for that kind).
pub fn encode_reply(kind: CommandKind, result: i32, reply: &Reply, buf: &mut [u8; FRAME_MAX]) -> usize {
    buf.fill(0);
    let len = kind.response_len();
    if len == MSG_RESULT {
        write_i32(buf, 0, result);
        return len;
    }
    write_header(buf, result, kind);
    match reply {
        Reply::Effect {
            effect_id,
            play_length_ms,
            tail,
        } => {
            write_i32(buf, OFF_EFFECT_ID, *effect_id);
            write_i32(buf, OFF_EFFECT_PLAY_LENGTH, *play_length_ms);
            match tail {
                EffectTail::Strength(strength) => buf[OFF_EFFECT_TAIL] = *strength as u8,
                EffectTail::Amplitude(amplitude) => write_f32(buf, OFF_EFFECT_TAIL, *amplitude),
            }
        }
        Reply::Intensity(intensity) => buf[OFF_PAYLOAD] = *intensity as u8,
        Reply::Capabilities(capabilities) => write_i32(buf, OFF_PAYLOAD, *capabilities),
        Reply::Calibration(value) => {
            buf[OFF_PAYLOAD..OFF_PAYLOAD + CALIB_VALUE_MAX].copy_from_slice(value);
        }
        Reply::Result => {}
    }
    len
}

/// Encode a bare 4-byte result, used when the command tag itself could not
/// be decoded and no length table applies.
pub fn encode_result(result: i32, buf: &mut [u8; FRAME_MAX]) -> usize {
    buf.fill(0);
    write_i32(buf, 0, result);
    MSG_RESULT
}

/// Decode a reply frame received for a request of `kind`.
pub fn decode_reply(kind: CommandKind, buf: &[u8]) -> ProtoResult<(i32, Reply)> {
    let need = kind.response_len();
    if buf.len() < need {
        return Err(ProtoError::Truncated {
            need,
            got: buf.len(),
        });
    }
    let result = read_i32(buf, 0);
    let reply = match kind {
        CommandKind::PredefinedEffect => Reply::Effect {
            effect_id: read_i32(buf, OFF_EFFECT_ID),
            play_length_ms: read_i32(buf, OFF_EFFECT_PLAY_LENGTH),
            tail: EffectTail::Strength(EffectStrength::from_wire(buf[OFF_EFFECT_TAIL])?),
        },
        CommandKind::Primitive => Reply::Effect {
            effect_id: read_i32(buf, OFF_EFFECT_ID),
            play_length_ms: read_i32(buf, OFF_EFFECT_PLAY_LENGTH),
            tail: EffectTail::Amplitude(read_f32(buf, OFF_EFFECT_TAIL)),
        },
        CommandKind::GetIntensity => Reply::Intensity(Intensity::from_wire(buf[OFF_PAYLOAD])?),
        CommandKind::GetCapabilities => Reply::Capabilities(read_i32(buf, OFF_PAYLOAD)),
        CommandKind::Calibrate => {
            let mut value = [0u8; CALIB_VALUE_MAX];
            value.copy_from_slice(&buf[OFF_PAYLOAD..OFF_PAYLOAD + CALIB_VALUE_MAX]);
            Reply::Calibration(value)
        }
        _ => Reply::Result,
    };
    Ok((result, reply))
}
