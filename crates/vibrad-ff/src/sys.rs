//! Raw force-feedback driver ABI
//!
//! `#[repr(C)]` mirrors of the structures the motor driver exchanges over
//! ioctl and `write`, plus the request codes themselves. Only the two
//! effect types the service uploads (constant and custom periodic) are
//! modeled.

use vibrad_proto::CALIB_VALUE_MAX;

/// Force-feedback event type.
pub const EV_FF: u16 = 0x15;

/// Feature bit: rumble effects.
pub const FF_RUMBLE: u16 = 0x50;
/// Feature bit: periodic effects.
pub const FF_PERIODIC: u16 = 0x51;
/// Feature bit: constant effects.
pub const FF_CONSTANT: u16 = 0x52;
/// Feature bit: custom waveform data for periodic effects.
pub const FF_CUSTOM: u16 = 0x5d;
/// Feature bit: global gain control.
pub const FF_GAIN: u16 = 0x60;
/// Highest feature bit the bitmap can carry.
pub const FF_MAX: u16 = 0x7f;

/// Length of the feature bitmap in bytes.
pub const FF_BITMAP_LEN: usize = FF_MAX as usize / 8 + 1;

/// Number of 16-bit words in the custom effect payload. The first word is
/// the firmware effect id; the driver writes the predicted play length
/// into the second (seconds) and third (milliseconds) on upload.
pub const CUSTOM_DATA_LEN: usize = 3;

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioctl_code(direction: u32, kind: u8, nr: u8, size: usize) -> libc::c_ulong {
    ((direction << IOC_DIRSHIFT)
        | ((kind as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)) as libc::c_ulong
}

/// Query the force-feedback feature bitmap.
pub const EVIOC_GBIT_FF: libc::c_ulong =
    ioctl_code(IOC_READ, b'E', 0x20 + EV_FF as u8, FF_BITMAP_LEN);

/// Upload an effect; the driver assigns and writes back the slot id.
pub const EVIOC_SFF: libc::c_ulong =
    ioctl_code(IOC_WRITE, b'E', 0x80, std::mem::size_of::<FfEffect>());

/// Remove an uploaded effect by slot id.
pub const EVIOC_RMFF: libc::c_ulong =
    ioctl_code(IOC_WRITE, b'E', 0x81, std::mem::size_of::<libc::c_int>());

/// Read the motor calibration value.
pub const EVIOC_GCALIB: libc::c_ulong = ioctl_code(IOC_READ, b'E', 0x90, CALIB_VALUE_MAX);

/// Write the motor calibration value.
pub const EVIOC_SCALIB: libc::c_ulong = ioctl_code(IOC_WRITE, b'E', 0x91, CALIB_VALUE_MAX);

/// Effect envelope; unused by the service but part of the ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfEnvelope {
    pub attack_length: u16,
    pub attack_level: u16,
    pub fade_length: u16,
    pub fade_level: u16,
}

/// Trigger configuration; unused by the service but part of the ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfTrigger {
    pub button: u16,
    pub interval: u16,
}

/// Replay window of an uploaded effect.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfReplay {
    /// Play length in milliseconds.
    pub length: u32,
    /// Delay before the effect starts, in milliseconds.
    pub delay: u32,
}

/// Constant effect parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfConstantEffect {
    pub level: i16,
    pub envelope: FfEnvelope,
}

/// Periodic effect parameters; the service only uses the custom waveform.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfPeriodicEffect {
    pub waveform: u16,
    pub period: u16,
    pub magnitude: i16,
    pub offset: i16,
    pub phase: u16,
    pub envelope: FfEnvelope,
    pub custom_len: u32,
    pub custom_data: *mut i16,
}

/// Effect type specific parameters.
#[repr(C)]
#[derive(Clone, Copy)]
pub union FfEffectData {
    pub constant: FfConstantEffect,
    pub periodic: FfPeriodicEffect,
}

/// An effect as uploaded to the driver.
#[repr(C)]
pub struct FfEffect {
    pub effect_type: u16,
    /// Slot id; -1 asks the driver to assign one.
    pub id: i16,
    pub direction: u16,
    pub trigger: FfTrigger,
    pub replay: FfReplay,
    pub data: FfEffectData,
}

/// Play/gain record written to the device handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfEvent {
    pub code: u32,
    pub value: i32,
}

/// Feature bitmap reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfFeatures {
    bits: [u8; FF_BITMAP_LEN],
}

impl FfFeatures {
    /// Wrap a raw bitmap.
    pub fn from_bitmap(bits: [u8; FF_BITMAP_LEN]) -> Self {
        Self { bits }
    }

    /// Build a bitmap carrying exactly the given feature bits.
    pub fn with(features: &[u16]) -> Self {
        let mut bits = [0u8; FF_BITMAP_LEN];
        for &feature in features {
            bits[usize::from(feature) / 8] |= 1 << (feature % 8);
        }
        Self { bits }
    }

    /// Whether a feature bit is set.
    pub fn has(&self, feature: u16) -> bool {
        let index = usize::from(feature) / 8;
        index < self.bits.len() && (self.bits[index] >> (feature % 8)) & 1 != 0
    }
}
