//! Wire protocol for the vibrator service
//!
//! Both transports of the service (local Unix domain socket and the
//! cross-core RPMSG socket) carry the same fixed-layout frame, so the
//! protocol is encoded field by field in little-endian order rather than
//! relying on a struct memory image; the two peers may be built by
//! different toolchains.
//!
//! The crate is organized into:
//!
//! - [`types`]: command tags, payload value types and the per-kind
//!   request/response length tables
//! - [`wire`]: frame encoding and decoding
//! - [`error`]: protocol error type
//!
//! # Frame shape
//!
//! Every frame starts with an 8-byte header (`result: i32`, `type: u8`,
//! `request_len: u8`, `response_len: u8`, one pad byte) followed by a
//! command-specific payload. Replies that carry no payload are truncated
//! to the 4-byte `result` field alone.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod types;
pub mod wire;

pub use error::{ProtoError, ProtoResult};
pub use types::{
    CommandKind, EffectStrength, Intensity, Interval, Waveform, CALIB_VALUE_MAX, WAVEFORM_MAX_NUM,
};
pub use wire::{Reply, Request};

/// Result codes carried in the `result` field of a reply.
///
/// Errors are negated errno values so a device failure can be propagated
/// to the client verbatim.
pub mod status {
    /// Command completed.
    pub const OK: i32 = 0;
    /// Parameter out of range, undersized frame or unknown command tag.
    pub const INVALID_ARGUMENT: i32 = -libc::EINVAL;
    /// The device or the current intensity setting cannot honor the request.
    pub const NOT_SUPPORTED: i32 = -libc::ENOTSUP;
    /// No usable vibrator device.
    pub const NO_DEVICE: i32 = -libc::ENODEV;
}
