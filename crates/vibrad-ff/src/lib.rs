//! Force-feedback motor device access
//!
//! The motor is a single force-feedback character device. This crate wraps
//! it in three layers:
//!
//! - [`sys`]: the raw driver ABI (effect structs, event records, ioctl
//!   request codes, feature bits)
//! - [`backend`]: the [`FfBackend`] seam between the service and the
//!   kernel, with the real `/dev` implementation and a recording mock
//! - [`device`]: the stateful [`FfDevice`] adapter that owns the uploaded
//!   effect slot and the magnitude/amplitude/intensity state

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod device;
pub mod error;
pub mod sys;

pub use backend::{DevInput, EffectUpload, FfBackend};
pub use device::{caps, FfDevice};
pub use error::{FfError, FfResult};
pub use sys::FfFeatures;
