//! vibrad, the force-feedback vibrator service
//!
//! A long-lived daemon that serializes access to the single motor device
//! and answers one fixed-layout command per client connection, on a local
//! Unix domain socket and on the cross-core RPMSG socket. Time-varying
//! waveforms play on a background worker thread that the event loop can
//! preempt at step boundaries.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

use std::sync::{Arc, Mutex, MutexGuard};

use vibrad_ff::FfDevice;

pub mod config;
pub mod dispatch;
pub mod interval;
pub mod playback;
pub mod props;
pub mod rpmsg;
pub mod server;
pub mod service;

pub use config::ServiceConfig;
pub use dispatch::{Dispatcher, Response, INTENSITY_KEY};
pub use service::VibratorService;

/// Lock the shared device. A poisoned lock still yields the device; every
/// command re-derives what it needs from device state.
pub(crate) fn lock_device<B>(device: &Arc<Mutex<FfDevice<B>>>) -> MutexGuard<'_, FfDevice<B>> {
    device.lock().unwrap_or_else(|e| e.into_inner())
}
