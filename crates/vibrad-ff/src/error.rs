//! Device layer error types

use std::io;
use thiserror::Error;

/// Error from the motor device layer.
#[derive(Debug, Error)]
pub enum FfError {
    /// The device could not be opened or offers no usable effect type.
    #[error("no usable force-feedback device: {0}")]
    NoDevice(String),

    /// The device lacks the feature a request needs.
    #[error("device lacks support for {0}")]
    Unsupported(&'static str),

    /// An ioctl or write on the device failed.
    #[error("{op} failed: {source}")]
    Device {
        /// The operation that failed.
        op: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl FfError {
    /// Capture `errno` for a failed device operation.
    pub(crate) fn device(op: &'static str) -> Self {
        FfError::Device {
            op,
            source: io::Error::last_os_error(),
        }
    }

    /// The negated errno to report on the wire.
    pub fn errno(&self) -> i32 {
        match self {
            FfError::NoDevice(_) => -libc::ENODEV,
            FfError::Unsupported(_) => -libc::ENOTSUP,
            FfError::Device { source, .. } => -source.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Specialized `Result` for device operations.
pub type FfResult<T> = Result<T, FfError>;
