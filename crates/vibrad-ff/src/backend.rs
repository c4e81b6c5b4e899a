//! Backend seam between the service and the motor driver

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::slice;

use vibrad_proto::CALIB_VALUE_MAX;

use crate::error::{FfError, FfResult};
use crate::sys::{
    self, FfConstantEffect, FfEffect, FfEffectData, FfEvent, FfFeatures, FfPeriodicEffect,
    CUSTOM_DATA_LEN, FF_BITMAP_LEN,
};

/// Parameters for an effect upload.
#[derive(Debug)]
pub enum EffectUpload<'a> {
    /// Constant effect played for `length_ms`.
    Constant {
        /// Driver magnitude.
        level: i16,
        /// Replay length in milliseconds.
        length_ms: u32,
    },
    /// Periodic effect with custom firmware data. `data[0]` carries the
    /// effect id; the driver writes the predicted duration into `data[1]`
    /// (seconds) and `data[2]` (milliseconds).
    Custom {
        /// Driver magnitude.
        magnitude: i16,
        /// Custom data words, mutated by the driver on upload.
        data: &'a mut [i16; CUSTOM_DATA_LEN],
    },
}

/// Raw operations the motor driver exposes.
///
/// The production implementation is [`DevInput`]; [`mock::MockBackend`]
/// records every call for tests.
pub trait FfBackend {
    /// Query the feature bitmap.
    fn features(&mut self) -> FfResult<FfFeatures>;

    /// Upload an effect and return the driver-assigned slot id.
    fn upload(&mut self, effect: EffectUpload<'_>) -> FfResult<i16>;

    /// Remove an uploaded effect.
    fn erase(&mut self, effect_id: i16) -> FfResult<()>;

    /// Write a single play or gain event record.
    fn write_event(&mut self, code: u32, value: i32) -> FfResult<()>;

    /// Read the calibration value.
    fn read_calibration(&mut self, out: &mut [u8; CALIB_VALUE_MAX]) -> FfResult<()>;

    /// Write the calibration value.
    fn write_calibration(&mut self, data: &[u8; CALIB_VALUE_MAX]) -> FfResult<()>;
}

/// The real motor device node.
#[derive(Debug)]
pub struct DevInput {
    file: File,
}

impl DevInput {
    /// Open the device node read/write.
    pub fn open(path: &Path) -> FfResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|err| FfError::NoDevice(format!("{}: {err}", path.display())))?;
        Ok(Self { file })
    }
}

impl FfBackend for DevInput {
    fn features(&mut self) -> FfResult<FfFeatures> {
        let mut bits = [0u8; FF_BITMAP_LEN];
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                sys::EVIOC_GBIT_FF,
                bits.as_mut_ptr(),
            )
        };
        if rc < 0 {
            return Err(FfError::device("feature query"));
        }
        Ok(FfFeatures::from_bitmap(bits))
    }

    fn upload(&mut self, effect: EffectUpload<'_>) -> FfResult<i16> {
        let mut raw = FfEffect {
            effect_type: 0,
            id: -1,
            direction: 0,
            trigger: Default::default(),
            replay: Default::default(),
            data: FfEffectData {
                constant: FfConstantEffect::default(),
            },
        };
        match effect {
            EffectUpload::Constant { level, length_ms } => {
                raw.effect_type = sys::FF_CONSTANT;
                raw.replay.length = length_ms;
                raw.data = FfEffectData {
                    constant: FfConstantEffect {
                        level,
                        envelope: Default::default(),
                    },
                };
            }
            EffectUpload::Custom { magnitude, data } => {
                raw.effect_type = sys::FF_PERIODIC;
                raw.data = FfEffectData {
                    periodic: FfPeriodicEffect {
                        waveform: sys::FF_CUSTOM,
                        period: 0,
                        magnitude,
                        offset: 0,
                        phase: 0,
                        envelope: Default::default(),
                        custom_len: (CUSTOM_DATA_LEN * std::mem::size_of::<i16>()) as u32,
                        custom_data: data.as_mut_ptr(),
                    },
                };
            }
        }
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                sys::EVIOC_SFF,
                &mut raw as *mut FfEffect,
            )
        };
        if rc < 0 {
            return Err(FfError::device("effect upload"));
        }
        Ok(raw.id)
    }

    fn erase(&mut self, effect_id: i16) -> FfResult<()> {
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                sys::EVIOC_RMFF,
                libc::c_int::from(effect_id),
            )
        };
        if rc < 0 {
            return Err(FfError::device("effect removal"));
        }
        Ok(())
    }

    fn write_event(&mut self, code: u32, value: i32) -> FfResult<()> {
        let event = FfEvent { code, value };
        let bytes = unsafe {
            slice::from_raw_parts(
                (&event as *const FfEvent).cast::<u8>(),
                std::mem::size_of::<FfEvent>(),
            )
        };
        self.file
            .write_all(bytes)
            .map_err(|source| FfError::Device {
                op: "event write",
                source,
            })
    }

    fn read_calibration(&mut self, out: &mut [u8; CALIB_VALUE_MAX]) -> FfResult<()> {
        let rc = unsafe {
            libc::ioctl(self.file.as_raw_fd(), sys::EVIOC_GCALIB, out.as_mut_ptr())
        };
        if rc < 0 {
            return Err(FfError::device("calibration read"));
        }
        Ok(())
    }

    fn write_calibration(&mut self, data: &[u8; CALIB_VALUE_MAX]) -> FfResult<()> {
        let rc = unsafe {
            libc::ioctl(self.file.as_raw_fd(), sys::EVIOC_SCALIB, data.as_ptr())
        };
        if rc < 0 {
            return Err(FfError::device("calibration write"));
        }
        Ok(())
    }
}

pub mod mock {
    //! Recording mock backend for tests.

    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// One observed driver call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DeviceCall {
        /// Constant effect upload.
        UploadConstant {
            /// Driver magnitude.
            level: i16,
            /// Replay length in milliseconds.
            length_ms: u32,
        },
        /// Custom periodic effect upload.
        UploadCustom {
            /// Driver magnitude.
            magnitude: i16,
            /// Firmware effect id from the custom data.
            effect_id: i16,
        },
        /// Effect removal.
        Erase {
            /// Removed slot id.
            effect_id: i16,
        },
        /// Play event.
        Play {
            /// Played slot id.
            effect_id: i16,
            /// Event value (1 = start).
            value: i32,
        },
        /// Gain event.
        Gain {
            /// Written magnitude.
            value: i32,
        },
        /// Calibration read.
        ReadCalibration,
        /// Calibration write.
        WriteCalibration(Vec<u8>),
    }

    /// Shared view of the calls a [`MockBackend`] has observed.
    #[derive(Debug, Clone, Default)]
    pub struct CallHistory {
        calls: Arc<Mutex<Vec<DeviceCall>>>,
    }

    impl CallHistory {
        fn push(&self, call: DeviceCall) {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(call);
        }

        /// All calls observed so far, in order.
        pub fn snapshot(&self) -> Vec<DeviceCall> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        /// Number of calls observed so far.
        pub fn len(&self) -> usize {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
        }

        /// Whether no calls were observed.
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Drop everything observed so far.
        pub fn clear(&self) {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
        }

        /// Count calls matching a predicate.
        pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .filter(|call| predicate(call))
                .count()
        }
    }

    /// A backend that records calls instead of touching hardware.
    #[derive(Debug)]
    pub struct MockBackend {
        features: FfFeatures,
        history: CallHistory,
        next_effect_id: i16,
        predicted: (i16, i16),
        fail_uploads: bool,
        fail_events: bool,
        calibration: [u8; CALIB_VALUE_MAX],
    }

    impl MockBackend {
        /// A mock with every feature the service cares about.
        pub fn new() -> Self {
            Self::with_features(FfFeatures::with(&[
                sys::FF_CONSTANT,
                sys::FF_PERIODIC,
                sys::FF_CUSTOM,
                sys::FF_GAIN,
            ]))
        }

        /// A mock advertising exactly `features`.
        pub fn with_features(features: FfFeatures) -> Self {
            Self {
                features,
                history: CallHistory::default(),
                next_effect_id: 0,
                predicted: (0, 48),
                fail_uploads: false,
                fail_events: false,
                calibration: [0u8; CALIB_VALUE_MAX],
            }
        }

        /// Handle for inspecting calls after the backend has been moved
        /// into a device.
        pub fn history(&self) -> CallHistory {
            self.history.clone()
        }

        /// Predicted duration reported for custom uploads, as the driver
        /// writes it: whole seconds and remaining milliseconds.
        pub fn predicted_duration(mut self, secs: i16, ms: i16) -> Self {
            self.predicted = (secs, ms);
            self
        }

        /// Make every upload fail with `EIO`.
        pub fn fail_uploads(mut self) -> Self {
            self.fail_uploads = true;
            self
        }

        /// Make every event write fail with `EIO`.
        pub fn fail_events(mut self) -> Self {
            self.fail_events = true;
            self
        }

        fn io_error(op: &'static str) -> FfError {
            FfError::Device {
                op,
                source: io::Error::from_raw_os_error(libc::EIO),
            }
        }
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FfBackend for MockBackend {
        fn features(&mut self) -> FfResult<FfFeatures> {
            Ok(self.features)
        }

        fn upload(&mut self, effect: EffectUpload<'_>) -> FfResult<i16> {
            if self.fail_uploads {
                return Err(Self::io_error("effect upload"));
            }
            match effect {
                EffectUpload::Constant { level, length_ms } => {
                    self.history.push(DeviceCall::UploadConstant { level, length_ms });
                }
                EffectUpload::Custom { magnitude, data } => {
                    self.history.push(DeviceCall::UploadCustom {
                        magnitude,
                        effect_id: data[0],
                    });
                    data[1] = self.predicted.0;
                    data[2] = self.predicted.1;
                }
            }
            let id = self.next_effect_id;
            self.next_effect_id = self.next_effect_id.wrapping_add(1);
            Ok(id)
        }

        fn erase(&mut self, effect_id: i16) -> FfResult<()> {
            self.history.push(DeviceCall::Erase { effect_id });
            Ok(())
        }

        fn write_event(&mut self, code: u32, value: i32) -> FfResult<()> {
            if self.fail_events {
                return Err(Self::io_error("event write"));
            }
            if code == u32::from(sys::FF_GAIN) {
                self.history.push(DeviceCall::Gain { value });
            } else {
                self.history.push(DeviceCall::Play {
                    effect_id: code as i16,
                    value,
                });
            }
            Ok(())
        }

        fn read_calibration(&mut self, out: &mut [u8; CALIB_VALUE_MAX]) -> FfResult<()> {
            self.history.push(DeviceCall::ReadCalibration);
            out.copy_from_slice(&self.calibration);
            Ok(())
        }

        fn write_calibration(&mut self, data: &[u8; CALIB_VALUE_MAX]) -> FfResult<()> {
            self.history
                .push(DeviceCall::WriteCalibration(data.to_vec()));
            self.calibration.copy_from_slice(data);
            Ok(())
        }
    }
}
