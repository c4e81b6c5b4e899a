//! Interval repetition on the event-loop timer

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, warn};
use vibrad_ff::{FfBackend, FfDevice};
use vibrad_proto::Interval;

use crate::lock_device;

/// Owner of the single outstanding interval schedule.
#[derive(Debug, Default)]
pub struct IntervalRepeater {
    task: Option<JoinHandle<()>>,
}

impl IntervalRepeater {
    /// A repeater with no schedule outstanding.
    pub fn new() -> Self {
        Self { task: None }
    }

    /// Abort the outstanding schedule, if any.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Replace any outstanding schedule. The timer period is one full
    /// (on + off) cycle and the first cycle starts immediately; the task
    /// exits once `count` cycles have played.
    ///
    /// Must be called from within the service runtime.
    pub fn start<B>(&mut self, device: Arc<Mutex<FfDevice<B>>>, interval: Interval)
    where
        B: FfBackend + Send + 'static,
    {
        self.cancel();
        let period =
            Duration::from_millis(interval.duration_ms as u64 + interval.interval_ms as u64);
        let duration_ms = interval.duration_ms as u32;
        let mut remaining = interval.count;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
                let played = lock_device(&device).upload_and_start(None, duration_ms);
                if let Err(err) = played {
                    warn!("interval vibration failed: {err}");
                    break;
                }
            }
            debug!("interval schedule complete");
        }));
    }
}

impl Drop for IntervalRepeater {
    fn drop(&mut self) {
        self.cancel();
    }
}
