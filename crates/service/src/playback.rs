//! Waveform playback worker
//!
//! A waveform plays on a dedicated worker thread that owns a copy of the
//! pattern. The dispatcher and the worker share one [`WaveSync`] per
//! worker: a force-stop flag the worker checks at every step boundary and
//! a completion flag it raises on exit. Cancellation is cooperative; a
//! step whose delay has begun is interrupted only because the delay
//! itself waits on the shared condition variable.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use vibrad_ff::{device, FfBackend, FfDevice};
use vibrad_proto::Waveform;

use crate::lock_device;

#[derive(Debug, Default)]
struct WaveState {
    force_stop: bool,
    finished: bool,
}

/// Stop/completion channel shared between the dispatcher and one worker.
#[derive(Debug, Default)]
pub struct WaveSync {
    state: Mutex<WaveState>,
    cond: Condvar,
}

impl WaveSync {
    fn lock(&self) -> MutexGuard<'_, WaveState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask the worker to stop at its next step boundary.
    pub fn request_stop(&self) {
        let mut state = self.lock();
        state.force_stop = true;
        self.cond.notify_all();
    }

    /// Whether a stop has been requested.
    pub fn stop_requested(&self) -> bool {
        self.lock().force_stop
    }

    fn mark_finished(&self) {
        let mut state = self.lock();
        state.finished = true;
        self.cond.notify_all();
    }

    /// Block until the worker has signalled completion.
    pub fn wait_finished(&self) {
        let mut state = self.lock();
        while !state.finished {
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Sleep up to `duration_ms` against a monotonic deadline, waking
    /// early on a stop request. Returns the milliseconds actually waited.
    pub fn delay_cancelable(&self, duration_ms: u32) -> u32 {
        if duration_ms == 0 {
            return 0;
        }
        let started = Instant::now();
        let deadline = started + Duration::from_millis(u64::from(duration_ms));
        let mut state = self.lock();
        loop {
            if state.force_stop {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
        drop(state);
        started.elapsed().as_millis().min(u128::from(duration_ms)) as u32
    }
}

/// True when at least one step in the repeat tail has a non-zero
/// duration; a repeating waveform whose tail is silent would spin without
/// ever driving the motor.
pub fn should_repeat(wave: &Waveform) -> bool {
    if wave.repeat < 0 {
        return false;
    }
    let len = usize::from(wave.length);
    (wave.repeat as usize..len).any(|step| wave.timings[step] != 0)
}

/// Sum of consecutive non-silent step durations starting at `start`,
/// wrapping through the repeat index at most once. A wrap that reaches
/// `start` again means the on-segment never ends; 1000 ms is returned so
/// the constant effect is refreshed every second.
pub fn total_on_duration(wave: &Waveform, start: usize) -> u32 {
    let len = usize::from(wave.length);
    let mut repeat = wave.repeat;
    let mut index = start;
    let mut total: u64 = 0;
    while wave.amplitudes[index] != 0 {
        total += u64::from(wave.timings[index]);
        index += 1;
        if index >= len {
            if repeat >= 0 {
                index = repeat as usize;
                repeat = -1;
            } else {
                break;
            }
        }
        if index == start {
            return 1000;
        }
    }
    total.min(u64::from(u32::MAX)) as u32
}

/// Owner of the single waveform worker.
#[derive(Debug)]
pub struct WaveformPlayer {
    sync: Arc<WaveSync>,
    worker: Option<JoinHandle<()>>,
}

impl WaveformPlayer {
    /// A player with no worker running.
    pub fn new() -> Self {
        Self {
            sync: Arc::new(WaveSync::default()),
            worker: None,
        }
    }

    /// Whether a worker thread is currently live.
    pub fn is_playing(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Ask a live worker to stop at its next step boundary, without
    /// waiting for it to exit.
    pub fn request_stop(&mut self) {
        if self.worker.is_some() {
            self.sync.request_stop();
        }
        self.reap();
    }

    /// Stop and join the current worker, blocking until it has signalled
    /// completion. Bounded by one step delay.
    pub fn stop_and_wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.sync.request_stop();
            self.sync.wait_finished();
            let _ = worker.join();
        }
    }

    /// Preempt any running waveform and start a new worker owning `wave`.
    pub fn start<B>(&mut self, wave: Waveform, device: Arc<Mutex<FfDevice<B>>>)
    where
        B: FfBackend + Send + 'static,
    {
        self.stop_and_wait();
        let sync = Arc::new(WaveSync::default());
        self.sync = Arc::clone(&sync);
        let spawned = thread::Builder::new()
            .name("vibrad-waveform".into())
            .spawn(move || run_waveform(wave, device, sync));
        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(err) => warn!("failed to spawn waveform worker: {err}"),
        }
    }

    fn reap(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

impl Default for WaveformPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaveformPlayer {
    fn drop(&mut self) {
        self.stop_and_wait();
    }
}

fn run_waveform<B: FfBackend>(
    wave: Waveform,
    device: Arc<Mutex<FfDevice<B>>>,
    sync: Arc<WaveSync>,
) {
    let mut index = 0usize;
    let mut on_duration_remaining: i64 = 0;

    loop {
        if sync.stop_requested() {
            break;
        }
        if index < usize::from(wave.length) {
            let raw = wave.amplitudes[index];
            let duration = wave.timings[index];
            index += 1;
            if duration == 0 {
                continue;
            }
            let (amplitude, step) = {
                let mut dev = lock_device(&device);
                let amplitude = device::scale(raw, dev.intensity());
                let step = if amplitude != 0 && on_duration_remaining <= 0 {
                    // Entering an on-segment: drive the motor for the whole
                    // segment at once, refreshing only when it runs dry.
                    on_duration_remaining = i64::from(total_on_duration(&wave, index - 1));
                    dev.upload_and_start(None, on_duration_remaining as u32)
                        .map(|_| ())
                } else if amplitude != 0 {
                    dev.set_gain(amplitude)
                } else {
                    Ok(())
                };
                (amplitude, step)
            };
            if let Err(err) = step {
                warn!("waveform step failed: {err}");
                break;
            }
            let waited = sync.delay_cancelable(duration);
            if amplitude != 0 {
                on_duration_remaining -= i64::from(waited);
            }
        } else if wave.repeat < 0 {
            break;
        } else {
            index = wave.repeat as usize;
        }
    }

    sync.mark_finished();
    debug!("waveform worker exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use vibrad_ff::backend::mock::{DeviceCall, MockBackend};
    use vibrad_proto::Intensity;

    fn wave(timings: &[u32], amplitudes: &[u8], repeat: i8) -> Waveform {
        let mut wave = Waveform {
            length: timings.len() as u8,
            repeat,
            ..Waveform::default()
        };
        wave.timings[..timings.len()].copy_from_slice(timings);
        wave.amplitudes[..amplitudes.len()].copy_from_slice(amplitudes);
        wave
    }

    fn shared_device(backend: MockBackend) -> Arc<Mutex<FfDevice<MockBackend>>> {
        Arc::new(Mutex::new(FfDevice::probe(backend).expect("probe")))
    }

    #[test]
    fn test_total_on_duration_stops_at_silence() {
        let wave = wave(&[100, 200, 300], &[50, 60, 0], -1);
        assert_eq!(total_on_duration(&wave, 0), 300);
        assert_eq!(total_on_duration(&wave, 1), 200);
        assert_eq!(total_on_duration(&wave, 2), 0);
    }

    #[test]
    fn test_total_on_duration_wraps_once() {
        // Tail is loud, head is loud, silence in the middle: starting at
        // the tail wraps into the head and stops at the silent step.
        let wave = wave(&[100, 400, 200], &[30, 0, 40], 0);
        assert_eq!(total_on_duration(&wave, 2), 300);
    }

    #[test]
    fn test_total_on_duration_endless_segment_sentinel() {
        // Every step is loud and the pattern repeats from the start, so
        // the on-segment never ends.
        let wave = wave(&[100, 100], &[10, 20], 0);
        assert_eq!(total_on_duration(&wave, 0), 1000);
        assert_eq!(total_on_duration(&wave, 1), 1000);
    }

    #[test]
    fn test_should_repeat() {
        assert!(!should_repeat(&wave(&[100, 100], &[1, 1], -1)));
        assert!(should_repeat(&wave(&[100, 100], &[1, 1], 0)));
        assert!(should_repeat(&wave(&[0, 100], &[1, 1], 1)));
        // Repeat tail of zero-duration steps never drives the motor.
        assert!(!should_repeat(&wave(&[100, 0], &[1, 1], 1)));
    }

    #[test]
    fn test_delay_cancelable_full_wait() {
        let sync = WaveSync::default();
        let started = Instant::now();
        let waited = sync.delay_cancelable(50);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(waited, 50);
    }

    #[test]
    fn test_delay_cancelable_wakes_on_stop() {
        let sync = Arc::new(WaveSync::default());
        let stopper = Arc::clone(&sync);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            stopper.request_stop();
        });
        let waited = sync.delay_cancelable(5_000);
        assert!(waited < 1_000, "stop request should cut the delay short");
        handle.join().expect("stopper thread");
    }

    #[test]
    fn test_oneshot_plays_and_exits() {
        let backend = MockBackend::new();
        let history = backend.history();
        let device = shared_device(backend);
        let mut player = WaveformPlayer::new();

        player.start(wave(&[40], &[200], -1), Arc::clone(&device));
        thread::sleep(Duration::from_millis(200));
        assert!(!player.is_playing());
        assert_eq!(
            history.snapshot(),
            vec![
                DeviceCall::UploadConstant {
                    level: 0x7fff,
                    length_ms: 40
                },
                DeviceCall::Play {
                    effect_id: 0,
                    value: 1
                },
            ]
        );
    }

    #[test]
    fn test_silent_steps_touch_nothing() {
        let backend = MockBackend::new();
        let history = backend.history();
        let device = shared_device(backend);
        let mut player = WaveformPlayer::new();

        player.start(wave(&[20, 20], &[0, 0], -1), Arc::clone(&device));
        thread::sleep(Duration::from_millis(200));
        assert!(history.is_empty());
    }

    #[test]
    fn test_amplitude_scaled_by_intensity() {
        let backend = MockBackend::new();
        let history = backend.history();
        let device = shared_device(backend);
        lock_device(&device).set_intensity(Intensity::Low);
        let mut player = WaveformPlayer::new();

        // Two loud steps: the first opens the segment, the second only
        // adjusts the gain, scaled to 30%.
        player.start(wave(&[30, 30], &[100, 200], -1), Arc::clone(&device));
        thread::sleep(Duration::from_millis(250));
        let calls = history.snapshot();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], DeviceCall::UploadConstant { length_ms: 60, .. }));
        assert!(matches!(calls[1], DeviceCall::Play { .. }));
        assert_eq!(
            calls[2],
            DeviceCall::Gain {
                value: i32::from(vibrad_ff::device::amplitude_magnitude(60))
            }
        );
    }

    #[test]
    fn test_preemption_joins_previous_worker() {
        let backend = MockBackend::new();
        let history = backend.history();
        let device = shared_device(backend);
        let mut player = WaveformPlayer::new();

        player.start(wave(&[5_000, 5_000], &[200, 200], 0), Arc::clone(&device));
        thread::sleep(Duration::from_millis(50));
        // The successor must observe the first worker's completion before
        // its own first step runs.
        player.start(wave(&[40], &[100], -1), Arc::clone(&device));
        thread::sleep(Duration::from_millis(200));
        assert!(!player.is_playing());

        let uploads = history.count(|c| matches!(c, DeviceCall::UploadConstant { .. }));
        assert_eq!(uploads, 2);
    }

    #[test]
    fn test_request_stop_halts_at_step_boundary() {
        let backend = MockBackend::new();
        let history = backend.history();
        let device = shared_device(backend);
        let mut player = WaveformPlayer::new();

        player.start(wave(&[5_000, 5_000], &[200, 200], 0), Arc::clone(&device));
        thread::sleep(Duration::from_millis(50));
        player.request_stop();
        thread::sleep(Duration::from_millis(100));
        assert!(!player.is_playing());
        // One segment upload, one play, nothing after the stop.
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_worker_stops_on_device_error() {
        let backend = MockBackend::new().fail_events();
        let device = shared_device(backend);
        let mut player = WaveformPlayer::new();

        player.start(wave(&[1_000, 1_000], &[200, 200], 0), Arc::clone(&device));
        thread::sleep(Duration::from_millis(100));
        assert!(!player.is_playing(), "device error must end the waveform");
    }
}
