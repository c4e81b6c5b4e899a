//! Socket-level tests: a real daemon over a Unix socket, mock motor.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use vibrad_ff::backend::mock::{CallHistory, DeviceCall, MockBackend};
use vibrad_ff::device::STRONG_MAGNITUDE;
use vibrad_ff::FfDevice;
use vibrad_proto::wire::{self, EffectTail, Reply, Request};
use vibrad_proto::{status, CommandKind, EffectStrength, Intensity, Interval, Waveform};
use vibrad_service::{ServiceConfig, VibratorService};

struct RunningServer {
    socket: PathBuf,
    stop: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RunningServer {
    fn start(backend: MockBackend, socket: PathBuf, props: PathBuf) -> Self {
        let device = FfDevice::probe(backend).expect("mock probe");
        let config = ServiceConfig {
            socket_path: socket.clone(),
            property_path: props,
            ..ServiceConfig::default()
        };
        let service = VibratorService::with_device(device, config);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            runtime
                .block_on(service.run_until(async {
                    let _ = rx.await;
                }))
                .expect("server run");
        });

        let server = Self {
            socket,
            stop: Some(tx),
            thread: Some(thread),
        };
        server.wait_ready();
        server
    }

    fn wait_ready(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if UnixStream::connect(&self.socket).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("server socket never became ready");
    }

    fn connect(&self) -> UnixStream {
        let stream = UnixStream::connect(&self.socket).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        stream
    }

    /// Send one request and read its full reply, asserting the server
    /// writes exactly `response_len` bytes and then closes.
    fn roundtrip(&self, request: &Request) -> (i32, Reply) {
        let mut stream = self.connect();
        let mut buf = [0u8; wire::FRAME_MAX];
        let len = wire::encode_request(request, &mut buf);
        stream.write_all(&buf[..len]).expect("send request");

        let kind = request.kind();
        let mut reply = vec![0u8; kind.response_len()];
        stream.read_exact(&mut reply).expect("read reply");
        let mut extra = [0u8; 1];
        assert_eq!(
            stream.read(&mut extra).expect("read eof"),
            0,
            "server must close after exactly response_len bytes"
        );
        wire::decode_reply(kind, &reply).expect("decode reply")
    }

    fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            thread.join().expect("server thread");
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct Fixture {
    server: RunningServer,
    history: CallHistory,
    _dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self::with_backend(MockBackend::new())
    }

    fn with_backend(backend: MockBackend) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = backend.history();
        let server = RunningServer::start(
            backend,
            dir.path().join("vibratord.sock"),
            dir.path().join("properties"),
        );
        Self {
            server,
            history,
            _dir: dir,
        }
    }
}

fn waveform(timings: &[u32], amplitudes: &[u8], repeat: i8) -> Waveform {
    let mut wave = Waveform {
        length: timings.len() as u8,
        repeat,
        ..Waveform::default()
    };
    wave.timings[..timings.len()].copy_from_slice(timings);
    wave.amplitudes[..amplitudes.len()].copy_from_slice(amplitudes);
    wave
}

#[test]
fn test_capabilities_reply() {
    let fixture = Fixture::new();
    let (result, reply) = fixture.server.roundtrip(&Request::GetCapabilities);
    assert_eq!(result, status::OK);
    match reply {
        Reply::Capabilities(caps) => assert_ne!(caps, 0),
        other => panic!("unexpected reply {other:?}"),
    }
    assert!(fixture.history.is_empty());
}

#[test]
fn test_oneshot_waveform_plays_once() {
    let fixture = Fixture::new();
    let (result, _) = fixture.server.roundtrip(&Request::SetIntensity {
        intensity: Intensity::High,
    });
    assert_eq!(result, status::OK);

    let (result, _) = fixture
        .server
        .roundtrip(&Request::Waveform(waveform(&[100], &[200], -1)));
    assert_eq!(result, status::OK);

    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(
        fixture.history.snapshot(),
        vec![
            DeviceCall::UploadConstant {
                level: STRONG_MAGNITUDE,
                length_ms: 100
            },
            DeviceCall::Play {
                effect_id: 0,
                value: 1
            },
        ]
    );

    // Quiet after the pattern has run out.
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(fixture.history.len(), 2);
}

#[test]
fn test_predefined_effect_reports_duration() {
    let fixture = Fixture::with_backend(MockBackend::new().predicted_duration(0, 48));
    let (result, reply) = fixture.server.roundtrip(&Request::PredefinedEffect {
        effect_id: 5,
        strength: EffectStrength::Strong,
    });
    assert_eq!(result, status::OK);
    assert_eq!(
        reply,
        Reply::Effect {
            effect_id: 5,
            play_length_ms: 48,
            tail: EffectTail::Strength(EffectStrength::Strong),
        }
    );
    assert_eq!(
        fixture.history.snapshot(),
        vec![
            DeviceCall::UploadCustom {
                magnitude: STRONG_MAGNITUDE,
                effect_id: 5
            },
            DeviceCall::Play {
                effect_id: 0,
                value: 1
            },
        ]
    );
}

#[test]
fn test_stop_preempts_waveform() {
    let fixture = Fixture::new();
    let (result, _) = fixture
        .server
        .roundtrip(&Request::Waveform(waveform(&[1_000, 1_000], &[200, 200], 0)));
    assert_eq!(result, status::OK);
    std::thread::sleep(Duration::from_millis(50));

    let (result, _) = fixture.server.roundtrip(&Request::Stop);
    assert_eq!(result, status::OK);
    std::thread::sleep(Duration::from_millis(150));

    let calls = fixture.history.snapshot();
    let uploads = calls
        .iter()
        .filter(|c| matches!(c, DeviceCall::UploadConstant { .. }))
        .count();
    let erases = calls
        .iter()
        .filter(|c| matches!(c, DeviceCall::Erase { .. }))
        .count();
    assert_eq!(uploads, 1, "preempted waveform must not upload again");
    assert_eq!(erases, 1, "exactly one removal from the stop");
}

#[test]
fn test_intensity_off_gates_play() {
    let fixture = Fixture::new();
    let (result, _) = fixture.server.roundtrip(&Request::SetIntensity {
        intensity: Intensity::Off,
    });
    assert_eq!(result, status::OK);

    let (result, _) = fixture
        .server
        .roundtrip(&Request::Start { timeout_ms: 1_000 });
    assert_eq!(result, status::NOT_SUPPORTED);

    let (result, _) = fixture
        .server
        .roundtrip(&Request::Waveform(waveform(&[100], &[200], -1)));
    assert_eq!(result, status::NOT_SUPPORTED);

    assert!(fixture.history.is_empty(), "no device I/O while muted");
}

#[test]
fn test_waveform_validation() {
    let fixture = Fixture::new();
    let (result, _) = fixture
        .server
        .roundtrip(&Request::Waveform(waveform(&[10, 10, 10], &[1, 1, 1], 3)));
    assert_eq!(result, status::INVALID_ARGUMENT);
    assert!(fixture.history.is_empty());
}

#[test]
fn test_interval_plays_count_cycles() {
    let fixture = Fixture::new();
    let (result, _) = fixture.server.roundtrip(&Request::Interval(Interval {
        duration_ms: 50,
        interval_ms: 100,
        count: 3,
    }));
    assert_eq!(result, status::OK);

    std::thread::sleep(Duration::from_millis(700));
    let uploads = fixture
        .history
        .count(|c| matches!(c, DeviceCall::UploadConstant { length_ms: 50, .. }));
    assert_eq!(uploads, 3);

    // No further cycle after the schedule is exhausted.
    std::thread::sleep(Duration::from_millis(300));
    let uploads = fixture
        .history
        .count(|c| matches!(c, DeviceCall::UploadConstant { length_ms: 50, .. }));
    assert_eq!(uploads, 3);
}

#[test]
fn test_intensity_persists_across_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let props = dir.path().join("properties");

    let server = RunningServer::start(
        MockBackend::new(),
        dir.path().join("first.sock"),
        props.clone(),
    );
    let (result, _) = server.roundtrip(&Request::SetIntensity {
        intensity: Intensity::Low,
    });
    assert_eq!(result, status::OK);
    server.stop();

    let server = RunningServer::start(MockBackend::new(), dir.path().join("second.sock"), props);
    let (result, reply) = server.roundtrip(&Request::GetIntensity);
    assert_eq!(result, status::OK);
    assert_eq!(reply, Reply::Intensity(Intensity::Low));
    server.stop();
}

#[test]
fn test_undersized_request_rejected() {
    let fixture = Fixture::new();
    let mut stream = fixture.server.connect();
    // Six bytes is not even a full header.
    stream.write_all(&[0, 0, 0, 0, 1, 0]).expect("send");
    stream.shutdown(Shutdown::Write).expect("shutdown");

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).expect("read reply");
    assert_eq!(i32::from_le_bytes(reply), status::INVALID_ARGUMENT);
}

#[test]
fn test_truncated_payload_rejected() {
    let fixture = Fixture::new();
    let mut stream = fixture.server.connect();
    // A full header declaring a waveform, but no payload follows.
    let mut header = [0u8; wire::MSG_HEADER];
    header[wire::OFF_TYPE] = CommandKind::Waveform as u8;
    stream.write_all(&header).expect("send");
    stream.shutdown(Shutdown::Write).expect("shutdown");

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).expect("read reply");
    assert_eq!(i32::from_le_bytes(reply), status::INVALID_ARGUMENT);
    assert!(fixture.history.is_empty());
}

#[test]
fn test_unknown_tag_rejected() {
    let fixture = Fixture::new();
    let mut stream = fixture.server.connect();
    let mut header = [0u8; wire::MSG_HEADER];
    header[wire::OFF_TYPE] = 99;
    stream.write_all(&header).expect("send");

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).expect("read reply");
    assert_eq!(i32::from_le_bytes(reply), status::INVALID_ARGUMENT);
}

#[test]
fn test_set_amplitude_then_start_applies_scaled_gain() {
    let fixture = Fixture::new();
    let (result, _) = fixture
        .server
        .roundtrip(&Request::SetAmplitude { amplitude: 200 });
    assert_eq!(result, status::OK);
    fixture.history.clear();

    let (result, _) = fixture.server.roundtrip(&Request::Start { timeout_ms: 500 });
    assert_eq!(result, status::OK);

    let calls = fixture.history.snapshot();
    assert!(matches!(
        calls[0],
        DeviceCall::UploadConstant { length_ms: 500, .. }
    ));
    assert!(matches!(calls[1], DeviceCall::Play { .. }));
    // Default intensity is Medium: 200 scales to 120.
    assert_eq!(
        calls[2],
        DeviceCall::Gain {
            value: i32::from(vibrad_ff::device::amplitude_magnitude(120))
        }
    );
}

#[test]
fn test_calibration_round_trip_over_socket() {
    let fixture = Fixture::new();
    let mut value = [0u8; vibrad_proto::CALIB_VALUE_MAX];
    value[7] = 0x99;
    let (result, _) = fixture.server.roundtrip(&Request::SetCalibValue { value });
    assert_eq!(result, status::OK);

    let (result, reply) = fixture.server.roundtrip(&Request::Calibrate);
    assert_eq!(result, status::OK);
    assert_eq!(reply, Reply::Calibration(value));
}

#[test]
fn test_composition_answered_not_supported() {
    let fixture = Fixture::new();
    let (result, _) = fixture.server.roundtrip(&Request::Composition);
    assert_eq!(result, status::NOT_SUPPORTED);
    assert!(fixture.history.is_empty());
}

#[test]
fn test_waveform_preempts_waveform() {
    let fixture = Fixture::new();
    let (result, _) = fixture
        .server
        .roundtrip(&Request::Waveform(waveform(&[5_000, 5_000], &[200, 200], 0)));
    assert_eq!(result, status::OK);
    std::thread::sleep(Duration::from_millis(50));

    let (result, _) = fixture
        .server
        .roundtrip(&Request::Waveform(waveform(&[80], &[100], -1)));
    assert_eq!(result, status::OK);
    std::thread::sleep(Duration::from_millis(400));

    // Both waveforms opened exactly one on-segment each.
    let uploads = fixture
        .history
        .count(|c| matches!(c, DeviceCall::UploadConstant { .. }));
    assert_eq!(uploads, 2);
}
