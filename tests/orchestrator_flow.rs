//! End-to-end lifecycle tests against the simulated camera.
//!
//! States are observed through the state-change callback over a channel.
//! Set `RUST_LOG=thermal_fsm=debug` to see the orchestrator's logs.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thermal_fsm::device::simulated::{ConnectBehavior, SimulatedPermission, SimulatedSdk};
use thermal_fsm::device::{
    CameraState, Collaborators, DeviceError, DeviceOrchestrator, DiscoveryEvent, FusionMode,
    NucState,
};
use thermal_fsm::range::TemperatureRange;
use thermal_fsm::OrchestratorConfig;
use tracing_subscriber::EnvFilter;

use CameraState::*;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(150);

const STARTUP: [CameraState; 6] = [
    Discovering,
    DeviceFound,
    Connecting,
    Connected,
    StartingStream,
    Streaming,
];

struct Harness {
    sdk: SimulatedSdk,
    permission: Arc<SimulatedPermission>,
    states: Receiver<CameraState>,
    frames: Receiver<()>,
    camera: DeviceOrchestrator,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(OrchestratorConfig::default(), SimulatedSdk::new())
    }

    fn with_config(config: OrchestratorConfig, sdk: SimulatedSdk) -> Self {
        init_logging();
        let permission = Arc::new(SimulatedPermission::new(true));
        let (state_tx, states) = mpsc::channel();
        let (frame_tx, frames) = mpsc::channel();
        let state_tx = Mutex::new(state_tx);
        let frame_tx = Mutex::new(frame_tx);

        let camera = DeviceOrchestrator::new(
            config,
            Collaborators {
                sdk: Arc::new(sdk.clone()),
                permission: permission.clone(),
                on_state_change: Arc::new(move |state| {
                    let _ = state_tx.lock().unwrap().send(state);
                }),
                on_frame_ready: Arc::new(move || {
                    let _ = frame_tx.lock().unwrap().send(());
                }),
            },
        )
        .unwrap();

        Self {
            sdk,
            permission,
            states,
            frames,
            camera,
        }
    }

    fn expect(&self, expected: &[CameraState]) {
        let seen: Vec<CameraState> = expected
            .iter()
            .map(|want| {
                let got = self
                    .states
                    .recv_timeout(WAIT)
                    .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"));
                assert_eq!(got, *want);
                got
            })
            .collect();
        assert_eq!(seen, expected);
    }

    fn expect_quiet(&self) {
        if let Ok(state) = self.states.recv_timeout(QUIET) {
            panic!("unexpected transition to {state:?}");
        }
    }

    fn start_streaming(&self) {
        self.camera.start_camera();
        self.expect(&STARTUP);
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn start_camera_walks_to_streaming() {
    let harness = Harness::new();
    harness.start_streaming();

    assert_eq!(harness.camera.camera_state(), Streaming);
    assert_eq!(harness.sdk.scan_count(), 1);
    assert_eq!(harness.sdk.stop_scan_count(), 1);
    assert_eq!(harness.sdk.selected_range(), Some(0));
    assert!(!harness.sdk.auto_calibration_enabled());

    let settings = harness.sdk.image_settings().unwrap();
    assert_eq!(settings.palette, "iron");
    assert_eq!(settings.fusion, FusionMode::Msx);
    assert!(!settings.auto_scale);

    let path = harness.camera.history().get_path();
    assert_eq!(path.first(), Some(&Idle));
    assert_eq!(&path[1..], &STARTUP);
}

#[test]
fn frames_are_rendered_and_signalled() {
    let harness = Harness::new();
    harness.start_streaming();
    assert!(harness.camera.most_recent_bitmap().is_none());

    assert!(harness.sdk.emit_frame());
    harness.frames.recv_timeout(WAIT).unwrap();

    let bitmap = harness.camera.most_recent_bitmap().unwrap();
    assert_eq!((bitmap.width, bitmap.height), (160, 120));
    assert_eq!(harness.sdk.color_range(), Some((10.0, 20.0)));
}

#[test]
fn temperature_bounds_keep_minimum_separation() {
    let harness = Harness::new();

    assert!(!harness.camera.set_min_temp(19.8));
    assert!(!harness.camera.set_max_temp(10.4));
    assert_eq!(harness.camera.min_temp(), 10.0);
    assert_eq!(harness.camera.max_temp(), 20.0);

    assert!(harness.camera.set_max_temp(30.0));
    assert!(harness.camera.set_min_temp(-5.0));

    harness.start_streaming();
    harness.sdk.emit_frame();
    harness.frames.recv_timeout(WAIT).unwrap();
    assert_eq!(harness.sdk.color_range(), Some((-5.0, 30.0)));
}

#[test]
fn clobber_recovery_reuses_cached_identity() {
    let harness = Harness::new();
    harness.start_streaming();

    harness.camera.on_device_unavailable("0");
    harness.expect(&[Clobbered]);

    harness.camera.start_camera();
    harness.expect(&[Idle]);
    harness.expect(&STARTUP);

    assert_eq!(harness.sdk.scan_count(), 1);
    assert_eq!(harness.sdk.cameras_created(), 2);
    assert_eq!(harness.sdk.cameras_closed(), 1);
}

#[test]
fn disconnect_discards_cached_identity() {
    let harness = Harness::new();
    harness.start_streaming();

    harness.camera.disconnect();
    harness.expect(&[Idle]);
    eventually(|| !harness.sdk.any_connected() && !harness.sdk.is_streaming());
    eventually(|| harness.sdk.stop_scan_count() == 2);

    harness.start_streaming();
    assert_eq!(harness.sdk.scan_count(), 2);
}

#[test]
fn hung_connect_is_released_and_compromised() {
    let config = OrchestratorConfig {
        connect_timeout_ms: 100,
        ..OrchestratorConfig::default()
    };
    let sdk = SimulatedSdk::new();
    sdk.set_connect_behavior(ConnectBehavior::Hang);
    let harness = Harness::with_config(config, sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, DeviceFound, Connecting, Compromised]);
    assert_eq!(harness.sdk.cameras_created(), 2);
    assert_eq!(harness.sdk.cameras_closed(), 1);
    assert!(!harness.sdk.any_connected());

    harness.sdk.set_connect_behavior(ConnectBehavior::Succeed);
    harness.camera.disconnect();
    harness.expect(&[Idle]);
    harness.start_streaming();
    assert_eq!(harness.sdk.scan_count(), 1);
}

#[test]
fn pause_and_resume_through_stand_by() {
    let harness = Harness::new();
    harness.start_streaming();

    harness.camera.pause_stream();
    harness.expect(&[StandBy]);
    eventually(|| !harness.sdk.is_streaming());
    assert!(harness.sdk.any_connected());

    harness.camera.start_camera();
    harness.expect(&[Connected, StartingStream, Streaming]);
    assert_eq!(harness.sdk.connect_count(), 1);
}

#[test]
fn long_stand_by_disconnects() {
    let config = OrchestratorConfig {
        stand_by_timeout_ms: 100,
        ..OrchestratorConfig::default()
    };
    let harness = Harness::with_config(config, SimulatedSdk::new());
    harness.start_streaming();

    harness.camera.pause_stream();
    harness.expect(&[StandBy, Idle]);
    eventually(|| !harness.sdk.any_connected());
}

#[test]
fn missing_frames_compromise_the_stream() {
    let config = OrchestratorConfig {
        frame_timeout_ms: 100,
        ..OrchestratorConfig::default()
    };
    let harness = Harness::with_config(config, SimulatedSdk::new());
    harness.start_streaming();
    harness.expect(&[Compromised]);
}

#[test]
fn discovery_error_retries_after_backoff() {
    let config = OrchestratorConfig {
        discover_retry_ms: 20,
        ..OrchestratorConfig::default()
    };
    let sdk = SimulatedSdk::new();
    sdk.push_discovery(DiscoveryEvent::Failed(DeviceError::Unavailable(
        "scan aborted".to_string(),
    )));
    let harness = Harness::with_config(config, sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, Idle]);
    harness.expect(&STARTUP);
    assert_eq!(harness.sdk.scan_count(), 2);
}

#[test]
fn unsupported_interface_is_terminal() {
    let sdk = SimulatedSdk::new();
    sdk.push_discovery(DiscoveryEvent::Failed(DeviceError::InterfaceNotSupported));
    let harness = Harness::with_config(OrchestratorConfig::default(), sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, NotSupported]);

    harness.camera.start_camera();
    harness.camera.disconnect();
    harness.expect_quiet();
    assert_eq!(harness.camera.camera_state(), NotSupported);
}

#[test]
fn permission_denial_is_reported() {
    let harness = Harness::new();
    harness.permission.set_granted(false);

    harness.camera.start_camera();
    harness.expect(&[Discovering, DeviceFound, Connecting, NoPermission]);
    eventually(|| harness.permission.requests() >= 2);
    harness.expect_quiet();
    assert_eq!(harness.sdk.connect_count(), 0);

    harness.permission.set_granted(true);
    harness.camera.disconnect();
    harness.expect(&[Idle]);
    harness.start_streaming();
}

#[test]
fn missing_calibration_interface_retries_connect() {
    let config = OrchestratorConfig {
        retry_backoff_ms: 50,
        ..OrchestratorConfig::default()
    };
    let sdk = SimulatedSdk::new();
    sdk.set_connect_behavior(ConnectBehavior::NoCalibration);
    let harness = Harness::with_config(config, sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, DeviceFound, Connecting, DeviceFound, Connecting]);
    harness.camera.close();
}

#[test]
fn calibration_events_map_to_states() {
    let harness = Harness::new();
    harness.start_streaming();

    harness.sdk.emit_nuc(NucState::Desired);
    harness.expect(&[NeedCalibrate]);
    harness.sdk.emit_nuc(NucState::Progress);
    harness.expect(&[Calibrating]);
    harness.sdk.emit_nuc(NucState::ValidRad);
    harness.expect(&[Streaming]);

    harness.sdk.emit_nuc(NucState::Unrecognized(42));
    harness.expect_quiet();
    assert_eq!(harness.camera.camera_state(), Streaming);
}

#[test]
fn manual_calibration_only_while_streaming() {
    let harness = Harness::new();
    harness.camera.ffc_calibration();
    assert_eq!(harness.sdk.calibration_count(), 0);

    harness.start_streaming();
    harness.camera.ffc_calibration();
    eventually(|| harness.sdk.calibration_count() == 1);
}

#[test]
fn close_releases_the_camera() {
    let harness = Harness::new();
    harness.start_streaming();

    harness.camera.close();
    harness.expect(&[Idle]);
    assert!(!harness.sdk.any_connected());
    assert!(!harness.sdk.is_streaming());
    assert_eq!(harness.sdk.cameras_closed(), 1);
}

#[test]
fn unsupported_host_ignores_everything() {
    let (tx, states) = mpsc::channel();
    let tx = Mutex::new(tx);
    let camera = DeviceOrchestrator::unsupported(
        Arc::new(move |state| {
            let _ = tx.lock().unwrap().send(state);
        }),
        "thermal SDK failed to load",
    )
    .unwrap();

    assert_eq!(states.recv_timeout(WAIT).unwrap(), NotSupported);
    camera.start_camera();
    camera.pause_stream();
    camera.disconnect();
    camera.on_device_unavailable("0");
    camera.close();
    assert!(states.recv_timeout(QUIET).is_err());
    assert_eq!(camera.camera_state(), NotSupported);
}

fn with_backoff(retry_backoff_ms: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        retry_backoff_ms,
        ..OrchestratorConfig::default()
    }
}

#[test]
fn pause_while_connecting_ends_in_stand_by() {
    let sdk = SimulatedSdk::new();
    sdk.set_connect_behavior(ConnectBehavior::Slow(Duration::from_millis(300)));
    let harness = Harness::with_config(OrchestratorConfig::default(), sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, DeviceFound, Connecting]);
    harness.camera.pause_stream();
    harness.expect(&[ConnectingPaused, StandBy]);
    assert!(harness.sdk.any_connected());
    assert!(!harness.sdk.is_streaming());

    harness.camera.start_camera();
    harness.expect(&[Connected, StartingStream, Streaming]);
    assert_eq!(harness.sdk.connect_count(), 1);
}

#[test]
fn start_camera_resumes_a_paused_connect() {
    let sdk = SimulatedSdk::new();
    sdk.set_connect_behavior(ConnectBehavior::Slow(Duration::from_millis(400)));
    let harness = Harness::with_config(OrchestratorConfig::default(), sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, DeviceFound, Connecting]);
    harness.camera.pause_stream();
    harness.expect(&[ConnectingPaused]);
    harness.camera.start_camera();
    harness.expect(&[Connecting]);

    harness.expect(&[Connected, StartingStream, Streaming]);
    assert_eq!(harness.sdk.connect_count(), 1);
}

#[test]
fn calibration_during_stream_start_resolves_to_calibrating() {
    let sdk = SimulatedSdk::new();
    sdk.calibrate_during_stream_setup(NucState::Progress);
    let harness = Harness::with_config(OrchestratorConfig::default(), sdk);

    harness.camera.start_camera();
    harness.expect(&[
        Discovering,
        DeviceFound,
        Connecting,
        Connected,
        StartingStream,
        StartWithCalibration,
        Calibrating,
    ]);
    assert!(harness.sdk.is_streaming());

    harness.sdk.emit_nuc(NucState::ValidRad);
    harness.expect(&[Streaming]);
}

#[test]
fn busy_stream_backs_off_until_pause() {
    let sdk = SimulatedSdk::new();
    sdk.set_stream_busy(true);
    let harness = Harness::with_config(with_backoff(100), sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, DeviceFound, Connecting, Connected, StartingStream, Connected]);
    harness.expect(&[StartingStream, Connected]);
    assert!(harness.camera.history().len() < 12);

    harness.camera.pause_stream();
    harness.expect(&[StandBy]);
    thread::sleep(Duration::from_millis(200));
    harness.expect_quiet();
    assert_eq!(harness.camera.camera_state(), StandBy);

    harness.sdk.set_stream_busy(false);
    harness.camera.start_camera();
    harness.expect(&[Connected, StartingStream, Streaming]);
}

#[test]
fn stream_start_failure_retries_after_backoff() {
    let sdk = SimulatedSdk::new();
    sdk.fail_stream_start(Some(DeviceError::StreamFailed("usb reset".to_string())));
    let harness = Harness::with_config(with_backoff(400), sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, DeviceFound, Connecting, Connected, StartingStream, Connected]);
    harness.expect_quiet();
    assert!(!harness.sdk.is_streaming());

    harness.sdk.fail_stream_start(None);
    harness.expect(&[StartingStream, Streaming]);
    assert_eq!(harness.sdk.connect_count(), 1);
}

#[test]
fn failed_connect_retries_after_backoff() {
    let sdk = SimulatedSdk::new();
    sdk.set_connect_behavior(ConnectBehavior::Fail("bus error".to_string()));
    let harness = Harness::with_config(with_backoff(400), sdk);

    harness.camera.start_camera();
    harness.expect(&[Discovering, DeviceFound, Connecting, DeviceFound]);
    harness.expect_quiet();
    assert_eq!(harness.sdk.connect_count(), 1);

    harness.sdk.set_connect_behavior(ConnectBehavior::Succeed);
    harness.expect(&[Connecting, Connected, StartingStream, Streaming]);
    assert_eq!(harness.sdk.connect_count(), 2);
    assert_eq!(harness.sdk.scan_count(), 1);
}

#[test]
fn single_gain_mode_is_left_alone() {
    let sdk = SimulatedSdk::new();
    sdk.set_temperature_ranges(Some(vec![TemperatureRange::new(-10.0, 140.0)]));
    let harness = Harness::with_config(OrchestratorConfig::default(), sdk);

    harness.start_streaming();
    assert_eq!(harness.sdk.selected_range(), None);
}

#[test]
fn gain_mode_follows_the_target_range() {
    let sdk = SimulatedSdk::new();
    sdk.set_temperature_ranges(Some(vec![
        TemperatureRange::new(100.0, 650.0),
        TemperatureRange::new(-20.0, 120.0),
    ]));
    let harness = Harness::with_config(OrchestratorConfig::default(), sdk);

    harness.start_streaming();
    assert_eq!(harness.sdk.selected_range(), Some(1));
}
