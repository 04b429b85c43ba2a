//! Drive the orchestrator against the simulated camera.
//!
//! Run with `RUST_LOG=thermal_fsm=debug` for the full transition log.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thermal_fsm::device::simulated::{SimulatedPermission, SimulatedSdk};
use thermal_fsm::device::{CameraState, Collaborators, DeviceOrchestrator, NucState};
use thermal_fsm::OrchestratorConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn wait_for(states: &mpsc::Receiver<CameraState>, target: CameraState) {
    while let Ok(state) = states.recv_timeout(Duration::from_secs(5)) {
        info!(state = ?state, "camera state");
        if state == target {
            return;
        }
    }
    panic!("camera never reached {target:?}");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = OrchestratorConfig::from_json(r#"{ "frame_timeout_ms": 2000 }"#)
        .expect("demo configuration is valid");
    let sdk = SimulatedSdk::new();
    let (state_tx, states) = mpsc::channel();
    let state_tx = Mutex::new(state_tx);

    let camera = DeviceOrchestrator::new(
        config,
        Collaborators {
            sdk: Arc::new(sdk.clone()),
            permission: Arc::new(SimulatedPermission::new(true)),
            on_state_change: Arc::new(move |state| {
                let _ = state_tx.lock().unwrap().send(state);
            }),
            on_frame_ready: Arc::new(|| {}),
        },
    )
    .expect("orchestrator builds");

    camera.start_camera();
    wait_for(&states, CameraState::Streaming);

    for _ in 0..3 {
        sdk.emit_frame();
        std::thread::sleep(Duration::from_millis(30));
    }
    if let Some(frame) = camera.most_recent_bitmap() {
        info!(width = frame.width, height = frame.height, "latest frame");
    }

    camera.ffc_calibration();
    sdk.emit_nuc(NucState::Progress);
    wait_for(&states, CameraState::Calibrating);
    sdk.emit_nuc(NucState::ValidRad);
    wait_for(&states, CameraState::Streaming);

    camera.pause_stream();
    wait_for(&states, CameraState::StandBy);
    camera.start_camera();
    wait_for(&states, CameraState::Streaming);

    camera.on_device_unavailable("0");
    wait_for(&states, CameraState::Clobbered);
    camera.start_camera();
    wait_for(&states, CameraState::Streaming);

    camera.close();
    info!(
        transitions = camera.history().len(),
        scans = sdk.scan_count(),
        "demo finished"
    );
}
