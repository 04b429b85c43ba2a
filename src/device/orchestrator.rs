//! Thermal camera lifecycle orchestration.
//!
//! The orchestrator wires the camera lifecycle into a [`StateMachine`]:
//! post-hooks walk the machine from discovery through connect to streaming,
//! cleanup actions release hardware resources level by level, and hardware
//! callbacks feed calibration and availability events back in.
//!
//! Locking: the engine lock is always taken before the device lock. Never
//! call `set_state` while holding the device lock.

use super::colors::ColorRange;
use super::error::{DeviceError, SetupError};
use super::sdk::{
    AccessPermission, Bitmap, Camera, DiscoveryEvent, FrameListener, Identity, ImageSettings,
    NucState, RemoteControl, Stream, Streamer, ThermalSdk,
};
use super::state::{CameraState, CONNECTION_STATES, DISCOVERY_STATES, STREAM_STATES};
use super::watchdog::Watchdog;
use crate::builder::StateMachineBuilder;
use crate::config::OrchestratorConfig;
use crate::core::{State, StateHistory, StateTransition};
use crate::engine::{Critical, Observer, StateMachine};
use crate::range::match_range;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use CameraState::*;

/// Callback signalled after each processed frame.
pub type FrameReady = Arc<dyn Fn() + Send + Sync>;

/// Everything the orchestrator talks to besides the state machine.
pub struct Collaborators {
    pub sdk: Arc<dyn ThermalSdk>,
    pub permission: Arc<dyn AccessPermission>,
    /// Notified with the new state after every accepted transition. Must not block.
    pub on_state_change: Observer<CameraState>,
    pub on_frame_ready: FrameReady,
}

/// Attempts made by the permission loop when the denial cannot be recorded.
const PERMISSION_ATTEMPTS: usize = 3;

type CoreSlot = Arc<OnceLock<Weak<Core>>>;

type Step = fn(&Arc<Core>);

struct Backend {
    sdk: Arc<dyn ThermalSdk>,
    permission: Arc<dyn AccessPermission>,
}

/// Hardware resources. Each is only present while its cleanup level is active.
#[derive(Default)]
struct Device {
    camera: Option<Arc<dyn Camera>>,
    identity: Option<Identity>,
    remote_control: Option<Arc<dyn RemoteControl>>,
    stream: Option<Arc<dyn Stream>>,
    streamer: Option<Arc<dyn Streamer>>,
    most_recent_frame: Option<Bitmap>,
}

struct Core {
    machine: StateMachine<CameraState>,
    config: OrchestratorConfig,
    backend: Option<Backend>,
    on_frame_ready: Option<FrameReady>,
    device: Mutex<Device>,
    colors: Mutex<ColorRange>,
    watchdog: Watchdog,
    /// Set when DeviceFound is re-entered after a failed connect.
    connect_backoff: AtomicBool,
    /// Set when Connected is re-entered after a failed stream start.
    stream_backoff: AtomicBool,
}

/// Drives one thermal camera through discovery, connect, streaming and
/// calibration.
///
/// All operations return immediately; progress is reported through the
/// state observer. Cloning yields another handle to the same camera.
#[derive(Clone)]
pub struct DeviceOrchestrator {
    core: Arc<Core>,
}

impl DeviceOrchestrator {
    /// Build an orchestrator in the Idle state.
    pub fn new(
        config: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> Result<Self, SetupError> {
        config.validate()?;

        let slot: CoreSlot = Arc::new(OnceLock::new());
        let machine = lifecycle_builder(&config, collaborators.on_state_change)
            .worker_name("camera-state")
            .pre_hook(Clobbered, on_core(&slot, Core::replace_camera))
            .pre_hook(StandBy, on_core(&slot, Core::cancel_watchdog))
            .pre_hook(Streaming, on_core(&slot, Core::cancel_watchdog))
            .post_hook(NoPermission, on_core(&slot, Core::ask_permission))
            .post_hook(DeviceFound, on_core(&slot, Core::on_device_found))
            .post_hook(Connected, on_core(&slot, Core::on_connected))
            .post_hook(StandBy, on_core(&slot, Core::arm_stand_by_timeout))
            .post_hook(Streaming, on_core(&slot, Core::arm_frame_timeout))
            .cleanup(1, false, DISCOVERY_STATES, cleanup_on_core(&slot, Core::clean_discovery))
            .cleanup(2, true, CONNECTION_STATES, cleanup_on_core(&slot, Core::clean_connection))
            .cleanup(3, true, STREAM_STATES, cleanup_on_core(&slot, Core::clean_stream))
            .build()?;

        let camera = collaborators.sdk.new_camera();
        let colors = ColorRange::new(
            config.initial_min_temp,
            config.initial_max_temp,
            config.min_color_span,
        );

        let core = Arc::new(Core {
            machine,
            backend: Some(Backend {
                sdk: collaborators.sdk,
                permission: collaborators.permission,
            }),
            on_frame_ready: Some(collaborators.on_frame_ready),
            device: Mutex::new(Device {
                camera: Some(camera),
                ..Device::default()
            }),
            colors: Mutex::new(colors),
            watchdog: Watchdog::new("camera-watchdog"),
            connect_backoff: AtomicBool::new(false),
            stream_backoff: AtomicBool::new(false),
            config,
        });
        let _ = slot.set(Arc::downgrade(&core));

        Ok(Self { core })
    }

    /// Orchestrator for a host whose camera SDK failed to initialize.
    ///
    /// Moves straight to [`CameraState::NotSupported`] and ignores every
    /// later operation.
    pub fn unsupported(
        on_state_change: Observer<CameraState>,
        reason: impl Display,
    ) -> Result<Self, SetupError> {
        error!(reason = %reason, "thermal camera SDK unavailable");

        let config = OrchestratorConfig::default();
        let machine = lifecycle_builder(&config, on_state_change)
            .worker_name("camera-state")
            .build()?;
        machine.set_state(NotSupported);

        let colors = ColorRange::new(
            config.initial_min_temp,
            config.initial_max_temp,
            config.min_color_span,
        );
        Ok(Self {
            core: Arc::new(Core {
                machine,
                backend: None,
                on_frame_ready: None,
                device: Mutex::new(Device::default()),
                colors: Mutex::new(colors),
                watchdog: Watchdog::new("camera-watchdog"),
                connect_backoff: AtomicBool::new(false),
                stream_backoff: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// Start the camera. Streaming has begun once the state is Streaming.
    pub fn start_camera(&self) {
        let core = &self.core;
        match core.machine.current_state() {
            Clobbered => {
                info!("recovering from external camera clobber");
                core.machine.set_state(Idle);
                core.schedule_discovery();
            }
            Idle => core.schedule_discovery(),
            ConnectingPaused => {
                core.machine.set_state(Connecting);
            }
            StandBy => {
                core.machine.set_state(Connected);
            }
            _ => {}
        }
    }

    /// Stop streaming. A connected camera stays connected in stand-by.
    pub fn pause_stream(&self) {
        let machine = &self.core.machine;
        match machine.current_state() {
            Discovering | DeviceFound => {
                info!("connect aborted by pause");
                machine.set_state(Idle);
            }
            Connecting => {
                info!("pause requested while connecting");
                machine.set_state(ConnectingPaused);
            }
            Connected | StartingStream | StartWithCalibration | Streaming | NeedCalibrate
            | Calibrating => {
                info!("entering stand-by");
                machine.set_state(StandBy);
            }
            _ => {}
        }
    }

    /// Release every camera resource.
    pub fn disconnect(&self) {
        self.core.disconnect();
    }

    /// Request a manual flat-field calibration. Only honored while streaming.
    pub fn ffc_calibration(&self) {
        info!("user calibration request");
        let core = &self.core;
        let calibration = core
            .device()
            .remote_control
            .as_ref()
            .and_then(|remote| remote.calibration());
        let Some(calibration) = calibration else {
            return;
        };

        if core.machine.is_state(Streaming) {
            core.machine.run_on_worker(move || {
                if let Err(e) = calibration.execute() {
                    warn!(error = %e, "manual calibration failed");
                }
            });
        }
    }

    pub fn camera_state(&self) -> CameraState {
        self.core.machine.current_state()
    }

    /// The last rendered frame, if any.
    pub fn most_recent_bitmap(&self) -> Option<Bitmap> {
        let frame = self.core.device().most_recent_frame.clone();
        if frame.is_none() {
            debug!("no rendered frame available");
        }
        frame
    }

    pub fn min_temp(&self) -> f64 {
        self.core.colors().min()
    }

    pub fn max_temp(&self) -> f64 {
        self.core.colors().max()
    }

    /// Set the lower color-mapping bound. Returns `false` if it would leave
    /// the bounds too close together; nothing changes in that case.
    pub fn set_min_temp(&self, min: f64) -> bool {
        self.core.colors().set_min(min)
    }

    /// Set the upper color-mapping bound. See [`set_min_temp`](Self::set_min_temp).
    pub fn set_max_temp(&self, max: f64) -> bool {
        self.core.colors().set_max(max)
    }

    /// Another process took a camera. Expected while a stream is starting;
    /// any other time the device is considered clobbered.
    pub fn on_device_unavailable(&self, device_id: &str) {
        let machine = &self.core.machine;
        if matches!(machine.current_state(), StartingStream | StartWithCalibration) {
            info!(device_id, "intended camera access");
        } else {
            info!(device_id, "external camera access");
            machine.set_state(Clobbered);
        }
    }

    /// Transitions accepted so far, oldest first.
    pub fn history(&self) -> StateHistory<CameraState> {
        self.core.machine.history()
    }

    /// Disconnect, wait for cleanup to finish and release the camera handle.
    pub fn close(&self) {
        let core = &self.core;
        core.machine.set_state(Idle);
        if !core.machine.flush(core.config.close_timeout()) {
            warn!(
                timeout = ?core.config.close_timeout(),
                "camera cleanup still pending at close"
            );
        }
        core.watchdog.cancel();
        let camera = core.device().camera.take();
        if let Some(camera) = camera {
            camera.close();
        }
    }
}

fn lifecycle_builder(
    config: &OrchestratorConfig,
    observer: Observer<CameraState>,
) -> StateMachineBuilder<CameraState> {
    StateMachine::builder(Idle)
        .rules(CameraState::rules())
        .history_capacity(config.history_capacity)
        .on_state_change(move |state| observer(state))
}

fn on_core(slot: &CoreSlot, hook: Step) -> impl Fn() + Send + Sync + 'static {
    let slot = Arc::clone(slot);
    move || {
        if let Some(core) = slot.get().and_then(Weak::upgrade) {
            hook(&core);
        }
    }
}

fn cleanup_on_core(
    slot: &CoreSlot,
    action: fn(&Core, &StateTransition<CameraState>),
) -> impl Fn(&StateTransition<CameraState>) + Send + Sync + 'static {
    let slot = Arc::clone(slot);
    move |transition| {
        if let Some(core) = slot.get().and_then(Weak::upgrade) {
            action(&core, transition);
        }
    }
}

impl Core {
    fn device(&self) -> MutexGuard<'_, Device> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn colors(&self) -> MutexGuard<'_, ColorRange> {
        self.colors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disconnect(&self) {
        self.machine.set_state(Idle);
    }

    fn schedule_discovery(self: &Arc<Self>) {
        self.on_worker(Core::start_discovering);
    }

    fn on_worker(self: &Arc<Self>, step: Step) {
        let weak = Arc::downgrade(self);
        self.machine.run_on_worker(move || {
            if let Some(core) = weak.upgrade() {
                step(&core);
            }
        });
    }

    /// Queue `step` on the worker once `delay` has passed. The step must
    /// re-check the state itself.
    fn after_backoff(self: &Arc<Self>, delay: Duration, step: Step) {
        let weak = Arc::downgrade(self);
        let spawned = thread::Builder::new()
            .name("camera-retry".to_string())
            .spawn(move || {
                thread::sleep(delay);
                if let Some(core) = weak.upgrade() {
                    core.on_worker(step);
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to schedule camera retry");
            self.on_worker(step);
        }
    }

    /// Transition to `target` and have its post-hook wait out the backoff
    /// first. Nothing happens unless the state is one of `expected`.
    fn fall_back(
        critical: &mut Critical<'_, CameraState>,
        expected: &[CameraState],
        target: CameraState,
        backoff: &AtomicBool,
    ) {
        if !expected.contains(&critical.current_state()) {
            return;
        }
        backoff.store(true, Ordering::SeqCst);
        if !critical.set_state(target) {
            backoff.store(false, Ordering::SeqCst);
        }
    }

    // Hooks

    fn replace_camera(self: &Arc<Self>) {
        let Some(backend) = &self.backend else {
            return;
        };
        let mut device = self.device();
        if let Some(camera) = device.camera.take() {
            camera.close();
        }
        device.camera = Some(backend.sdk.new_camera());
        info!("camera handle recreated after clobber");
    }

    fn cancel_watchdog(self: &Arc<Self>) {
        self.watchdog.cancel();
    }

    fn arm_stand_by_timeout(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.watchdog.arm(self.config.stand_by_timeout(), move || {
            let Some(core) = weak.upgrade() else {
                return;
            };
            let mut critical = core.machine.lock();
            if critical.is_state(StandBy) {
                info!("disconnecting after long stand-by");
                critical.set_state(Idle);
            }
        });
    }

    fn arm_frame_timeout(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.watchdog.arm(self.config.frame_timeout(), move || {
            let Some(core) = weak.upgrade() else {
                return;
            };
            let mut critical = core.machine.lock();
            if critical.is_state(Streaming) {
                warn!("camera stream not providing frames");
                critical.set_state(Compromised);
            }
        });
    }

    fn on_device_found(self: &Arc<Self>) {
        if self.connect_backoff.swap(false, Ordering::SeqCst) {
            self.after_backoff(self.config.retry_backoff(), Core::connect);
        } else {
            self.connect();
        }
    }

    fn on_connected(self: &Arc<Self>) {
        if self.stream_backoff.swap(false, Ordering::SeqCst) {
            self.after_backoff(self.config.retry_backoff(), Core::start_streaming);
        } else {
            self.start_streaming();
        }
    }

    fn ask_permission(self: &Arc<Self>) {
        let Some(backend) = &self.backend else {
            return;
        };

        for _ in 0..PERMISSION_ATTEMPTS {
            if backend.permission.ensure_granted() {
                self.machine.set_state(Idle);
                self.schedule_discovery();
                return;
            }

            warn!("camera access permission denied");
            if self.machine.set_state(NoPermission) || self.machine.is_state(NoPermission) {
                return;
            }
        }
        error!(
            state = self.machine.current_state().name(),
            "could not record camera permission denial"
        );
    }

    // Lifecycle steps

    fn start_discovering(self: &Arc<Self>) {
        let Some(backend) = &self.backend else {
            return;
        };
        if !self.machine.set_state(Discovering) {
            return;
        }

        let cached = self.device().identity.clone();
        if let Some(identity) = cached {
            debug!(device = %identity, "reusing cached camera identity");
            self.machine.set_state(DeviceFound);
            return;
        }

        let weak = Arc::downgrade(self);
        backend.sdk.scan(Arc::new(move |event| {
            if let Some(core) = weak.upgrade() {
                core.on_discovery(event);
            }
        }));
    }

    fn on_discovery(self: &Arc<Self>, event: DiscoveryEvent) {
        let Some(backend) = &self.backend else {
            return;
        };

        match event {
            DiscoveryEvent::Found(identity) => {
                let mut critical = self.machine.lock();
                if !critical.is_state(Discovering) {
                    return;
                }
                backend.sdk.stop_scan();
                info!(device = %identity, "camera discovered");
                self.device().identity = Some(identity);
                critical.set_state(DeviceFound);
            }
            DiscoveryEvent::Failed(DeviceError::InterfaceNotSupported) => {
                error!("camera interface not supported on this host");
                self.machine.set_state(NotSupported);
            }
            DiscoveryEvent::Failed(e) => {
                {
                    let mut critical = self.machine.lock();
                    if !critical.is_state(Discovering) {
                        return;
                    }
                    warn!(error = %e, "camera discovery failed");
                    critical.set_state(Idle);
                }
                self.retry_discovery();
            }
        }
    }

    fn retry_discovery(self: &Arc<Self>) {
        self.after_backoff(self.config.discover_retry(), Core::start_discovering);
    }

    fn connect(self: &Arc<Self>) {
        let Some(backend) = &self.backend else {
            return;
        };
        if !self.machine.set_state(Connecting) {
            return;
        }

        if !backend.permission.ensure_granted() {
            warn!("camera access permission missing at connect");
            self.machine.set_state(NoPermission);
            return;
        }

        let (camera, identity) = {
            let device = self.device();
            (device.camera.clone(), device.identity.clone())
        };
        let (Some(camera), Some(identity)) = (camera, identity) else {
            warn!("no camera handle or identity to connect with");
            self.machine.set_state(Idle);
            return;
        };

        // The engine lock is not held while connecting, so a pause or
        // disconnect can land meanwhile.
        let outcome = self.connect_with_timeout(Arc::clone(&camera), identity);

        let mut critical = self.machine.lock();
        let state = critical.current_state();
        let connecting = matches!(state, Connecting | ConnectingPaused);

        let remote = match outcome {
            Err(DeviceError::ConnectTimeout(timeout)) => {
                error!(?timeout, "camera backend not responding, host restart usually needed");
                self.release_stalled_camera(backend);
                if connecting {
                    critical.set_state(Compromised);
                }
                return;
            }
            _ if !connecting => {
                info!(state = state.name(), "connect finished after the camera was released");
                if camera.is_connected() {
                    camera.disconnect();
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "camera connect failed");
                Self::fall_back(&mut critical, &[state], DeviceFound, &self.connect_backoff);
                return;
            }
            Ok(remote) => remote,
        };

        let calibration = remote.as_ref().and_then(|remote| remote.calibration());
        let (Some(remote), Some(calibration)) = (remote, calibration) else {
            error!("connected camera exposes no calibration interface");
            Self::fall_back(&mut critical, &[state], DeviceFound, &self.connect_backoff);
            return;
        };
        self.device().remote_control = Some(Arc::clone(&remote));

        self.select_gain_mode(remote.as_ref());
        let weak = Arc::downgrade(self);
        calibration.subscribe(Arc::new(move |nuc| {
            if let Some(core) = weak.upgrade() {
                core.on_nuc_state(nuc);
            }
        }));
        if let Err(e) = calibration.disable_auto_calibration() {
            warn!(error = %e, "could not disable automatic calibration");
        }

        if state == ConnectingPaused {
            critical.set_state(StandBy);
        } else {
            critical.set_state(Connected);
        }
    }

    /// Run the connect call on a throwaway thread, abandoning it after the
    /// configured timeout.
    fn connect_with_timeout(
        &self,
        camera: Arc<dyn Camera>,
        identity: Identity,
    ) -> Result<Option<Arc<dyn RemoteControl>>, DeviceError> {
        let timeout = self.config.connect_timeout();
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("camera-connect".to_string())
            .spawn(move || {
                let result = camera.connect(&identity).map(|()| camera.remote_control());
                let _ = tx.send(result);
            })
            .map_err(|e| DeviceError::ConnectFailed(e.to_string()))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(DeviceError::ConnectTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(DeviceError::ConnectFailed(
                "connect attempt aborted".to_string(),
            )),
        }
    }

    /// Tear down a handle whose connect call never returned and install a
    /// fresh one, checking that it starts out disconnected.
    fn release_stalled_camera(&self, backend: &Backend) {
        let mut device = self.device();
        device.remote_control = None;
        if let Some(camera) = device.camera.take() {
            if camera.is_connected() {
                camera.disconnect();
            }
            camera.close();
        }

        let fresh = backend.sdk.new_camera();
        if fresh.is_connected() {
            error!("replacement camera handle still reports a connection");
        } else {
            info!("stalled camera handle released");
        }
        device.camera = Some(fresh);
    }

    fn select_gain_mode(&self, remote: &dyn RemoteControl) {
        let Some(ranges) = remote.temperature_ranges() else {
            return;
        };
        if ranges.len() <= 1 {
            return;
        }

        let Some(index) = match_range(
            &ranges,
            self.config.target_range_min,
            self.config.target_range_max,
        ) else {
            return;
        };
        match remote.select_range(index) {
            Ok(()) => debug!(index, "gain mode selected"),
            Err(e) => warn!(error = %e, index, "could not select gain mode"),
        }
    }

    fn start_streaming(self: &Arc<Self>) {
        let Some(backend) = &self.backend else {
            return;
        };
        if !self.machine.set_state(StartingStream) {
            return;
        }

        let camera = self.device().camera.clone();
        let Some(camera) = camera.filter(|camera| camera.is_connected()) else {
            info!("expected a connected camera before streaming");
            self.abandon_stream_start(DeviceFound, None);
            return;
        };

        let Some(stream) = camera.streams().into_iter().next() else {
            error!("connected camera exposes no stream");
            self.abandon_stream_start(StandBy, None);
            return;
        };
        if stream.is_streaming() {
            info!("camera stream already in use");
            self.abandon_stream_start(Connected, Some(&self.stream_backoff));
            return;
        }

        let streamer = backend.sdk.new_streamer(Arc::clone(&stream));
        streamer.configure(&ImageSettings {
            palette: self.config.palette.clone(),
            fusion: self.config.fusion,
            auto_scale: false,
        });
        {
            let mut device = self.device();
            device.stream = Some(Arc::clone(&stream));
            device.streamer = Some(streamer);
        }
        self.colors().mark_dirty();

        let mut critical = self.machine.lock();
        if !matches!(critical.current_state(), StartingStream | StartWithCalibration) {
            return;
        }
        let weak = Arc::downgrade(self);
        let on_frame: FrameListener = Arc::new(move || {
            let Some(core) = weak.upgrade() else {
                return;
            };
            let frame_core = Arc::downgrade(&core);
            core.machine.run_on_worker(move || {
                if let Some(core) = frame_core.upgrade() {
                    core.process_frame();
                }
            });
        });

        if let Err(e) = stream.start(on_frame) {
            error!(error = %e, "failed to start camera stream");
            Self::fall_back(
                &mut critical,
                &[StartingStream, StartWithCalibration],
                Connected,
                &self.stream_backoff,
            );
            return;
        }

        if critical.is_state(StartWithCalibration) {
            critical.set_state(Calibrating);
        } else {
            critical.set_state(Streaming);
        }
    }

    /// Leave a stream start that cannot proceed, unless something else
    /// already moved the machine on.
    fn abandon_stream_start(&self, target: CameraState, backoff: Option<&AtomicBool>) {
        let mut critical = self.machine.lock();
        let starting = [StartingStream, StartWithCalibration];
        match backoff {
            Some(backoff) => Self::fall_back(&mut critical, &starting, target, backoff),
            None => {
                if starting.contains(&critical.current_state()) {
                    critical.set_state(target);
                }
            }
        }
    }

    fn process_frame(&self) {
        let rendered = {
            let mut critical = self.machine.lock();
            let state = critical.current_state();
            if !state.accepts_frames() {
                debug!(state = state.name(), "ignoring camera frame");
                return;
            }

            let mut device = self.device();
            let connected = device
                .camera
                .as_ref()
                .is_some_and(|camera| camera.is_connected());
            if !connected {
                drop(device);
                info!("camera disconnected while streaming");
                critical.set_state(DeviceFound);
                return;
            }
            let Some(streamer) = device.streamer.clone() else {
                return;
            };

            if let Err(e) = streamer.update() {
                warn!(error = %e, "failed to pull camera frame");
                return;
            }
            let pending = self.colors().take_pending();
            if let Some((min, max)) = pending {
                streamer.set_color_range(min, max);
            }
            if state == Streaming {
                self.watchdog.postpone(self.config.frame_timeout());
            }

            device.most_recent_frame = streamer.render();
            device.most_recent_frame.is_some()
        };

        if rendered {
            if let Some(on_frame_ready) = &self.on_frame_ready {
                on_frame_ready();
            }
        }
    }

    fn on_nuc_state(&self, nuc: NucState) {
        info!(?nuc, "calibration state changed");

        let mut critical = self.machine.lock();
        let state = critical.current_state();
        if state == Connected {
            info!("calibrating before the stream starts");
            return;
        }

        let starting = matches!(state, StartingStream | StartWithCalibration);
        match nuc {
            NucState::Unknown | NucState::Invalid | NucState::Bad | NucState::Desired => {
                critical.set_state(if starting { StartWithCalibration } else { NeedCalibrate });
            }
            NucState::Progress | NucState::RadApprox | NucState::ValidImg => {
                critical.set_state(if starting { StartWithCalibration } else { Calibrating });
            }
            NucState::ValidRad => {
                critical.set_state(if starting { StartingStream } else { Streaming });
                self.colors().mark_dirty();
            }
            NucState::Unrecognized(code) => {
                error!(code, state = state.name(), "unexpected calibration state");
            }
        }
    }

    // Cleanup

    fn clean_discovery(&self, transition: &StateTransition<CameraState>) {
        if let Some(backend) = &self.backend {
            backend.sdk.stop_scan();
        }
        if !transition.to.is_recoverable_fault() {
            self.device().identity = None;
        }
    }

    fn clean_connection(&self, _transition: &StateTransition<CameraState>) {
        let mut device = self.device();
        if let Some(camera) = &device.camera {
            if camera.is_connected() {
                camera.disconnect();
            }
        }
        device.remote_control = None;
    }

    fn clean_stream(&self, _transition: &StateTransition<CameraState>) {
        let mut device = self.device();
        if let Some(stream) = device.stream.take() {
            if stream.is_streaming() {
                stream.stop();
            }
        }
        device.streamer = None;
        device.most_recent_frame = None;
    }
}
