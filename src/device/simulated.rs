//! In-memory thermal camera for tests and demos.
//!
//! [`SimulatedSdk`] is a cheap handle; clones share one simulated device.
//! Discovery outcomes, connect behavior, stream availability, calibration
//! events and frames are all scriptable, and every listener is invoked from
//! a thread other than the one that registered it.

use super::error::DeviceError;
use super::sdk::{
    AccessPermission, Bitmap, Calibration, Camera, DiscoveryEvent, DiscoveryListener,
    FrameListener, Identity, ImageSettings, NucListener, NucState, RemoteControl, Stream,
    Streamer, ThermalSdk,
};
use crate::range::TemperatureRange;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;

const FRAME_WIDTH: u32 = 160;
const FRAME_HEIGHT: u32 = 120;

/// How the next connect call behaves.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectBehavior {
    Succeed,
    /// Succeed after the given delay.
    Slow(Duration),
    Fail(String),
    /// Block until the handle is closed, then fail.
    Hang,
    /// Connect, but expose no calibration interface.
    NoCalibration,
}

struct Script {
    discovery: VecDeque<DiscoveryEvent>,
    default_identity: Identity,
    connect: ConnectBehavior,
    ranges: Option<Vec<TemperatureRange>>,
    selected_range: Option<usize>,
    stream_start_error: Option<DeviceError>,
    setup_nuc: Option<NucState>,
    settings: Option<ImageSettings>,
    color_range: Option<(f64, f64)>,
    frame_listener: Option<FrameListener>,
    nuc_listener: Option<NucListener>,
    cameras: Vec<Arc<SimulatedCamera>>,
}

#[derive(Default)]
struct Counters {
    scans: AtomicUsize,
    stop_scans: AtomicUsize,
    connects: AtomicUsize,
    calibrations: AtomicUsize,
}

struct SimInner {
    script: Mutex<Script>,
    counters: Counters,
    stream_busy: AtomicBool,
    streaming: AtomicBool,
    auto_calibration: AtomicBool,
    hang: (Mutex<()>, Condvar),
}

impl SimInner {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scriptable stand-in for the vendor SDK.
#[derive(Clone)]
pub struct SimulatedSdk {
    inner: Arc<SimInner>,
}

impl Default for SimulatedSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSdk {
    /// A camera that is found, connects and streams without trouble.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SimInner {
                script: Mutex::new(Script {
                    discovery: VecDeque::new(),
                    default_identity: Identity::new("simulated-lepton"),
                    connect: ConnectBehavior::Succeed,
                    ranges: Some(vec![
                        TemperatureRange::new(-10.0, 140.0),
                        TemperatureRange::new(-10.0, 400.0),
                    ]),
                    selected_range: None,
                    stream_start_error: None,
                    setup_nuc: None,
                    settings: None,
                    color_range: None,
                    frame_listener: None,
                    nuc_listener: None,
                    cameras: Vec::new(),
                }),
                counters: Counters::default(),
                stream_busy: AtomicBool::new(false),
                streaming: AtomicBool::new(false),
                auto_calibration: AtomicBool::new(true),
                hang: (Mutex::new(()), Condvar::new()),
            }),
        }
    }

    /// Queue the outcome of a future scan. Scans with nothing queued find
    /// the default identity.
    pub fn push_discovery(&self, event: DiscoveryEvent) -> &Self {
        self.inner.script().discovery.push_back(event);
        self
    }

    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) -> &Self {
        self.inner.script().connect = behavior;
        self
    }

    pub fn set_temperature_ranges(&self, ranges: Option<Vec<TemperatureRange>>) -> &Self {
        self.inner.script().ranges = ranges;
        self
    }

    /// Make the next stream start calls fail with `error`.
    pub fn fail_stream_start(&self, error: Option<DeviceError>) -> &Self {
        self.inner.script().stream_start_error = error;
        self
    }

    /// Pretend another client holds the stream.
    pub fn set_stream_busy(&self, busy: bool) -> &Self {
        self.inner.stream_busy.store(busy, Ordering::SeqCst);
        self
    }

    /// Report `nuc` to the calibration listener while the next stream is
    /// being configured, and wait for the listener to return.
    pub fn calibrate_during_stream_setup(&self, nuc: NucState) -> &Self {
        self.inner.script().setup_nuc = Some(nuc);
        self
    }

    /// Deliver one frame to the active stream, if any. Returns whether a
    /// listener received it.
    pub fn emit_frame(&self) -> bool {
        let listener = self.inner.script().frame_listener.clone();
        match listener {
            Some(listener) if self.inner.streaming.load(Ordering::SeqCst) => {
                spawn_named("simulated-frame", move || listener());
                true
            }
            _ => false,
        }
    }

    /// Report a calibration sub-state to the subscribed listener, if any.
    pub fn emit_nuc(&self, nuc: NucState) -> bool {
        let listener = self.inner.script().nuc_listener.clone();
        match listener {
            Some(listener) => {
                spawn_named("simulated-nuc", move || listener(nuc));
                true
            }
            None => false,
        }
    }

    pub fn scan_count(&self) -> usize {
        self.inner.counters.scans.load(Ordering::SeqCst)
    }

    pub fn stop_scan_count(&self) -> usize {
        self.inner.counters.stop_scans.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.inner.counters.connects.load(Ordering::SeqCst)
    }

    pub fn calibration_count(&self) -> usize {
        self.inner.counters.calibrations.load(Ordering::SeqCst)
    }

    /// Camera handles created so far.
    pub fn cameras_created(&self) -> usize {
        self.inner.script().cameras.len()
    }

    /// Handles closed so far.
    pub fn cameras_closed(&self) -> usize {
        self.inner
            .script()
            .cameras
            .iter()
            .filter(|camera| camera.closed.load(Ordering::SeqCst))
            .count()
    }

    pub fn any_connected(&self) -> bool {
        self.inner
            .script()
            .cameras
            .iter()
            .any(|camera| camera.connected.load(Ordering::SeqCst))
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.streaming.load(Ordering::SeqCst)
    }

    pub fn selected_range(&self) -> Option<usize> {
        self.inner.script().selected_range
    }

    pub fn image_settings(&self) -> Option<ImageSettings> {
        self.inner.script().settings.clone()
    }

    /// Color mapping most recently applied by the streamer.
    pub fn color_range(&self) -> Option<(f64, f64)> {
        self.inner.script().color_range
    }

    pub fn auto_calibration_enabled(&self) -> bool {
        self.inner.auto_calibration.load(Ordering::SeqCst)
    }
}

fn spawn_named<F>(name: &str, task: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(e) = thread::Builder::new().name(name.to_string()).spawn(task) {
        debug!(error = %e, "simulated callback thread failed to start");
    }
}

impl ThermalSdk for SimulatedSdk {
    fn scan(&self, listener: DiscoveryListener) {
        self.inner.counters.scans.fetch_add(1, Ordering::SeqCst);
        let event = {
            let mut script = self.inner.script();
            script
                .discovery
                .pop_front()
                .unwrap_or_else(|| DiscoveryEvent::Found(script.default_identity.clone()))
        };
        spawn_named("simulated-discovery", move || listener(event));
    }

    fn stop_scan(&self) {
        self.inner.counters.stop_scans.fetch_add(1, Ordering::SeqCst);
    }

    fn new_camera(&self) -> Arc<dyn Camera> {
        let camera = Arc::new(SimulatedCamera {
            sim: Arc::clone(&self.inner),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            calibration: AtomicBool::new(true),
        });
        self.inner.script().cameras.push(Arc::clone(&camera));
        camera
    }

    fn new_streamer(&self, _stream: Arc<dyn Stream>) -> Arc<dyn Streamer> {
        Arc::new(SimulatedStreamer {
            sim: Arc::clone(&self.inner),
        })
    }
}

struct SimulatedCamera {
    sim: Arc<SimInner>,
    connected: AtomicBool,
    closed: AtomicBool,
    calibration: AtomicBool,
}

impl SimulatedCamera {
    fn hang_until_closed(&self) -> Result<(), DeviceError> {
        let (lock, cvar) = &self.sim.hang;
        let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.closed.load(Ordering::SeqCst) {
            guard = cvar.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
        Err(DeviceError::ConnectFailed("connect abandoned".to_string()))
    }
}

impl Camera for SimulatedCamera {
    fn connect(&self, identity: &Identity) -> Result<(), DeviceError> {
        self.sim.counters.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self.sim.script().connect.clone();
        debug!(device = %identity, ?behavior, "simulated connect");

        match behavior {
            ConnectBehavior::Succeed => {
                self.calibration.store(true, Ordering::SeqCst);
            }
            ConnectBehavior::Slow(delay) => {
                thread::sleep(delay);
                self.calibration.store(true, Ordering::SeqCst);
            }
            ConnectBehavior::NoCalibration => {
                self.calibration.store(false, Ordering::SeqCst);
            }
            ConnectBehavior::Fail(reason) => return Err(DeviceError::ConnectFailed(reason)),
            ConnectBehavior::Hang => return self.hang_until_closed(),
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn remote_control(&self) -> Option<Arc<dyn RemoteControl>> {
        if !self.is_connected() {
            return None;
        }
        Some(Arc::new(SimulatedRemote {
            sim: Arc::clone(&self.sim),
            calibration: self.calibration.load(Ordering::SeqCst),
        }))
    }

    fn streams(&self) -> Vec<Arc<dyn Stream>> {
        vec![Arc::new(SimulatedStream {
            sim: Arc::clone(&self.sim),
        })]
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        let (lock, cvar) = &self.sim.hang;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        cvar.notify_all();
    }
}

struct SimulatedRemote {
    sim: Arc<SimInner>,
    calibration: bool,
}

impl RemoteControl for SimulatedRemote {
    fn calibration(&self) -> Option<Arc<dyn Calibration>> {
        if !self.calibration {
            return None;
        }
        Some(Arc::new(SimulatedCalibration {
            sim: Arc::clone(&self.sim),
        }))
    }

    fn temperature_ranges(&self) -> Option<Vec<TemperatureRange>> {
        self.sim.script().ranges.clone()
    }

    fn select_range(&self, index: usize) -> Result<(), DeviceError> {
        let mut script = self.sim.script();
        let available = script.ranges.as_ref().map_or(0, Vec::len);
        if index >= available {
            return Err(DeviceError::Unavailable(format!("no gain mode {index}")));
        }
        script.selected_range = Some(index);
        Ok(())
    }
}

struct SimulatedCalibration {
    sim: Arc<SimInner>,
}

impl Calibration for SimulatedCalibration {
    fn subscribe(&self, listener: NucListener) {
        self.sim.script().nuc_listener = Some(listener);
    }

    fn disable_auto_calibration(&self) -> Result<(), DeviceError> {
        self.sim.auto_calibration.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn execute(&self) -> Result<(), DeviceError> {
        let connected = self
            .sim
            .script()
            .cameras
            .iter()
            .any(|camera| camera.connected.load(Ordering::SeqCst));
        if !connected {
            return Err(DeviceError::CalibrationFailed(
                "camera disconnected".to_string(),
            ));
        }
        self.sim.counters.calibrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct SimulatedStream {
    sim: Arc<SimInner>,
}

impl Stream for SimulatedStream {
    fn is_streaming(&self) -> bool {
        self.sim.stream_busy.load(Ordering::SeqCst) || self.sim.streaming.load(Ordering::SeqCst)
    }

    fn start(&self, on_frame: FrameListener) -> Result<(), DeviceError> {
        let mut script = self.sim.script();
        if let Some(error) = script.stream_start_error.clone() {
            return Err(error);
        }
        script.frame_listener = Some(on_frame);
        self.sim.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.sim.script().frame_listener = None;
        self.sim.streaming.store(false, Ordering::SeqCst);
    }
}

struct SimulatedStreamer {
    sim: Arc<SimInner>,
}

impl Streamer for SimulatedStreamer {
    fn configure(&self, settings: &ImageSettings) {
        let (nuc, listener) = {
            let mut script = self.sim.script();
            script.settings = Some(settings.clone());
            (script.setup_nuc.take(), script.nuc_listener.clone())
        };
        if let (Some(nuc), Some(listener)) = (nuc, listener) {
            let delivered = thread::Builder::new()
                .name("simulated-nuc".to_string())
                .spawn(move || listener(nuc))
                .map(|handle| handle.join());
            if !matches!(delivered, Ok(Ok(()))) {
                debug!("simulated calibration event was not delivered");
            }
        }
    }

    fn update(&self) -> Result<(), DeviceError> {
        if self.sim.streaming.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceError::StreamFailed("stream not running".to_string()))
        }
    }

    fn set_color_range(&self, min: f64, max: f64) {
        self.sim.script().color_range = Some((min, max));
    }

    fn render(&self) -> Option<Bitmap> {
        let pixels = vec![0xFF20_2020; (FRAME_WIDTH * FRAME_HEIGHT) as usize];
        Some(Bitmap {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            pixels: pixels.into(),
        })
    }
}

/// Access permission with a switchable answer.
#[derive(Debug)]
pub struct SimulatedPermission {
    granted: AtomicBool,
    requests: AtomicUsize,
}

impl SimulatedPermission {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl AccessPermission for SimulatedPermission {
    fn ensure_granted(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.granted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn scan_reports_queued_events_then_default() {
        let sdk = SimulatedSdk::new();
        sdk.push_discovery(DiscoveryEvent::Failed(DeviceError::Unavailable(
            "busy".to_string(),
        )));

        let (tx, rx) = mpsc::channel();
        let tx = Arc::new(Mutex::new(tx));
        let listener: DiscoveryListener = Arc::new(move |event| {
            tx.lock().unwrap().send(event).unwrap();
        });

        sdk.scan(Arc::clone(&listener));
        sdk.scan(listener);

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let mut events = vec![first, second];
        events.sort_by_key(|event| matches!(event, DiscoveryEvent::Found(_)));
        assert!(matches!(events[0], DiscoveryEvent::Failed(_)));
        assert_eq!(
            events[1],
            DiscoveryEvent::Found(Identity::new("simulated-lepton"))
        );
        assert_eq!(sdk.scan_count(), 2);
    }

    #[test]
    fn hung_connect_unblocks_on_close() {
        let sdk = SimulatedSdk::new();
        sdk.set_connect_behavior(ConnectBehavior::Hang);
        let camera = sdk.new_camera();

        let (tx, rx) = mpsc::channel();
        let attempt = Arc::clone(&camera);
        thread::spawn(move || {
            tx.send(attempt.connect(&Identity::new("x"))).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        camera.close();
        let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(result.is_err());
        assert!(!sdk.any_connected());
        assert_eq!(sdk.cameras_closed(), 1);
    }

    #[test]
    fn remote_control_requires_connection() {
        let sdk = SimulatedSdk::new();
        let camera = sdk.new_camera();
        assert!(camera.remote_control().is_none());

        camera.connect(&Identity::new("x")).unwrap();
        let remote = camera.remote_control().unwrap();
        assert!(remote.calibration().is_some());
        assert!(remote.select_range(5).is_err());
        remote.select_range(1).unwrap();
        assert_eq!(sdk.selected_range(), Some(1));
    }

    #[test]
    fn calibration_needs_a_connected_camera() {
        let sdk = SimulatedSdk::new();
        let camera = sdk.new_camera();
        camera.connect(&Identity::new("x")).unwrap();
        let calibration = camera.remote_control().unwrap().calibration().unwrap();

        calibration.execute().unwrap();
        assert_eq!(sdk.calibration_count(), 1);

        camera.disconnect();
        assert_eq!(
            calibration.execute(),
            Err(DeviceError::CalibrationFailed(
                "camera disconnected".to_string()
            ))
        );
        assert_eq!(sdk.calibration_count(), 1);
    }

    #[test]
    fn busy_stream_reports_streaming() {
        let sdk = SimulatedSdk::new();
        let camera = sdk.new_camera();
        let stream = camera.streams().remove(0);
        assert!(!stream.is_streaming());
        sdk.set_stream_busy(true);
        assert!(stream.is_streaming());
    }
}
