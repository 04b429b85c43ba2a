//! Camera lifecycle states and their legality table.

use crate::core::{Sources, TransitionRule};
use crate::state_enum;

state_enum! {
    /// Lifecycle phase of the thermal camera.
    pub enum CameraState {
        /// Camera access permission is missing.
        NoPermission,
        /// The camera backend is broken; usually needs a host reboot.
        Compromised,
        /// Another process seized the camera while it was in use.
        Clobbered,
        Idle,
        Discovering,
        /// A camera identity is known and cached.
        DeviceFound,
        Connecting,
        /// Connecting, but go to stand-by instead of streaming afterwards.
        ConnectingPaused,
        Connected,
        /// Connected with no stream requested.
        StandBy,
        StartingStream,
        /// Starting a stream while the camera calibrates.
        StartWithCalibration,
        Streaming,
        NeedCalibrate,
        Calibrating,
        /// The host cannot drive the camera at all.
        NotSupported,
    }
    final: [NotSupported]
    error: [NoPermission, Compromised, Clobbered, NotSupported]
}

/// States owing discovery cleanup.
pub const DISCOVERY_STATES: [CameraState; 2] = [CameraState::Discovering, CameraState::DeviceFound];

/// States owing connection cleanup.
pub const CONNECTION_STATES: [CameraState; 4] = [
    CameraState::Connecting,
    CameraState::ConnectingPaused,
    CameraState::Connected,
    CameraState::StandBy,
];

/// States owing stream cleanup.
pub const STREAM_STATES: [CameraState; 5] = [
    CameraState::StartingStream,
    CameraState::StartWithCalibration,
    CameraState::Streaming,
    CameraState::NeedCalibrate,
    CameraState::Calibrating,
];

impl CameraState {
    /// States from which `self` may be entered.
    pub fn legal_sources(self) -> Sources<CameraState> {
        use CameraState::*;

        match self {
            Idle | Clobbered => Sources::AnyExcept(vec![NotSupported]),
            NoPermission => Sources::Only(vec![Idle, Connecting, ConnectingPaused]),
            Compromised => Sources::Only(vec![Connecting, ConnectingPaused, Streaming]),
            Discovering => Sources::Only(vec![Idle]),
            DeviceFound => Sources::Only(vec![
                Discovering,
                Connecting,
                ConnectingPaused,
                Connected,
                StartingStream,
                StartWithCalibration,
                Streaming,
                NeedCalibrate,
                Calibrating,
            ]),
            Connecting => Sources::Only(vec![DeviceFound, ConnectingPaused]),
            ConnectingPaused => Sources::Only(vec![DeviceFound, Connecting]),
            Connected => Sources::Only(vec![
                StandBy,
                Connecting,
                StartingStream,
                StartWithCalibration,
            ]),
            StandBy => Sources::Only(vec![
                ConnectingPaused,
                Connected,
                StartingStream,
                StartWithCalibration,
                Streaming,
                NeedCalibrate,
                Calibrating,
            ]),
            StartingStream => Sources::Only(vec![Connected, StartWithCalibration]),
            StartWithCalibration => Sources::Only(vec![StartingStream]),
            Streaming => Sources::Only(vec![StartingStream, Calibrating, NeedCalibrate]),
            NeedCalibrate => Sources::Only(vec![Streaming, Calibrating]),
            Calibrating => Sources::Only(vec![StartWithCalibration, NeedCalibrate, Streaming]),
            NotSupported => Sources::Only(vec![Idle, Discovering]),
        }
    }

    /// One rule per state, covering the whole lifecycle.
    pub fn rules() -> Vec<TransitionRule<CameraState>> {
        Self::ALL
            .iter()
            .map(|&state| TransitionRule::new(state, state.legal_sources()))
            .collect()
    }

    /// Faults recovered by going back through Idle with the cached identity.
    pub fn is_recoverable_fault(self) -> bool {
        matches!(self, CameraState::Clobbered | CameraState::Compromised)
    }

    /// States in which camera frames are processed.
    pub fn accepts_frames(self) -> bool {
        matches!(
            self,
            CameraState::Streaming | CameraState::NeedCalibrate | CameraState::Calibrating
        )
    }
}
