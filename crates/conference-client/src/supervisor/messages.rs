//! Message types exchanged with the supervisor actor.
//!
//! Commands arrive on a bounded `tokio::sync::mpsc` mailbox and answer through
//! a `tokio::sync::oneshot`. Notifications flow the other way on an unbounded
//! channel the application shell drains.

use crate::devices::AudioOutputOption;
use crate::errors::ClientError;
use crate::model::{Facing, Mode, TrackId};
use crate::session::{Participant, SessionState};
use serde::Serialize;
use tokio::sync::oneshot;

/// Commands sent to the supervisor by the application shell.
#[derive(Debug)]
pub enum ClientCommand {
    /// Invert the camera facing and recapture (publisher mode).
    SwitchCamera {
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },

    /// User gesture observed: start remote playback (viewer mode).
    /// Responds with the number of surfaces started.
    StartPlayback {
        respond_to: oneshot::Sender<Result<usize, ClientError>>,
    },

    /// Switch the audio output device (publisher mode).
    SelectAudioOutput {
        device_id: String,
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },

    /// Get a snapshot of the client state.
    GetState {
        respond_to: oneshot::Sender<ClientSnapshot>,
    },

    /// Tear down and stop.
    Shutdown {
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },
}

/// Notifications for the application shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientNotification {
    /// The session lifecycle moved to a new state.
    StateChanged { state: SessionState },

    /// Transport or conference could not be established. Not retried.
    EstablishmentFailed { reason: String },

    /// Local capture failed. Not retried.
    CaptureFailed { reason: String },

    /// More than one audio output is available.
    AudioOutputOptions { options: Vec<AudioOutputOption> },
}

/// Point-in-time view of the client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub mode: Mode,
    pub state: SessionState,
    pub room_id: String,
    pub session_id: Option<String>,
    pub facing: Facing,
    /// Local tracks in capture order.
    pub local_tracks: Vec<TrackId>,
    /// Local tracks currently submitted to the session.
    pub published_tracks: usize,
    pub participants: Vec<Participant>,
    pub surfaces: usize,
    pub playback_unlocked: bool,
    pub capture_in_flight: bool,
    /// Remote tracks waiting for their participant to join.
    pub pending_tracks: usize,
}
