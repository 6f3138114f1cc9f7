//! Conference client error types.
//!
//! Every error maps onto one [`ErrorClass`], which decides how the caller
//! reacts: contract violations drop a single event, cleanup failures are
//! swallowed after logging, establishment and capture failures are surfaced
//! to the application shell.

use crate::config::ConfigError;
use crate::model::{ParticipantId, TrackId};
use crate::session::state::{SessionEvent, SessionState};
use thiserror::Error;

/// Errors reported by an engine implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Transport session could not be established.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Conference join/leave request was refused.
    #[error("Conference request failed: {0}")]
    JoinFailed(String),

    /// Local media capture was refused or failed (e.g. no camera permission).
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Detaching a track from its surface failed (surface already gone).
    #[error("Detach failed: {0}")]
    DetachFailed(String),

    /// The track was already disposed.
    #[error("Track already disposed: {0}")]
    Disposed(String),

    /// The engine rejected the request.
    #[error("Engine rejected request: {0}")]
    Rejected(String),
}

/// Conference client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A track with this id is already registered.
    #[error("Duplicate track: {0}")]
    DuplicateTrack(TrackId),

    /// The participant has already joined.
    #[error("Duplicate participant: {0}")]
    DuplicateParticipant(ParticipantId),

    /// A track arrived for a participant that has not joined.
    #[error("Unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// A remote track reported a kind other than audio or video.
    #[error("Unexpected remote track type {kind} for participant {participant_id}")]
    UnknownTrackKind {
        kind: String,
        participant_id: ParticipantId,
    },

    /// The session state machine does not allow this event in this state.
    #[error("Invalid session transition: {event:?} in state {from:?}")]
    InvalidTransition {
        from: SessionState,
        event: SessionEvent,
    },

    /// A conference operation was requested before a conference exists.
    #[error("No conference session established")]
    NoConference,

    /// The operation is not available in the current mode.
    #[error("Operation '{0}' is not available in this mode")]
    WrongMode(&'static str),

    /// A capture request is already pending.
    #[error("A capture request is already in flight")]
    CaptureInFlight,

    /// Engine-level failure.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal error (actor channel failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Handling class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Engine delivered a reference that breaks an invariant. Drop the event.
    ContractViolation,
    /// Detach/dispose failed during teardown. Log and continue.
    CleanupFailure,
    /// Transport or conference could not be established. Surface to shell.
    Establishment,
    /// Local media capture failed. Surface to shell.
    Capture,
    /// The caller asked for something the current state does not allow.
    Usage,
    /// Internal failure.
    Internal,
}

impl ErrorClass {
    /// Returns the class as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ContractViolation => "contract_violation",
            ErrorClass::CleanupFailure => "cleanup_failure",
            ErrorClass::Establishment => "establishment",
            ErrorClass::Capture => "capture",
            ErrorClass::Usage => "usage",
            ErrorClass::Internal => "internal",
        }
    }
}

impl ClientError {
    /// Returns the handling class for this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::DuplicateTrack(_)
            | ClientError::DuplicateParticipant(_)
            | ClientError::UnknownParticipant(_)
            | ClientError::UnknownTrackKind { .. }
            | ClientError::InvalidTransition { .. } => ErrorClass::ContractViolation,
            ClientError::Engine(EngineError::ConnectFailed(_) | EngineError::JoinFailed(_)) => {
                ErrorClass::Establishment
            }
            ClientError::Engine(EngineError::CaptureFailed(_)) => ErrorClass::Capture,
            ClientError::Engine(
                EngineError::DetachFailed(_) | EngineError::Disposed(_) | EngineError::Rejected(_),
            ) => ErrorClass::CleanupFailure,
            ClientError::NoConference
            | ClientError::WrongMode(_)
            | ClientError::CaptureInFlight => ErrorClass::Usage,
            ClientError::Config(_) | ClientError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Short, bounded label for metrics (`client_contract_violations_total{kind}`).
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            ClientError::DuplicateTrack(_) => "duplicate_track",
            ClientError::DuplicateParticipant(_) => "duplicate_participant",
            ClientError::UnknownParticipant(_) => "unknown_participant",
            ClientError::UnknownTrackKind { .. } => "unknown_track_kind",
            ClientError::InvalidTransition { .. } => "invalid_transition",
            ClientError::NoConference => "no_conference",
            ClientError::WrongMode(_) => "wrong_mode",
            ClientError::CaptureInFlight => "capture_in_flight",
            ClientError::Engine(_) => "engine",
            ClientError::Config(_) => "config",
            ClientError::Internal(_) => "internal",
        }
    }
}
