//! Session lifecycle states and the pure transition function.

use crate::errors::ClientError;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of the client's session with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Joining,
    Joined,
    Left,
}

/// Inputs to the lifecycle transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    ConnectRequested,
    TransportEstablished,
    ConnectFailed,
    JoinRequested,
    JoinConfirmed,
    LeaveRequested,
    /// Leave confirmation or remote eviction.
    ConferenceLeft,
    TransportClosed,
}

impl SessionState {
    /// Compute the state that follows `event`.
    ///
    /// Repeated `JoinConfirmed` in `Joined` and repeated leave events in
    /// `Left` are accepted and leave the state unchanged. `TransportClosed`
    /// is accepted from every state.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` for any other combination.
    pub fn next(self, event: SessionEvent) -> Result<SessionState, ClientError> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self, event) {
            (S::Disconnected, E::ConnectRequested) => S::Connecting,
            (S::Connecting, E::TransportEstablished) => S::Connected,
            (S::Connecting, E::ConnectFailed) => S::Disconnected,
            (S::Connected | S::Left, E::JoinRequested) => S::Joining,
            (S::Joining | S::Joined, E::JoinConfirmed) => S::Joined,
            (S::Joining | S::Joined | S::Left, E::LeaveRequested | E::ConferenceLeft) => S::Left,
            (_, E::TransportClosed) => S::Disconnected,
            (from, event) => return Err(ClientError::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Joining => "joining",
            SessionState::Joined => "joined",
            SessionState::Left => "left",
        }
    }

    /// Whether a conference handle may exist in this state.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Connected
                | SessionState::Joining
                | SessionState::Joined
                | SessionState::Left
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
