//! Pre-configured test data for conference client tests.

use conference_client::config::Config;
use conference_client::engine::{ConferenceEvent, RemoteTrackInfo};
use conference_client::model::TrackId;
use std::collections::HashMap;
use uuid::Uuid;

/// Config for `mode` ("publisher"/"viewer") and `room_id`, defaults elsewhere.
#[must_use]
pub fn test_config(mode: &str, room_id: &str) -> Config {
    Config::from_vars(&HashMap::from([
        ("CLIENT_MODE".to_string(), mode.to_string()),
        ("CLIENT_ROOM_ID".to_string(), room_id.to_string()),
    ]))
    .expect("test config should load")
}

/// Test participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    /// Participant ID.
    pub id: String,
}

impl TestParticipant {
    /// Create a new test participant with the given ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Create a test participant with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("participant-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn joined(&self) -> ConferenceEvent {
        ConferenceEvent::UserJoined(self.id.as_str().into())
    }

    #[must_use]
    pub fn left(&self) -> ConferenceEvent {
        ConferenceEvent::UserLeft(self.id.as_str().into())
    }

    /// Track-added event for a track of raw `kind` owned by this participant.
    #[must_use]
    pub fn track_added(&self, track_id: &str, kind: &str) -> ConferenceEvent {
        ConferenceEvent::TrackAdded(RemoteTrackInfo {
            track_id: TrackId::new(track_id),
            kind: kind.to_string(),
            participant_id: self.id.as_str().into(),
        })
    }

    #[must_use]
    pub fn track_removed(&self, track_id: &str) -> ConferenceEvent {
        ConferenceEvent::TrackRemoved {
            track_id: TrackId::new(track_id),
            participant_id: self.id.as_str().into(),
        }
    }

    #[must_use]
    pub fn renamed(&self, display_name: &str) -> ConferenceEvent {
        ConferenceEvent::DisplayNameChanged {
            participant_id: self.id.as_str().into(),
            display_name: display_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_client::model::Mode;

    #[test]
    fn test_participant_events_carry_id() {
        let participant = TestParticipant::new("alice");
        assert_eq!(
            participant.joined(),
            ConferenceEvent::UserJoined("alice".into())
        );
        assert!(matches!(
            participant.track_added("t1", "video"),
            ConferenceEvent::TrackAdded(info) if info.participant_id.as_str() == "alice"
        ));
    }

    #[test]
    fn test_random_participants_differ() {
        assert_ne!(TestParticipant::random().id, TestParticipant::random().id);
    }

    #[test]
    fn test_config_fixture() {
        let config = test_config("publisher", "room-42");
        assert_eq!(config.mode, Mode::Publisher);
        assert_eq!(config.room_id, "room-42");
    }
}
