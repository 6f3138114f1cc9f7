//! Core data model: tracks, participants, surfaces and the operating mode.
//!
//! Identities are opaque strings assigned by the engine. Ownership is encoded
//! in [`OwnerKey`], so a track carries a participant id if and only if it is
//! remote.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Engine-assigned track identity, unique within the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackId(String);

impl TrackId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Engine-assigned identity of a remote session member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identity of a rendering surface. Generated locally, never by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SurfaceId(pub Uuid);

impl SurfaceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Media kind of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    /// Returns the kind as the engine spells it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }

    /// Parse an engine-reported kind. Returns `None` for anything other than
    /// `audio` or `video`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "audio" => Some(TrackKind::Audio),
            "video" => Some(TrackKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a track was captured here or received from another participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Local,
    Remote,
}

impl Ownership {
    /// Returns the ownership as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Ownership::Local => "local",
            Ownership::Remote => "remote",
        }
    }
}

/// Key under which tracks are grouped: the local side or one participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum OwnerKey {
    Local,
    Participant(ParticipantId),
}

impl OwnerKey {
    #[must_use]
    pub fn ownership(&self) -> Ownership {
        match self {
            OwnerKey::Local => Ownership::Local,
            OwnerKey::Participant(_) => Ownership::Remote,
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKey::Local => f.write_str("Local"),
            OwnerKey::Participant(id) => write!(f, "Remote participant {id}"),
        }
    }
}

/// One media stream unit known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    id: TrackId,
    kind: TrackKind,
    owner: OwnerKey,
    bound_surface: Option<SurfaceId>,
}

impl Track {
    /// A track captured by this client.
    #[must_use]
    pub fn local(id: TrackId, kind: TrackKind) -> Self {
        Self {
            id,
            kind,
            owner: OwnerKey::Local,
            bound_surface: None,
        }
    }

    /// A track published by a remote participant.
    #[must_use]
    pub fn remote(id: TrackId, kind: TrackKind, participant_id: ParticipantId) -> Self {
        Self {
            id,
            kind,
            owner: OwnerKey::Participant(participant_id),
            bound_surface: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &TrackId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    #[must_use]
    pub fn owner(&self) -> &OwnerKey {
        &self.owner
    }

    #[must_use]
    pub fn ownership(&self) -> Ownership {
        self.owner.ownership()
    }

    /// The owning participant, present iff the track is remote.
    #[must_use]
    pub fn participant_id(&self) -> Option<&ParticipantId> {
        match &self.owner {
            OwnerKey::Local => None,
            OwnerKey::Participant(id) => Some(id),
        }
    }

    #[must_use]
    pub fn bound_surface(&self) -> Option<SurfaceId> {
        self.bound_surface
    }

    pub(crate) fn bind_surface(&mut self, surface_id: SurfaceId) {
        self.bound_surface = Some(surface_id);
    }

    pub(crate) fn clear_surface(&mut self) {
        self.bound_surface = None;
    }
}

/// Camera facing direction requested from the capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    User,
    Environment,
}

impl Facing {
    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            Facing::User => Facing::Environment,
            Facing::Environment => Facing::User,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Facing::User => "user",
            Facing::Environment => "environment",
        }
    }
}

impl FromStr for Facing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Facing::User),
            "environment" => Ok(Facing::Environment),
            other => Err(format!("unknown facing mode '{other}'")),
        }
    }
}

/// The two mutually exclusive operating roles of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Captures and publishes local camera/microphone.
    Publisher,
    /// Subscribes to and renders tracks published by others.
    Viewer,
}

impl Mode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Mode::Publisher => "publisher",
            Mode::Viewer => "viewer",
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    /// Accepts `publisher`/`viewer` and the legacy `stream`/`watch` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publisher" | "stream" => Ok(Mode::Publisher),
            "viewer" | "watch" => Ok(Mode::Viewer),
            other => Err(format!("Invalid mode {other}")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_track_kind_parse() {
        assert_eq!(TrackKind::parse("audio"), Some(TrackKind::Audio));
        assert_eq!(TrackKind::parse("video"), Some(TrackKind::Video));
        assert_eq!(TrackKind::parse("desktop"), None);
        assert_eq!(TrackKind::parse("Audio"), None);
    }

    #[test]
    fn test_remote_track_carries_participant() {
        let track = Track::remote("t1".into(), TrackKind::Video, "p1".into());
        assert_eq!(track.ownership(), Ownership::Remote);
        assert_eq!(track.participant_id(), Some(&ParticipantId::new("p1")));

        let local = Track::local("a1".into(), TrackKind::Audio);
        assert_eq!(local.ownership(), Ownership::Local);
        assert!(local.participant_id().is_none());
        assert!(local.bound_surface().is_none());
    }

    #[test]
    fn test_facing_inverts() {
        assert_eq!(Facing::User.inverted(), Facing::Environment);
        assert_eq!(Facing::Environment.inverted(), Facing::User);
        assert_eq!("environment".parse::<Facing>(), Ok(Facing::Environment));
        assert!("sideways".parse::<Facing>().is_err());
    }

    #[test]
    fn test_mode_parse_accepts_legacy_names() {
        assert_eq!("publisher".parse::<Mode>(), Ok(Mode::Publisher));
        assert_eq!("stream".parse::<Mode>(), Ok(Mode::Publisher));
        assert_eq!("viewer".parse::<Mode>(), Ok(Mode::Viewer));
        assert_eq!("watch".parse::<Mode>(), Ok(Mode::Viewer));
        assert_eq!(
            "broadcast".parse::<Mode>(),
            Err("Invalid mode broadcast".to_string())
        );
    }
}
