//! `ParticipantTable` - known remote participants and their tracks.
//!
//! Each participant keeps its track ids in arrival order. Track metadata
//! itself lives in the [`TrackRegistry`]; the table and the registry are
//! mutated together so that every track referenced here is registered and
//! every registered remote track is referenced here.

use super::registry::TrackRegistry;
use crate::errors::ClientError;
use crate::model::{ParticipantId, Track, TrackId, TrackKind};
use crate::render::RenderSurfaceBinder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// A remote session member.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub display_name: Option<String>,
    /// Owned tracks in arrival order.
    pub tracks: Vec<TrackId>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ParticipantTable {
    participants: HashMap<ParticipantId, Participant>,
}

impl ParticipantTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty entry for a participant.
    ///
    /// # Errors
    ///
    /// `DuplicateParticipant` if the participant is already known.
    pub fn on_join(&mut self, participant_id: ParticipantId) -> Result<(), ClientError> {
        if self.participants.contains_key(&participant_id) {
            return Err(ClientError::DuplicateParticipant(participant_id));
        }
        info!(
            target: "client.session",
            participant_id = %participant_id,
            "User has joined the conference"
        );
        self.participants.insert(
            participant_id.clone(),
            Participant {
                participant_id,
                display_name: None,
                tracks: Vec::new(),
                joined_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Remove a participant, detaching and unregistering every track it owns.
    ///
    /// Returns the removed track ids, or `None` if the participant was
    /// unknown (duplicate leave notifications are ignored).
    pub fn on_leave(
        &mut self,
        participant_id: &ParticipantId,
        registry: &mut TrackRegistry,
        binder: &mut RenderSurfaceBinder,
    ) -> Option<Vec<TrackId>> {
        let Some(participant) = self.participants.remove(participant_id) else {
            debug!(
                target: "client.session",
                participant_id = %participant_id,
                "Leave for unknown participant ignored"
            );
            return None;
        };

        for track_id in &participant.tracks {
            binder.detach(track_id);
            registry.remove(track_id);
        }

        info!(
            target: "client.session",
            participant_id = %participant_id,
            removed_tracks = participant.tracks.len(),
            "User has left the conference"
        );
        Some(participant.tracks)
    }

    /// Register a remote track for a joined participant.
    ///
    /// # Errors
    ///
    /// - `UnknownParticipant` if the participant has not joined (recoverable;
    ///   the caller decides whether to buffer)
    /// - `DuplicateTrack` if the id is already registered
    pub fn add_track_to(
        &mut self,
        participant_id: &ParticipantId,
        track_id: TrackId,
        kind: TrackKind,
        registry: &mut TrackRegistry,
    ) -> Result<(), ClientError> {
        let participant = self
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| ClientError::UnknownParticipant(participant_id.clone()))?;

        registry.add(Track::remote(track_id.clone(), kind, participant_id.clone()))?;
        participant.tracks.push(track_id);
        Ok(())
    }

    /// Drop a track from a participant's list. Returns `false` if either is
    /// unknown.
    pub fn remove_track_of(&mut self, participant_id: &ParticipantId, track_id: &TrackId) -> bool {
        match self.participants.get_mut(participant_id) {
            Some(participant) => {
                let before = participant.tracks.len();
                participant.tracks.retain(|id| id != track_id);
                participant.tracks.len() != before
            }
            None => false,
        }
    }

    /// Record a display-name change. Returns `false` for unknown participants.
    pub fn set_display_name(&mut self, participant_id: &ParticipantId, name: String) -> bool {
        match self.participants.get_mut(participant_id) {
            Some(participant) => {
                participant.display_name = Some(name);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, participant_id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(participant_id)
    }

    #[must_use]
    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.participants.contains_key(participant_id)
    }

    /// Track ids of a participant in arrival order. Empty for unknown ids.
    #[must_use]
    pub fn tracks_of(&self, participant_id: &ParticipantId) -> &[TrackId] {
        self.participants
            .get(participant_id)
            .map(|p| p.tracks.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::OwnerKey;
    use crate::render::headless::HeadlessRenderer;

    struct Fixture {
        table: ParticipantTable,
        registry: TrackRegistry,
        binder: RenderSurfaceBinder,
        renderer: HeadlessRenderer,
    }

    fn fixture() -> Fixture {
        let renderer = HeadlessRenderer::new();
        Fixture {
            table: ParticipantTable::new(),
            registry: TrackRegistry::new(),
            binder: RenderSurfaceBinder::new(Box::new(renderer.clone())),
            renderer,
        }
    }

    fn add_and_attach(f: &mut Fixture, participant: &str, track: &str, kind: TrackKind) {
        let pid = ParticipantId::new(participant);
        let tid = TrackId::new(track);
        f.table
            .add_track_to(&pid, tid.clone(), kind, &mut f.registry)
            .unwrap();
        let track = f.registry.lookup_mut(&tid).unwrap();
        f.binder.attach(track).unwrap();
    }

    #[test]
    fn test_join_creates_empty_entry() {
        let mut f = fixture();
        f.table.on_join("p1".into()).unwrap();

        assert!(f.table.contains(&"p1".into()));
        assert!(f.table.tracks_of(&"p1".into()).is_empty());
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let mut f = fixture();
        f.table.on_join("p1".into()).unwrap();

        let result = f.table.on_join("p1".into());
        assert!(matches!(result, Err(ClientError::DuplicateParticipant(_))));
        assert_eq!(f.table.len(), 1);
    }

    #[test]
    fn test_add_track_to_unknown_participant() {
        let mut f = fixture();
        let result = f.table.add_track_to(
            &"ghost".into(),
            "t1".into(),
            TrackKind::Video,
            &mut f.registry,
        );

        assert!(matches!(result, Err(ClientError::UnknownParticipant(_))));
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_leave_cascades_to_registry_and_surfaces() {
        let mut f = fixture();
        f.table.on_join("p1".into()).unwrap();
        f.table.on_join("p2".into()).unwrap();
        add_and_attach(&mut f, "p1", "t1", TrackKind::Video);
        add_and_attach(&mut f, "p1", "t2", TrackKind::Audio);
        add_and_attach(&mut f, "p2", "t3", TrackKind::Video);

        let removed = f
            .table
            .on_leave(&"p1".into(), &mut f.registry, &mut f.binder)
            .unwrap();
        assert_eq!(removed, vec![TrackId::new("t1"), TrackId::new("t2")]);

        assert!(f
            .registry
            .tracks_of(&OwnerKey::Participant("p1".into()))
            .is_empty());
        assert!(!f.binder.has_surface(&"t1".into()));
        assert!(!f.binder.has_surface(&"t2".into()));
        assert!(f.binder.has_surface(&"t3".into()));
        assert_eq!(f.renderer.element_count(), 1);
        assert!(!f.table.contains(&"p1".into()));
    }

    #[test]
    fn test_leave_unknown_is_noop() {
        let mut f = fixture();
        assert!(f
            .table
            .on_leave(&"nobody".into(), &mut f.registry, &mut f.binder)
            .is_none());

        f.table.on_join("p1".into()).unwrap();
        assert!(f
            .table
            .on_leave(&"p1".into(), &mut f.registry, &mut f.binder)
            .is_some());
        assert!(f
            .table
            .on_leave(&"p1".into(), &mut f.registry, &mut f.binder)
            .is_none());
    }

    #[test]
    fn test_tracks_keep_arrival_order() {
        let mut f = fixture();
        f.table.on_join("p1".into()).unwrap();
        add_and_attach(&mut f, "p1", "b", TrackKind::Video);
        add_and_attach(&mut f, "p1", "a", TrackKind::Audio);

        assert_eq!(
            f.table.tracks_of(&"p1".into()),
            &[TrackId::new("b"), TrackId::new("a")]
        );
        assert!(f.table.remove_track_of(&"p1".into(), &"b".into()));
        assert!(!f.table.remove_track_of(&"p1".into(), &"b".into()));
        assert_eq!(f.table.tracks_of(&"p1".into()), &[TrackId::new("a")]);
    }

    #[test]
    fn test_display_name_change() {
        let mut f = fixture();
        assert!(!f.table.set_display_name(&"p1".into(), "Ada".to_string()));

        f.table.on_join("p1".into()).unwrap();
        assert!(f.table.set_display_name(&"p1".into(), "Ada".to_string()));
        assert_eq!(
            f.table.get(&"p1".into()).unwrap().display_name.as_deref(),
            Some("Ada")
        );
    }
}
