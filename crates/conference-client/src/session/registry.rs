//! `TrackRegistry` - authoritative map from track id to track.
//!
//! The registry is the single source of truth the other components consult
//! before touching surfaces. It never renders anything itself.

use crate::errors::ClientError;
use crate::model::{OwnerKey, Ownership, Track, TrackId};
use std::collections::HashMap;

/// Track metadata keyed by id, with per-owner arrival order.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: HashMap<TrackId, Track>,
    by_owner: HashMap<OwnerKey, Vec<TrackId>>,
}

impl TrackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track.
    ///
    /// # Errors
    ///
    /// `DuplicateTrack` if the id is already present; the registry is left
    /// unchanged.
    pub fn add(&mut self, track: Track) -> Result<(), ClientError> {
        if self.tracks.contains_key(track.id()) {
            return Err(ClientError::DuplicateTrack(track.id().clone()));
        }
        self.by_owner
            .entry(track.owner().clone())
            .or_default()
            .push(track.id().clone());
        self.tracks.insert(track.id().clone(), track);
        Ok(())
    }

    /// Remove a track. Absent ids are ignored, since removal races with the
    /// cleanup paths.
    pub fn remove(&mut self, track_id: &TrackId) -> Option<Track> {
        let track = self.tracks.remove(track_id)?;
        if let Some(ids) = self.by_owner.get_mut(track.owner()) {
            ids.retain(|id| id != track_id);
            if ids.is_empty() {
                self.by_owner.remove(track.owner());
            }
        }
        Some(track)
    }

    #[must_use]
    pub fn lookup(&self, track_id: &TrackId) -> Option<&Track> {
        self.tracks.get(track_id)
    }

    #[must_use]
    pub fn contains(&self, track_id: &TrackId) -> bool {
        self.tracks.contains_key(track_id)
    }

    /// Tracks of one owner, in arrival order.
    #[must_use]
    pub fn tracks_of(&self, owner: &OwnerKey) -> Vec<&Track> {
        self.by_owner
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| self.tracks.get(id)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn lookup_mut(&mut self, track_id: &TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(track_id)
    }

    /// Ids of every registered track, local and remote.
    #[must_use]
    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Number of tracks with the given ownership.
    #[must_use]
    pub fn count(&self, ownership: Ownership) -> usize {
        self.tracks
            .values()
            .filter(|t| t.ownership() == ownership)
            .count()
    }
}
