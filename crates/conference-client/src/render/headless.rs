//! In-memory rendering backend.
//!
//! Keeps surface elements in a map instead of a document. Clones share
//! state, so a test can keep one clone and hand the other to the binder.

use super::{PresentationPolicy, RenderBackend};
use crate::errors::EngineError;
use crate::model::{SurfaceId, TrackId, TrackKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One surface element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessElement {
    pub kind: TrackKind,
    pub policy: PresentationPolicy,
    pub bound_track: Option<TrackId>,
    pub playing: bool,
}

#[derive(Debug, Default)]
struct HeadlessState {
    elements: HashMap<SurfaceId, HeadlessElement>,
    created: usize,
    removed: usize,
    fail_bind: bool,
    fail_unbind: bool,
}

/// Shared handle to the in-memory document.
#[derive(Debug, Clone, Default)]
pub struct HeadlessRenderer {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent `bind_media` calls fail.
    pub fn fail_bind(&self, fail: bool) {
        self.lock().fail_bind = fail;
    }

    /// Make subsequent `unbind_media` calls fail, as if the element were gone.
    pub fn fail_unbind(&self, fail: bool) {
        self.lock().fail_unbind = fail;
    }

    #[must_use]
    pub fn element(&self, surface_id: SurfaceId) -> Option<HeadlessElement> {
        self.lock().elements.get(&surface_id).cloned()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.lock().elements.len()
    }

    /// Number of elements whose media is playing.
    #[must_use]
    pub fn playing_count(&self) -> usize {
        self.lock().elements.values().filter(|e| e.playing).count()
    }

    /// Surface elements ever created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.lock().created
    }

    /// Surface elements ever removed.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.lock().removed
    }
}

impl RenderBackend for HeadlessRenderer {
    fn create_surface(
        &mut self,
        surface_id: SurfaceId,
        kind: TrackKind,
        policy: &PresentationPolicy,
    ) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.created += 1;
        state.elements.insert(
            surface_id,
            HeadlessElement {
                kind,
                policy: *policy,
                bound_track: None,
                playing: false,
            },
        );
        Ok(())
    }

    fn bind_media(&mut self, surface_id: SurfaceId, track_id: &TrackId) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.fail_bind {
            return Err(EngineError::Rejected(format!("cannot bind {track_id}")));
        }
        let element = state
            .elements
            .get_mut(&surface_id)
            .ok_or_else(|| EngineError::Rejected(format!("no element {surface_id}")))?;
        element.bound_track = Some(track_id.clone());
        Ok(())
    }

    fn unbind_media(
        &mut self,
        surface_id: SurfaceId,
        track_id: &TrackId,
    ) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.fail_unbind {
            return Err(EngineError::DetachFailed(format!(
                "element for {track_id} is gone"
            )));
        }
        let element = state
            .elements
            .get_mut(&surface_id)
            .ok_or_else(|| EngineError::DetachFailed(format!("no element {surface_id}")))?;
        element.bound_track = None;
        element.playing = false;
        Ok(())
    }

    fn remove_surface(&mut self, surface_id: SurfaceId) {
        let mut state = self.lock();
        if state.elements.remove(&surface_id).is_some() {
            state.removed += 1;
        }
    }

    fn start_playback(&mut self, surface_id: SurfaceId) -> Result<(), EngineError> {
        let mut state = self.lock();
        let element = state
            .elements
            .get_mut(&surface_id)
            .ok_or_else(|| EngineError::Rejected(format!("no element {surface_id}")))?;
        element.playing = true;
        Ok(())
    }
}
