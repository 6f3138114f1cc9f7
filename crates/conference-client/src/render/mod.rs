//! `RenderSurfaceBinder` - creates and destroys rendering surfaces for tracks.
//!
//! The binder is the only component that talks to the rendering backend
//! (the DOM in a browser). It is invoked at the boundary by the session
//! state machine and the mode controller; nothing in the reconciliation core
//! decides presentation inline.
//!
//! # Presentation policy
//!
//! - local audio surfaces are muted on creation (no echo)
//! - video surfaces get full-area sizing hints
//! - remote surfaces only autoplay once playback has been unlocked by a user
//!   gesture; surfaces attached after that start immediately
//!
//! # Cleanup
//!
//! `detach` is idempotent and never fails: a failing backend unbind is logged
//! and counted, and the surface is removed regardless.

pub mod headless;

use crate::errors::{ClientError, EngineError};
use crate::model::{Ownership, SurfaceId, Track, TrackId, TrackKind};
use crate::observability::metrics;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Per-surface presentation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresentationPolicy {
    pub muted: bool,
    pub autoplay: bool,
    pub full_area: bool,
}

impl PresentationPolicy {
    /// Policy for a track of `kind` and `ownership`. `playback_unlocked`
    /// reflects whether a user gesture has been observed.
    #[must_use]
    pub fn for_track(kind: TrackKind, ownership: Ownership, playback_unlocked: bool) -> Self {
        Self {
            muted: kind == TrackKind::Audio && ownership == Ownership::Local,
            autoplay: ownership == Ownership::Local || playback_unlocked,
            full_area: kind == TrackKind::Video,
        }
    }
}

/// The rendering backend seam.
pub trait RenderBackend: Send {
    /// Create a surface element for a track of `kind`.
    fn create_surface(
        &mut self,
        surface_id: SurfaceId,
        kind: TrackKind,
        policy: &PresentationPolicy,
    ) -> Result<(), EngineError>;

    /// Bind the track's media stream to the surface.
    fn bind_media(&mut self, surface_id: SurfaceId, track_id: &TrackId) -> Result<(), EngineError>;

    /// Unbind the media stream. May fail if the element is already gone.
    fn unbind_media(&mut self, surface_id: SurfaceId, track_id: &TrackId)
        -> Result<(), EngineError>;

    /// Remove the surface element.
    fn remove_surface(&mut self, surface_id: SurfaceId);

    /// Start media playback on the surface.
    fn start_playback(&mut self, surface_id: SurfaceId) -> Result<(), EngineError>;
}

/// A surface bound 1:1 to a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderSurface {
    pub surface_id: SurfaceId,
    pub track_id: TrackId,
    pub kind: TrackKind,
    pub ownership: Ownership,
    pub policy: PresentationPolicy,
    pub playing: bool,
}

/// Returned by [`RenderSurfaceBinder::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceHandle {
    pub surface_id: SurfaceId,
    pub track_id: TrackId,
    /// `false` when the track already had a surface and nothing was created.
    pub created: bool,
}

/// Owns every surface, keyed by track id.
pub struct RenderSurfaceBinder {
    backend: Box<dyn RenderBackend>,
    surfaces: HashMap<TrackId, RenderSurface>,
    playback_unlocked: bool,
}

impl RenderSurfaceBinder {
    #[must_use]
    pub fn new(backend: Box<dyn RenderBackend>) -> Self {
        Self {
            backend,
            surfaces: HashMap::new(),
            playback_unlocked: false,
        }
    }

    /// Create a surface for `track`, bind its media and record the surface id
    /// in the track. Attaching a track that already has a surface returns the
    /// existing handle.
    ///
    /// # Errors
    ///
    /// Backend failures while creating or binding. A surface whose bind failed
    /// is removed again before returning.
    pub fn attach(&mut self, track: &mut Track) -> Result<SurfaceHandle, ClientError> {
        if let Some(existing) = self.surfaces.get(track.id()) {
            debug!(
                target: "client.render",
                track_id = %track.id(),
                surface_id = %existing.surface_id,
                "Track already attached"
            );
            track.bind_surface(existing.surface_id);
            return Ok(SurfaceHandle {
                surface_id: existing.surface_id,
                track_id: track.id().clone(),
                created: false,
            });
        }

        let policy =
            PresentationPolicy::for_track(track.kind(), track.ownership(), self.playback_unlocked);
        let surface_id = SurfaceId::new();

        self.backend
            .create_surface(surface_id, track.kind(), &policy)?;
        if let Err(e) = self.backend.bind_media(surface_id, track.id()) {
            self.backend.remove_surface(surface_id);
            return Err(e.into());
        }

        let mut surface = RenderSurface {
            surface_id,
            track_id: track.id().clone(),
            kind: track.kind(),
            ownership: track.ownership(),
            policy,
            playing: false,
        };

        if policy.autoplay {
            match self.backend.start_playback(surface_id) {
                Ok(()) => surface.playing = true,
                Err(e) => warn!(
                    target: "client.render",
                    track_id = %track.id(),
                    error = %e,
                    "Autoplay was refused"
                ),
            }
        }

        debug!(
            target: "client.render",
            track_id = %track.id(),
            kind = %track.kind(),
            owner = %track.owner(),
            surface_id = %surface_id,
            playing = surface.playing,
            "Surface attached"
        );

        track.bind_surface(surface_id);
        self.surfaces.insert(track.id().clone(), surface);
        metrics::set_surfaces_active(self.surfaces.len());

        Ok(SurfaceHandle {
            surface_id,
            track_id: track.id().clone(),
            created: true,
        })
    }

    /// Destroy the surface of `track_id`.
    ///
    /// Returns `true` if a surface was removed. Unknown ids and repeated calls
    /// only produce a log line.
    pub fn detach(&mut self, track_id: &TrackId) -> bool {
        let Some(surface) = self.surfaces.remove(track_id) else {
            debug!(
                target: "client.render",
                track_id = %track_id,
                "Detach for track without surface ignored"
            );
            return false;
        };

        if let Err(e) = self.backend.unbind_media(surface.surface_id, track_id) {
            warn!(
                target: "client.render",
                track_id = %track_id,
                surface_id = %surface.surface_id,
                error = %e,
                "Failed to detach track, removing surface anyway"
            );
            metrics::record_cleanup_failure("detach");
        }
        self.backend.remove_surface(surface.surface_id);
        metrics::set_surfaces_active(self.surfaces.len());

        debug!(
            target: "client.render",
            track_id = %track_id,
            surface_id = %surface.surface_id,
            "Surface detached"
        );
        true
    }

    /// Record the playback gesture and start every remote surface that is not
    /// playing yet. Returns the number of surfaces started.
    ///
    /// Surfaces attached afterwards start on their own.
    pub fn unlock_playback(&mut self) -> usize {
        self.playback_unlocked = true;

        let mut started = 0;
        for surface in self.surfaces.values_mut() {
            if surface.playing || surface.ownership != Ownership::Remote {
                continue;
            }
            match self.backend.start_playback(surface.surface_id) {
                Ok(()) => {
                    surface.playing = true;
                    surface.policy.autoplay = true;
                    started += 1;
                }
                Err(e) => warn!(
                    target: "client.render",
                    track_id = %surface.track_id,
                    error = %e,
                    "Failed to start playback"
                ),
            }
        }

        info!(
            target: "client.render",
            started,
            surfaces = self.surfaces.len(),
            "Playback unlocked"
        );
        started
    }

    #[must_use]
    pub fn is_playback_unlocked(&self) -> bool {
        self.playback_unlocked
    }

    #[must_use]
    pub fn surface_for(&self, track_id: &TrackId) -> Option<&RenderSurface> {
        self.surfaces.get(track_id)
    }

    #[must_use]
    pub fn has_surface(&self, track_id: &TrackId) -> bool {
        self.surfaces.contains_key(track_id)
    }

    pub fn surfaces(&self) -> impl Iterator<Item = &RenderSurface> {
        self.surfaces.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}
