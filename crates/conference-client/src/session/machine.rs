//! `SessionStateMachine` - drives the join/leave lifecycle and reconciles
//! engine events into the registry, the participant table and the binder.
//!
//! # Publishing local tracks
//!
//! Local tracks may be captured before the conference is joined. Each local
//! track carries a `published` flag; [`SessionStateMachine::add_local_track`]
//! publishes right away when joined, otherwise the track waits for the
//! `Joined` event, which publishes every unpublished local track in capture
//! order. A duplicate `Joined` finds nothing left to publish. `Left` clears
//! the flags so a rejoin publishes each track once more.
//!
//! # Tracks for unknown participants
//!
//! A remote track for a participant that has not joined yet is buffered per
//! participant and registered when the join arrives. A removal or a leave for
//! a buffered track discards it.

use super::participants::ParticipantTable;
use super::registry::TrackRegistry;
use super::state::{SessionEvent, SessionState};
use crate::engine::{ConferenceEvent, ConferenceSession, RemoteTrackInfo, TrackInfoEvent};
use crate::errors::{ClientError, ErrorClass};
use crate::model::{Mode, OwnerKey, Ownership, ParticipantId, Track, TrackId, TrackKind};
use crate::observability::metrics;
use crate::render::RenderSurfaceBinder;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A locally captured track and whether it has been submitted to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LocalEntry {
    track_id: TrackId,
    published: bool,
}

/// Reconciliation core for one client session.
pub struct SessionStateMachine {
    mode: Mode,
    state: SessionState,
    registry: TrackRegistry,
    participants: ParticipantTable,
    binder: RenderSurfaceBinder,
    conference: Option<Box<dyn ConferenceSession>>,
    local: Vec<LocalEntry>,
    pending: HashMap<ParticipantId, Vec<(TrackId, TrackKind)>>,
}

impl SessionStateMachine {
    #[must_use]
    pub fn new(mode: Mode, binder: RenderSurfaceBinder) -> Self {
        Self {
            mode,
            state: SessionState::Disconnected,
            registry: TrackRegistry::new(),
            participants: ParticipantTable::new(),
            binder,
            conference: None,
            local: Vec::new(),
            pending: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Apply a lifecycle event.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` if the current state does not accept `event`.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionState, ClientError> {
        let next = self.state.next(event)?;
        if next != self.state {
            info!(
                target: "client.session",
                from = %self.state,
                to = %next,
                event = ?event,
                "Session state changed"
            );
        }
        self.state = next;
        Ok(next)
    }

    /// Hand over the conference handle created on an established transport.
    pub fn set_conference(&mut self, conference: Box<dyn ConferenceSession>) {
        self.conference = Some(conference);
    }

    /// Mutable access to the conference handle, e.g. to subscribe to events.
    pub fn conference_mut(&mut self) -> Option<&mut (dyn ConferenceSession + 'static)> {
        self.conference.as_deref_mut()
    }

    #[must_use]
    pub fn has_conference(&self) -> bool {
        self.conference.is_some()
    }

    /// Issue the join request and move to `Joining`.
    ///
    /// # Errors
    ///
    /// - `NoConference` before a conference handle was set
    /// - `InvalidTransition` outside `Connected`/`Left`
    /// - engine failures of the join request
    pub fn request_join(&mut self) -> Result<(), ClientError> {
        self.state.next(SessionEvent::JoinRequested)?;
        let conference = self.conference.as_mut().ok_or(ClientError::NoConference)?;
        conference.join()?;
        self.apply(SessionEvent::JoinRequested)?;
        Ok(())
    }

    /// Request to leave the conference whenever a conference handle exists,
    /// including after a refused join. Failures are logged and counted; from
    /// `Joining`/`Joined` the state moves to `Left` regardless. No-op without
    /// a conference or once already left.
    pub fn leave_conference(&mut self) {
        if self.state == SessionState::Left {
            return;
        }
        let Some(conference) = self.conference.as_mut() else {
            return;
        };
        if let Err(e) = conference.leave() {
            warn!(target: "client.session", error = %e, "Failed to leave conference");
            metrics::record_cleanup_failure("leave");
        }
        if matches!(self.state, SessionState::Joining | SessionState::Joined)
            && self.apply(SessionEvent::LeaveRequested).is_ok()
        {
            self.reset_publication();
        }
    }

    /// Transport is gone: move to `Disconnected`, drop the conference handle
    /// and any buffered remote tracks. Registered track state is left to the
    /// caller's teardown.
    pub fn on_transport_closed(&mut self) {
        if self.state == SessionState::Joined {
            self.reset_publication();
        }
        if !self.pending.is_empty() {
            debug!(
                target: "client.session",
                discarded = self.pending_count(),
                "Discarded buffered tracks on transport close"
            );
            self.pending.clear();
        }
        // Accepted from every state.
        let _ = self.apply(SessionEvent::TransportClosed);
        self.conference = None;
    }

    // ------------------------------------------------------------------
    // Conference events
    // ------------------------------------------------------------------

    /// Dispatch one conference event, logging and counting contract
    /// violations. A failing event never affects later events.
    pub fn handle(&mut self, event: ConferenceEvent) {
        if let Err(e) = self.dispatch(event) {
            report_dropped(&e, "Dropped engine event");
        }
    }

    /// Dispatch one conference event.
    ///
    /// # Errors
    ///
    /// The error of the single failed event (unknown kind, duplicate ids,
    /// invalid transitions, render failures). State touched before the
    /// failure stays consistent.
    pub fn dispatch(&mut self, event: ConferenceEvent) -> Result<(), ClientError> {
        let result = match event {
            ConferenceEvent::Joined => self.on_joined(),
            ConferenceEvent::Left => self.on_left(),
            ConferenceEvent::TrackAdded(info) => self.on_remote_track_added(info),
            ConferenceEvent::TrackRemoved {
                track_id,
                participant_id,
            } => {
                self.on_remote_track_removed(&track_id, &participant_id);
                Ok(())
            }
            ConferenceEvent::UserJoined(participant_id) => self.on_user_joined(participant_id),
            ConferenceEvent::UserLeft(participant_id) => {
                self.on_user_left(&participant_id);
                Ok(())
            }
            ConferenceEvent::DisplayNameChanged {
                participant_id,
                display_name,
            } => {
                info!(
                    target: "client.session",
                    participant_id = %participant_id,
                    display_name = %display_name,
                    "Display name changed"
                );
                self.participants
                    .set_display_name(&participant_id, display_name);
                Ok(())
            }
            ConferenceEvent::TrackInfo { track_id, event } => {
                self.log_track_info(&track_id, &event);
                Ok(())
            }
        };
        self.refresh_gauges();
        result
    }

    fn on_joined(&mut self) -> Result<(), ClientError> {
        if self.state == SessionState::Joined {
            debug!(target: "client.session", "Duplicate conference joined event");
        }
        self.apply(SessionEvent::JoinConfirmed)?;
        info!(
            target: "client.session",
            session_id = ?self.session_id(),
            local_tracks = self.local.len(),
            "Conference joined"
        );
        self.publish_pending();
        Ok(())
    }

    fn on_left(&mut self) -> Result<(), ClientError> {
        self.apply(SessionEvent::ConferenceLeft)?;
        self.reset_publication();
        info!(target: "client.session", "Conference left");
        Ok(())
    }

    fn ignores_remote(&self) -> bool {
        self.mode == Mode::Publisher
    }

    fn on_remote_track_added(&mut self, info: RemoteTrackInfo) -> Result<(), ClientError> {
        if self.ignores_remote() {
            debug!(
                target: "client.session",
                track_id = %info.track_id,
                "Ignoring remote track in publisher mode"
            );
            return Ok(());
        }

        let kind = TrackKind::parse(&info.kind).ok_or_else(|| ClientError::UnknownTrackKind {
            kind: info.kind.clone(),
            participant_id: info.participant_id.clone(),
        })?;

        if self.registry.contains(&info.track_id) || self.is_pending(&info.track_id) {
            return Err(ClientError::DuplicateTrack(info.track_id));
        }

        match self.register_remote(&info.participant_id, &info.track_id, kind) {
            Ok(()) => Ok(()),
            Err(e @ ClientError::UnknownParticipant(_)) => {
                warn!(
                    target: "client.session",
                    error = %e,
                    track_id = %info.track_id,
                    "Buffering track until its participant joins"
                );
                self.pending
                    .entry(info.participant_id)
                    .or_default()
                    .push((info.track_id, kind));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Register a remote track and attach its surface. A failed attach rolls
    /// the registration back, so a later add for the same id is accepted.
    fn register_remote(
        &mut self,
        participant_id: &ParticipantId,
        track_id: &TrackId,
        kind: TrackKind,
    ) -> Result<(), ClientError> {
        self.participants
            .add_track_to(participant_id, track_id.clone(), kind, &mut self.registry)?;
        if let Err(e) = self.attach(track_id) {
            self.registry.remove(track_id);
            self.participants.remove_track_of(participant_id, track_id);
            return Err(e);
        }
        Ok(())
    }

    fn attach(&mut self, track_id: &TrackId) -> Result<(), ClientError> {
        let Some(track) = self.registry.lookup_mut(track_id) else {
            return Ok(());
        };
        self.binder.attach(track)?;
        Ok(())
    }

    fn on_remote_track_removed(&mut self, track_id: &TrackId, participant_id: &ParticipantId) {
        if self.discard_pending(participant_id, track_id) {
            debug!(
                target: "client.session",
                track_id = %track_id,
                "Discarded buffered track"
            );
            return;
        }

        let owner = match self.registry.lookup(track_id) {
            Some(track) if track.ownership() == Ownership::Remote => track.owner().clone(),
            Some(_) => {
                debug!(
                    target: "client.session",
                    track_id = %track_id,
                    "Ignoring removal of local track"
                );
                return;
            }
            None => {
                debug!(
                    target: "client.session",
                    track_id = %track_id,
                    "Removal of unknown track ignored"
                );
                return;
            }
        };

        self.binder.detach(track_id);
        self.registry.remove(track_id);
        if let OwnerKey::Participant(owner) = owner {
            self.participants.remove_track_of(&owner, track_id);
        }
        debug!(
            target: "client.session",
            track_id = %track_id,
            participant_id = %participant_id,
            "Remote track removed"
        );
    }

    fn on_user_joined(&mut self, participant_id: ParticipantId) -> Result<(), ClientError> {
        if self.ignores_remote() {
            debug!(
                target: "client.session",
                participant_id = %participant_id,
                "Ignoring participant join in publisher mode"
            );
            return Ok(());
        }

        self.participants.on_join(participant_id.clone())?;

        let buffered = self.pending.remove(&participant_id).unwrap_or_default();
        for (track_id, kind) in buffered {
            match self.register_remote(&participant_id, &track_id, kind) {
                Ok(()) => debug!(
                    target: "client.session",
                    participant_id = %participant_id,
                    track_id = %track_id,
                    "Flushed buffered track"
                ),
                Err(e) => report_dropped(&e, "Dropped buffered track"),
            }
        }
        Ok(())
    }

    fn on_user_left(&mut self, participant_id: &ParticipantId) {
        if let Some(discarded) = self.pending.remove(participant_id) {
            debug!(
                target: "client.session",
                participant_id = %participant_id,
                discarded = discarded.len(),
                "Discarded buffered tracks of departed participant"
            );
        }
        self.participants
            .on_leave(participant_id, &mut self.registry, &mut self.binder);
    }

    fn log_track_info(&self, track_id: &TrackId, event: &TrackInfoEvent) {
        let owner = self
            .registry
            .lookup(track_id)
            .map_or_else(|| "Unknown".to_string(), |t| t.owner().to_string());
        match event {
            TrackInfoEvent::AudioLevelChanged(level) => debug!(
                target: "client.session",
                track_id = %track_id,
                owner = %owner,
                level,
                "Audio level changed"
            ),
            TrackInfoEvent::MuteChanged { muted } => info!(
                target: "client.session",
                track_id = %track_id,
                owner = %owner,
                muted,
                "Track mute changed"
            ),
            TrackInfoEvent::LocalStopped => info!(
                target: "client.session",
                track_id = %track_id,
                owner = %owner,
                "Local track stopped"
            ),
            TrackInfoEvent::AudioOutputChanged { device_id } => info!(
                target: "client.session",
                track_id = %track_id,
                owner = %owner,
                device_id = %device_id,
                "Track audio output changed"
            ),
        }
    }

    fn is_pending(&self, track_id: &TrackId) -> bool {
        self.pending
            .values()
            .any(|tracks| tracks.iter().any(|(id, _)| id == track_id))
    }

    fn discard_pending(&mut self, participant_id: &ParticipantId, track_id: &TrackId) -> bool {
        let Some(tracks) = self.pending.get_mut(participant_id) else {
            return false;
        };
        let before = tracks.len();
        tracks.retain(|(id, _)| id != track_id);
        let removed = tracks.len() != before;
        if tracks.is_empty() {
            self.pending.remove(participant_id);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Local tracks
    // ------------------------------------------------------------------

    /// Register and attach a captured local track; publish it immediately
    /// when joined.
    ///
    /// # Errors
    ///
    /// `DuplicateTrack` if the id is already registered. A failing surface
    /// is logged and does not prevent publishing.
    pub fn add_local_track(&mut self, track_id: TrackId, kind: TrackKind) -> Result<(), ClientError> {
        self.registry.add(Track::local(track_id.clone(), kind))?;
        if let Err(e) = self.attach(&track_id) {
            warn!(
                target: "client.session",
                track_id = %track_id,
                error = %e,
                "Failed to attach local track"
            );
        }
        self.local.push(LocalEntry {
            track_id: track_id.clone(),
            published: false,
        });
        debug!(
            target: "client.session",
            track_id = %track_id,
            kind = %kind,
            joined = self.state == SessionState::Joined,
            "Local track added"
        );

        if self.state == SessionState::Joined {
            self.publish_pending();
        }
        self.refresh_gauges();
        Ok(())
    }

    /// Publish every local track not yet submitted, in capture order.
    fn publish_pending(&mut self) {
        let Some(conference) = self.conference.as_mut() else {
            warn!(
                target: "client.session",
                "Joined without a conference handle, nothing published"
            );
            return;
        };

        for entry in self.local.iter_mut().filter(|e| !e.published) {
            let Some(track) = self.registry.lookup(&entry.track_id) else {
                continue;
            };
            match conference.add_track(track) {
                Ok(()) => {
                    entry.published = true;
                    metrics::record_publish();
                    info!(
                        target: "client.session",
                        track_id = %entry.track_id,
                        "Local track published"
                    );
                }
                Err(e) => warn!(
                    target: "client.session",
                    track_id = %entry.track_id,
                    error = %e,
                    "Failed to publish local track"
                ),
            }
        }
    }

    fn reset_publication(&mut self) {
        for entry in &mut self.local {
            entry.published = false;
        }
    }

    /// Tear down every local track: detach its surface, unpublish it when
    /// joined and remove it from the registry.
    ///
    /// Returns the removed ids so the caller can release the captured media.
    /// Unpublish failures are logged, counted and do not stop the teardown.
    pub fn teardown_local_tracks(&mut self) -> Vec<TrackId> {
        let joined = self.state == SessionState::Joined;
        let entries = std::mem::take(&mut self.local);
        let mut removed = Vec::with_capacity(entries.len());

        for entry in entries {
            self.binder.detach(&entry.track_id);
            if let Some(track) = self.registry.remove(&entry.track_id) {
                if joined && entry.published {
                    if let Some(conference) = self.conference.as_mut() {
                        if let Err(e) = conference.remove_track(&track) {
                            warn!(
                                target: "client.session",
                                track_id = %entry.track_id,
                                error = %e,
                                "Failed to unpublish local track"
                            );
                            metrics::record_cleanup_failure("unpublish");
                        }
                    }
                }
            }
            removed.push(entry.track_id);
        }

        if !removed.is_empty() {
            info!(
                target: "client.session",
                count = removed.len(),
                "Local tracks torn down"
            );
        }
        self.refresh_gauges();
        removed
    }

    fn refresh_gauges(&self) {
        metrics::set_tracks_active(
            Ownership::Local.as_str(),
            self.registry.count(Ownership::Local),
        );
        metrics::set_tracks_active(
            Ownership::Remote.as_str(),
            self.registry.count(Ownership::Remote),
        );
        metrics::set_participants_active(self.participants.len());
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    #[must_use]
    pub fn participants(&self) -> &ParticipantTable {
        &self.participants
    }

    #[must_use]
    pub fn binder(&self) -> &RenderSurfaceBinder {
        &self.binder
    }

    pub fn binder_mut(&mut self) -> &mut RenderSurfaceBinder {
        &mut self.binder
    }

    /// Local track ids in capture order.
    #[must_use]
    pub fn local_tracks(&self) -> Vec<TrackId> {
        self.local.iter().map(|e| e.track_id.clone()).collect()
    }

    #[must_use]
    pub fn is_published(&self, track_id: &TrackId) -> bool {
        self.local
            .iter()
            .any(|e| &e.track_id == track_id && e.published)
    }

    /// Number of buffered tracks waiting for their participant.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.conference.as_ref().and_then(|c| c.session_id())
    }
}

fn report_dropped(e: &ClientError, message: &str) {
    match e.class() {
        ErrorClass::ContractViolation => {
            warn!(target: "client.session", error = %e, "{message}");
            metrics::record_contract_violation(e.kind_label());
        }
        _ => warn!(
            target: "client.session",
            error = %e,
            class = e.class().as_str(),
            "{message}"
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::loopback::LoopbackEngine;
    use crate::engine::EngineOptions;
    use crate::render::headless::HeadlessRenderer;

    fn options() -> EngineOptions {
        EngineOptions {
            domain: "meet.jitsi".to_string(),
            muc_domain: "muc.meet.jitsi".to_string(),
            service_url: "wss://localhost/xmpp-websocket".to_string(),
            disable_audio_levels: true,
        }
    }

    fn machine(mode: Mode) -> (SessionStateMachine, HeadlessRenderer) {
        let renderer = HeadlessRenderer::new();
        let binder = RenderSurfaceBinder::new(Box::new(renderer.clone()));
        (SessionStateMachine::new(mode, binder), renderer)
    }

    /// Drive a machine to `Joining` on a loopback conference for `room`.
    fn connect(machine: &mut SessionStateMachine, engine: &LoopbackEngine, room: &str) {
        let mut transport = engine.transport();
        machine.apply(SessionEvent::ConnectRequested).unwrap();
        transport.connect().unwrap();
        machine.apply(SessionEvent::TransportEstablished).unwrap();
        machine.set_conference(transport.init_conference(room).unwrap());
        machine.request_join().unwrap();
    }

    fn remote(track: &str, kind: &str, participant: &str) -> ConferenceEvent {
        ConferenceEvent::TrackAdded(RemoteTrackInfo {
            track_id: track.into(),
            kind: kind.to_string(),
            participant_id: participant.into(),
        })
    }

    #[test]
    fn test_tracks_captured_while_connecting_published_once_on_join() {
        let engine = LoopbackEngine::new(options());
        let (mut machine, _renderer) = machine(Mode::Publisher);

        machine.apply(SessionEvent::ConnectRequested).unwrap();
        machine
            .add_local_track("a1".into(), TrackKind::Audio)
            .unwrap();
        machine
            .add_local_track("v1".into(), TrackKind::Video)
            .unwrap();
        assert!(engine.published().is_empty());

        let mut transport = engine.transport();
        transport.connect().unwrap();
        machine.apply(SessionEvent::TransportEstablished).unwrap();
        machine.set_conference(transport.init_conference("room-42").unwrap());
        machine.request_join().unwrap();
        assert_eq!(engine.room_id().as_deref(), Some("room-42"));

        machine.dispatch(ConferenceEvent::Joined).unwrap();
        assert_eq!(
            engine.published(),
            vec![TrackId::new("a1"), TrackId::new("v1")]
        );

        // Duplicate joined publishes nothing new.
        machine.dispatch(ConferenceEvent::Joined).unwrap();
        assert_eq!(engine.published().len(), 2);
        assert!(machine.is_published(&"a1".into()));
        assert!(machine.is_published(&"v1".into()));
    }

    #[test]
    fn test_local_track_after_join_published_immediately() {
        let engine = LoopbackEngine::new(options());
        let (mut machine, renderer) = machine(Mode::Publisher);
        connect(&mut machine, &engine, "room");
        machine.dispatch(ConferenceEvent::Joined).unwrap();

        machine
            .add_local_track("v1".into(), TrackKind::Video)
            .unwrap();
        assert_eq!(engine.published(), vec![TrackId::new("v1")]);
        assert_eq!(renderer.playing_count(), 1);
    }

    #[test]
    fn test_rejoin_republishes_once() {
        let engine = LoopbackEngine::new(options());
        let (mut machine, _renderer) = machine(Mode::Publisher);
        connect(&mut machine, &engine, "room");
        machine
            .add_local_track("a1".into(), TrackKind::Audio)
            .unwrap();
        machine.dispatch(ConferenceEvent::Joined).unwrap();

        machine.dispatch(ConferenceEvent::Left).unwrap();
        assert!(!machine.is_published(&"a1".into()));

        machine.request_join().unwrap();
        machine.dispatch(ConferenceEvent::Joined).unwrap();
        assert_eq!(
            engine.published(),
            vec![TrackId::new("a1"), TrackId::new("a1")]
        );
    }

    #[test]
    fn test_unknown_remote_kind_fails_single_dispatch() {
        let (mut machine, _renderer) = machine(Mode::Viewer);
        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();

        let err = machine.dispatch(remote("t1", "desktop", "p1")).unwrap_err();
        assert!(matches!(err, ClientError::UnknownTrackKind { .. }));
        assert!(machine.registry().is_empty());

        // Later events are unaffected.
        machine.dispatch(remote("t2", "video", "p1")).unwrap();
        assert!(machine.registry().contains(&"t2".into()));
        assert!(machine.binder().has_surface(&"t2".into()));
    }

    #[test]
    fn test_duplicate_remote_track_dropped() {
        let (mut machine, renderer) = machine(Mode::Viewer);
        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();
        machine.dispatch(remote("t1", "video", "p1")).unwrap();

        let err = machine.dispatch(remote("t1", "audio", "p1")).unwrap_err();
        assert!(matches!(err, ClientError::DuplicateTrack(_)));
        assert_eq!(renderer.element_count(), 1);
        assert_eq!(machine.participants().tracks_of(&"p1".into()).len(), 1);
    }

    #[test]
    fn test_track_before_participant_join_is_buffered() {
        let (mut machine, _renderer) = machine(Mode::Viewer);

        machine.dispatch(remote("t1", "video", "p1")).unwrap();
        assert!(!machine.registry().contains(&"t1".into()));
        assert_eq!(machine.pending_count(), 1);

        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();
        assert_eq!(machine.pending_count(), 0);
        assert!(machine.registry().contains(&"t1".into()));
        assert!(machine.binder().has_surface(&"t1".into()));
        assert_eq!(
            machine.participants().tracks_of(&"p1".into()),
            &[TrackId::new("t1")]
        );
    }

    #[test]
    fn test_track_after_participant_join_attached_directly() {
        let (mut machine, _renderer) = machine(Mode::Viewer);

        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();
        machine.dispatch(remote("t1", "video", "p1")).unwrap();

        assert_eq!(machine.pending_count(), 0);
        assert!(machine.binder().has_surface(&"t1".into()));
    }

    #[test]
    fn test_buffered_track_discarded_on_remove_and_leave() {
        let (mut machine, _renderer) = machine(Mode::Viewer);

        machine.dispatch(remote("t1", "video", "p1")).unwrap();
        machine
            .dispatch(ConferenceEvent::TrackRemoved {
                track_id: "t1".into(),
                participant_id: "p1".into(),
            })
            .unwrap();
        assert_eq!(machine.pending_count(), 0);

        machine.dispatch(remote("t2", "audio", "p2")).unwrap();
        machine
            .dispatch(ConferenceEvent::UserLeft("p2".into()))
            .unwrap();
        assert_eq!(machine.pending_count(), 0);

        machine
            .dispatch(ConferenceEvent::UserJoined("p2".into()))
            .unwrap();
        assert!(machine.registry().is_empty());
    }

    #[test]
    fn test_remote_track_removed_cleans_everything() {
        let (mut machine, renderer) = machine(Mode::Viewer);
        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();
        machine.dispatch(remote("t1", "video", "p1")).unwrap();

        let removed = ConferenceEvent::TrackRemoved {
            track_id: "t1".into(),
            participant_id: "p1".into(),
        };
        machine.dispatch(removed.clone()).unwrap();
        machine.dispatch(removed).unwrap();

        assert!(machine.registry().is_empty());
        assert!(machine.participants().tracks_of(&"p1".into()).is_empty());
        assert_eq!(renderer.element_count(), 0);
        assert_eq!(renderer.removed_count(), 1);
    }

    #[test]
    fn test_user_left_cascades() {
        let (mut machine, renderer) = machine(Mode::Viewer);
        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();
        machine.dispatch(remote("t1", "video", "p1")).unwrap();
        machine.dispatch(remote("t2", "audio", "p1")).unwrap();

        machine
            .dispatch(ConferenceEvent::UserLeft("p1".into()))
            .unwrap();
        machine
            .dispatch(ConferenceEvent::UserLeft("p1".into()))
            .unwrap();

        assert!(machine.registry().is_empty());
        assert!(machine.participants().is_empty());
        assert_eq!(renderer.element_count(), 0);
    }

    #[test]
    fn test_publisher_ignores_remote_events() {
        let (mut machine, renderer) = machine(Mode::Publisher);
        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();
        machine.dispatch(remote("t1", "video", "p1")).unwrap();

        assert!(machine.participants().is_empty());
        assert!(machine.registry().is_empty());
        assert_eq!(renderer.element_count(), 0);
    }

    #[test]
    fn test_joined_before_join_request_is_contract_violation() {
        let (mut machine, _renderer) = machine(Mode::Viewer);
        let err = machine.dispatch(ConferenceEvent::Joined).unwrap_err();
        assert!(matches!(err, ClientError::InvalidTransition { .. }));

        // handle() swallows it.
        machine.handle(ConferenceEvent::Joined);
        assert_eq!(machine.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_teardown_local_tracks_unpublishes_when_joined() {
        let engine = LoopbackEngine::new(options());
        let (mut machine, renderer) = machine(Mode::Publisher);
        connect(&mut machine, &engine, "room");
        machine
            .add_local_track("a1".into(), TrackKind::Audio)
            .unwrap();
        machine
            .add_local_track("v1".into(), TrackKind::Video)
            .unwrap();
        machine.dispatch(ConferenceEvent::Joined).unwrap();

        let removed = machine.teardown_local_tracks();
        assert_eq!(removed, vec![TrackId::new("a1"), TrackId::new("v1")]);
        assert_eq!(
            engine.unpublished(),
            vec![TrackId::new("a1"), TrackId::new("v1")]
        );
        assert!(machine.local_tracks().is_empty());
        assert!(machine.registry().is_empty());
        assert_eq!(renderer.element_count(), 0);

        assert!(machine.teardown_local_tracks().is_empty());
    }

    #[test]
    fn test_teardown_before_join_does_not_unpublish() {
        let engine = LoopbackEngine::new(options());
        let (mut machine, _renderer) = machine(Mode::Publisher);
        connect(&mut machine, &engine, "room");
        machine
            .add_local_track("a1".into(), TrackKind::Audio)
            .unwrap();

        assert_eq!(machine.teardown_local_tracks(), vec![TrackId::new("a1")]);
        assert!(engine.unpublished().is_empty());
        assert!(engine.published().is_empty());
    }

    #[test]
    fn test_display_name_stored() {
        let (mut machine, _renderer) = machine(Mode::Viewer);
        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();
        machine
            .dispatch(ConferenceEvent::DisplayNameChanged {
                participant_id: "p1".into(),
                display_name: "Grace".to_string(),
            })
            .unwrap();

        let participant = machine.participants().get(&"p1".into()).unwrap();
        assert_eq!(participant.display_name.as_deref(), Some("Grace"));
    }

    #[test]
    fn test_track_info_never_changes_state() {
        let (mut machine, _renderer) = machine(Mode::Viewer);
        machine
            .dispatch(ConferenceEvent::TrackInfo {
                track_id: "nope".into(),
                event: TrackInfoEvent::MuteChanged { muted: true },
            })
            .unwrap();
        assert!(machine.registry().is_empty());
        assert_eq!(machine.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_transport_closed_drops_conference() {
        let engine = LoopbackEngine::new(options());
        let (mut machine, _renderer) = machine(Mode::Viewer);
        connect(&mut machine, &engine, "room");

        machine.on_transport_closed();
        assert_eq!(machine.state(), SessionState::Disconnected);
        assert!(!machine.has_conference());
    }

    #[test]
    fn test_request_join_without_conference() {
        let (mut machine, _renderer) = machine(Mode::Viewer);
        machine.apply(SessionEvent::ConnectRequested).unwrap();
        machine.apply(SessionEvent::TransportEstablished).unwrap();

        assert!(matches!(
            machine.request_join(),
            Err(ClientError::NoConference)
        ));
        assert_eq!(machine.state(), SessionState::Connected);
    }

    #[test]
    fn test_failing_attach_rolls_back_single_track() {
        let (mut machine, renderer) = machine(Mode::Viewer);
        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();

        renderer.fail_bind(true);
        assert!(machine.dispatch(remote("t1", "video", "p1")).is_err());
        assert!(!machine.registry().contains(&"t1".into()));
        assert!(machine.participants().tracks_of(&"p1".into()).is_empty());

        // The engine may announce the track again once rendering recovers.
        renderer.fail_bind(false);
        machine.dispatch(remote("t1", "video", "p1")).unwrap();
        assert!(machine.binder().has_surface(&"t1".into()));
    }

    #[test]
    fn test_failing_buffered_track_does_not_drop_the_rest() {
        let (mut machine, renderer) = machine(Mode::Viewer);
        machine.dispatch(remote("t1", "video", "p1")).unwrap();
        machine.dispatch(remote("t2", "audio", "p1")).unwrap();
        assert_eq!(machine.pending_count(), 2);

        renderer.fail_bind(true);
        machine
            .dispatch(ConferenceEvent::UserJoined("p1".into()))
            .unwrap();
        assert_eq!(machine.pending_count(), 0);
        assert!(machine.participants().contains(&"p1".into()));
        assert!(machine.registry().is_empty());

        renderer.fail_bind(false);
        machine.dispatch(remote("t1", "video", "p1")).unwrap();
        machine.dispatch(remote("t2", "audio", "p1")).unwrap();
        assert_eq!(
            machine.participants().tracks_of(&"p1".into()),
            &[TrackId::new("t1"), TrackId::new("t2")]
        );
        assert_eq!(renderer.element_count(), 2);
    }

    #[test]
    fn test_leave_sent_after_refused_join() {
        let engine = LoopbackEngine::new(options());
        let (mut machine, _renderer) = machine(Mode::Viewer);
        let mut transport = engine.transport();
        machine.apply(SessionEvent::ConnectRequested).unwrap();
        transport.connect().unwrap();
        machine.apply(SessionEvent::TransportEstablished).unwrap();
        machine.set_conference(transport.init_conference("room").unwrap());
        let mut events = machine.conference_mut().unwrap().events();

        machine.leave_conference();
        assert_eq!(events.try_recv(), Some(ConferenceEvent::Left));
        assert_eq!(machine.state(), SessionState::Connected);
    }

    #[test]
    fn test_transport_closed_discards_buffered_tracks() {
        let engine = LoopbackEngine::new(options());
        let (mut machine, renderer) = machine(Mode::Viewer);
        connect(&mut machine, &engine, "room");
        machine.dispatch(remote("t1", "video", "ghost")).unwrap();
        assert_eq!(machine.pending_count(), 1);

        machine.on_transport_closed();
        assert_eq!(machine.pending_count(), 0);

        machine
            .dispatch(ConferenceEvent::UserJoined("ghost".into()))
            .unwrap();
        assert!(machine.registry().is_empty());
        assert_eq!(renderer.element_count(), 0);
    }
}
