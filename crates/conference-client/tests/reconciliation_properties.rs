//! Reconciliation invariants checked over seeded random event sequences.
//!
//! Each run feeds a viewer-mode `SessionStateMachine` a stream of
//! join/leave/add/remove events and compares it against a plain model after
//! every step.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use conference_client::engine::{ConferenceEvent, RemoteTrackInfo};
use conference_client::model::{Mode, OwnerKey, Ownership, ParticipantId, TrackId};
use conference_client::render::headless::HeadlessRenderer;
use conference_client::render::RenderSurfaceBinder;
use conference_client::session::SessionStateMachine;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};

const PARTICIPANTS: usize = 4;
const TRACKS: usize = 12;
const STEPS: usize = 400;

/// Expected registry contents.
#[derive(Default)]
struct Model {
    joined: BTreeSet<String>,
    registered: BTreeMap<String, String>,
    pending: BTreeMap<String, Vec<String>>,
}

impl Model {
    fn is_known(&self, track: &str) -> bool {
        self.registered.contains_key(track)
            || self.pending.values().any(|tracks| tracks.iter().any(|t| t == track))
    }

    fn apply(&mut self, event: &ConferenceEvent) {
        match event {
            ConferenceEvent::UserJoined(participant) => {
                let participant = participant.as_str().to_string();
                if self.joined.insert(participant.clone()) {
                    for track in self.pending.remove(&participant).unwrap_or_default() {
                        self.registered.insert(track, participant.clone());
                    }
                }
            }
            ConferenceEvent::UserLeft(participant) => {
                let participant = participant.as_str();
                self.pending.remove(participant);
                if self.joined.remove(participant) {
                    self.registered.retain(|_, owner| owner != participant);
                }
            }
            ConferenceEvent::TrackAdded(info) => {
                let track = info.track_id.as_str().to_string();
                let participant = info.participant_id.as_str().to_string();
                if self.is_known(&track) {
                    return;
                }
                if self.joined.contains(&participant) {
                    self.registered.insert(track, participant);
                } else {
                    self.pending.entry(participant).or_default().push(track);
                }
            }
            ConferenceEvent::TrackRemoved {
                track_id,
                participant_id,
            } => {
                let track = track_id.as_str();
                if let Some(tracks) = self.pending.get_mut(participant_id.as_str()) {
                    let before = tracks.len();
                    tracks.retain(|t| t != track);
                    let discarded = tracks.len() != before;
                    if tracks.is_empty() {
                        self.pending.remove(participant_id.as_str());
                    }
                    if discarded {
                        return;
                    }
                }
                self.registered.remove(track);
            }
            _ => {}
        }
    }

    fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

fn viewer() -> (SessionStateMachine, HeadlessRenderer) {
    let renderer = HeadlessRenderer::new();
    let binder = RenderSurfaceBinder::new(Box::new(renderer.clone()));
    (SessionStateMachine::new(Mode::Viewer, binder), renderer)
}

fn random_event(rng: &mut StdRng) -> ConferenceEvent {
    let participant = ParticipantId::new(format!("p{}", rng.gen_range(0..PARTICIPANTS)));
    let track_id = TrackId::new(format!("t{}", rng.gen_range(0..TRACKS)));
    match rng.gen_range(0..10) {
        0 | 1 => ConferenceEvent::UserJoined(participant),
        2 => ConferenceEvent::UserLeft(participant),
        3..=6 => ConferenceEvent::TrackAdded(RemoteTrackInfo {
            track_id,
            kind: if rng.gen_bool(0.5) { "audio" } else { "video" }.to_string(),
            participant_id: participant,
        }),
        _ => ConferenceEvent::TrackRemoved {
            track_id,
            participant_id: participant,
        },
    }
}

fn assert_consistent(machine: &SessionStateMachine, renderer: &HeadlessRenderer, model: &Model) {
    let registry = machine.registry();
    assert_eq!(registry.len(), model.registered.len());
    assert_eq!(registry.count(Ownership::Remote), model.registered.len());
    assert_eq!(machine.pending_count(), model.pending_count());

    // Every registered track has exactly one surface.
    assert_eq!(machine.binder().len(), registry.len());
    assert_eq!(renderer.element_count(), registry.len());

    for (track, owner) in &model.registered {
        let track_id = TrackId::new(track.as_str());
        let registered = registry.lookup(&track_id).expect("track registered");
        assert_eq!(
            registered.owner(),
            &OwnerKey::Participant(ParticipantId::new(owner.as_str()))
        );
        assert_eq!(
            registered.bound_surface(),
            machine.binder().surface_for(&track_id).map(|s| s.surface_id)
        );
        assert!(machine
            .participants()
            .tracks_of(&ParticipantId::new(owner.as_str()))
            .contains(&track_id));
    }

    let joined: BTreeSet<String> = machine
        .participants()
        .iter()
        .map(|p| p.participant_id.as_str().to_string())
        .collect();
    assert_eq!(joined, model.joined);
}

#[test]
fn test_registry_matches_model_over_random_sequences() {
    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (mut machine, renderer) = viewer();
        let mut model = Model::default();

        for _ in 0..STEPS {
            let event = random_event(&mut rng);
            model.apply(&event);
            machine.handle(event);
            assert_consistent(&machine, &renderer, &model);
        }
    }
}

#[test]
fn test_every_created_surface_is_removed_after_all_leave() {
    let mut rng = StdRng::seed_from_u64(7);
    let (mut machine, renderer) = viewer();

    for _ in 0..STEPS {
        machine.handle(random_event(&mut rng));
    }
    for participant in 0..PARTICIPANTS {
        machine.handle(ConferenceEvent::UserLeft(ParticipantId::new(format!(
            "p{participant}"
        ))));
    }

    assert!(machine.registry().is_empty());
    assert!(machine.participants().is_empty());
    assert_eq!(machine.pending_count(), 0);
    assert_eq!(renderer.element_count(), 0);
    assert_eq!(renderer.created_count(), renderer.removed_count());
}

#[test]
fn test_leave_cascades_only_to_departing_participant() {
    let (mut machine, renderer) = viewer();
    for participant in ["alice", "bob"] {
        machine.handle(ConferenceEvent::UserJoined(participant.into()));
        for kind in ["audio", "video"] {
            machine.handle(ConferenceEvent::TrackAdded(RemoteTrackInfo {
                track_id: TrackId::new(format!("{participant}-{kind}")),
                kind: kind.to_string(),
                participant_id: participant.into(),
            }));
        }
    }
    assert_eq!(renderer.element_count(), 4);

    machine.handle(ConferenceEvent::UserLeft("alice".into()));
    // A duplicate leave is a no-op.
    machine.handle(ConferenceEvent::UserLeft("alice".into()));

    let remaining: Vec<_> = machine
        .registry()
        .tracks_of(&OwnerKey::Participant("bob".into()))
        .iter()
        .map(|t| t.id().as_str().to_string())
        .collect();
    assert_eq!(remaining, vec!["bob-audio", "bob-video"]);
    assert!(machine
        .registry()
        .tracks_of(&OwnerKey::Participant("alice".into()))
        .is_empty());
    assert_eq!(renderer.element_count(), 2);
    assert_eq!(machine.registry().len(), 2);
}

#[test]
fn test_detach_is_idempotent() {
    let (mut machine, renderer) = viewer();
    machine.handle(ConferenceEvent::UserJoined("p1".into()));
    machine.handle(ConferenceEvent::TrackAdded(RemoteTrackInfo {
        track_id: "t1".into(),
        kind: "video".to_string(),
        participant_id: "p1".into(),
    }));
    assert_eq!(renderer.element_count(), 1);

    let track_id = TrackId::new("t1");
    assert!(machine.binder_mut().detach(&track_id));
    assert!(!machine.binder_mut().detach(&track_id));
    assert_eq!(renderer.element_count(), 0);
    assert_eq!(renderer.removed_count(), 1);

    // Removing the track afterwards does not touch the renderer again.
    machine.handle(ConferenceEvent::TrackRemoved {
        track_id: track_id.clone(),
        participant_id: "p1".into(),
    });
    assert!(!machine.registry().contains(&track_id));
    assert_eq!(renderer.removed_count(), 1);
}

#[test]
fn test_failing_unbind_still_removes_surface() {
    let (mut machine, renderer) = viewer();
    machine.handle(ConferenceEvent::UserJoined("p1".into()));
    machine.handle(ConferenceEvent::TrackAdded(RemoteTrackInfo {
        track_id: "t1".into(),
        kind: "audio".to_string(),
        participant_id: "p1".into(),
    }));

    renderer.fail_unbind(true);
    machine.handle(ConferenceEvent::UserLeft("p1".into()));

    assert!(machine.binder().is_empty());
    assert_eq!(renderer.element_count(), 0);
    assert!(machine.registry().is_empty());
}
