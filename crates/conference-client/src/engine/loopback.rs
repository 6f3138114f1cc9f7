//! In-process loopback engine.
//!
//! Answers every request immediately with the matching event: `connect`
//! establishes, `join` confirms, `leave` leaves. Captures succeed with fresh
//! track ids. Remote participants only exist when simulated through
//! [`LoopbackEngine::simulate_participant`]. Used by the binary when no real
//! engine is wired in, and by unit tests.

use super::events::{EventChannel, Subscription};
use super::{
    CaptureConstraints, CapturedTrack, ConferenceEvent, ConferenceSession, DeviceEvent,
    DeviceInfo, DeviceKind, EngineOptions, MediaDevices, RemoteTrackInfo, TransportEvent,
    TransportSession,
};
use crate::errors::EngineError;
use crate::model::{ParticipantId, Track, TrackId, TrackKind};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct LoopbackState {
    connected: bool,
    room_id: Option<String>,
    session_id: Option<String>,
    transport_events: EventChannel<TransportEvent>,
    conference_events: EventChannel<ConferenceEvent>,
    device_events: EventChannel<DeviceEvent>,
    published: Vec<TrackId>,
    unpublished: Vec<TrackId>,
    disposed: HashSet<TrackId>,
    captures: u64,
    devices: Vec<DeviceInfo>,
    audio_output: Option<String>,
}

/// Shared loopback engine. Cheap to clone.
#[derive(Clone)]
pub struct LoopbackEngine {
    options: EngineOptions,
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackEngine {
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        let state = LoopbackState {
            devices: vec![
                DeviceInfo {
                    device_id: "default-mic".to_string(),
                    label: "Default microphone".to_string(),
                    kind: DeviceKind::AudioInput,
                },
                DeviceInfo {
                    device_id: "default-camera".to_string(),
                    label: "Default camera".to_string(),
                    kind: DeviceKind::VideoInput,
                },
                DeviceInfo {
                    device_id: "default-speaker".to_string(),
                    label: "Default speaker".to_string(),
                    kind: DeviceKind::AudioOutput,
                },
            ],
            audio_output: Some("default-speaker".to_string()),
            ..LoopbackState::default()
        };
        Self {
            options,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Transport handle for the supervisor.
    #[must_use]
    pub fn transport(&self) -> Box<dyn TransportSession> {
        Box::new(LoopbackTransport {
            engine: self.clone(),
        })
    }

    /// Device backend for the supervisor.
    #[must_use]
    pub fn devices(&self) -> Arc<dyn MediaDevices> {
        Arc::new(LoopbackDevices {
            engine: self.clone(),
        })
    }

    /// Emit a join for `participant_id` followed by one track per kind.
    pub fn simulate_participant(&self, participant_id: &ParticipantId, kinds: &[TrackKind]) {
        let mut state = self.lock();
        state
            .conference_events
            .publish(ConferenceEvent::UserJoined(participant_id.clone()));
        for kind in kinds {
            let info = RemoteTrackInfo {
                track_id: TrackId::new(format!("{participant_id}-{kind}")),
                kind: kind.as_str().to_string(),
                participant_id: participant_id.clone(),
            };
            state
                .conference_events
                .publish(ConferenceEvent::TrackAdded(info));
        }
    }

    /// Emit a leave for `participant_id`.
    pub fn simulate_participant_left(&self, participant_id: &ParticipantId) {
        self.lock()
            .conference_events
            .publish(ConferenceEvent::UserLeft(participant_id.clone()));
    }

    /// Replace the device list and notify listeners.
    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        let mut state = self.lock();
        state.devices = devices.clone();
        state
            .device_events
            .publish(DeviceEvent::DeviceListChanged(devices));
    }

    /// Tracks published through `add_track`, in call order.
    #[must_use]
    pub fn published(&self) -> Vec<TrackId> {
        self.lock().published.clone()
    }

    /// Tracks withdrawn through `remove_track`, in call order.
    #[must_use]
    pub fn unpublished(&self) -> Vec<TrackId> {
        self.lock().unpublished.clone()
    }

    #[must_use]
    pub fn is_disposed(&self, track_id: &TrackId) -> bool {
        self.lock().disposed.contains(track_id)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    #[must_use]
    pub fn room_id(&self) -> Option<String> {
        self.lock().room_id.clone()
    }
}

struct LoopbackTransport {
    engine: LoopbackEngine,
}

impl TransportSession for LoopbackTransport {
    fn connect(&mut self) -> Result<(), EngineError> {
        let mut state = self.engine.lock();
        state.connected = true;
        debug!(
            target: "client.engine.loopback",
            service_url = %self.engine.options.service_url,
            "Loopback transport connected"
        );
        state.transport_events.publish(TransportEvent::Established);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), EngineError> {
        let mut state = self.engine.lock();
        if !state.connected {
            return Err(EngineError::Rejected("not connected".to_string()));
        }
        state.connected = false;
        state.transport_events.publish(TransportEvent::Disconnected);
        Ok(())
    }

    fn events(&mut self) -> Subscription<TransportEvent> {
        self.engine.lock().transport_events.subscribe()
    }

    fn init_conference(
        &mut self,
        room_id: &str,
    ) -> Result<Box<dyn ConferenceSession>, EngineError> {
        let mut state = self.engine.lock();
        if !state.connected {
            return Err(EngineError::JoinFailed("transport not established".to_string()));
        }
        state.room_id = Some(room_id.to_string());
        Ok(Box::new(LoopbackConference {
            engine: self.engine.clone(),
        }))
    }
}

struct LoopbackConference {
    engine: LoopbackEngine,
}

impl ConferenceSession for LoopbackConference {
    fn join(&mut self) -> Result<(), EngineError> {
        let mut state = self.engine.lock();
        state.session_id = Some(uuid::Uuid::new_v4().to_string());
        state.conference_events.publish(ConferenceEvent::Joined);
        Ok(())
    }

    fn leave(&mut self) -> Result<(), EngineError> {
        let mut state = self.engine.lock();
        state.session_id = None;
        state.conference_events.publish(ConferenceEvent::Left);
        Ok(())
    }

    fn add_track(&mut self, track: &Track) -> Result<(), EngineError> {
        self.engine.lock().published.push(track.id().clone());
        Ok(())
    }

    fn remove_track(&mut self, track: &Track) -> Result<(), EngineError> {
        self.engine.lock().unpublished.push(track.id().clone());
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.engine.lock().session_id.clone()
    }

    fn events(&mut self) -> Subscription<ConferenceEvent> {
        self.engine.lock().conference_events.subscribe()
    }
}

struct LoopbackDevices {
    engine: LoopbackEngine,
}

#[async_trait]
impl MediaDevices for LoopbackDevices {
    async fn create_local_tracks(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<Vec<CapturedTrack>, EngineError> {
        let mut state = self.engine.lock();
        state.captures += 1;
        let generation = state.captures;
        Ok(constraints
            .devices
            .iter()
            .map(|kind| CapturedTrack {
                track_id: TrackId::new(format!(
                    "local-{kind}-{}-{generation}",
                    constraints.facing.as_str()
                )),
                kind: kind.as_str().to_string(),
                is_local: true,
            })
            .collect())
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, EngineError> {
        Ok(self.engine.lock().devices.clone())
    }

    fn is_output_change_available(&self) -> bool {
        true
    }

    fn audio_output_device(&self) -> Option<String> {
        self.engine.lock().audio_output.clone()
    }

    fn set_audio_output_device(&self, device_id: &str) -> Result<(), EngineError> {
        let mut state = self.engine.lock();
        let known = state
            .devices
            .iter()
            .any(|d| d.kind == DeviceKind::AudioOutput && d.device_id == device_id);
        if !known {
            return Err(EngineError::Rejected(format!(
                "unknown audio output device {device_id}"
            )));
        }
        state.audio_output = Some(device_id.to_string());
        Ok(())
    }

    fn dispose_track(&self, track_id: &TrackId) -> Result<(), EngineError> {
        if self.engine.lock().disposed.insert(track_id.clone()) {
            Ok(())
        } else {
            Err(EngineError::Disposed(track_id.to_string()))
        }
    }

    fn events(&self) -> Subscription<DeviceEvent> {
        self.engine.lock().device_events.subscribe()
    }
}
