//! Scriptable mock conferencing engine.
//!
//! Implements the transport, conference and device seams of
//! `conference_client::engine`, records every call, and lets a test decide
//! when events fire:
//!
//! - connect can fail synchronously, or establish only when the test emits
//!   `Established`
//! - join can be confirmed automatically or left to the test
//! - captures can fail, return scripted tracks, or wait for a release
//!
//! # Example
//!
//! ```rust,ignore
//! use client_test_utils::MockEngine;
//!
//! let engine = MockEngine::builder()
//!     .manual_establish()
//!     .capture_tracks(&[("a1", "audio"), ("v1", "video")])
//!     .build();
//!
//! // spawn the client with engine.parts(renderer), then:
//! engine.emit_transport(TransportEvent::Established);
//! ```

use async_trait::async_trait;
use conference_client::engine::events::{EventChannel, Subscription};
use conference_client::engine::{
    CaptureConstraints, CapturedTrack, ConferenceEvent, ConferenceSession, DeviceEvent,
    DeviceInfo, DeviceKind, MediaDevices, TransportEvent, TransportSession,
};
use conference_client::errors::EngineError;
use conference_client::model::{Track, TrackId};
use conference_client::render::RenderBackend;
use conference_client::supervisor::ClientParts;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// A call made by the client into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Connect,
    Disconnect,
    InitConference(String),
    Join,
    Leave,
    AddTrack(TrackId),
    RemoveTrack(TrackId),
    CreateLocalTracks(CaptureConstraints),
    DisposeTrack(TrackId),
    SetAudioOutput(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<EngineCall>,
    transport_events: EventChannel<TransportEvent>,
    conference_events: EventChannel<ConferenceEvent>,
    device_events: EventChannel<DeviceEvent>,
    scripted_captures: VecDeque<Result<Vec<CapturedTrack>, EngineError>>,
    captures: u64,
    devices: Vec<DeviceInfo>,
    audio_output: Option<String>,
    connected: bool,
}

#[derive(Debug, Clone, Default)]
struct MockOptions {
    connect_error: Option<String>,
    join_error: Option<String>,
    capture_error: Option<String>,
    manual_establish: bool,
    manual_join: bool,
    gate_capture: bool,
    output_change_available: bool,
}

/// Mock engine. Clones share state.
#[derive(Clone)]
pub struct MockEngine {
    options: MockOptions,
    state: Arc<Mutex<MockState>>,
    capture_gate: Arc<Notify>,
}

impl MockEngine {
    /// Create a new MockEngine builder.
    #[must_use]
    pub fn builder() -> MockEngineBuilder {
        MockEngineBuilder::default()
    }

    /// Engine that establishes, joins and captures immediately.
    #[must_use]
    pub fn accepting() -> Self {
        Self::builder().build()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: EngineCall) {
        self.lock().calls.push(call);
    }

    /// Collaborators for `ConnectionSupervisor::spawn`.
    pub fn parts(&self, renderer: Box<dyn RenderBackend>) -> ClientParts {
        ClientParts {
            transport: self.transport(),
            devices: self.devices(),
            renderer,
        }
    }

    #[must_use]
    pub fn transport(&self) -> Box<dyn TransportSession> {
        Box::new(MockTransport {
            engine: self.clone(),
        })
    }

    #[must_use]
    pub fn devices(&self) -> Arc<dyn MediaDevices> {
        Arc::new(MockDevices {
            engine: self.clone(),
        })
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    /// Number of calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Ids passed to `add_track`, in call order.
    #[must_use]
    pub fn published(&self) -> Vec<TrackId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::AddTrack(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids passed to `remove_track`, in call order.
    #[must_use]
    pub fn unpublished(&self) -> Vec<TrackId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::RemoveTrack(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids passed to `dispose_track`, in call order.
    #[must_use]
    pub fn disposed(&self) -> Vec<TrackId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::DisposeTrack(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn emit_transport(&self, event: TransportEvent) {
        self.lock().transport_events.publish(event);
    }

    pub fn emit_conference(&self, event: ConferenceEvent) {
        self.lock().conference_events.publish(event);
    }

    /// Replace the device list and emit a device-list change.
    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        let mut state = self.lock();
        state.devices = devices.clone();
        state
            .device_events
            .publish(DeviceEvent::DeviceListChanged(devices));
    }

    /// Live transport subscriptions.
    #[must_use]
    pub fn transport_subscribers(&self) -> usize {
        self.lock().transport_events.subscriber_count()
    }

    /// Live conference subscriptions.
    #[must_use]
    pub fn conference_subscribers(&self) -> usize {
        self.lock().conference_events.subscriber_count()
    }

    /// Let one gated capture complete.
    pub fn release_capture(&self) {
        self.capture_gate.notify_one();
    }

    #[must_use]
    pub fn audio_output(&self) -> Option<String> {
        self.lock().audio_output.clone()
    }

    fn next_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Vec<CapturedTrack>, EngineError> {
        let mut state = self.lock();
        state.captures += 1;
        if let Some(scripted) = state.scripted_captures.pop_front() {
            return scripted;
        }
        if let Some(reason) = &self.options.capture_error {
            return Err(EngineError::CaptureFailed(reason.clone()));
        }
        let generation = state.captures;
        Ok(constraints
            .devices
            .iter()
            .map(|kind| CapturedTrack {
                track_id: TrackId::new(format!("cap{generation}-{kind}")),
                kind: kind.as_str().to_string(),
                is_local: true,
            })
            .collect())
    }
}

/// Builder for MockEngine configuration.
#[derive(Debug, Default)]
pub struct MockEngineBuilder {
    options: MockOptions,
    scripted_captures: Vec<Result<Vec<CapturedTrack>, EngineError>>,
    audio_outputs: Vec<String>,
}

impl MockEngineBuilder {
    /// `connect` fails synchronously with `reason`.
    #[must_use]
    pub fn fail_connect(mut self, reason: &str) -> Self {
        self.options.connect_error = Some(reason.to_string());
        self
    }

    /// `join` fails with `reason`.
    #[must_use]
    pub fn fail_join(mut self, reason: &str) -> Self {
        self.options.join_error = Some(reason.to_string());
        self
    }

    /// Every unscripted capture fails with `reason`.
    #[must_use]
    pub fn fail_capture(mut self, reason: &str) -> Self {
        self.options.capture_error = Some(reason.to_string());
        self
    }

    /// `connect` succeeds but `Established` is only emitted by the test.
    #[must_use]
    pub fn manual_establish(mut self) -> Self {
        self.options.manual_establish = true;
        self
    }

    /// `join` succeeds but `Joined` is only emitted by the test.
    #[must_use]
    pub fn manual_join(mut self) -> Self {
        self.options.manual_join = true;
        self
    }

    /// Captures wait for [`MockEngine::release_capture`].
    #[must_use]
    pub fn gate_capture(mut self) -> Self {
        self.options.gate_capture = true;
        self
    }

    /// Script the result of the next capture: `(track_id, kind)` pairs.
    #[must_use]
    pub fn capture_tracks(mut self, tracks: &[(&str, &str)]) -> Self {
        self.scripted_captures.push(Ok(tracks
            .iter()
            .map(|(id, kind)| CapturedTrack {
                track_id: TrackId::new(*id),
                kind: (*kind).to_string(),
                is_local: true,
            })
            .collect()));
        self
    }

    /// Report output switching as available with these audio outputs. The
    /// first one is selected.
    #[must_use]
    pub fn audio_outputs(mut self, device_ids: &[&str]) -> Self {
        self.options.output_change_available = true;
        self.audio_outputs = device_ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    /// Build the MockEngine.
    #[must_use]
    pub fn build(self) -> MockEngine {
        let devices = self
            .audio_outputs
            .iter()
            .map(|id| DeviceInfo {
                device_id: id.clone(),
                label: format!("Speaker {id}"),
                kind: DeviceKind::AudioOutput,
            })
            .collect();
        let state = MockState {
            scripted_captures: self.scripted_captures.into(),
            audio_output: self.audio_outputs.first().cloned(),
            devices,
            ..MockState::default()
        };
        MockEngine {
            options: self.options,
            state: Arc::new(Mutex::new(state)),
            capture_gate: Arc::new(Notify::new()),
        }
    }
}

struct MockTransport {
    engine: MockEngine,
}

impl TransportSession for MockTransport {
    fn connect(&mut self) -> Result<(), EngineError> {
        self.engine.record(EngineCall::Connect);
        if let Some(reason) = &self.engine.options.connect_error {
            return Err(EngineError::ConnectFailed(reason.clone()));
        }
        let mut state = self.engine.lock();
        state.connected = true;
        if !self.engine.options.manual_establish {
            state.transport_events.publish(TransportEvent::Established);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), EngineError> {
        self.engine.record(EngineCall::Disconnect);
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
        self.engine
            .record(EngineCall::InitConference(room_id.to_string()));
        Ok(Box::new(MockConference {
            engine: self.engine.clone(),
            session_id: None,
        }))
    }
}

struct MockConference {
    engine: MockEngine,
    session_id: Option<String>,
}

impl ConferenceSession for MockConference {
    fn join(&mut self) -> Result<(), EngineError> {
        self.engine.record(EngineCall::Join);
        if let Some(reason) = &self.engine.options.join_error {
            return Err(EngineError::JoinFailed(reason.clone()));
        }
        self.session_id = Some(uuid::Uuid::new_v4().to_string());
        if !self.engine.options.manual_join {
            self.engine.emit_conference(ConferenceEvent::Joined);
        }
        Ok(())
    }

    fn leave(&mut self) -> Result<(), EngineError> {
        self.engine.record(EngineCall::Leave);
        self.session_id = None;
        self.engine.emit_conference(ConferenceEvent::Left);
        Ok(())
    }

    fn add_track(&mut self, track: &Track) -> Result<(), EngineError> {
        self.engine.record(EngineCall::AddTrack(track.id().clone()));
        Ok(())
    }

    fn remove_track(&mut self, track: &Track) -> Result<(), EngineError> {
        self.engine
            .record(EngineCall::RemoveTrack(track.id().clone()));
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.clone()
    }

    fn events(&mut self) -> Subscription<ConferenceEvent> {
        self.engine.lock().conference_events.subscribe()
    }
}

struct MockDevices {
    engine: MockEngine,
}

#[async_trait]
impl MediaDevices for MockDevices {
    async fn create_local_tracks(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<Vec<CapturedTrack>, EngineError> {
        self.engine
            .record(EngineCall::CreateLocalTracks(constraints.clone()));
        if self.engine.options.gate_capture {
            self.engine.capture_gate.notified().await;
        }
        self.engine.next_capture(&constraints)
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, EngineError> {
        Ok(self.engine.lock().devices.clone())
    }

    fn is_output_change_available(&self) -> bool {
        self.engine.options.output_change_available
    }

    fn audio_output_device(&self) -> Option<String> {
        self.engine.lock().audio_output.clone()
    }

    fn set_audio_output_device(&self, device_id: &str) -> Result<(), EngineError> {
        self.engine
            .record(EngineCall::SetAudioOutput(device_id.to_string()));
        let mut state = self.engine.lock();
        if !state.devices.iter().any(|d| d.device_id == device_id) {
            return Err(EngineError::Rejected(format!("unknown device {device_id}")));
        }
        state.audio_output = Some(device_id.to_string());
        Ok(())
    }

    fn dispose_track(&self, track_id: &TrackId) -> Result<(), EngineError> {
        self.engine.record(EngineCall::DisposeTrack(track_id.clone()));
        Ok(())
    }

    fn events(&self) -> Subscription<DeviceEvent> {
        self.engine.lock().device_events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_client::model::{Facing, TrackKind};

    fn constraints() -> CaptureConstraints {
        CaptureConstraints {
            devices: vec![TrackKind::Audio, TrackKind::Video],
            resolution: 720,
            frame_rate: 30,
            facing: Facing::User,
        }
    }

    #[tokio::test]
    async fn test_scripted_capture_then_default() {
        let engine = MockEngine::builder()
            .capture_tracks(&[("a1", "audio"), ("v1", "video")])
            .build();
        let devices = engine.devices();

        let first = devices.create_local_tracks(constraints()).await.unwrap();
        let ids: Vec<_> = first.iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "v1"]);

        let second = devices.create_local_tracks(constraints()).await.unwrap();
        let ids: Vec<_> = second.iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(ids, vec!["cap2-audio", "cap2-video"]);
    }

    #[tokio::test]
    async fn test_connect_auto_establishes() {
        let engine = MockEngine::accepting();
        let mut transport = engine.transport();
        let mut events = transport.events();

        transport.connect().unwrap();
        assert_eq!(events.recv().await, Some(TransportEvent::Established));
        assert_eq!(engine.calls(), vec![EngineCall::Connect]);
    }

    #[test]
    fn test_fail_connect() {
        let engine = MockEngine::builder().fail_connect("refused").build();
        let err = engine.transport().connect().unwrap_err();
        assert_eq!(err, EngineError::ConnectFailed("refused".to_string()));
    }
}
