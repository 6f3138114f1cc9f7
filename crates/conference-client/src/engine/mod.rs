//! Contract with the external conferencing engine.
//!
//! The engine owns signaling, negotiation and media transport. The client sees
//! it through three seams:
//!
//! - [`TransportSession`] - the connection to the engine (`connect`, events
//!   `established`/`failed`/`disconnected`)
//! - [`ConferenceSession`] - one room (`join`, `leave`, `add_track`,
//!   `remove_track`, room events)
//! - [`MediaDevices`] - local capture and device enumeration
//!
//! Requests are fire-and-forget; their outcome arrives later as an event on
//! the matching [`events::Subscription`].
//!
//! # Modules
//!
//! - [`events`] - typed event channel with cancellable subscriptions
//! - [`loopback`] - in-process engine used by the binary and unit tests

pub mod events;
pub mod loopback;

use crate::errors::EngineError;
use crate::model::{Facing, ParticipantId, Track, TrackId, TrackKind};
use async_trait::async_trait;
use events::Subscription;
use serde::Serialize;

/// Engine connection options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Host domain of the engine deployment.
    pub domain: String,
    /// Multi-user-chat domain rooms live under.
    pub muc_domain: String,
    /// Signaling endpoint.
    pub service_url: String,
    /// Ask the engine not to compute audio levels.
    pub disable_audio_levels: bool,
}

/// Transport session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Established,
    Failed { reason: String },
    Disconnected,
}

/// A remote track as reported by the engine. `kind` is unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrackInfo {
    pub track_id: TrackId,
    pub kind: String,
    pub participant_id: ParticipantId,
}

/// Informational per-track notifications. Logged, never state-changing.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackInfoEvent {
    AudioLevelChanged(f32),
    MuteChanged { muted: bool },
    LocalStopped,
    AudioOutputChanged { device_id: String },
}

/// Conference (room) events.
#[derive(Debug, Clone, PartialEq)]
pub enum ConferenceEvent {
    Joined,
    Left,
    TrackAdded(RemoteTrackInfo),
    TrackRemoved {
        track_id: TrackId,
        participant_id: ParticipantId,
    },
    UserJoined(ParticipantId),
    UserLeft(ParticipantId),
    DisplayNameChanged {
        participant_id: ParticipantId,
        display_name: String,
    },
    TrackInfo {
        track_id: TrackId,
        event: TrackInfoEvent,
    },
}

/// Kind of a media device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

/// One enumerated media device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

/// Device backend events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    DeviceListChanged(Vec<DeviceInfo>),
}

/// Constraints for a local capture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Device kinds to capture, in request order.
    pub devices: Vec<TrackKind>,
    /// Requested capture height in pixels.
    pub resolution: u32,
    /// Requested frame rate.
    pub frame_rate: u32,
    /// Camera facing direction.
    pub facing: Facing,
}

/// A track produced by a capture request. `kind` is unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedTrack {
    pub track_id: TrackId,
    pub kind: String,
    pub is_local: bool,
}

/// A conference (room) on the engine.
pub trait ConferenceSession: Send {
    /// Request to join the room. Confirmation arrives as [`ConferenceEvent::Joined`].
    fn join(&mut self) -> Result<(), EngineError>;

    /// Request to leave the room.
    fn leave(&mut self) -> Result<(), EngineError>;

    /// Publish a local track to the room.
    fn add_track(&mut self, track: &Track) -> Result<(), EngineError>;

    /// Stop publishing a local track.
    fn remove_track(&mut self, track: &Track) -> Result<(), EngineError>;

    /// Engine-side id of this session, if assigned yet.
    fn session_id(&self) -> Option<String>;

    /// Subscribe to room events.
    fn events(&mut self) -> Subscription<ConferenceEvent>;
}

/// The transport session with the engine.
pub trait TransportSession: Send {
    /// Request a connection. Outcome arrives as a [`TransportEvent`].
    fn connect(&mut self) -> Result<(), EngineError>;

    /// Tear the connection down.
    fn disconnect(&mut self) -> Result<(), EngineError>;

    /// Subscribe to transport events.
    fn events(&mut self) -> Subscription<TransportEvent>;

    /// Create the conference handle for `room_id` on an established transport.
    fn init_conference(&mut self, room_id: &str)
        -> Result<Box<dyn ConferenceSession>, EngineError>;
}

/// Local media devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Capture local tracks. May take arbitrarily long (permission prompts).
    async fn create_local_tracks(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<Vec<CapturedTrack>, EngineError>;

    /// List available devices.
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, EngineError>;

    /// Whether the audio output device can be switched.
    fn is_output_change_available(&self) -> bool;

    /// Currently selected audio output device.
    fn audio_output_device(&self) -> Option<String>;

    /// Switch the audio output device.
    fn set_audio_output_device(&self, device_id: &str) -> Result<(), EngineError>;

    /// Release a captured track.
    fn dispose_track(&self, track_id: &TrackId) -> Result<(), EngineError>;

    /// Subscribe to device-list changes.
    fn events(&self) -> Subscription<DeviceEvent>;
}
