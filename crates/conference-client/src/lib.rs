//! Conference Client Library
//!
//! Joins a real-time audio/video session hosted by an external conferencing
//! engine, in one of two modes:
//!
//! - **publisher** - captures local camera/microphone and publishes the tracks
//! - **viewer** - renders the tracks published by others
//!
//! The core of the library keeps an in-memory model of which tracks exist,
//! who owns them and which rendering surface they are bound to, consistent
//! with the engine's asynchronous, partially ordered event stream.
//!
//! # Architecture
//!
//! ```text
//! ConnectionSupervisor (actor, one per client)
//! ├── TransportSession (engine)
//! ├── ModeController ──────────┐
//! └── SessionStateMachine ◄────┘
//!     ├── ParticipantTable ──► TrackRegistry
//!     ├── TrackRegistry
//!     └── RenderSurfaceBinder ──► RenderBackend
//! ```
//!
//! Engine events arrive on typed subscriptions, flow into the session state
//! machine, which updates the participant table and the registry and asks
//! the binder to attach or detach surfaces. The mode controller issues
//! outbound requests (capture, publish, playback) through the same state
//! machine.
//!
//! # Modules
//!
//! - [`model`] - tracks, ids, kinds, ownership, modes
//! - [`session`] - registry, participant table, session state machine
//! - [`render`] - surface binder and presentation policy
//! - [`mode`] - publisher/viewer split, capture jobs
//! - [`devices`] - audio-output selection
//! - [`supervisor`] - connection supervisor actor and client handle
//! - [`engine`] - contract with the conferencing engine, loopback engine
//! - [`config`] - configuration from environment
//! - [`errors`] - error types and their handling classes
//! - [`observability`] - metrics

pub mod config;
pub mod devices;
pub mod engine;
pub mod errors;
pub mod mode;
pub mod model;
pub mod observability;
pub mod render;
pub mod session;
pub mod supervisor;
