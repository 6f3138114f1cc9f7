//! # Client Test Utilities
//!
//! Shared test utilities for the conference client.
//!
//! This crate provides a scriptable engine mock and fixtures for driving
//! the client without a real conferencing engine.
//!
//! ## Modules
//!
//! - `mock_engine` - Mock transport, conference and device backend
//! - `fixtures` - Configs and participant event builders
//! - `wait` - Polling helpers for actor state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use client_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let engine = MockEngine::builder().manual_join().build();
//!     let renderer = HeadlessRenderer::new();
//!     let client = ConnectionSupervisor::spawn(
//!         &test_config("viewer", "room"),
//!         engine.parts(Box::new(renderer.clone())),
//!         CancellationToken::new(),
//!     );
//!
//!     wait_for(&client.handle, |s| s.state == SessionState::Joining).await;
//! }
//! ```

pub mod fixtures;
pub mod mock_engine;
pub mod wait;

pub use fixtures::{test_config, TestParticipant};
pub use mock_engine::{EngineCall, MockEngine, MockEngineBuilder};
pub use wait::{drain_notifications, eventually, settle, wait_for, wait_for_notification};
