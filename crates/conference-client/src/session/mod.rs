//! Reconciliation core: the track registry, the participant table and the
//! session state machine that feeds engine events into both.
//!
//! Nothing in here decides presentation; surfaces are created and destroyed
//! through [`crate::render::RenderSurfaceBinder`].

pub mod machine;
pub mod participants;
pub mod registry;
pub mod state;

pub use machine::SessionStateMachine;
pub use participants::{Participant, ParticipantTable};
pub use registry::TrackRegistry;
pub use state::{SessionEvent, SessionState};
