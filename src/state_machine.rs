//! Core session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `transition()` maps (phase, event) to a new phase plus effects, and the
//! runtime executes the effects.

mod effect;
pub mod event;
pub mod selector;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, NotificationKind};
pub use event::Event;
pub use selector::{FallbackStrategy, Selection, SelectionRule, TurnSelector};
pub use state::{
    Message, MessageKind, ParticipantId, SessionContext, SessionPhase, TerminationReason,
    ToolKind, ToolStatus,
};
pub use transition::{transition, TransitionError, TransitionResult};
