//! Study planner - multi-agent study planning sessions
//!
//! A Human, a Planner agent and a Syncer agent share one conversation. A
//! deterministic turn selector picks each speaker; the Planner persists an
//! agreed plan and the Syncer pushes it to the calendar.

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod agents;
pub mod calendar;
pub mod config;
pub mod db;
pub mod llm;
pub mod plan;
pub mod runtime;
pub mod state_machine;
pub mod system_prompt;
pub mod tools;
