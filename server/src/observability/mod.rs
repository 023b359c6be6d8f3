//! Observability Module
//!
//! Tracks the categorization runs submitted to this process and logs their
//! progress as status tables.

mod common;
mod run_tracker;

pub use run_tracker::{RunEntry, RunPhase, RunStatus, RunTracker};
