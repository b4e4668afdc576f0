//! Change scheduling
//!
//! Turns a stream of "document changed" notifications into pagination
//! passes: at most one per animation frame, at least one after a quiet
//! period, immediately for structural edits.

pub mod clock;
mod scheduler;

pub use scheduler::{ChangeKind, ChangeScheduler, PassReason, PassTicket, SchedulerConfig, SchedulerStats};
