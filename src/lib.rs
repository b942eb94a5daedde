//! autopm library crate
//!
//! An autonomous project-management dashboard: a task board, a read-only
//! project tree, a terminal-style event log and an AI "thinking" feed that
//! re-syncs on a timer.

pub mod ai;
pub mod api;
pub mod cli;
pub mod models;
pub mod seed;
pub mod sync;

pub use ai::{PlanBatch, PlanClient};
pub use models::{Context, Core};
pub use sync::{PlanSync, SyncConfig, SyncHandle, SyncOutcome};
