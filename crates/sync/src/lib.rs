//! Reconciliation orchestrator: queue workers, the full/incremental sync
//! engine, conflict handling, hold reaping, and health monitoring.
//!
//! Every long-running loop follows one shape: `tokio::time::interval`
//! ticks inside `tokio::select!` against a `CancellationToken`, so the
//! API binary can shut everything down gracefully.

pub mod config;
pub mod conflict;
pub mod consent;
pub mod engine;
mod executor;
pub mod maintenance;
pub mod monitor;
pub mod reaper;
pub mod worker;

pub use config::SyncConfig;
pub use consent::DbConsentService;
pub use engine::{SyncEngine, SyncReport, WebhookOutcome};
pub use monitor::Monitor;
pub use worker::WorkerPool;

use velora_core::error::CoreError;

pub(crate) fn db_err(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("database error: {err}"))
}

pub(crate) fn json_err(err: serde_json::Error) -> CoreError {
    CoreError::Internal(format!("serialization error: {err}"))
}
