use std::sync::Arc;

use velora_sync::{SyncConfig, SyncEngine};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: velora_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Sync tuning knobs shared with the background loops (hold TTL,
    /// health thresholds).
    pub sync_config: SyncConfig,
    /// Sync engine used by the manual-sync, booking, and webhook endpoints.
    pub engine: Arc<SyncEngine>,
}
