//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Generic pagination parameters (`?limit=&offset=`).
///
/// Values are clamped in the repository layer.
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for list endpoints that default to open items only.
#[derive(Debug, Deserialize)]
pub struct IncludeResolvedParams {
    #[serde(default)]
    pub include_resolved: bool,
}
