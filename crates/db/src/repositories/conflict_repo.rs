//! Repository for the `conflicts` table.
//!
//! Conflicts are an append-only audit trail. Resolution is terminal: a
//! resolved row is never reopened, and a fresh divergence for the same
//! entity gets a new row.

use sqlx::PgPool;
use velora_core::entity::{EntityKind, Resolution};
use velora_core::error::CoreError;
use velora_core::types::DbId;

use super::db_internal;
use crate::models::conflict::{Conflict, NewConflict};

/// Column list for `conflicts` queries.
const COLUMNS: &str = "\
    id, entity_kind, entity_id, external_ref, conflict_type, local_snapshot, \
    external_snapshot, resolution, resolved_at, resolved_by, detected_at";

/// Maximum page size for conflict listing.
const MAX_LIMIT: i64 = 200;

/// Default page size for conflict listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides conflict recording, lookup, and terminal resolution.
pub struct ConflictRepo;

impl ConflictRepo {
    /// Open a new conflict record.
    pub async fn create(pool: &PgPool, input: &NewConflict) -> Result<Conflict, sqlx::Error> {
        let query = format!(
            "INSERT INTO conflicts \
                 (entity_kind, entity_id, external_ref, conflict_type, \
                  local_snapshot, external_snapshot) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let conflict = sqlx::query_as::<_, Conflict>(&query)
            .bind(input.entity_kind.as_str())
            .bind(input.entity_id)
            .bind(&input.external_ref)
            .bind(input.conflict_type.as_str())
            .bind(&input.local_snapshot)
            .bind(&input.external_snapshot)
            .fetch_one(pool)
            .await?;

        tracing::warn!(
            conflict_id = conflict.id,
            entity_kind = %conflict.entity_kind,
            entity_id = conflict.entity_id,
            conflict_type = %conflict.conflict_type,
            "Conflict recorded"
        );
        Ok(conflict)
    }

    /// Find a conflict by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Conflict>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM conflicts WHERE id = $1");
        sqlx::query_as::<_, Conflict>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The oldest unresolved conflict for an entity, if any. While one
    /// exists, the queue will not dispatch operations for the entity.
    pub async fn find_open_for_entity(
        pool: &PgPool,
        kind: EntityKind,
        entity_id: DbId,
    ) -> Result<Option<Conflict>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM conflicts \
             WHERE entity_kind = $1 AND entity_id = $2 AND resolution IS NULL \
             ORDER BY detected_at ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Conflict>(&query)
            .bind(kind.as_str())
            .bind(entity_id)
            .fetch_optional(pool)
            .await
    }

    /// List conflicts, optionally filtered to unresolved ones.
    pub async fn list(
        pool: &PgPool,
        only_open: bool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conflict>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0).max(0);

        let where_clause = if only_open { "WHERE resolution IS NULL" } else { "" };
        let query = format!(
            "SELECT {COLUMNS} FROM conflicts \
             {where_clause} \
             ORDER BY detected_at DESC \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, Conflict>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Unresolved conflict count (monitoring).
    pub async fn count_open(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM conflicts WHERE resolution IS NULL")
            .fetch_one(pool)
            .await
    }

    /// Record the resolution of a conflict. Fails if the conflict does not
    /// exist or was already resolved; resolution is terminal and cannot
    /// be overwritten.
    pub async fn resolve(
        pool: &PgPool,
        id: DbId,
        resolution: Resolution,
        actor: &str,
    ) -> Result<Conflict, CoreError> {
        let query = format!(
            "UPDATE conflicts \
             SET resolution = $2, resolved_at = NOW(), resolved_by = $3 \
             WHERE id = $1 AND resolution IS NULL \
             RETURNING {COLUMNS}"
        );
        let resolved = sqlx::query_as::<_, Conflict>(&query)
            .bind(id)
            .bind(resolution.as_str())
            .bind(actor)
            .fetch_optional(pool)
            .await
            .map_err(db_internal)?;

        match resolved {
            Some(conflict) => {
                tracing::info!(
                    conflict_id = id,
                    resolution = %resolution,
                    actor,
                    "Conflict resolved"
                );
                Ok(conflict)
            }
            None => {
                let exists: Option<(DbId,)> =
                    sqlx::query_as("SELECT id FROM conflicts WHERE id = $1")
                        .bind(id)
                        .fetch_optional(pool)
                        .await
                        .map_err(db_internal)?;
                if exists.is_some() {
                    Err(CoreError::Validation(format!("Conflict {id} is already resolved")))
                } else {
                    Err(CoreError::NotFound { entity: "Conflict", id })
                }
            }
        }
    }
}
