//! Payload hashing for idempotent enqueue.
//!
//! Two enqueue calls with the same entity, operation type, and payload
//! inside the dedupe window must collapse to one queued operation. The
//! hash covers all three so that a genuine payload change produces a new
//! operation.

use sha2::{Digest, Sha256};

use crate::entity::{EntityKind, OpType};
use crate::types::DbId;

/// Hex SHA-256 over `(entity_kind, entity_id, op_type, payload)`.
///
/// `serde_json::Value` orders object keys deterministically, so logically
/// equal payloads hash equally regardless of how they were constructed.
pub fn payload_hash(
    kind: EntityKind,
    entity_id: DbId,
    op: OpType,
    payload: &serde_json::Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(entity_id.to_le_bytes());
    hasher.update(b"|");
    hasher.update(op.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(payload.to_string().as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}
