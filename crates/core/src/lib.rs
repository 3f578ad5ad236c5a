//! Domain types and pure algorithms for the Velora availability engine.
//!
//! This crate has zero internal dependencies so it can be used by the
//! repository layer, the sync workers, and the API without cycles.

pub mod backoff;
pub mod dedupe;
pub mod entity;
pub mod error;
pub mod health;
pub mod types;
