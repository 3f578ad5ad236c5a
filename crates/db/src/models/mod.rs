//! Row structs (`FromRow`) and Create/Update DTOs for every table.

pub mod booking;
pub mod conflict;
pub mod consent;
pub mod hold;
pub mod monitoring;
pub mod slot;
pub mod status;
pub mod sync_operation;
