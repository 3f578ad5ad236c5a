//! Collaborator boundary for the external scheduling platform (Booksy).
//!
//! The sync engine and conflict resolver depend only on the
//! [`client::ExternalCalendar`] trait and the typed [`error::ClientError`]
//! taxonomy, never on transport details. [`client::BooksyClient`] is the
//! production reqwest implementation; tests substitute their own.

pub mod client;
pub mod consent;
pub mod error;
pub mod types;

pub use client::{BooksyClient, ExternalCalendar};
pub use consent::ConsentService;
pub use error::ClientError;
