//! Closed enumerations for sync routing.
//!
//! Entity kinds and operation types are a compile-time enumeration, not
//! free strings: adding a kind means adding a variant and fixing every
//! `match`. They serialize to/from the TEXT columns used by `velora-db`
//! via `as_str` / `TryFrom<String>`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority for customer-visible cancellations. Dequeued before all else.
pub const PRIORITY_CANCELLATION: i32 = 10;

/// Priority for booking creates/updates.
pub const PRIORITY_BOOKING: i32 = 5;

/// Priority for routine availability pushes. Default.
pub const PRIORITY_AVAILABILITY: i32 = 0;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident = $text:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Canonical TEXT representation stored in the database.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                match value.as_str() {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(CoreError::Validation(format!(
                        concat!("Unknown ", stringify!($name), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum! {
    /// The kind of entity a sync operation or conflict refers to.
    EntityKind {
        Booking = "booking",
        AvailabilitySlot = "availability_slot",
    }
}

text_enum! {
    /// What a sync operation does to the external side.
    OpType {
        Create = "create",
        Update = "update",
        Cancel = "cancel",
    }
}

text_enum! {
    /// Why a conflict record was opened.
    ConflictType {
        DataMismatch = "data_mismatch",
        AvailabilityMismatch = "availability_mismatch",
        SyncFailure = "sync_failure",
    }
}

text_enum! {
    /// How a conflict was resolved. Resolution is terminal.
    Resolution {
        PlatformWins = "platform_wins",
        ExternalWins = "external_wins",
        Merged = "merged",
    }
}

text_enum! {
    /// Alert severity. Escalates warning -> critical when a condition
    /// persists past the escalation window.
    AlertSeverity {
        Warning = "warning",
        Critical = "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips_through_text() {
        for kind in [EntityKind::Booking, EntityKind::AvailabilitySlot] {
            let text = kind.as_str().to_string();
            assert_eq!(EntityKind::try_from(text).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_entity_kind_is_rejected() {
        let err = EntityKind::try_from("payment".to_string());
        assert!(err.is_err());
    }

    #[test]
    fn op_type_text_matches_wire_format() {
        assert_eq!(OpType::Create.as_str(), "create");
        assert_eq!(OpType::Update.as_str(), "update");
        assert_eq!(OpType::Cancel.as_str(), "cancel");
    }

    #[test]
    fn cancellations_outrank_availability_pushes() {
        assert!(PRIORITY_CANCELLATION > PRIORITY_BOOKING);
        assert!(PRIORITY_BOOKING > PRIORITY_AVAILABILITY);
    }

    #[test]
    fn resolution_parses_from_api_payloads() {
        assert_eq!(
            Resolution::try_from("platform_wins".to_string()).unwrap(),
            Resolution::PlatformWins
        );
        assert_eq!(
            Resolution::try_from("external_wins".to_string()).unwrap(),
            Resolution::ExternalWins
        );
        assert_eq!(Resolution::try_from("merged".to_string()).unwrap(), Resolution::Merged);
    }
}
