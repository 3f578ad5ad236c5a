//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Slot lifecycle status.
    SlotStatus {
        Available = 1,
        Held = 2,
        Booked = 3,
        /// Past or manually withdrawn capacity. Slots are never deleted.
        Blocked = 4,
    }
}

define_status_enum! {
    /// Booking lifecycle status.
    BookingStatus {
        Pending = 1,
        Confirmed = 2,
        Cancelled = 3,
    }
}

define_status_enum! {
    /// Sync operation state machine.
    ///
    /// pending -> in_progress -> completed | failed
    /// failed  -> pending (retry) | dead_letter (attempts exhausted)
    OperationStatus {
        Pending = 1,
        InProgress = 2,
        Completed = 3,
        Failed = 4,
        DeadLetter = 5,
    }
}

define_status_enum! {
    /// Alert lifecycle status.
    AlertStatus {
        Active = 1,
        Acknowledged = 2,
        Resolved = 3,
    }
}
