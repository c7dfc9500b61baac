pub mod eeprom;
pub mod layout;
pub mod persistent;

pub use eeprom::*;
pub use layout::*;
pub use persistent::*;

use core::fmt::{self, Display};

use thiserror_no_std::Error;

use crate::records::{FutureEvent, PastEvent, ScheduledEvent, SlotRecord};

/// Version of the EEPROM image. Bump whenever a record layout changes.
pub const STORE_FORMAT_VERSION: u16 = 2;

/// Number of recurring schedule slots
pub const MAX_SCHEDULED_EVENTS: usize = 8;

/// Number of pending activation slots
pub const MAX_FUTURE_EVENTS: usize = 16;

/// Number of history slots
pub const MAX_PAST_EVENTS: usize = 32;

/// One of the three fixed-capacity record arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Recurring daily schedules
    Scheduled,
    /// Pending activations
    Future,
    /// Completed activations
    Past,
}

impl Tier {
    /// Tiers in the order they are laid out on storage.
    pub const ALL: [Tier; 3] = [Self::Scheduled, Self::Future, Self::Past];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Future => "future",
            Self::Past => "past",
        }
    }

    /// Number of slots in this tier
    pub const fn capacity(self) -> usize {
        match self {
            Self::Scheduled => MAX_SCHEDULED_EVENTS,
            Self::Future => MAX_FUTURE_EVENTS,
            Self::Past => MAX_PAST_EVENTS,
        }
    }

    /// Size of one slot of this tier in bytes
    pub const fn record_size(self) -> usize {
        match self {
            Self::Scheduled => ScheduledEvent::SIZE,
            Self::Future => FutureEvent::SIZE,
            Self::Past => PastEvent::SIZE,
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("no free slot in the {0} tier")]
    Full(Tier),
    #[error("slot {index} is out of range for the {tier} tier")]
    IndexOutOfRange { tier: Tier, index: usize },
    #[error("invalid record: {0}")]
    InvalidRecord(&'static str),
    #[error("storage medium access failed")]
    Medium,
    #[error("storage medium holds {actual} bytes, layout needs {required}")]
    MediumTooSmall { required: usize, actual: usize },
}
