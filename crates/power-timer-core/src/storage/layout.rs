//! Byte layout of the EEPROM image.
//!
//! The image is a header of five little-endian `u16` fields followed by the
//! scheduled, future and past slot arrays, back to back:
//!
//! | Offset | Size         | Content                         |
//! |--------|--------------|---------------------------------|
//! | 0      | 10           | [`StoreHeader`]                 |
//! | 10     | 8 × 80       | scheduled slots                 |
//! | 650    | 16 × 80      | future slots                    |
//! | 1930   | 32 × 88      | past slots                      |
//!
//! Every slot address is derived from [`StoreLayout`] so reads and writes
//! cannot drift apart.

use core::fmt::{self, Display};

use thiserror_no_std::Error;

use super::{
    MAX_FUTURE_EVENTS, MAX_PAST_EVENTS, MAX_SCHEDULED_EVENTS, STORE_FORMAT_VERSION, StoreError,
    Tier,
};
use crate::records::LABEL_LEN;

/// Number of `u16` fields in the header
pub const HEADER_FIELDS: usize = 5;

/// Size of the header in bytes
pub const HEADER_SIZE: usize = HEADER_FIELDS * core::mem::size_of::<u16>();

/// Total size of the EEPROM image in bytes
pub const STORE_SIZE: usize = StoreLayout::CURRENT.total_size();

/// Header fields, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    FormatVersion,
    ScheduledCapacity,
    FutureCapacity,
    PastCapacity,
    LabelLen,
}

impl HeaderField {
    pub const ALL: [HeaderField; HEADER_FIELDS] = [
        Self::FormatVersion,
        Self::ScheduledCapacity,
        Self::FutureCapacity,
        Self::PastCapacity,
        Self::LabelLen,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::FormatVersion => "format version",
            Self::ScheduledCapacity => "scheduled capacity",
            Self::FutureCapacity => "future capacity",
            Self::PastCapacity => "past capacity",
            Self::LabelLen => "label length",
        }
    }
}

impl Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted header doesn't match the compiled layout.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{field} changed: stored {stored}, expected {expected}")]
pub struct LayoutMismatch {
    pub field: HeaderField,
    pub stored: u16,
    pub expected: u16,
}

/// Format version and capacity constants written at the start of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub format_version: u16,
    pub scheduled_capacity: u16,
    pub future_capacity: u16,
    pub past_capacity: u16,
    pub label_len: u16,
}

impl StoreHeader {
    /// Header describing this build's layout.
    pub const CURRENT: Self = Self {
        format_version: STORE_FORMAT_VERSION,
        scheduled_capacity: MAX_SCHEDULED_EVENTS as u16,
        future_capacity: MAX_FUTURE_EVENTS as u16,
        past_capacity: MAX_PAST_EVENTS as u16,
        label_len: LABEL_LEN as u16,
    };

    pub const fn field(&self, field: HeaderField) -> u16 {
        match field {
            HeaderField::FormatVersion => self.format_version,
            HeaderField::ScheduledCapacity => self.scheduled_capacity,
            HeaderField::FutureCapacity => self.future_capacity,
            HeaderField::PastCapacity => self.past_capacity,
            HeaderField::LabelLen => self.label_len,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        for (i, field) in HeaderField::ALL.into_iter().enumerate() {
            bytes[i * 2..i * 2 + 2].copy_from_slice(&self.field(field).to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let read = |i: usize| u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        Self {
            format_version: read(0),
            scheduled_capacity: read(1),
            future_capacity: read(2),
            past_capacity: read(3),
            label_len: read(4),
        }
    }

    /// Compare against [`StoreHeader::CURRENT`], field by field in storage
    /// order, reporting the first mismatch.
    pub fn validate(&self) -> Result<(), LayoutMismatch> {
        for field in HeaderField::ALL {
            let stored = self.field(field);
            let expected = Self::CURRENT.field(field);
            if stored != expected {
                return Err(LayoutMismatch {
                    field,
                    stored,
                    expected,
                });
            }
        }
        Ok(())
    }
}

/// Bytes occupied by every slot of `tier`
const fn tier_span(tier: Tier) -> usize {
    tier.capacity() * tier.record_size()
}

/// Slot addressing for the EEPROM image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLayout {
    scheduled_base: usize,
    future_base: usize,
    past_base: usize,
    total: usize,
}

impl StoreLayout {
    pub const CURRENT: Self = Self::new();

    const fn new() -> Self {
        let scheduled_base = HEADER_SIZE;
        let future_base = scheduled_base + tier_span(Tier::Scheduled);
        let past_base = future_base + tier_span(Tier::Future);
        let total = past_base + tier_span(Tier::Past);
        Self {
            scheduled_base,
            future_base,
            past_base,
            total,
        }
    }

    /// Address of the first slot of `tier`
    pub const fn tier_base(&self, tier: Tier) -> usize {
        match tier {
            Tier::Scheduled => self.scheduled_base,
            Tier::Future => self.future_base,
            Tier::Past => self.past_base,
        }
    }

    /// Address of slot `index` of `tier`
    pub fn slot_offset(&self, tier: Tier, index: usize) -> Result<usize, StoreError> {
        if index >= tier.capacity() {
            return Err(StoreError::IndexOutOfRange { tier, index });
        }
        Ok(self.tier_base(tier) + index * tier.record_size())
    }

    pub const fn total_size(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        let layout = StoreLayout::CURRENT;
        assert_eq!(layout.tier_base(Tier::Scheduled), 10);
        assert_eq!(layout.tier_base(Tier::Future), 10 + 8 * 80);
        assert_eq!(layout.tier_base(Tier::Past), 10 + 8 * 80 + 16 * 80);
        assert_eq!(STORE_SIZE, 4746);
        assert_eq!(layout.slot_offset(Tier::Past, 31), Ok(4746 - 88));
    }

    #[test]
    fn test_slot_offset_out_of_range() {
        let layout = StoreLayout::CURRENT;
        assert_eq!(
            layout.slot_offset(Tier::Scheduled, 8),
            Err(StoreError::IndexOutOfRange {
                tier: Tier::Scheduled,
                index: 8
            })
        );
    }

    #[test]
    fn test_header_bytes() {
        let bytes = StoreHeader::CURRENT.to_bytes();
        assert_eq!(bytes, [2, 0, 8, 0, 16, 0, 32, 0, 64, 0]);
        assert_eq!(StoreHeader::from_bytes(&bytes), StoreHeader::CURRENT);
    }

    #[test]
    fn test_header_validate_reports_first_mismatch() {
        let mut header = StoreHeader::CURRENT;
        header.past_capacity = 20;
        header.label_len = 32;
        assert_eq!(
            header.validate(),
            Err(LayoutMismatch {
                field: HeaderField::PastCapacity,
                stored: 20,
                expected: 32,
            })
        );
        assert!(StoreHeader::CURRENT.validate().is_ok());
    }
}
