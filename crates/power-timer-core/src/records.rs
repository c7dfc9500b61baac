//! Record types for the three event tiers.
//!
//! Each record has a fixed binary image that mirrors the natural C layout of
//! the controller's EEPROM structs (little-endian, fields aligned to their
//! size, label buffer of `LABEL_LEN + 1` bytes with a NUL terminator). The
//! image is load-bearing: changing it requires bumping
//! [`STORE_FORMAT_VERSION`](crate::storage::STORE_FORMAT_VERSION).
//!
//! A slot whose sentinel field is zero is an empty slot. Constructors reject
//! values that would persist a zero sentinel so a stored record can never be
//! mistaken for free space.

use core::fmt::{self, Display};
use core::str::FromStr;

use heapless::String;
use log::warn;

use crate::storage::{StoreError, Tier};

/// Maximum label length in bytes (excluding the terminator).
pub const LABEL_LEN: usize = 64;

/// Size of the on-storage label buffer.
pub const LABEL_BUF_LEN: usize = LABEL_LEN + 1;

/// Seconds since the Unix epoch, or seconds since local midnight for
/// scheduled offsets.
pub type Timestamp = i64;

/// Seconds in a civil day.
pub const SECS_PER_DAY: Timestamp = 86_400;

/// Why an activation happened (or is going to happen).
///
/// Stored as a 32-bit code; unknown codes decode as [`EventReason::Unknown`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventReason {
    #[default]
    Unknown = 0,
    Reboot = 1,
    UnrecordedEvents = 2,
    HwButton = 3,
    WebButton = 4,
    ScheduledDaily = 5,
    ScheduledOnce = 6,
}

/// Bounded label text.
///
/// Text longer than [`LABEL_LEN`] bytes is truncated at the last character
/// boundary that fits, and the truncation is logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Label(String<LABEL_LEN>);

impl Label {
    pub fn new(text: &str) -> Self {
        let mut end = text.len().min(LABEL_LEN);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end < text.len() {
            warn!(
                "Label truncated from {} to {} bytes: {:?}",
                text.len(),
                end,
                &text[..end]
            );
        }
        Self(String::from_str(&text[..end]).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Write the NUL-padded label into a `LABEL_BUF_LEN` byte buffer.
    fn encode(&self, buf: &mut [u8]) {
        let raw = self.0.as_bytes();
        buf[..LABEL_BUF_LEN].fill(0);
        buf[..raw.len()].copy_from_slice(raw);
    }

    /// Read a label back from its buffer, stopping at the first NUL.
    ///
    /// Bytes that are not valid UTF-8 end the label at the last valid
    /// character.
    fn decode(buf: &[u8]) -> Self {
        let raw = &buf[..LABEL_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(LABEL_LEN);
        let text = match core::str::from_utf8(&raw[..end]) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
        };
        Self::new(text)
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Label {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

// ---------------------------------------------------------------------------
// Slot encoding
// ---------------------------------------------------------------------------

/// A record that occupies one fixed-size slot of a tier.
pub trait SlotRecord: Sized {
    /// Tier the record lives in.
    const TIER: Tier;
    /// Size of one slot in bytes.
    const SIZE: usize;

    /// Encode into `buf[..Self::SIZE]`. Padding bytes are written as zero.
    fn encode(&self, buf: &mut [u8]);

    /// Decode `buf[..Self::SIZE]`, returning `None` for an empty slot.
    fn decode(buf: &[u8]) -> Option<Self>;
}

fn put_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn get_i64(buf: &[u8], offset: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(raw)
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn get_u16(buf: &[u8], offset: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(raw)
}

/// Keep a decoded record only if its constructor accepts it; a corrupt slot
/// reads as empty.
fn accept<R: SlotRecord>(record: Result<R, StoreError>) -> Option<R> {
    match record {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Ignoring corrupt {} slot: {}", R::TIER, e);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduled
// ---------------------------------------------------------------------------

/// A recurring daily activation.
///
/// Binary format (80 bytes, little-endian):
/// - when: 8 bytes (i64) at 0, seconds after local midnight
/// - duration: 2 bytes (u16) at 8, zero marks an empty slot
/// - label: 65 bytes at 10
/// - padding: 5 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub when: Timestamp,
    pub duration: u16,
    pub label: Label,
}

impl ScheduledEvent {
    pub fn new(when: Timestamp, duration: u16, label: Label) -> Result<Self, StoreError> {
        if duration == 0 {
            return Err(StoreError::InvalidRecord("scheduled duration must be non-zero"));
        }
        if !(0..SECS_PER_DAY).contains(&when) {
            return Err(StoreError::InvalidRecord(
                "scheduled offset must fall within one day",
            ));
        }
        Ok(Self {
            when,
            duration,
            label,
        })
    }

    /// Whether `(when, duration, label)` match.
    pub fn same_key(&self, other: &Self) -> bool {
        self.when == other.when && self.duration == other.duration && self.label == other.label
    }
}

impl SlotRecord for ScheduledEvent {
    const TIER: Tier = Tier::Scheduled;
    const SIZE: usize = 80;

    fn encode(&self, buf: &mut [u8]) {
        buf[..Self::SIZE].fill(0);
        put_i64(buf, 0, self.when);
        put_u16(buf, 8, self.duration);
        self.label.encode(&mut buf[10..]);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        let duration = get_u16(buf, 8);
        if duration == 0 {
            return None;
        }
        let label = Label::decode(&buf[10..]);
        accept(Self::new(get_i64(buf, 0), duration, label))
    }
}

// ---------------------------------------------------------------------------
// Future
// ---------------------------------------------------------------------------

/// A pending activation.
///
/// Binary format (80 bytes, little-endian):
/// - when: 8 bytes (i64) at 0, zero marks an empty slot
/// - why: 4 bytes (u32) at 8
/// - duration: 2 bytes (u16) at 12
/// - label: 65 bytes at 14
/// - padding: 1 byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FutureEvent {
    pub when: Timestamp,
    pub why: EventReason,
    pub duration: u16,
    pub label: Label,
}

impl FutureEvent {
    pub fn new(
        when: Timestamp,
        why: EventReason,
        duration: u16,
        label: Label,
    ) -> Result<Self, StoreError> {
        if when == 0 {
            return Err(StoreError::InvalidRecord("future event time must be non-zero"));
        }
        if duration == 0 {
            return Err(StoreError::InvalidRecord("future duration must be non-zero"));
        }
        Ok(Self {
            when,
            why,
            duration,
            label,
        })
    }

    /// Whether `(when, duration, label)` match. The reason is not part of the key.
    pub fn same_key(&self, other: &Self) -> bool {
        self.when == other.when && self.duration == other.duration && self.label == other.label
    }
}

impl SlotRecord for FutureEvent {
    const TIER: Tier = Tier::Future;
    const SIZE: usize = 80;

    fn encode(&self, buf: &mut [u8]) {
        buf[..Self::SIZE].fill(0);
        put_i64(buf, 0, self.when);
        put_u32(buf, 8, self.why as u32);
        put_u16(buf, 12, self.duration);
        self.label.encode(&mut buf[14..]);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        let when = get_i64(buf, 0);
        if when == 0 {
            return None;
        }
        let why = EventReason::from(get_u32(buf, 8));
        let label = Label::decode(&buf[14..]);
        accept(Self::new(when, why, get_u16(buf, 12), label))
    }
}

// ---------------------------------------------------------------------------
// Past
// ---------------------------------------------------------------------------

/// A completed activation.
///
/// Binary format (88 bytes, little-endian):
/// - when: 8 bytes (i64) at 0, actual activation time, zero marks an empty slot
/// - scheduled: 8 bytes (i64) at 8, time the activation was due
/// - why: 4 bytes (u32) at 16
/// - duration: 2 bytes (u16) at 20
/// - label: 65 bytes at 22
/// - padding: 1 byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PastEvent {
    pub when: Timestamp,
    pub scheduled: Timestamp,
    pub why: EventReason,
    pub duration: u16,
    pub label: Label,
}

impl PastEvent {
    pub fn new(
        when: Timestamp,
        scheduled: Timestamp,
        why: EventReason,
        duration: u16,
        label: Label,
    ) -> Result<Self, StoreError> {
        if when == 0 {
            return Err(StoreError::InvalidRecord("past event time must be non-zero"));
        }
        Ok(Self {
            when,
            scheduled,
            why,
            duration,
            label,
        })
    }

    /// Whether this record logs the activation that was due at `scheduled`
    /// with the given reason, duration and label.
    pub fn logs(
        &self,
        scheduled: Timestamp,
        why: EventReason,
        duration: u16,
        label: &Label,
    ) -> bool {
        self.scheduled == scheduled
            && self.why == why
            && self.duration == duration
            && &self.label == label
    }
}

impl SlotRecord for PastEvent {
    const TIER: Tier = Tier::Past;
    const SIZE: usize = 88;

    fn encode(&self, buf: &mut [u8]) {
        buf[..Self::SIZE].fill(0);
        put_i64(buf, 0, self.when);
        put_i64(buf, 8, self.scheduled);
        put_u32(buf, 16, self.why as u32);
        put_u16(buf, 20, self.duration);
        self.label.encode(&mut buf[22..]);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        let when = get_i64(buf, 0);
        if when == 0 {
            return None;
        }
        let scheduled = get_i64(buf, 8);
        let why = EventReason::from(get_u32(buf, 16));
        let label = Label::decode(&buf[22..]);
        accept(Self::new(when, scheduled, why, get_u16(buf, 20), label))
    }
}
