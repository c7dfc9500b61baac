//! In-memory mirror of the three event tiers and the lifecycle engine.
//!
//! [`EventStore`] owns the [`PersistentStore`] and a fixed-size array of
//! slots per tier. The mirror is the authoritative working set: reads never
//! touch the medium, and every mutation is written and committed to the
//! medium before the mirror slot changes. A failed write or commit restages
//! the slot's previous bytes, so both sides stay as they were.

mod dump;
mod lifecycle;
mod tiers;

pub use dump::DumpError;
pub use lifecycle::ActiveEvent;

use log::info;

use crate::config::TimerConfig;
use crate::records::{FutureEvent, PastEvent, ScheduledEvent};
use crate::storage::{
    Eeprom, HeaderCheck, LayoutMismatch, MAX_FUTURE_EVENTS, MAX_PAST_EVENTS, MAX_SCHEDULED_EVENTS,
    PersistentStore, StoreError,
};

/// Result of an insertion that did not fail.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written to this slot.
    Inserted(usize),
    /// An identical record already occupies this slot; nothing changed.
    Duplicate(usize),
}

impl InsertOutcome {
    pub const fn index(self) -> usize {
        match self {
            Self::Inserted(index) | Self::Duplicate(index) => index,
        }
    }

    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// How [`EventStore::initialize_store`] brought the mirror up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreInit {
    /// Header matched; every slot was loaded from the medium.
    Loaded,
    /// Header didn't match; the image was wiped and all tiers start empty.
    Wiped(LayoutMismatch),
}

/// The event tiers, mirrored in RAM and written through to EEPROM.
pub struct EventStore<E: Eeprom> {
    store: PersistentStore<E>,
    config: TimerConfig,
    scheduled: [Option<ScheduledEvent>; MAX_SCHEDULED_EVENTS],
    future: [Option<FutureEvent>; MAX_FUTURE_EVENTS],
    past: [Option<PastEvent>; MAX_PAST_EVENTS],
}

impl<E: Eeprom> EventStore<E> {
    /// Create a store over `medium` with an empty mirror.
    ///
    /// Nothing is read from the medium until [`EventStore::initialize_store`].
    pub fn new(medium: E, config: TimerConfig) -> Result<Self, StoreError> {
        Ok(Self {
            store: PersistentStore::new(medium)?,
            config,
            scheduled: [const { None }; MAX_SCHEDULED_EVENTS],
            future: [const { None }; MAX_FUTURE_EVENTS],
            past: [const { None }; MAX_PAST_EVENTS],
        })
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn persistent(&self) -> &PersistentStore<E> {
        &self.store
    }

    pub fn into_medium(self) -> E {
        self.store.into_medium()
    }

    /// Load the mirror from the medium, wiping the medium first if its header
    /// doesn't match this build.
    pub fn initialize_store(&mut self) -> Result<StoreInit, StoreError> {
        self.clear_mirror();

        match self.store.load()? {
            HeaderCheck::Valid(_) => {
                for index in 0..MAX_SCHEDULED_EVENTS {
                    self.scheduled[index] = self.store.read_slot(index)?;
                }
                for index in 0..MAX_FUTURE_EVENTS {
                    self.future[index] = self.store.read_slot(index)?;
                }
                for index in 0..MAX_PAST_EVENTS {
                    self.past[index] = self.store.read_slot(index)?;
                }
                info!(
                    "Loaded {} scheduled, {} future and {} past events",
                    self.scheduled_count(),
                    self.future_count(),
                    self.past_count()
                );
                Ok(StoreInit::Loaded)
            }
            HeaderCheck::Mismatch(mismatch) => {
                self.wipe()?;
                Ok(StoreInit::Wiped(mismatch))
            }
        }
    }

    /// Reset the medium to an empty image and empty the mirror.
    pub fn wipe(&mut self) -> Result<(), StoreError> {
        self.store.wipe()?;
        self.clear_mirror();
        Ok(())
    }

    fn clear_mirror(&mut self) {
        self.scheduled.iter_mut().for_each(|slot| *slot = None);
        self.future.iter_mut().for_each(|slot| *slot = None);
        self.past.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.iter().flatten().count()
    }

    pub fn future_count(&self) -> usize {
        self.future.iter().flatten().count()
    }

    pub fn past_count(&self) -> usize {
        self.past.iter().flatten().count()
    }
}

/// Index of the first empty slot.
fn first_free<T>(slots: &[Option<T>]) -> Option<usize> {
    slots.iter().position(Option::is_none)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::storage::{MemoryEeprom, STORE_SIZE};

    // 2023-11-14 22:13:20 UTC
    pub const NOW: crate::Timestamp = 1_700_000_000;
    // 2023-11-14 00:00:00 UTC
    pub const MIDNIGHT: crate::Timestamp = 1_699_920_000;

    /// Freshly wiped store over a RAM medium, UTC local time.
    pub fn wiped_store() -> EventStore<MemoryEeprom> {
        let mut store =
            EventStore::new(MemoryEeprom::new(STORE_SIZE), TimerConfig::default()).unwrap();
        store.initialize_store().unwrap();
        store
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::records::{EventReason, Label};
    use crate::storage::{HeaderField, MemoryEeprom, STORE_SIZE, StagedEeprom, StoreHeader};

    fn wiped_image() -> alloc::vec::Vec<u8> {
        wiped_store().into_medium().into_bytes()
    }

    #[test]
    fn test_version_mismatch_forces_single_wipe() {
        // Image written by an older build: version 1, same capacities, junk slots
        let mut image = alloc::vec![0x11u8; STORE_SIZE];
        image[..10].copy_from_slice(&[1, 0, 8, 0, 16, 0, 32, 0, 64, 0]);

        let mut store =
            EventStore::new(MemoryEeprom::with_contents(image), TimerConfig::default()).unwrap();
        let init = store.initialize_store().unwrap();

        assert_eq!(
            init,
            StoreInit::Wiped(LayoutMismatch {
                field: HeaderField::FormatVersion,
                stored: 1,
                expected: 2,
            })
        );
        assert_eq!(store.persistent().medium().commits(), 1);
        assert_eq!(store.scheduled_count(), 0);
        assert_eq!(store.future_count(), 0);
        assert_eq!(store.past_count(), 0);
    }

    #[test]
    fn test_capacity_mismatch_forces_wipe() {
        // Image from a build with room for 20 history records
        let mut image = alloc::vec![0x22u8; STORE_SIZE];
        image[..10].copy_from_slice(&[2, 0, 8, 0, 16, 0, 20, 0, 64, 0]);

        let mut store =
            EventStore::new(MemoryEeprom::with_contents(image), TimerConfig::default()).unwrap();
        let init = store.initialize_store().unwrap();

        assert_eq!(
            init,
            StoreInit::Wiped(LayoutMismatch {
                field: HeaderField::PastCapacity,
                stored: 20,
                expected: 32,
            })
        );
        assert_eq!(store.persistent().medium().commits(), 1);
        assert_eq!(store.scheduled_count(), 0);
        assert_eq!(store.future_count(), 0);
        assert_eq!(store.past_count(), 0);
    }

    #[test]
    fn test_failed_commit_is_not_persisted_later() {
        let mut medium = StagedEeprom::with_contents(wiped_image());
        medium.fail_commits(1);
        let mut store = EventStore::new(medium, TimerConfig::default()).unwrap();
        assert_eq!(store.initialize_store().unwrap(), StoreInit::Loaded);

        let rejected = store.set_future(NOW + 60, EventReason::WebButton, 30, "lost");
        assert_eq!(rejected, Err(StoreError::Medium));
        assert_eq!(store.future_count(), 0);

        store
            .append_past(NOW, NOW, EventReason::HwButton, 10, "kept")
            .unwrap();

        let durable = store.persistent().medium().durable();
        let mut reloaded = EventStore::new(durable, TimerConfig::default()).unwrap();
        assert_eq!(reloaded.initialize_store().unwrap(), StoreInit::Loaded);
        assert_eq!(reloaded.future_count(), 0);
        assert_eq!(reloaded.past_count(), 1);
    }

    #[test]
    fn test_corrupt_slots_load_as_empty() {
        let mut image = wiped_image();
        // Past slot 0 at the far end of the timeline
        image[1930..1938].copy_from_slice(&i64::MAX.to_le_bytes());
        image[1946..1950].copy_from_slice(&4u32.to_le_bytes());
        image[1950..1952].copy_from_slice(&30u16.to_le_bytes());
        image[1952] = b'x';
        // Scheduled slot 1 past the end of the day
        image[90..98].copy_from_slice(&90_000i64.to_le_bytes());
        image[98..100].copy_from_slice(&10u16.to_le_bytes());

        let config = TimerConfig {
            utc_offset_secs: 3600,
            ..TimerConfig::default()
        };
        let mut store = EventStore::new(MemoryEeprom::with_contents(image), config).unwrap();
        assert_eq!(store.initialize_store().unwrap(), StoreInit::Loaded);
        assert_eq!(store.scheduled_count(), 0);
        assert_eq!(store.past_count(), 1);
        assert_eq!(store.get_past(0).unwrap().unwrap().when, i64::MAX);

        assert_eq!(store.promote_daily(NOW).unwrap(), 0);
        let mut out = alloc::string::String::new();
        store.dump(&mut out).unwrap();
        let far_end = "  [ 0] @1930 eeprom: 9999-12-31 23:59:59 web_button";
        assert!(out.contains(far_end));
        assert!(out.contains("  [ 1] @  90\n"));
    }

    #[test]
    fn test_fresh_medium_is_wiped() {
        // An all-zero medium has format version 0
        let store = wiped_store();
        let bytes = store.persistent().medium().as_bytes();
        assert_eq!(&bytes[..10], &StoreHeader::CURRENT.to_bytes());
    }

    #[test]
    fn test_load_after_wipe_is_empty() {
        let mut store = wiped_store();
        store.wipe().unwrap();
        let medium = store.into_medium();

        let mut reloaded = EventStore::new(medium, TimerConfig::default()).unwrap();
        assert_eq!(reloaded.initialize_store().unwrap(), StoreInit::Loaded);
        assert_eq!(reloaded.scheduled_count(), 0);
        assert_eq!(reloaded.future_count(), 0);
        assert_eq!(reloaded.past_count(), 0);
    }

    #[test]
    fn test_reload_restores_every_tier() {
        let mut store = wiped_store();
        let _ = store.set_scheduled(8 * 3600, 600, "morning").unwrap();
        let _ = store
            .set_future(NOW + 60, EventReason::WebButton, 30, "kettle")
            .unwrap();
        store
            .append_past(NOW, NOW - 5, EventReason::HwButton, 45, "porch")
            .unwrap();

        let mut reloaded =
            EventStore::new(store.into_medium(), TimerConfig::default()).unwrap();
        assert_eq!(reloaded.initialize_store().unwrap(), StoreInit::Loaded);

        let scheduled = reloaded.get_scheduled(0).unwrap().unwrap();
        assert_eq!(scheduled.when, 8 * 3600);
        assert_eq!(scheduled.label, Label::new("morning"));

        let future = reloaded.get_future(0).unwrap().unwrap();
        assert_eq!(future.why, EventReason::WebButton);

        let past = reloaded.get_past(0).unwrap().unwrap();
        assert_eq!((past.when, past.scheduled), (NOW, NOW - 5));
    }

    #[test]
    fn test_rejects_small_medium() {
        let result = EventStore::new(MemoryEeprom::new(100), TimerConfig::default());
        assert!(matches!(
            result,
            Err(StoreError::MediumTooSmall { actual: 100, .. })
        ));
    }
}
