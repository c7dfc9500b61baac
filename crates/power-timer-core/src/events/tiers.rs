//! Per-tier slot operations: find, dedup, insert, clear, get.

use heapless::Vec;
use log::{debug, info, warn};

use super::{EventStore, InsertOutcome, first_free};
use crate::records::{EventReason, FutureEvent, Label, PastEvent, ScheduledEvent, Timestamp};
use crate::storage::{Eeprom, MAX_PAST_EVENTS, StoreError, Tier};

fn check_index(tier: Tier, index: usize) -> Result<(), StoreError> {
    if index < tier.capacity() {
        Ok(())
    } else {
        Err(StoreError::IndexOutOfRange { tier, index })
    }
}

impl<E: Eeprom> EventStore<E> {
    // -----------------------------------------------------------------------
    // Scheduled
    // -----------------------------------------------------------------------

    pub fn find_free_scheduled(&self) -> Option<usize> {
        first_free(&self.scheduled)
    }

    /// Slot holding a schedule with the same `(when, duration, label)`.
    pub fn find_duplicate_scheduled(&self, candidate: &ScheduledEvent) -> Option<usize> {
        self.scheduled
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|event| event.same_key(candidate)))
    }

    pub fn is_duplicate_scheduled(&self, candidate: &ScheduledEvent) -> bool {
        self.find_duplicate_scheduled(candidate).is_some()
    }

    /// Add a daily schedule at `when` seconds after local midnight.
    pub fn set_scheduled(
        &mut self,
        when: Timestamp,
        duration: u16,
        label: &str,
    ) -> Result<InsertOutcome, StoreError> {
        info!("set_scheduled({}, {}, {})", when, duration, label);
        self.insert_scheduled(ScheduledEvent::new(when, duration, Label::new(label))?)
    }

    pub fn insert_scheduled(&mut self, event: ScheduledEvent) -> Result<InsertOutcome, StoreError> {
        if let Some(index) = self.find_duplicate_scheduled(&event) {
            debug!("Duplicate scheduled event in slot {}", index);
            return Ok(InsertOutcome::Duplicate(index));
        }

        let Some(index) = self.find_free_scheduled() else {
            warn!(
                "No free space for new scheduled event {:?}",
                event.label.as_str()
            );
            return Err(StoreError::Full(Tier::Scheduled));
        };

        self.store.write_slot(index, Some(&event))?;
        self.scheduled[index] = Some(event);
        Ok(InsertOutcome::Inserted(index))
    }

    pub fn clear_scheduled(&mut self, index: usize) -> Result<(), StoreError> {
        self.store.write_slot::<ScheduledEvent>(index, None)?;
        self.scheduled[index] = None;
        Ok(())
    }

    pub fn get_scheduled(&self, index: usize) -> Result<Option<&ScheduledEvent>, StoreError> {
        check_index(Tier::Scheduled, index)?;
        Ok(self.scheduled[index].as_ref())
    }

    /// Occupied schedule slots with their indices.
    pub fn scheduled_events(&self) -> impl Iterator<Item = (usize, &ScheduledEvent)> {
        self.scheduled
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|event| (index, event)))
    }

    // -----------------------------------------------------------------------
    // Future
    // -----------------------------------------------------------------------

    pub fn find_free_future(&self) -> Option<usize> {
        first_free(&self.future)
    }

    /// Slot holding a pending event with the same `(when, duration, label)`.
    pub fn find_duplicate_future(&self, candidate: &FutureEvent) -> Option<usize> {
        self.future
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|event| event.same_key(candidate)))
    }

    pub fn is_duplicate_future(&self, candidate: &FutureEvent) -> bool {
        self.find_duplicate_future(candidate).is_some()
    }

    /// Add a pending activation at absolute time `when`.
    pub fn set_future(
        &mut self,
        when: Timestamp,
        why: EventReason,
        duration: u16,
        label: &str,
    ) -> Result<InsertOutcome, StoreError> {
        info!("set_future({}, {}, {}, {})", when, why, duration, label);
        self.insert_future(FutureEvent::new(when, why, duration, Label::new(label))?)
    }

    pub fn insert_future(&mut self, event: FutureEvent) -> Result<InsertOutcome, StoreError> {
        if let Some(index) = self.find_duplicate_future(&event) {
            debug!("Duplicate future event in slot {}", index);
            return Ok(InsertOutcome::Duplicate(index));
        }

        let Some(index) = self.find_free_future() else {
            warn!(
                "No free space for new future event {:?}",
                event.label.as_str()
            );
            return Err(StoreError::Full(Tier::Future));
        };

        self.store.write_slot(index, Some(&event))?;
        self.future[index] = Some(event);
        Ok(InsertOutcome::Inserted(index))
    }

    pub fn clear_future(&mut self, index: usize) -> Result<(), StoreError> {
        self.store.write_slot::<FutureEvent>(index, None)?;
        self.future[index] = None;
        Ok(())
    }

    pub fn get_future(&self, index: usize) -> Result<Option<&FutureEvent>, StoreError> {
        check_index(Tier::Future, index)?;
        Ok(self.future[index].as_ref())
    }

    pub fn future_events(&self) -> impl Iterator<Item = (usize, &FutureEvent)> {
        self.future
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|event| (index, event)))
    }

    // -----------------------------------------------------------------------
    // Past
    // -----------------------------------------------------------------------

    pub fn find_free_past(&self) -> Option<usize> {
        first_free(&self.past)
    }

    /// Whether an activation due at `scheduled` has already been logged.
    pub fn is_duplicate_past(
        &self,
        scheduled: Timestamp,
        why: EventReason,
        duration: u16,
        label: &Label,
    ) -> bool {
        self.past
            .iter()
            .flatten()
            .any(|event| event.logs(scheduled, why, duration, label))
    }

    /// Slot that the next history record goes into: the first free slot, or
    /// else the record with the smallest `when` (lowest index on ties).
    fn past_victim(&self) -> usize {
        let mut victim = 0;
        let mut oldest = Timestamp::MAX;
        for (index, slot) in self.past.iter().enumerate() {
            match slot {
                None => return index,
                Some(event) if event.when < oldest => {
                    victim = index;
                    oldest = event.when;
                }
                Some(_) => {}
            }
        }
        victim
    }

    /// Record an activation that happened at `when` without a due time.
    ///
    /// Uses the first free slot; a full history loses its oldest record.
    pub fn set_past(
        &mut self,
        when: Timestamp,
        why: EventReason,
        duration: u16,
        label: &str,
    ) -> Result<usize, StoreError> {
        info!("set_past({}, {}, {}, {})", when, why, duration, label);
        let event = PastEvent::new(when, 0, why, duration, Label::new(label))?;
        let index = self.past_victim();
        self.write_past(index, event)?;
        Ok(index)
    }

    /// Log an activation at `now` of an event that was due at `scheduled`.
    ///
    /// Never deduplicates and never fails for lack of space: the oldest record
    /// is overwritten once the history is full.
    pub fn append_past(
        &mut self,
        now: Timestamp,
        scheduled: Timestamp,
        why: EventReason,
        duration: u16,
        label: &str,
    ) -> Result<usize, StoreError> {
        let event = PastEvent::new(now, scheduled, why, duration, Label::new(label))?;
        self.append_past_event(event)
    }

    pub fn append_past_event(&mut self, event: PastEvent) -> Result<usize, StoreError> {
        let index = self.past_victim();
        if let Some(evicted) = &self.past[index] {
            debug!(
                "Past events full, evicting slot {} ({} at {})",
                index, evicted.label, evicted.when
            );
        }
        self.write_past(index, event)?;
        info!("append_past_event: index {}", index);
        Ok(index)
    }

    fn write_past(&mut self, index: usize, event: PastEvent) -> Result<(), StoreError> {
        self.store.write_slot(index, Some(&event))?;
        self.past[index] = Some(event);
        Ok(())
    }

    pub fn clear_past(&mut self, index: usize) -> Result<(), StoreError> {
        self.store.write_slot::<PastEvent>(index, None)?;
        self.past[index] = None;
        Ok(())
    }

    pub fn get_past(&self, index: usize) -> Result<Option<&PastEvent>, StoreError> {
        check_index(Tier::Past, index)?;
        Ok(self.past[index].as_ref())
    }

    pub fn past_events(&self) -> impl Iterator<Item = (usize, &PastEvent)> {
        self.past
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|event| (index, event)))
    }

    /// Index of the occupied history record with the smallest `when`.
    pub fn oldest_past_index(&self) -> Option<usize> {
        self.past_events()
            .min_by_key(|&(index, event)| (event.when, index))
            .map(|(index, _)| index)
    }

    /// Occupied history indices, oldest first.
    pub fn past_indices_chronological(&self) -> Vec<usize, MAX_PAST_EVENTS> {
        let mut indices: Vec<usize, MAX_PAST_EVENTS> =
            self.past_events().map(|(index, _)| index).collect();
        indices.sort_unstable_by_key(|&index| {
            let when = self.past[index].as_ref().map(|event| event.when);
            (when.unwrap_or(Timestamp::MAX), index)
        });
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_scheduled_dedup_keeps_one_slot() {
        let mut store = wiped_store();
        let first = store.set_scheduled(8 * 3600, 600, "morning").unwrap();
        let second = store.set_scheduled(8 * 3600, 600, "morning").unwrap();

        assert_eq!(first, InsertOutcome::Inserted(0));
        assert_eq!(second, InsertOutcome::Duplicate(0));
        assert_eq!(store.scheduled_count(), 1);

        // A different label is a different schedule
        let third = store.set_scheduled(8 * 3600, 600, "evening").unwrap();
        assert_eq!(third, InsertOutcome::Inserted(1));
    }

    #[test]
    fn test_scheduled_full_is_reported() {
        let mut store = wiped_store();
        for i in 0..8 {
            let _ = store.set_scheduled(i * 60, 10, "slot").unwrap();
        }
        assert_eq!(
            store.set_scheduled(9 * 60, 10, "overflow"),
            Err(StoreError::Full(Tier::Scheduled))
        );
        assert_eq!(store.scheduled_count(), 8);
    }

    #[test]
    fn test_clear_frees_slot_for_reuse() {
        let mut store = wiped_store();
        let _ = store.set_scheduled(60, 10, "a").unwrap();
        let _ = store.set_scheduled(120, 10, "b").unwrap();
        store.clear_scheduled(0).unwrap();

        assert_eq!(store.get_scheduled(0), Ok(None));
        assert_eq!(
            store.set_scheduled(180, 10, "c").unwrap(),
            InsertOutcome::Inserted(0)
        );
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let mut store = wiped_store();
        assert_eq!(
            store.get_future(16),
            Err(StoreError::IndexOutOfRange {
                tier: Tier::Future,
                index: 16
            })
        );
        assert_eq!(
            store.clear_past(32),
            Err(StoreError::IndexOutOfRange {
                tier: Tier::Past,
                index: 32
            })
        );
        assert!(store.clear_scheduled(8).is_err());
    }

    #[test]
    fn test_future_dedup_scans_every_slot() {
        let mut store = wiped_store();
        for i in 0..12 {
            let _ = store
                .set_future(NOW + i, EventReason::WebButton, 10, "fill")
                .unwrap();
        }
        // Slot 11 is past the scheduled capacity
        let again = store
            .set_future(NOW + 11, EventReason::HwButton, 10, "fill")
            .unwrap();
        assert_eq!(again, InsertOutcome::Duplicate(11));
        assert_eq!(store.future_count(), 12);
    }

    #[test]
    fn test_future_full_is_reported() {
        let mut store = wiped_store();
        for i in 0..16 {
            let _ = store
                .set_future(NOW + i, EventReason::WebButton, 10, "fill")
                .unwrap();
        }
        assert_eq!(
            store.set_future(NOW + 100, EventReason::WebButton, 10, "overflow"),
            Err(StoreError::Full(Tier::Future))
        );
    }

    #[test]
    fn test_past_eviction_replaces_oldest() {
        let mut store = wiped_store();
        // Fill out of order so the oldest sits in the middle
        for i in 0..MAX_PAST_EVENTS as i64 {
            let when = if i == 17 { NOW - 10_000 } else { NOW + i };
            store
                .append_past(when, when, EventReason::ScheduledDaily, 60, "log")
                .unwrap();
        }
        assert_eq!(store.past_count(), MAX_PAST_EVENTS);
        assert_eq!(store.oldest_past_index(), Some(17));

        let index = store
            .append_past(NOW + 500, NOW + 500, EventReason::HwButton, 5, "new")
            .unwrap();
        assert_eq!(index, 17);
        assert_eq!(store.past_count(), MAX_PAST_EVENTS);
        assert_eq!(store.get_past(17).unwrap().unwrap().when, NOW + 500);
        assert_eq!(store.oldest_past_index(), Some(0));
    }

    #[test]
    fn test_past_eviction_ties_pick_lowest_index() {
        let mut store = wiped_store();
        for _ in 0..MAX_PAST_EVENTS {
            store
                .append_past(NOW, NOW, EventReason::WebButton, 1, "same")
                .unwrap();
        }
        let index = store
            .append_past(NOW + 1, NOW, EventReason::WebButton, 1, "same")
            .unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn test_past_prefers_free_slot() {
        let mut store = wiped_store();
        for i in 0..3 {
            store
                .append_past(NOW + i, NOW, EventReason::WebButton, 1, "x")
                .unwrap();
        }
        store.clear_past(1).unwrap();
        let index = store
            .set_past(NOW + 10, EventReason::HwButton, 20, "manual")
            .unwrap();
        assert_eq!(index, 1);
        assert_eq!(store.get_past(1).unwrap().unwrap().scheduled, 0);
    }

    #[test]
    fn test_past_chronological_order() {
        let mut store = wiped_store();
        assert_eq!(store.oldest_past_index(), None);
        for when in [NOW + 30, NOW + 10, NOW + 20] {
            store
                .append_past(when, when, EventReason::WebButton, 1, "x")
                .unwrap();
        }
        assert_eq!(store.past_indices_chronological().as_slice(), &[1, 2, 0]);
        assert_eq!(store.oldest_past_index(), Some(1));
    }

    #[test]
    fn test_rejected_clear_leaves_mirror_untouched() {
        let mut store = wiped_store();
        let _ = store.set_scheduled(60, 10, "keep").unwrap();
        assert!(store.clear_scheduled(MAX_PAST_EVENTS).is_err());
        assert_eq!(store.scheduled_count(), 1);
    }
}
