//! Daily promotion, active-event selection and garbage collection.

use log::{debug, info, warn};

use super::{EventStore, InsertOutcome};
use crate::convert::midnight_in_days;
use crate::records::{EventReason, FutureEvent, PastEvent, Timestamp};
use crate::storage::{Eeprom, MAX_FUTURE_EVENTS, MAX_SCHEDULED_EVENTS, StoreError};

/// The future event that should currently drive the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEvent {
    /// Future slot holding the event
    pub index: usize,
    pub event: FutureEvent,
}

/// Result of one promotion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Promotion {
    pub promoted: usize,
    /// False when the pass stopped on a full future tier
    pub complete: bool,
}

impl<E: Eeprom> EventStore<E> {
    /// Copy today's occurrence of every schedule into the future tier.
    ///
    /// A schedule whose time today lies more than the sync window in the past
    /// is skipped. Meant to run at the start of each day; repeated calls only
    /// hit future-tier dedup. Returns how many events were added.
    pub fn promote_daily(&mut self, now: Timestamp) -> Result<usize, StoreError> {
        Ok(self.promote_schedules(now)?.promoted)
    }

    /// [`promote_daily`](Self::promote_daily), also reporting whether every
    /// eligible schedule made it into the future tier.
    pub(crate) fn promote_schedules(&mut self, now: Timestamp) -> Result<Promotion, StoreError> {
        let midnight = midnight_in_days(now, 0, self.config.utc_offset_secs);
        let mut promoted = 0;
        let mut complete = true;

        for index in 0..MAX_SCHEDULED_EVENTS {
            let Some(schedule) = &self.scheduled[index] else {
                continue;
            };
            let event_time = midnight.saturating_add(schedule.when);
            if event_time.saturating_add(self.config.sync_window()) < now {
                continue;
            }

            let event = FutureEvent::new(
                event_time,
                EventReason::ScheduledDaily,
                schedule.duration,
                schedule.label.clone(),
            )?;
            match self.insert_future(event) {
                Ok(InsertOutcome::Inserted(_)) => promoted += 1,
                Ok(InsertOutcome::Duplicate(_)) => {}
                Err(StoreError::Full(tier)) => {
                    warn!("Stopping promotion at schedule {}: {} tier full", index, tier);
                    complete = false;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if promoted > 0 {
            info!("Promoted {} scheduled events for today", promoted);
        }
        Ok(Promotion { promoted, complete })
    }

    /// Find the first due future event that hasn't been logged yet.
    ///
    /// Due events that are already logged in the past tier are skipped, and
    /// cleared once they are `delete_delay` seconds overdue. The delay keeps a
    /// freshly promoted daily event from flickering against the stale copy it
    /// replaces.
    pub fn select_active(&mut self, now: Timestamp) -> Result<Option<ActiveEvent>, StoreError> {
        let delete_delay = self.config.delete_delay();

        for index in 0..MAX_FUTURE_EVENTS {
            let Some(event) = &self.future[index] else {
                continue;
            };
            if event.duration == 0 || event.when > now {
                continue;
            }

            if !self.is_duplicate_past(event.when, event.why, event.duration, &event.label) {
                return Ok(Some(ActiveEvent {
                    index,
                    event: event.clone(),
                }));
            }

            if event.when.saturating_add(delete_delay) <= now {
                debug!("Clearing actioned future event in slot {}", index);
                self.clear_future(index)?;
            }
        }

        Ok(None)
    }

    /// Select the active event and log it to the past tier in one step.
    ///
    /// The past record (`when = now`, `scheduled` = the event's due time) is
    /// what stops the same event from being returned again.
    pub fn take_active(&mut self, now: Timestamp) -> Result<Option<ActiveEvent>, StoreError> {
        let Some(active) = self.select_active(now)? else {
            return Ok(None);
        };

        let event = &active.event;
        info!(
            "Activating {} ({}) for {}s, due at {}",
            event.label, event.why, event.duration, event.when
        );
        self.append_past_event(PastEvent::new(
            now,
            event.when,
            event.why,
            event.duration,
            event.label.clone(),
        )?)?;

        Ok(Some(active))
    }

    /// Clear every future event at least `delete_delay` seconds overdue,
    /// whether or not it was ever activated. Returns how many were cleared.
    pub fn expire_future(&mut self, now: Timestamp) -> Result<usize, StoreError> {
        let delete_delay = self.config.delete_delay();
        let mut cleared = 0;

        for index in 0..MAX_FUTURE_EVENTS {
            let expired = self.future[index]
                .as_ref()
                .is_some_and(|event| event.when.saturating_add(delete_delay) <= now);
            if expired {
                self.clear_future(index)?;
                cleared += 1;
            }
        }

        if cleared > 0 {
            info!("Expired {} future events", cleared);
        }
        Ok(cleared)
    }
}
