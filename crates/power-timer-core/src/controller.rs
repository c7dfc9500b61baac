//! Relay control loop on top of the event store

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{info, warn};

use crate::config::TimerConfig;
use crate::convert::local_day;
use crate::events::{EventStore, InsertOutcome, StoreInit};
use crate::records::{EventReason, Timestamp};
use crate::storage::{Eeprom, StoreError};

/// What the relay output should be after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    /// Energise the relay until the given time.
    On { until: Timestamp },
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Running,
}

pub struct TimerController<E: Eeprom> {
    store: EventStore<E>,
    state: ControllerState,
    /// Local day of the last promotion
    promoted_day: Option<Timestamp>,
    relay_until: Option<Timestamp>,
}

/// The controller shared between the tick loop and button/web handlers.
pub type SharedController<E> = Mutex<CriticalSectionRawMutex, RefCell<TimerController<E>>>;

impl<E: Eeprom> TimerController<E> {
    pub fn new(medium: E, config: TimerConfig) -> Result<Self, StoreError> {
        Ok(Self {
            store: EventStore::new(medium, config)?,
            state: ControllerState::Uninitialized,
            promoted_day: None,
            relay_until: None,
        })
    }

    pub fn into_shared(self) -> SharedController<E> {
        Mutex::new(RefCell::new(self))
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn store(&self) -> &EventStore<E> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EventStore<E> {
        &mut self.store
    }

    pub fn into_medium(self) -> E {
        self.store.into_medium()
    }

    /// Bring the store up and record the restart in the history.
    pub fn start(&mut self, now: Timestamp) -> Result<StoreInit, StoreError> {
        let init = self.store.initialize_store()?;
        if let StoreInit::Wiped(mismatch) = &init {
            warn!("Event store wiped on start: {}", mismatch);
        }

        self.store.set_past(now, EventReason::Reboot, 0, "reboot")?;
        self.state = ControllerState::Running;
        self.promoted_day = None;
        self.relay_until = None;
        Ok(init)
    }

    /// Advance the controller to `now` and return the relay state.
    ///
    /// Promotes schedules on the first tick of each local day, expires stale
    /// future events, then activates whatever is due. An activation while the
    /// relay is already on extends the window if it ends later.
    pub fn tick(&mut self, now: Timestamp) -> Result<RelayCommand, StoreError> {
        if self.state != ControllerState::Running {
            warn!("tick before start, relay stays off");
            return Ok(RelayCommand::Off);
        }

        // A promotion cut short by a full future tier is retried once a slot frees up
        let today = local_day(now, self.store.config().utc_offset_secs);
        if self.promoted_day != Some(today)
            && self.store.find_free_future().is_some()
            && self.store.promote_schedules(now)?.complete
        {
            self.promoted_day = Some(today);
        }

        self.store.expire_future(now)?;

        if let Some(active) = self.store.take_active(now)? {
            let until = now.saturating_add(Timestamp::from(active.event.duration));
            if self.relay_until.is_none_or(|current| until > current) {
                info!("Relay on until {} for {}", until, active.event.label);
                self.relay_until = Some(until);
            }
        }

        Ok(self.relay(now))
    }

    /// Relay state at `now` without advancing anything.
    pub fn relay(&mut self, now: Timestamp) -> RelayCommand {
        match self.relay_until {
            Some(until) if now < until => RelayCommand::On { until },
            Some(_) => {
                info!("Relay off");
                self.relay_until = None;
                RelayCommand::Off
            }
            None => RelayCommand::Off,
        }
    }

    /// Queue an activation due immediately, as from a hardware or web button.
    /// It takes effect on the next tick.
    pub fn trigger(
        &mut self,
        now: Timestamp,
        why: EventReason,
        duration: u16,
        label: &str,
    ) -> Result<InsertOutcome, StoreError> {
        self.store.set_future(now, why, duration, label)
    }
}
