//! Hardware-independent core library for the power-timer relay controller
//!
//! This crate holds the persistence and lifecycle logic of the timer: the
//! three event tiers (scheduled, future, past), their fixed-layout EEPROM
//! image, the in-memory mirror kept in sync with it, daily promotion of
//! schedules and selection of the event currently driving the relay.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod config;
pub mod controller;
pub mod convert;
pub mod events;
pub mod records;
pub mod storage;

pub use config::TimerConfig;
pub use controller::{RelayCommand, SharedController, TimerController};
pub use events::{ActiveEvent, EventStore, InsertOutcome, StoreInit};
pub use records::{EventReason, FutureEvent, Label, PastEvent, ScheduledEvent, Timestamp};
pub use storage::{Eeprom, MemoryEeprom, StoreError, Tier};
