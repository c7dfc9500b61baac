//! Desktop simulator for the power-timer relay controller.
//!
//! Runs the power-timer core against an EEPROM image kept in a file, on a
//! simulated clock that advances one second per tick. Relay transitions are
//! printed as they happen, and the store is dumped at the end of the run.
//!
//! # Usage
//!
//! ```text
//! power-timer-simulator [--image PATH] [--config PATH] [--hours N] [--save-config PATH]
//! ```
//!
//! | Option          | Default               | Meaning                              |
//! |-----------------|-----------------------|--------------------------------------|
//! | `--image`       | `power-timer.eeprom`  | EEPROM image file                    |
//! | `--config`      | none (defaults)       | postcard-encoded `TimerConfig`       |
//! | `--hours`       | 26                    | simulated run length                 |
//! | `--save-config` | none                  | write the active config and continue |
//!
//! `RUST_LOG` controls log verbosity.

mod file_eeprom;

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info};
use thiserror_no_std::Error;

use power_timer_core::config::ConfigError;
use power_timer_core::convert::format_timestamp;
use power_timer_core::storage::STORE_SIZE;
use power_timer_core::{
    EventReason, RelayCommand, StoreError, StoreInit, Timestamp, TimerConfig, TimerController,
};

use crate::file_eeprom::FileEeprom;

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const DEFAULT_IMAGE: &str = "power-timer.eeprom";

const DEFAULT_HOURS: i64 = 26;

/// Simulated seconds per tick.
const TICK_SECS: Timestamp = 1;

/// When the simulated hardware button is pressed, relative to the start.
const BUTTON_PRESS_AFTER_SECS: Timestamp = 90;

/// Schedules written into a blank store: (offset after midnight, seconds, label).
const DEMO_SCHEDULES: [(Timestamp, u16, &str); 2] = [
    (7 * 3600, 15 * 60, "morning coffee"),
    (18 * 3600 + 30 * 60, 3600, "evening lights"),
];

// ---------------------------------------------------------------------------
// Errors and options
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
enum SimError {
    #[error("bad arguments: {0}")]
    Usage(String),
    #[error("file error on {0}")]
    Io(String),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("dump failed")]
    Dump,
}

struct Options {
    image: PathBuf,
    config: Option<PathBuf>,
    save_config: Option<PathBuf>,
    hours: i64,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, SimError> {
        let mut options = Self {
            image: PathBuf::from(DEFAULT_IMAGE),
            config: None,
            save_config: None,
            hours: DEFAULT_HOURS,
        };

        while let Some(flag) = args.next() {
            let value = args
                .next()
                .ok_or_else(|| SimError::Usage(format!("{} needs a value", flag)))?;
            match flag.as_str() {
                "--image" => options.image = PathBuf::from(value),
                "--config" => options.config = Some(PathBuf::from(value)),
                "--save-config" => options.save_config = Some(PathBuf::from(value)),
                "--hours" => {
                    options.hours = value
                        .parse::<i64>()
                        .ok()
                        .filter(|hours| *hours > 0)
                        .ok_or_else(|| SimError::Usage(format!("invalid hours {:?}", value)))?;
                }
                _ => return Err(SimError::Usage(format!("unknown option {}", flag))),
            }
        }

        Ok(options)
    }
}

fn load_config(options: &Options) -> Result<TimerConfig, SimError> {
    let config = match &options.config {
        Some(path) => {
            let bytes = fs::read(path).map_err(|_| SimError::Io(path.display().to_string()))?;
            TimerConfig::from_bytes(&bytes)?
        }
        None => TimerConfig::default(),
    };

    if let Some(path) = &options.save_config {
        fs::write(path, config.to_vec()?).map_err(|_| SimError::Io(path.display().to_string()))?;
        info!("Saved config to {}", path.display());
    }

    info!("Using {:?}", config);
    Ok(config)
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

fn run(options: Options) -> Result<(), SimError> {
    let config = load_config(&options)?;
    let offset = config.utc_offset_secs;

    let medium = FileEeprom::open(&options.image, STORE_SIZE)
        .map_err(|_| SimError::Io(options.image.display().to_string()))?;
    info!("EEPROM image at {}", medium.path().display());
    let mut controller = TimerController::new(medium, config)?;

    let start = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or_default();

    if let StoreInit::Wiped(mismatch) = controller.start(start)? {
        info!("Started from a blank store ({})", mismatch);
    }

    if controller.store().scheduled_count() == 0 {
        for (when, duration, label) in DEMO_SCHEDULES {
            let _ = controller.store_mut().set_scheduled(when, duration, label)?;
        }
    }

    // Button handlers and the tick loop share the controller on hardware
    let shared = controller.into_shared();
    let end = start + options.hours * 3600;
    let mut relay = RelayCommand::Off;
    let mut now = start;

    println!(
        "Simulating {} until {}",
        format_timestamp(start, offset),
        format_timestamp(end, offset)
    );

    while now < end {
        if now == start + BUTTON_PRESS_AFTER_SECS {
            let _ = shared.lock(|controller| {
                controller
                    .borrow_mut()
                    .trigger(now, EventReason::HwButton, 45, "button")
            })?;
        }

        let command = shared.lock(|controller| controller.borrow_mut().tick(now))?;
        if command != relay {
            match command {
                RelayCommand::On { until } => println!(
                    "{}  relay ON until {}",
                    format_timestamp(now, offset),
                    format_timestamp(until, offset)
                ),
                RelayCommand::Off => println!("{}  relay OFF", format_timestamp(now, offset)),
            }
            relay = command;
        }

        now += TICK_SECS;
    }

    let mut dump = String::new();
    shared
        .lock(|controller| controller.borrow_mut().store_mut().dump(&mut dump))
        .map_err(|e| {
            error!("Dump failed: {}", e);
            SimError::Dump
        })?;
    println!("\n{}", dump);
    Ok(())
}

fn main() {
    env_logger::init();

    let options = match Options::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(options) {
        error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}
