//! Runtime tuning for the lifecycle engine.
//!
//! The config travels as a postcard blob (a small flash region or a file on
//! the simulator host); a missing blob means [`TimerConfig::default`].

use alloc::vec::Vec;

use log::error;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Default tolerance, in seconds, for promoting a schedule whose time today
/// has already passed.
pub const EVENT_SYNC_WINDOW_SECS: u32 = 60;

/// Default grace period, in seconds, before a due future event may be
/// garbage-collected.
pub const EVENT_DELETE_DELAY_SECS: u32 = 120;

/// Largest UTC offset accepted (±18 hours).
pub const MAX_UTC_OFFSET_SECS: i32 = 18 * 3600;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub sync_window_secs: u32,
    pub delete_delay_secs: u32,
    /// Local time offset east of UTC
    pub utc_offset_secs: i32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            sync_window_secs: EVENT_SYNC_WINDOW_SECS,
            delete_delay_secs: EVENT_DELETE_DELAY_SECS,
            utc_offset_secs: 0,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config blob could not be decoded")]
    Decode,
    #[error("config could not be encoded")]
    Encode,
    #[error("UTC offset {0}s is outside ±18h")]
    UtcOffsetOutOfRange(i32),
    #[error("delete delay must be non-zero")]
    ZeroDeleteDelay,
}

impl TimerConfig {
    /// Decode a postcard blob and validate it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|e| {
            error!("Config decode failed: {}", e);
            ConfigError::Decode
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|e| {
            error!("Config encode failed: {}", e);
            ConfigError::Encode
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let offsets = -MAX_UTC_OFFSET_SECS..=MAX_UTC_OFFSET_SECS;
        if !offsets.contains(&self.utc_offset_secs) {
            return Err(ConfigError::UtcOffsetOutOfRange(self.utc_offset_secs));
        }
        if self.delete_delay_secs == 0 {
            return Err(ConfigError::ZeroDeleteDelay);
        }
        Ok(())
    }

    pub(crate) fn sync_window(&self) -> i64 {
        i64::from(self.sync_window_secs)
    }

    pub(crate) fn delete_delay(&self) -> i64 {
        i64::from(self.delete_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_blob_round_trip() {
        let config = TimerConfig {
            sync_window_secs: 90,
            delete_delay_secs: 300,
            utc_offset_secs: -5 * 3600,
        };
        let bytes = config.to_vec().unwrap();
        assert_eq!(TimerConfig::from_bytes(&bytes), Ok(config));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let bytes = TimerConfig {
            utc_offset_secs: 19 * 3600,
            ..TimerConfig::default()
        }
        .to_vec()
        .unwrap();
        assert_eq!(
            TimerConfig::from_bytes(&bytes),
            Err(ConfigError::UtcOffsetOutOfRange(19 * 3600))
        );

        let bytes = TimerConfig {
            delete_delay_secs: 0,
            ..TimerConfig::default()
        }
        .to_vec()
        .unwrap();
        let decoded = TimerConfig::from_bytes(&bytes);
        assert_eq!(decoded, Err(ConfigError::ZeroDeleteDelay));
    }

    #[test]
    fn test_config_rejects_truncated_blob() {
        assert_eq!(TimerConfig::from_bytes(&[]), Err(ConfigError::Decode));
    }
}
