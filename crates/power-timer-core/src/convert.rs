//! Conversions between stored values and human-readable text
//!
//! Reason codes map to the snake_case names used by the web front end, clock
//! offsets to `HH:MM`, and absolute timestamps to local calendar time. Local
//! time is a fixed offset from UTC taken from [`TimerConfig`](crate::TimerConfig);
//! daylight saving transitions are not modelled.

use core::fmt::Write;

use heapless::String;

use crate::records::{EventReason, SECS_PER_DAY, Timestamp};

const SECS_PER_HOUR: Timestamp = 3600;
const SECS_PER_MINUTE: Timestamp = 60;

impl EventReason {
    /// Every reason, in code order.
    pub const ALL: [EventReason; 7] = [
        Self::Unknown,
        Self::Reboot,
        Self::UnrecordedEvents,
        Self::HwButton,
        Self::WebButton,
        Self::ScheduledDaily,
        Self::ScheduledOnce,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Reboot => "reboot",
            Self::UnrecordedEvents => "unrecorded_events",
            Self::HwButton => "hw_button",
            Self::WebButton => "web_button",
            Self::ScheduledDaily => "scheduled_daily",
            Self::ScheduledOnce => "scheduled_once",
        }
    }

    /// Parse a reason name. Anything unrecognised is [`EventReason::Unknown`].
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == name)
            .unwrap_or(Self::Unknown)
    }
}

impl From<u32> for EventReason {
    fn from(code: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|reason| *reason as u32 == code)
            .unwrap_or(Self::Unknown)
    }
}

impl core::fmt::Display for EventReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format a seconds-of-day offset as `HH:MM`. Seconds are dropped.
pub fn time_offset_to_string(offset: Timestamp) -> String<8> {
    let hours = offset / SECS_PER_HOUR;
    let mins = (offset / SECS_PER_MINUTE) % 60;
    let mut out = String::new();
    // In-range offsets need 5 bytes
    let _ = write!(out, "{:02}:{:02}", hours, mins);
    out
}

/// Parse `HH:MM` or `HH:MM:SS` into seconds after midnight.
///
/// Returns `None` unless every component is in range.
pub fn parse_time_offset(text: &str) -> Option<Timestamp> {
    let mut parts = text.trim().split(':');
    let hours: Timestamp = parts.next()?.parse().ok()?;
    let mins: Timestamp = parts.next()?.parse().ok()?;
    let secs: Timestamp = match parts.next() {
        Some(secs) => secs.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    if !(0..24).contains(&hours) || !(0..60).contains(&mins) || !(0..60).contains(&secs) {
        return None;
    }
    Some(hours * SECS_PER_HOUR + mins * SECS_PER_MINUTE + secs)
}

/// Local midnight at the start of the day `days_future` days after `now`.
///
/// Saturates instead of overflowing for timestamps near the `i64` limits.
pub fn midnight_in_days(now: Timestamp, days_future: u16, utc_offset_secs: i32) -> Timestamp {
    let offset = Timestamp::from(utc_offset_secs);
    let local = now.saturating_add(offset);
    let local_midnight = local.saturating_sub(local.rem_euclid(SECS_PER_DAY));
    let ahead = Timestamp::from(days_future) * SECS_PER_DAY;
    local_midnight.saturating_sub(offset).saturating_add(ahead)
}

/// Local day number since the epoch, used to detect day transitions.
pub fn local_day(now: Timestamp, utc_offset_secs: i32) -> Timestamp {
    let local = now.saturating_add(Timestamp::from(utc_offset_secs));
    local.div_euclid(SECS_PER_DAY)
}

/// Latest instant [`format_timestamp`] renders: 9999-12-31 23:59:59.
const MAX_FORMATTED: Timestamp = 253_402_300_799;

/// Format a timestamp as local `YYYY-MM-DD HH:MM:SS`.
///
/// Times before the epoch or after year 9999 are clamped to that range.
pub fn format_timestamp(when: Timestamp, utc_offset_secs: i32) -> String<24> {
    let local = when
        .saturating_add(Timestamp::from(utc_offset_secs))
        .clamp(0, MAX_FORMATTED);
    let days = local / SECS_PER_DAY;
    let secs = local % SECS_PER_DAY;
    let (year, month, day) = civil_from_days(days);

    let mut out = String::new();
    let _ = write!(
        out,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month,
        day,
        secs / SECS_PER_HOUR,
        (secs / SECS_PER_MINUTE) % 60,
        secs % 60
    );
    out
}

/// Proleptic Gregorian date for a day count relative to 1970-01-01.
///
/// Howard Hinnant's `civil_from_days`.
fn civil_from_days(days: Timestamp) -> (Timestamp, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + Timestamp::from(month <= 2);
    (year, month, day)
}
