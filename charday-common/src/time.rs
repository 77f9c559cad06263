//! Reference time zone date helpers
//!
//! "Today" is always computed in a fixed reference offset taken from
//! configuration, never from UTC or the host's local zone, so that a process
//! running anywhere agrees on which day's state it is working on.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::{Error, Result};

/// Date key format used by state stores and candidate files
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Build the reference offset from a minute count east of UTC
pub fn reference_offset(utc_offset_minutes: i32) -> Result<FixedOffset> {
    utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            Error::Config(format!(
                "utc_offset_minutes out of range: {}",
                utc_offset_minutes
            ))
        })
}

/// Current instant expressed in the reference offset
pub fn now_in(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// Calendar date of "today" in the reference offset
pub fn today_in(offset: FixedOffset) -> NaiveDate {
    now_in(offset).date_naive()
}

/// Parse an `HH:MM` slot time
pub fn parse_slot_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| Error::Config(format!("Invalid slot time '{}': {}", value, e)))
}

/// Instant at which a slot fires on `date` in the reference offset
pub fn slot_datetime(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    // A fixed offset has no gaps or folds, so the mapping is always single
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .unwrap_or_else(|| offset.from_utc_datetime(&date.and_time(time)))
}

/// Format a date as its storage key (`YYYY-MM-DD`)
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Parse a storage key back into a date
pub fn parse_date_key(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_KEY_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("Invalid date '{}': {}", value, e)))
}
