//! Business-day time helpers.
//!
//! All "what day is it" / "HH:MM" decisions happen in the configured
//! business timezone, never in raw UTC offsets.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

/// Parse a `"HH:MM"` config value.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Saturday or Sunday.
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
