//! Dates as epoch seconds.
//!
//! Formats use `strftime` syntax. Times without an offset are taken as UTC.

use std::fmt::Write;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub const SLASH_FORMAT: &str = "%m/%d/%Y:%H:%M:%S";
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Parses `text` with `format`, or with the default format when none is
/// given: [`SLASH_FORMAT`] if the text contains a `/`, [`ISO_FORMAT`]
/// otherwise.
///
/// # Examples
///
/// ```
/// use unq_lang::timefmt::parse_time;
///
/// assert_eq!(parse_time("1970-01-02T00:00:00+0000", None), Some(86400));
/// assert_eq!(parse_time("01/01/1970:00:01:00", None), Some(60));
/// assert_eq!(parse_time("1970-01-01", Some("%Y-%m-%d")), Some(0));
/// assert_eq!(parse_time("yesterday", None), None);
/// ```
pub fn parse_time(text: &str, format: Option<&str>) -> Option<i64> {
    let text = text.trim();
    let format = match format {
        Some(f) if !f.is_empty() => f,
        _ if text.contains('/') => SLASH_FORMAT,
        _ => ISO_FORMAT,
    };
    if let Ok(time) = DateTime::parse_from_str(text, format) {
        return Some(time.timestamp());
    }
    if let Ok(time) = NaiveDateTime::parse_from_str(text, format) {
        return Some(time.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| time.and_utc().timestamp())
}

/// Date literal of `$D`: an ISO date or time, or the slash format, with or
/// without the time of day.
pub fn parse_date(text: &str) -> Option<i64> {
    [ISO_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d", SLASH_FORMAT, "%m/%d/%Y"]
        .iter()
        .find_map(|format| parse_time(text, Some(format)))
}

/// Formats epoch seconds in UTC. Returns `None` for times out of range and
/// for invalid formats.
pub fn format_time(epoch: i64, format: Option<&str>) -> Option<String> {
    let format = format.filter(|f| !f.is_empty()).unwrap_or(ISO_FORMAT);
    let time = DateTime::<Utc>::from_timestamp(epoch, 0)?;
    let mut out = String::new();
    write!(out, "{}", time.format(format)).ok()?;
    Some(out)
}
