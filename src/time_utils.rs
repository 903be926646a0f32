// SPDX-License-Identifier: MIT

//! Civil timestamp helpers for the tracked region (Europe/Paris rule).
//!
//! The region switches between +01:00 and +02:00 on the last Sunday of
//! March / October at 01:00 UTC. Positions store their creation time as a
//! fixed-offset ISO-8601 string carrying whichever offset was in force on
//! that calendar date.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc, Weekday};

/// Standard (winter) offset.
pub const STANDARD_OFFSET: &str = "+01:00";
/// Daylight-saving (summer) offset.
pub const DST_OFFSET: &str = "+02:00";

/// Last Sunday of a month.
fn last_sunday(year: i32, month: u32) -> NaiveDate {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid first-of-month date");

    let mut cur = first_of_next.pred_opt().expect("valid previous day");
    while cur.weekday() != Weekday::Sun {
        cur = cur.pred_opt().expect("valid previous day");
    }
    cur
}

/// Civil UTC offset in force on a calendar date.
///
/// The transition boundary is evaluated at 12:00 UTC of the date, which
/// sidesteps ambiguity during the literal transition hour: the offset is a
/// pure function of the calendar date.
pub fn civil_offset_for_date(date: NaiveDate) -> &'static str {
    let year = date.year();
    let dst_start = last_sunday(year, 3)
        .and_hms_opt(1, 0, 0)
        .expect("valid time")
        .and_utc();
    let dst_end = last_sunday(year, 10)
        .and_hms_opt(1, 0, 0)
        .expect("valid time")
        .and_utc();
    let probe = date.and_hms_opt(12, 0, 0).expect("valid time").and_utc();

    if probe >= dst_start && probe < dst_end {
        DST_OFFSET
    } else {
        STANDARD_OFFSET
    }
}

/// Combine a `YYYY-MM-DD` date and `HH:MM` time into a civil ISO string,
/// defaulting either part to the current instant (UTC components).
pub fn build_civil_iso(date: Option<&str>, time: Option<&str>) -> String {
    let now = Utc::now();
    let date_str = date
        .map(str::to_string)
        .unwrap_or_else(|| now.format("%Y-%m-%d").to_string());
    let time_str = time
        .map(str::to_string)
        .unwrap_or_else(|| now.format("%H:%M").to_string());

    let offset = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map(civil_offset_for_date)
        .unwrap_or(STANDARD_OFFSET);

    format!("{date_str}T{time_str}:00{offset}")
}

/// True for a bare `HH:MM` time-of-day string.
pub fn is_hhmm(s: &str) -> bool {
    NaiveTime::parse_from_str(s, "%H:%M").is_ok() && s.len() == 5
}

/// Split a bare `YYYY-MM-DD[ T]HH:MM[:SS]` string into date and a
/// normalized `HH:MM:SS` time. Returns None if the shape does not match.
fn split_bare_civil(s: &str) -> Option<(NaiveDate, String)> {
    if s.len() != 16 && s.len() != 19 {
        return None;
    }
    let sep = s.as_bytes()[10];
    if sep != b'T' && sep != b' ' {
        return None;
    }
    let date = NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d").ok()?;
    let time = if s.len() == 16 {
        NaiveTime::parse_from_str(&s[11..], "%H:%M").ok()?
    } else {
        NaiveTime::parse_from_str(&s[11..], "%H:%M:%S").ok()?
    };
    Some((date, time.format("%H:%M:%S").to_string()))
}

/// Best-effort parse of any other date string, interpreted as UTC.
fn parse_loose(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Normalize any timestamp string to a civil ISO string.
///
/// Already-offset ISO strings are returned unchanged. Bare date-time
/// strings get the seasonal offset appended. Anything else parseable is
/// reinterpreted by its UTC components. Returns None on unparseable
/// input; callers must supply a fallback (typically "now").
pub fn normalize_civil_iso(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if DateTime::parse_from_rfc3339(s).is_ok() {
        return Some(s.to_string());
    }

    if let Some((date, time)) = split_bare_civil(s) {
        let offset = civil_offset_for_date(date);
        return Some(format!("{}T{}{}", date.format("%Y-%m-%d"), time, offset));
    }

    let instant = parse_loose(s)?;
    let date = instant.date_naive();
    let offset = civil_offset_for_date(date);
    Some(format!(
        "{}T{:02}:{:02}:{:02}{}",
        date.format("%Y-%m-%d"),
        instant.hour(),
        instant.minute(),
        instant.second(),
        offset
    ))
}

/// Parse a stored civil ISO string into an instant, for the
/// timestamp-mirror field of the document backend.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    normalize_civil_iso(s)
        .and_then(|iso| DateTime::parse_from_rfc3339(&iso).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Current instant as a civil ISO string.
pub fn now_civil_iso() -> String {
    build_civil_iso(None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_dst_spring_boundary() {
        // Last Sunday of March 2025 is the 30th.
        assert_eq!(civil_offset_for_date(d(2025, 3, 29)), "+01:00");
        assert_eq!(civil_offset_for_date(d(2025, 3, 30)), "+02:00");
    }

    #[test]
    fn test_dst_autumn_boundary() {
        // Last Sunday of October 2025 is the 26th.
        assert_eq!(civil_offset_for_date(d(2025, 10, 25)), "+02:00");
        assert_eq!(civil_offset_for_date(d(2025, 10, 26)), "+01:00");
    }

    #[test]
    fn test_offsets_across_seasons() {
        assert_eq!(civil_offset_for_date(d(2025, 1, 8)), "+01:00");
        assert_eq!(civil_offset_for_date(d(2025, 7, 14)), "+02:00");
        assert_eq!(civil_offset_for_date(d(2025, 12, 25)), "+01:00");
    }

    #[test]
    fn test_build_civil_iso_explicit() {
        assert_eq!(
            build_civil_iso(Some("2025-09-08"), Some("16:15")),
            "2025-09-08T16:15:00+02:00"
        );
        assert_eq!(
            build_civil_iso(Some("2025-01-08"), Some("09:05")),
            "2025-01-08T09:05:00+01:00"
        );
    }

    #[test]
    fn test_normalize_bare_strings() {
        assert_eq!(
            normalize_civil_iso("2025-09-08 16:15").as_deref(),
            Some("2025-09-08T16:15:00+02:00")
        );
        assert_eq!(
            normalize_civil_iso("2025-01-08T16:15:00").as_deref(),
            Some("2025-01-08T16:15:00+01:00")
        );
    }

    #[test]
    fn test_normalize_passthrough_and_failure() {
        // Already-offset strings are returned unchanged.
        assert_eq!(
            normalize_civil_iso("2025-09-08T16:15:00+02:00").as_deref(),
            Some("2025-09-08T16:15:00+02:00")
        );
        assert_eq!(
            normalize_civil_iso("2025-06-01T10:00:00Z").as_deref(),
            Some("2025-06-01T10:00:00Z")
        );
        assert_eq!(normalize_civil_iso("not a date"), None);
        assert_eq!(normalize_civil_iso(""), None);
    }

    #[test]
    fn test_normalize_loose_formats() {
        assert_eq!(
            normalize_civil_iso("2025/09/08 16:15:00").as_deref(),
            Some("2025-09-08T16:15:00+02:00")
        );
        assert_eq!(
            normalize_civil_iso("2025-12-01").as_deref(),
            Some("2025-12-01T00:00:00+01:00")
        );
    }

    #[test]
    fn test_parse_instant_round_trip() {
        let instant = parse_instant("2025-09-08T16:15:00+02:00").unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-09-08T14:15:00+00:00");
        assert!(parse_instant("garbage").is_none());
    }

    #[test]
    fn test_is_hhmm() {
        assert!(is_hhmm("16:15"));
        assert!(!is_hhmm("16:15:00"));
        assert!(!is_hhmm("2025-09-08T16:15"));
    }
}
