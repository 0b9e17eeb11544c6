//! Week anchors, clock strings and weekday numbering.
//!
//! Weeks are identified by their Monday as a calendar date. Dates carry no
//! time zone; "now" is read in UTC.

use chrono::{Datelike, Duration, NaiveDate, Utc};

pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// Monday of the week containing `date`. Sunday belongs to the week that
/// started six days earlier.
pub fn week_anchor(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Anchor of the current week.
pub fn current_week() -> NaiveDate {
    week_anchor(Utc::now().date_naive())
}

/// Parse an optional `YYYY-MM-DD` string into its week anchor. Absent or
/// blank input means the current week; malformed input yields `None`.
pub fn parse_week_anchor(raw: Option<&str>) -> Option<NaiveDate> {
    parse_week_anchor_or(raw, current_week())
}

pub fn parse_week_anchor_or(raw: Option<&str>, fallback: NaiveDate) -> Option<NaiveDate> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Some(week_anchor(fallback)),
        Some(s) => parse_date(s).map(week_anchor),
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn next_week(week_start: NaiveDate) -> NaiveDate {
    week_anchor(week_start + Duration::days(7))
}

/// Parse `YYYY-MM`.
pub fn parse_month(s: &str) -> Option<(i32, u32)> {
    let (year, month) = s.trim().split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1).map(|_| (year, month))
}

/// Every week anchor touching the month: from the Monday on or before the
/// 1st, in steps of seven days, while still inside the month.
pub fn month_week_anchors(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let Some(end) = next_month else {
        return Vec::new();
    };

    let mut weeks = Vec::new();
    let mut monday = week_anchor(first);
    while monday < end {
        weeks.push(monday);
        monday += Duration::days(7);
    }
    weeks
}

/// `HH:MM` for a minute of the day.
pub fn to_clock(minutes: i32) -> String {
    let minutes = minutes.rem_euclid(MINUTES_PER_DAY);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Minute of the day for an `H:MM` / `HH:MM` string.
pub fn from_clock(s: &str) -> Option<i32> {
    let (h, m) = s.trim().split_once(':')?;
    if m.len() != 2 {
        return None;
    }
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if !(0..24).contains(&h) || !(0..60).contains(&m) {
        return None;
    }
    Some(h * 60 + m)
}

/// Canonical ISO weekday (1=Mon … 7=Sun). Sunday may arrive as `0`.
pub fn normalize_day(day: i32) -> Option<i32> {
    match day {
        0 => Some(7),
        1..=7 => Some(day),
        _ => None,
    }
}
