// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting, parsing, and campus-local windows.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Today's date on campus.
pub fn campus_today(tz: Tz) -> NaiveDate {
    local_date(Utc::now(), tz)
}

/// Calendar date of `now` in `tz`.
pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Local midnight at the start of `date`, as UTC.
///
/// If midnight does not exist locally (DST gap), the earliest valid instant
/// after it is used.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// The campus week containing `now`: Monday 00:00 local to the next Monday.
pub fn week_window(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = local_date(now, tz);
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    (
        local_midnight(monday, tz),
        local_midnight(monday + Duration::days(7), tz),
    )
}

/// `days` campus-local days starting at today's local midnight.
pub fn rolling_window(now: DateTime<Utc>, tz: Tz, days: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = local_date(now, tz);
    (
        local_midnight(today, tz),
        local_midnight(today + Duration::days(i64::from(days)), tz),
    )
}

/// First and last date of the `days` calendar days ending on `today`, inclusive.
pub fn trailing_days(today: NaiveDate, days: u32) -> (NaiveDate, NaiveDate) {
    let span = i64::from(days.max(1)) - 1;
    (today - Duration::days(span), today)
}

/// Whole days from `today` to `date`. Negative when overdue.
pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// First plausible year (1900-2099) mentioned in `text`, e.g. a semester label.
pub fn year_in(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|t| t.len() == 4)
        .filter_map(|t| t.parse::<i32>().ok())
        .find(|y| (1900..2100).contains(y))
}

/// Resolve a free-form key date to a calendar day.
///
/// Accepts ISO dates and datetimes, iCalendar `YYYYMMDD[THHMMSS[Z]]`,
/// numeric `M/D[/Y]`, and month-name forms such as `October 5, 2025`,
/// `Oct 5`, `Week of Sept 8`, `Approximately Tue, Nov 4 10:00-11:15am`.
/// Without a year in the text, `fallback_year` is used.
pub fn parse_key_date(text: &str, fallback_year: i32) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(date) = text
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    {
        return Some(date);
    }

    if let Some(date) = text
        .get(..8)
        .filter(|prefix| prefix.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y%m%d").ok())
    {
        return Some(date);
    }

    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(date) = tokens
        .iter()
        .find_map(|token| parse_numeric_date(token, fallback_year))
    {
        return Some(date);
    }

    for (i, token) in tokens.iter().enumerate() {
        let Some(month) = month_from_name(token) else {
            continue;
        };
        let Some(day) = tokens.get(i + 1).and_then(|t| parse_day(t)) else {
            continue;
        };
        let year = tokens
            .get(i + 2)
            .and_then(|t| parse_year(t))
            .unwrap_or(fallback_year);
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// `"sept."` → 9. The token must be a prefix of a month name, at least 3 letters.
fn month_from_name(token: &str) -> Option<u32> {
    let token = token.trim_end_matches('.');
    if token.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|name| name.starts_with(token))
        .map(|i| i as u32 + 1)
}

/// `"5th"`, `"05"`, `"5-7"` → 5.
fn parse_day(token: &str) -> Option<u32> {
    let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    let rest = &token[digits.len()..];
    let rest_ok = rest.is_empty()
        || ["st", "nd", "rd", "th", "-", "–", ".", ")"]
            .iter()
            .any(|suffix| rest.starts_with(suffix));
    if !rest_ok {
        return None;
    }
    digits.parse().ok().filter(|d| (1..=31).contains(d))
}

fn parse_year(token: &str) -> Option<i32> {
    let token = token.trim_end_matches(['.', ')', ';']);
    if token.len() != 4 {
        return None;
    }
    token.parse().ok().filter(|y| (1900..2100).contains(y))
}

/// `"9/5"`, `"09/05/2025"`, `"9/5/25"`.
fn parse_numeric_date(token: &str, fallback_year: i32) -> Option<NaiveDate> {
    let parts: Vec<&str> = token.trim_end_matches(['.', ')', ';']).split('/').collect();
    if !(2..=3).contains(&parts.len())
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let month = parts[0].parse().ok()?;
    let day = parts[1].parse().ok()?;
    let year = match parts.get(2) {
        Some(y) if y.len() == 2 => 2000 + y.parse::<i32>().ok()?,
        Some(y) => y.parse().ok()?,
        None => fallback_year,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}
