//! Field parsers
//!
//! Strict parsers return `Result<_, ListingIssue>` and are used for required fields.
//! Lenient ones return `Option` and are used for optional fields and lightweight scans.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// A content-level defect in one listing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ListingIssue(pub String);

impl ListingIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Parses a price such as `$45,000`, failing the listing when it cannot
pub fn parse_price(text: &str) -> Result<Decimal, ListingIssue> {
    parse_price_lenient(text).ok_or_else(|| ListingIssue::new("Could not parse price"))
}

/// Parses a price such as `$45,000`, returning `None` when it cannot
pub fn parse_price_lenient(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    Decimal::from_str(cleaned.trim()).ok()
}

/// Parses a mileage such as `48,500` or `48,500 miles`
pub fn parse_mileage(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .split_whitespace()
        .next()?
        .chars()
        .filter(|c| *c != ',')
        .collect();
    digits.parse().ok()
}

/// Reads a model year from the first slug token of a listing URL's last path segment
///
/// `https://bringatrailer.com/listing/1995-porsche-911-carrera/` yields 1995.
pub fn year_from_slug(url: &str) -> Option<i32> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?;
    let token = segment.split('-').next()?;
    plausible_year(token.parse().ok()?)
}

/// Finds the first four-digit model year in free text
pub fn year_in_text(text: &str) -> Option<i32> {
    let re = Regex::new(r"\b(?:19|20)\d{2}\b").ok()?;
    let found = re.find(text)?;
    plausible_year(found.as_str().parse().ok()?)
}

fn plausible_year(year: i32) -> Option<i32> {
    (1885..=2100).contains(&year).then_some(year)
}

/// Classifies an end-of-auction status string
///
/// Returns `true` (ended) when any `ended_markers` entry appears, `false` (live) when any
/// `live_markers` entry appears. Matching is case-insensitive. Anything else is a
/// listing issue rather than a silent default.
pub fn parse_end_status(
    text: &str,
    ended_markers: &[&str],
    live_markers: &[&str],
) -> Result<bool, ListingIssue> {
    let lowered = text.to_lowercase();
    if ended_markers.iter().any(|m| lowered.contains(&m.to_lowercase())) {
        return Ok(true);
    }
    if live_markers.iter().any(|m| lowered.contains(&m.to_lowercase())) {
        return Ok(false);
    }
    Err(ListingIssue::new("Could not parse auction end status"))
}

/// Finds a US-style date (and optional time) anywhere in `text`
///
/// Recognized dates: `3/4/24`, `03/04/2024`, `Mar 4, 2024`, `March 4th`. A missing year
/// means the current year. A recognized time (`4:30 PM`, `16:30:05`) after the date is
/// applied, otherwise midnight. Text carrying only a time (`Sunday, 10:00 AM`) resolves
/// to that time today.
pub fn parse_us_datetime(text: &str) -> Option<NaiveDateTime> {
    parse_us_datetime_on(text, Local::now().date_naive())
}

/// [`parse_us_datetime`] relative to an explicit `today`
pub fn parse_us_datetime_on(text: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    match numeric_date(text).or_else(|| month_name_date(text, today.year())) {
        Some((date, rest)) => {
            let time = time_of_day(rest).unwrap_or(NaiveTime::MIN);
            Some(date.and_time(time))
        }
        None => time_of_day(text).map(|time| today.and_time(time)),
    }
}

/// Strict variant of [`parse_us_datetime`]
pub fn parse_end_date(text: &str) -> Result<NaiveDateTime, ListingIssue> {
    parse_us_datetime(text).ok_or_else(|| ListingIssue::new("Could not parse end time"))
}

fn numeric_date(text: &str) -> Option<(NaiveDate, &str)> {
    let re = Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").ok()?;
    let caps = re.captures(text)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year = expand_year(&caps[3])?;
    let end = caps.get(0)?.end();
    Some((NaiveDate::from_ymd_opt(year, month, day)?, &text[end..]))
}

fn month_name_date(text: &str, default_year: i32) -> Option<(NaiveDate, &str)> {
    let re = Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s+(\d{4})\b)?",
    )
    .ok()?;
    let caps = re.captures(text)?;
    let month = month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let year = match caps.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => default_year,
    };
    let end = caps.get(0)?.end();
    Some((NaiveDate::from_ymd_opt(year, month, day)?, &text[end..]))
}

fn time_of_day(text: &str) -> Option<NaiveTime> {
    let re = Regex::new(r"(?i)\b(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([ap])\.?m\.?)?").ok()?;
    let caps = re.captures(text)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let second: u32 = match caps.get(3) {
        Some(s) => s.as_str().parse().ok()?,
        None => 0,
    };
    if let Some(meridiem) = caps.get(4) {
        let pm = meridiem.as_str().eq_ignore_ascii_case("p");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }
    NaiveTime::from_hms_opt(hour, minute, second)
}

fn expand_year(text: &str) -> Option<i32> {
    let value: i32 = text.parse().ok()?;
    Some(match text.len() {
        2 if value < 70 => 2000 + value,
        2 => 1900 + value,
        _ => value,
    })
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
