//! Date, datetime, and time coercions.
//!
//! Values that are already temporal pass through untouched. With a `format`
//! option the text must match it exactly; otherwise a fixed list of common
//! layouts is tried in order. Zone-less input is taken as UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use cmdx_types::{Result, Value};

use super::failure;
use crate::coercion::CoercionOptions;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const CLOCK_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

fn utc(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&naive).into()
}

fn midnight(date: NaiveDate) -> Option<DateTime<FixedOffset>> {
    date.and_hms_opt(0, 0, 0).map(utc)
}

fn parse_date_free(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| parse_datetime_free(text, false).map(|dt| dt.date_naive()))
}

fn parse_datetime_free(text: &str, allow_date_only: bool) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt);
    }
    if let Some(dt) = ZONED_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
    {
        return Some(dt);
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(utc(naive));
    }
    if allow_date_only {
        return DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            .and_then(midnight);
    }
    None
}

fn parse_datetime_exact(text: &str, format: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, format).ok().map(utc))
        .or_else(|| NaiveDate::parse_from_str(text, format).ok().and_then(midnight))
}

fn parse_datetime(value: &Value, options: &CoercionOptions) -> Option<DateTime<FixedOffset>> {
    let text = value.as_str()?.trim();
    match options.format.as_deref() {
        Some(format) => parse_datetime_exact(text, format),
        None => parse_datetime_free(text, true),
    }
}

pub fn date(value: &Value, options: &CoercionOptions) -> Result<Value> {
    if value.is_temporal() {
        return Ok(value.clone());
    }
    let parsed = value.as_str().map(str::trim).and_then(|text| match options.format.as_deref() {
        Some(format) => NaiveDate::parse_from_str(text, format).ok(),
        None => parse_date_free(text),
    });
    parsed.map(Value::Date).ok_or_else(|| failure("date"))
}

pub fn datetime(value: &Value, options: &CoercionOptions) -> Result<Value> {
    if value.is_temporal() {
        return Ok(value.clone());
    }
    parse_datetime(value, options)
        .map(Value::DateTime)
        .ok_or_else(|| failure("datetime"))
}

/// Like [`datetime`], but also accepts a bare clock reading (`10:30`),
/// placed on the current UTC date.
pub fn time(value: &Value, options: &CoercionOptions) -> Result<Value> {
    if value.is_temporal() {
        return Ok(value.clone());
    }
    let parsed = parse_datetime(value, options).or_else(|| {
        let text = value.as_str()?.trim();
        if options.format.is_some() {
            return None;
        }
        CLOCK_FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
            .map(|clock| utc(Utc::now().date_naive().and_time(clock)))
    });
    parsed.map(Value::Time).ok_or_else(|| failure("time"))
}
