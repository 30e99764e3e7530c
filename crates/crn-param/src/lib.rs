//! crn-param
//!
//! Fuzzy parsing of operator input. Search boxes and manual account entry
//! forms accept free text; these routines pull a typed amount, currency code,
//! or calendar date out of the noise. Failures degrade to `None` — a bad
//! filter is "no filter", never an error escaping the caller.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

/// First run of an optional sign (ASCII or U+2212 true minus) followed by
/// digits, group separators, and decimal point.
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[+\-−]?[0-9.,]+").unwrap());

static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]+").unwrap());

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?\b").unwrap());

/// "2024-01-05T14:30" and "Jan 5 @ 14:30" both mean date-space-time.
static DATE_TIME_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*[T@]\s*(\d)").unwrap());

static AMPM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*([ap])m?\b").unwrap());

/// A signed amount extracted from free text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedAmount {
    /// Exact decimal value, sign applied.
    pub value: Decimal,
    /// -1 / 1 when the text carried an explicit leading sign, 0 otherwise.
    pub sign: i8,
    /// The token as consumed (U+2212 normalized to `-`), not reformatted.
    /// Callers inspect it for the presence of a decimal point to decide
    /// between exact and whole-unit matching.
    pub str_value: String,
}

impl ParsedAmount {
    pub fn abs(&self) -> Decimal {
        self.value.abs()
    }

    /// True when the operator typed subunits ("2.12" rather than "2").
    pub fn has_subunit(&self) -> bool {
        self.str_value.contains('.')
    }
}

/// Extract the first signed numeric run from `input`.
///
/// Surrounding noise is ignored; only the first run is considered. Returns
/// `None` when no run contains a digit or the digits do not form a valid
/// decimal.
pub fn parse_amount(input: &str) -> Option<ParsedAmount> {
    let m = AMOUNT_RE
        .find_iter(input)
        .find(|m| m.as_str().bytes().any(|b| b.is_ascii_digit()))?;

    let str_value = m.as_str().replace('\u{2212}', "-");

    let sign: i8 = match str_value.as_bytes().first() {
        Some(b'-') => -1,
        Some(b'+') => 1,
        _ => 0,
    };

    // Commas are group separators; strip them before conversion.
    let mut cleaned = str_value.replace(',', "");
    if let Some(rest) = cleaned.strip_prefix('+') {
        cleaned = rest.to_string();
    }
    let value: Decimal = cleaned.parse().ok()?;

    Some(ParsedAmount {
        value,
        sign,
        str_value,
    })
}

/// Extract a currency code candidate: the first alphabetic run, uppercased.
/// "12 usd" → "USD". Returns `None` when the text has no letters.
pub fn parse_currency(input: &str) -> Option<String> {
    CURRENCY_RE
        .find(input)
        .map(|m| m.as_str().to_ascii_uppercase())
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d %b %Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%B %d, %Y",
];

/// Permissive calendar-date parse. Tries the accepted formats in order and
/// returns the first hit.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// How precisely the operator specified a point in time. Derived from the
/// text itself: two colons means seconds, one means minutes, a bare nonzero
/// hour means hours, anything else means a whole day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateResolution {
    Day,
    Hour,
    Minute,
    Second,
}

impl DateResolution {
    /// Width of the half-open match window starting at the parsed instant.
    pub fn window(&self) -> Duration {
        match self {
            DateResolution::Day => Duration::days(1),
            DateResolution::Hour => Duration::seconds(3600),
            DateResolution::Minute => Duration::seconds(60),
            DateResolution::Second => Duration::seconds(1),
        }
    }
}

/// Parse a date with optional time of day, reporting the resolution implied
/// by the text. `"2024-03-05 14:30"` matches a minute; `"2024-03-05"` a day.
pub fn parse_datetime(input: &str) -> Option<(NaiveDateTime, DateResolution)> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = DATE_TIME_SEP_RE.replace(trimmed, "$1 $2").into_owned();

    let mut time = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
    let mut date_part = normalized.clone();

    if let Some(caps) = TIME_RE.captures(&normalized) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let second: u32 = match caps.get(3) {
            Some(s) => s.as_str().parse().ok()?,
            None => 0,
        };
        time = NaiveTime::from_hms_opt(hour, minute, second)?;
        let whole = caps.get(0).unwrap();
        date_part.replace_range(whole.range(), "");
    } else if let Some(caps) = AMPM_RE.captures(&normalized) {
        let mut hour: u32 = caps[1].parse().ok()?;
        if hour > 12 {
            return None;
        }
        hour %= 12;
        if caps[2].eq_ignore_ascii_case("p") {
            hour += 12;
        }
        time = NaiveTime::from_hms_opt(hour, 0, 0)?;
        let whole = caps.get(0).unwrap();
        date_part.replace_range(whole.range(), "");
    }

    let date = parse_date(date_part.trim())?;

    let colon_count = normalized.bytes().filter(|b| *b == b':').count();
    let resolution = if colon_count >= 2 {
        DateResolution::Second
    } else if colon_count >= 1 {
        DateResolution::Minute
    } else if time.hour() != 0 {
        DateResolution::Hour
    } else {
        DateResolution::Day
    };

    Some((date.and_time(time), resolution))
}
