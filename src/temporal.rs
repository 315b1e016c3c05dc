// ⏰ Date Normalizer
// Dates arrive from three places with different conventions:
//   1. The entry form (real calendar dates)
//   2. Bulk imports (day-first text such as "25/11/2018")
//   3. The durable file (ISO-8601 text, or whatever older versions stored)
//
// Every parser here returns Option<NaiveDate> and never fails loudly.
// "No date" is a value, not an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Textual markers that mean "no value" in hand-edited or spreadsheet data
const EMPTY_MARKERS: [&str; 5] = ["", "nan", "NaT", "None", "NoneType"];

/// Formats tried by the last-resort parser, in order
const LOOSE_DATE_FORMATS: &[&str] = &[
    "%d %B, %Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %b, %Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%A, %B %d, %Y",
    "%d-%B-%Y",
    "%d-%b-%Y",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%Y%m%d",
];

const LOOSE_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Date shown on the card and inside the QR payload: "05 March, 2010"
pub const CARD_DATE_FORMAT: &str = "%d %B, %Y";

/// Date written to exports: "05-March-2010"
pub const EXPORT_DATE_FORMAT: &str = "%d-%B-%Y";

// ============================================================================
// INPUT VALUES
// ============================================================================

/// Anything the normalizer accepts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateValue<'a> {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(&'a str),
    Missing,
}

impl From<NaiveDate> for DateValue<'_> {
    fn from(date: NaiveDate) -> Self {
        DateValue::Date(date)
    }
}

impl From<NaiveDateTime> for DateValue<'_> {
    fn from(datetime: NaiveDateTime) -> Self {
        DateValue::DateTime(datetime)
    }
}

impl<'a> From<&'a str> for DateValue<'a> {
    fn from(text: &'a str) -> Self {
        DateValue::Text(text)
    }
}

impl<'a> From<&'a String> for DateValue<'a> {
    fn from(text: &'a String) -> Self {
        DateValue::Text(text.as_str())
    }
}

impl<'a> From<Option<&'a str>> for DateValue<'a> {
    fn from(text: Option<&'a str>) -> Self {
        text.map_or(DateValue::Missing, DateValue::Text)
    }
}

impl<'a> From<&'a Option<String>> for DateValue<'a> {
    fn from(text: &'a Option<String>) -> Self {
        text.as_deref().into()
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Normalize any supported date representation into a calendar date
///
/// Stages, each tried only when the previous one found nothing:
/// 1. Real date / datetime values pass through
/// 2. Empty markers ("", "nan", "NaT", "None") → None
/// 3. Strict ISO-8601
/// 4. Three-part `/` or `-` split, day-first then month-first
/// 5. Permissive named-month and compact formats
pub fn normalize_date<'a>(value: impl Into<DateValue<'a>>) -> Option<NaiveDate> {
    let text = match value.into() {
        DateValue::Date(date) => return Some(date),
        DateValue::DateTime(datetime) => return Some(datetime.date()),
        DateValue::Missing => return None,
        DateValue::Text(text) => text.trim(),
    };

    if is_empty_marker(text) {
        return None;
    }

    parse_iso(text)
        .or_else(|| parse_separated(text, &['/', '-']))
        .or_else(|| parse_loose(text))
}

/// Parse a bulk-import cell, preferring day-first over everything else
///
/// Year-first ISO text is still read as ISO. Numeric dates split on `/`, `-`
/// or `.` are read as day/month/year, and anything else goes through
/// [`normalize_date`].
pub fn parse_import_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if is_empty_marker(text) {
        return None;
    }

    if let Some(date) = parse_iso(text) {
        return Some(date);
    }

    // Spreadsheet exports append a time of day: "03/04/2015 00:00:00"
    let date_part = text
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or(text);

    for sep in ['/', '-', '.'] {
        if let Some([day, month, year]) = split_numeric(date_part, sep) {
            if let Some(date) = NaiveDate::from_ymd_opt(expand_year(year), month as u32, day as u32)
            {
                return Some(date);
            }
        }
    }

    normalize_date(text)
}

/// True for the textual "no value" markers
pub fn is_empty_marker(text: &str) -> bool {
    EMPTY_MARKERS.contains(&text.trim())
}

/// Format for the card and QR payload, empty when there is no date
pub fn format_card_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(CARD_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Format for tabular exports, empty when there is no date
pub fn format_export_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(EXPORT_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Storage form: ISO-8601 calendar date
pub fn to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// STAGES
// ============================================================================

fn parse_iso(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| datetime.date_naive())
}

fn parse_separated(text: &str, separators: &[char]) -> Option<NaiveDate> {
    for &sep in separators {
        let Some([first, second, year]) = split_numeric(text, sep) else {
            continue;
        };
        let year = expand_year(year);

        // Day-first, then month-first. A day above 12 forces one reading.
        let day_first = NaiveDate::from_ymd_opt(year, second as u32, first as u32);
        let month_first = || NaiveDate::from_ymd_opt(year, first as u32, second as u32);

        if let Some(date) = day_first.or_else(month_first) {
            return Some(date);
        }
    }

    None
}

fn parse_loose(text: &str) -> Option<NaiveDate> {
    for format in LOOSE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    for format in LOOSE_DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }

    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|datetime| datetime.date_naive())
}

fn split_numeric(text: &str, sep: char) -> Option<[i32; 3]> {
    let parts: Vec<&str> = text.split(sep).collect();
    if parts.len() != 3 {
        return None;
    }

    let mut numbers = [0i32; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part.trim().parse().ok()?;
    }

    // Negative components never form a date
    if numbers.iter().any(|n| *n < 0) {
        return None;
    }

    Some(numbers)
}

/// Two-digit years belong to this century
fn expand_year(year: i32) -> i32 {
    if year < 100 {
        year + 2000
    } else {
        year
    }
}
