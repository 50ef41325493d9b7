// 🧰 Field extraction capabilities
// Small helpers each parser composes explicitly: null-coalescing, booleans,
// money, dates, names, postal codes, email and invoice-number extraction.
//
// Nothing here fails: a defective value becomes None / false / "0.00".

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// A raw source row: lower-case column name → raw string value
pub type RawRow = BTreeMap<String, String>;

/// Values legacy tools write when they mean "nothing"
const NULL_VALUES: [&str; 2] = ["null", "NULL"];

/// Case-insensitive vocabulary for truthy legacy booleans
const TRUE_VALUES: [&str; 5] = ["YES", "Y", "OK", "TRUE", "1"];

/// Date layouts tried, in order, for non-numeric date columns
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%b-%Y",
];

// ============================================================================
// NULL-COALESCING
// ============================================================================

/// Trim a value and map empty / null-like strings to None
pub fn nullify(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() || NULL_VALUES.contains(&trimmed) {
        None
    } else {
        Some(trimmed)
    }
}

/// Read a column, treating missing and null-like values alike
pub fn field<'a>(row: &'a RawRow, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|v| nullify(v))
}

/// Owned variant of [`field`]
pub fn field_string(row: &RawRow, column: &str) -> Option<String> {
    field(row, column).map(str::to_string)
}

/// First non-empty value among several candidate columns
pub fn coalesce<'a>(row: &'a RawRow, columns: &[&str]) -> Option<&'a str> {
    columns.iter().find_map(|c| field(row, c))
}

// ============================================================================
// SCALARS
// ============================================================================

/// Legacy boolean: "yes"/"y"/"ok"/"true"/"1" (any case) are true, all else false
pub fn boolean(value: Option<&str>) -> bool {
    match value {
        Some(v) => {
            let upper = v.trim().to_uppercase();
            TRUE_VALUES.contains(&upper.as_str())
        }
        None => false,
    }
}

/// Parse a money value, stripping "$" and "," and honouring "(12.50)" negatives
pub fn money(value: Option<&str>) -> Option<f64> {
    let raw = value?.trim();
    let negative = raw.starts_with('(') && raw.ends_with(')');
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '(' | ')' | ' '))
        .collect();

    let parsed: f64 = cleaned.parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }

    Some(if negative { -parsed.abs() } else { parsed })
}

/// Money rendered as a fixed two-place decimal string; defects become "0.00"
pub fn decimal(value: Option<&str>) -> String {
    format_decimal(money(value).unwrap_or(0.0))
}

/// Render an amount with exactly two decimal places
pub fn format_decimal(amount: f64) -> String {
    let rounded = (amount * 100.0).round() / 100.0;
    // Avoid "-0.00"
    if rounded == 0.0 {
        "0.00".to_string()
    } else {
        format!("{:.2}", rounded)
    }
}

/// Whole number, tolerating "12.0" and thousands separators
pub fn integer(value: Option<&str>) -> Option<i64> {
    let raw = value?.trim().replace(',', "");
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

/// Lower bound of an income band: "$50,000 - $74,999" → 50000, "75000+" → 75000
pub fn income_floor(value: Option<&str>) -> Option<i64> {
    let raw = value?.trim();
    let lower = raw
        .split(|c| c == '-' || c == '+')
        .map(str::trim)
        .find(|part| !part.is_empty())?;

    money(Some(lower)).map(|amount| amount.trunc() as i64)
}

// ============================================================================
// DATES
// ============================================================================

/// Outcome of reading a date column
#[derive(Debug, Clone, PartialEq)]
pub enum DateField {
    /// Column absent or empty
    Missing,

    /// Parsed successfully
    Parsed(NaiveDateTime),

    /// Present but unparseable; carries the raw text
    Invalid(String),
}

impl DateField {
    pub fn value(&self) -> Option<NaiveDateTime> {
        match self {
            DateField::Parsed(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, DateField::Invalid(_))
    }
}

/// Numeric values are Unix timestamps; anything else goes through the
/// generic layouts above.
pub fn parse_date(value: Option<&str>) -> DateField {
    let raw = match value.and_then(nullify) {
        Some(v) => v,
        None => return DateField::Missing,
    };

    if let Ok(seconds) = raw.parse::<i64>() {
        return match DateTime::from_timestamp(seconds, 0) {
            Some(dt) => DateField::Parsed(dt.naive_utc()),
            None => DateField::Invalid(raw.to_string()),
        };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return DateField::Parsed(dt.naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return DateField::Parsed(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return DateField::Parsed(dt);
            }
        }
    }

    DateField::Invalid(raw.to_string())
}

// ============================================================================
// NAMES, POSTAL CODES, TAGS
// ============================================================================

/// Split a display name into (first, last)
///
/// "Doe, John" → (John, Doe); "John Q Doe" → (John, Q Doe); "Cher" → (Cher, None)
pub fn split_name(full_name: &str) -> (Option<String>, Option<String>) {
    let full_name = full_name.trim();

    if let Some((last, first)) = full_name.split_once(',') {
        return (
            nullify(first).map(str::to_string),
            nullify(last).map(str::to_string),
        );
    }

    match full_name.split_once(char::is_whitespace) {
        Some((first, rest)) => (
            nullify(first).map(str::to_string),
            nullify(rest).map(str::to_string),
        ),
        None => (nullify(full_name).map(str::to_string), None),
    }
}

/// Join name parts, skipping empty ones
pub fn format_name(parts: &[Option<&str>]) -> Option<String> {
    let joined = parts
        .iter()
        .flatten()
        .filter_map(|p| nullify(p))
        .collect::<Vec<_>>()
        .join(" ");

    nullify(&joined).map(str::to_string)
}

/// First five alphanumerics of a postal code, upper-cased
pub fn postal_code_short(postal_code: &str) -> Option<String> {
    let short: String = postal_code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(5)
        .collect::<String>()
        .to_uppercase();

    nullify(&short).map(str::to_string)
}

/// Comma-separated tag list, trimmed and de-duplicated in order
pub fn split_tags(value: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in value.unwrap_or("").split(',').filter_map(nullify) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

// ============================================================================
// CAPABILITIES (composed by parsers that need them)
// ============================================================================

/// First plausible email address among the candidate columns, lower-cased
pub fn extract_email(row: &RawRow, columns: &[&str]) -> Option<String> {
    columns
        .iter()
        .filter_map(|c| field(row, c))
        .flat_map(|v| v.split([';', ',', ' ']))
        .map(str::trim)
        .find(|candidate| {
            candidate
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
                .unwrap_or(false)
        })
        .map(str::to_lowercase)
}

/// First invoice number among the candidate columns; drops a leading "#"
/// and surrounding whitespace, upper-cases the rest
pub fn extract_invoice_number(row: &RawRow, columns: &[&str]) -> Option<String> {
    coalesce(row, columns)
        .map(|v| v.trim_start_matches('#').trim().to_uppercase())
        .filter(|v| !v.is_empty())
}

/// Digits of a phone number; None unless at least 7 digits remain
pub fn extract_phone(row: &RawRow, columns: &[&str]) -> Option<String> {
    columns.iter().filter_map(|c| field(row, c)).find_map(|v| {
        let digits: String = v.chars().filter(|c| c.is_ascii_digit()).collect();
        (digits.len() >= 7).then_some(digits)
    })
}
