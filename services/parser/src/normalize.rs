//! Locale-aware cell coercion.
//!
//! Customer workbooks mix native numbers, Excel date serials and Spanish
//! locale strings ("2.703.695,25", "07/1/25") freely, sometimes within one
//! column. Everything here is best-effort: a bad cell produces a default
//! value plus a warning, never an error.

use chrono::{Days, NaiveDate};

use crate::sheet::Cell;

/// Spanish month names, index 0 = enero.
pub const MONTH_NAMES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Years outside this window are treated as data errors.
pub const YEAR_MIN: i32 = 2020;
pub const YEAR_MAX: i32 = 2035;

/// Excel stores dates as day counts from this epoch. The 1899-12-30 base
/// (rather than 1899-12-31) reproduces the platform's serial numbering,
/// including its historical 1900 leap-year offset.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// String date formats tried in order. Day-first formats come before the
/// US variant because the source workbooks are Spanish.
const DATE_FORMATS: [&str; 6] = [
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d/%m/%y",
    "%d-%m-%y",
];

/// Coerce a cell to a number. Unparseable cells default to 0.0 and push a
/// warning; empty cells are 0.0 without a warning (blank cells are normal).
pub fn coerce_number(cell: &Cell, row: usize, field: &str, warnings: &mut Vec<String>) -> f64 {
    match cell {
        Cell::Number(n) => *n,
        Cell::Empty => 0.0,
        Cell::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Cell::Text(s) => match parse_locale_number(s) {
            Some(n) => n,
            None => {
                warnings.push(format!(
                    "row {}: unparseable number '{}' in '{}', defaulting to 0",
                    row, s, field
                ));
                0.0
            }
        },
        Cell::Date(_) => {
            warnings.push(format!(
                "row {}: date found where '{}' expects a number, defaulting to 0",
                row, field
            ));
            0.0
        }
    }
}

/// Parse a Spanish/European formatted number string.
///
/// Rules: with both separators present, the one occurring last is the
/// decimal mark ("2.703.695,25" and "1,234.56" both work). A lone comma is
/// always decimal. A lone dot is decimal only when followed by at most two
/// digits, otherwise it is a thousands separator.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | ' ' | '\u{a0}'))
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().any(|c| c.is_alphabetic()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');

    let normalized = match (last_dot, last_comma) {
        (Some(d), Some(c)) => {
            if c > d {
                // European: dots are thousands, comma is decimal
                cleaned.replace('.', "").replace(',', ".")
            } else {
                // Anglo: commas are thousands, dot is decimal
                cleaned.replace(',', "")
            }
        }
        (None, Some(_)) => cleaned.replace(',', "."),
        (Some(d), None) => {
            let frac_digits = cleaned.len() - d - 1;
            if frac_digits <= 2 && cleaned.matches('.').count() == 1 {
                cleaned
            } else {
                cleaned.replace('.', "")
            }
        }
        (None, None) => cleaned,
    };

    normalized.parse::<f64>().ok()
}

/// Coerce a cell to a calendar date. Returns None when the cell holds
/// nothing date-like; the caller decides whether that drops the row.
pub fn coerce_date(cell: &Cell, row: usize, warnings: &mut Vec<String>) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Number(n) => {
            let date = date_from_serial(*n);
            if date.is_none() {
                warnings.push(format!("row {}: numeric value {} is not a valid date serial", row, n));
            }
            date
        }
        Cell::Text(s) => parse_date_string(s),
        Cell::Empty | Cell::Bool(_) => None,
    }
}

/// Convert an Excel date serial to a calendar date under the 1899-12-30
/// epoch. Serials outside a plausible window (1900..≈2173) are rejected.
pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    let days = serial.trunc();
    if !(1.0..=100_000.0).contains(&days) {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_days(Days::new(days as u64))
}

/// Try each known string format in order.
pub fn parse_date_string(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Coerce a cell to a month number 1..=12, from a number or a Spanish
/// month name. Out-of-range months are data errors, reported by caller.
pub fn coerce_month(cell: &Cell) -> Option<u32> {
    match cell {
        Cell::Number(n) => {
            let m = n.trunc() as i64;
            if (1..=12).contains(&m) {
                Some(m as u32)
            } else {
                None
            }
        }
        Cell::Text(s) => month_from_name(s),
        _ => None,
    }
}

/// Match a Spanish month name, case-insensitive and trimmed but exact.
/// Substring matching is deliberately avoided: a "Resumen Enero" summary
/// sheet must not pass as the January sheet, and "Géneros" contains
/// "enero".
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().to_lowercase();
    MONTH_NAMES
        .iter()
        .position(|m| lower == *m)
        .map(|i| i as u32 + 1)
}

/// Display name for a month number; callers guarantee 1..=12.
pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month as usize - 1).min(11)]
}

/// Coerce a cell to a bounded year.
pub fn coerce_year(cell: &Cell) -> Option<i32> {
    let y = match cell {
        Cell::Number(n) => n.trunc() as i32,
        Cell::Text(s) => s.trim().parse::<i32>().ok()?,
        _ => return None,
    };
    if (YEAR_MIN..=YEAR_MAX).contains(&y) {
        Some(y)
    } else {
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================
