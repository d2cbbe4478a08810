use calamine::Data;
use chrono::{Duration, NaiveDate};

/// Days between spreadsheet serial 0 (1899-12-30) and the Unix epoch.
const SERIAL_UNIX_OFFSET: i64 = 25569;

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Normalize a raw amount cell into a signed float.
///
/// Numeric cells pass through. Text cells may mix `,` and `.` as grouping or
/// decimal separators (regional exports disagree), carry a currency symbol,
/// a leading sign, or accounting parentheses for negatives.
pub fn parse_amount(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_amount_str(s),
        _ => None,
    }
}

fn parse_amount_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (parenthesized, inner) = match trimmed
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
    {
        Some(inner) => (true, inner.trim()),
        None => (false, trimmed),
    };

    let mut s: String = inner
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '£'))
        .collect();

    let signed_negative = s.starts_with('-');
    if signed_negative || s.starts_with('+') {
        s.remove(0);
    }
    if s.is_empty() {
        return None;
    }

    let value: f64 = resolve_separators(&s).parse().ok()?;
    if parenthesized || signed_negative {
        Some(-value)
    } else {
        Some(value)
    }
}

/// Decide which of `,` / `.` is the decimal point and strip the grouping one.
fn resolve_separators(s: &str) -> String {
    let dots = s.matches('.').count();
    let commas = s.matches(',').count();

    match (dots, commas) {
        (0, 0) => s.to_string(),
        (1, 0) => {
            // A dot followed by more than two digits reads as a thousands
            // group, not a decimal point: "1.234" is 1234.
            let frac_len = s.len() - s.rfind('.').unwrap() - 1;
            if frac_len <= 2 {
                s.to_string()
            } else {
                s.replace('.', "")
            }
        }
        // Dots without any comma only group thousands: "1.234.567".
        (_, 0) => s.replace('.', ""),
        // A single comma is a decimal comma: "270,41".
        (0, 1) => s.replace(',', "."),
        (d, 1) if d >= 1 && s.rfind(',') > s.rfind('.') => {
            // "1.234,56": dots group thousands, the comma is the decimal point.
            s.replace('.', "").replace(',', ".")
        }
        (1, c) if c >= 1 && s.rfind('.') > s.rfind(',') => {
            // "1,234.56": commas group thousands, the dot is the decimal point.
            s.replace(',', "")
        }
        _ => {
            tracing::debug!(raw = s, "ambiguous amount separators, assuming European format");
            strip_european(s)
        }
    }
}

/// Ambiguity fallback: drop all dots, then read the last comma as the decimal
/// point — unless its trailing group is three-or-more digits, in which case
/// the commas only group thousands.
fn strip_european(s: &str) -> String {
    let stripped = s.replace('.', "");
    match stripped.rfind(',') {
        Some(idx) if stripped.len() - idx - 1 <= 2 => {
            let (int_part, frac_part) = stripped.split_at(idx);
            format!("{}.{}", int_part.replace(',', ""), &frac_part[1..])
        }
        Some(_) => stripped.replace(',', ""),
        None => stripped,
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Normalize a raw date cell into a calendar date.
///
/// Spreadsheet cells arrive as numeric serials; delimited text arrives as
/// `d/m/y` (two- or four-digit year) or a generic ISO-ish string.
pub fn parse_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::Float(f) => serial_to_date(*f),
        Data::Int(i) => serial_to_date(*i as f64),
        Data::DateTime(dt) => serial_to_date(dt.as_f64()),
        Data::String(s) => parse_date_str(s),
        _ => None,
    }
}

fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    epoch.checked_add_signed(Duration::days(serial as i64 - SERIAL_UNIX_OFFSET))
}

fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('/') {
        let parts: Vec<&str> = raw.split('/').collect();
        if parts.len() != 3 {
            return None;
        }
        let d: u32 = parts[0].trim().parse().ok()?;
        let m: u32 = parts[1].trim().parse().ok()?;
        let year_part = parts[2].trim();
        let mut y: i32 = year_part.parse().ok()?;
        if year_part.len() <= 2 {
            y += 2000;
        }
        return NaiveDate::from_ymd_opt(y, m, d);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d-%m-%Y"))
        .ok()
}
