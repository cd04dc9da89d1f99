use chrono::{Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Integer part, optional point, optional fraction. `\d` is any Unicode
/// decimal digit, so full-width input such as `１００` matches too.
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.?\d*").expect("Failed to compile DECIMAL"));
static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d$").expect("Failed to compile DIGIT"));

/// Two decimals, comma-grouped thousands: 1,234.56
pub fn amount(val: f64) -> String {
    let cents = (val.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if val < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}{grouped}.{:02}", cents % 100)
}

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    DIGIT.is_match(c.encode_utf8(&mut buf))
}

/// Value of a Unicode decimal digit. Decimal digits are encoded in
/// contiguous runs made of whole 0..=9 blocks, so the offset from the start
/// of the run gives the value.
fn digit_value(c: char) -> Option<u32> {
    if let Some(d) = c.to_digit(10) {
        return Some(d);
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let mut start = c as u32;
    while let Some(prev) = start.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        start -= 1;
    }
    Some((c as u32 - start) % 10)
}

/// True when `raw` contains a decimal number in any script.
pub fn has_decimal(raw: &str) -> bool {
    DECIMAL.is_match(raw)
}

/// First decimal number in `raw`, e.g. `12.5` from `约12.5元` or `100` from
/// `１００元`.
pub fn first_decimal(raw: &str) -> Option<f64> {
    let found = DECIMAL.find(raw)?;
    let ascii: String = found
        .as_str()
        .chars()
        .map(|c| match c {
            '.' => Some('.'),
            c => digit_value(c).and_then(|d| char::from_digit(d, 10)),
        })
        .collect::<Option<String>>()?;
    ascii.parse().ok()
}

/// Convert an Excel serial date-time to a timestamp, rounded to the second.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::seconds(seconds))
}

/// Spreadsheet column letter for a 0-based index: 0 -> A, 19 -> T, 26 -> AA.
pub fn column_letter(index: u16) -> String {
    let mut n = index as u32 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
