//! Fixed-format calendar dates

use chrono::NaiveDate;

use crate::error::{Result, TradeflowError};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a date in exactly `YYYY-MM-DD` form.
///
/// chrono alone accepts unpadded and space-padded months and days, so the
/// layout is checked byte by byte first.
pub fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    let bytes = value.as_bytes();
    let fixed_layout = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !fixed_layout {
        return Err(TradeflowError::InvalidDate(value.to_string()));
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| TradeflowError::InvalidDate(value.to_string()))
}
