//! Raw row to [`TradeRecord`] conversion
//!
//! Pure functions only. Input rows come from `;`-separated exchange trade
//! files where prices use `.` as the thousands separator and `,` as the
//! decimal separator, and closing times are packed as `HHMMSSmmm`.

use chrono::{NaiveDate, NaiveTime};
use sqlx::types::BigDecimal;
use std::str::FromStr;
use tradeflow_common::parse_iso_date;

use crate::error::{FormatError, TradeField};
use crate::models::TradeRecord;

/// Number of columns in a trade row
pub const COLUMN_COUNT: usize = 11;

const TIME_LEN: usize = 9;

/// Convert one raw row into a typed record.
pub fn transform_row<S: AsRef<str>>(fields: &[S]) -> Result<TradeRecord, FormatError> {
    if fields.len() != COLUMN_COUNT {
        return Err(FormatError::ColumnCount {
            expected: COLUMN_COUNT,
            found: fields.len(),
        });
    }

    let raw = |field: TradeField| fields[field.index()].as_ref();

    Ok(TradeRecord {
        reference_date: parse_date(TradeField::ReferenceDate, raw(TradeField::ReferenceDate))?,
        instrument_code: raw(TradeField::InstrumentCode).to_string(),
        update_action: parse_int(TradeField::UpdateAction, raw(TradeField::UpdateAction))?,
        trade_price: parse_price(raw(TradeField::TradePrice))?,
        traded_quantity: parse_int(TradeField::TradedQuantity, raw(TradeField::TradedQuantity))?,
        closing_time: parse_closing_time(raw(TradeField::ClosingTime))?,
        deal_id: parse_int(TradeField::DealId, raw(TradeField::DealId))?,
        session_type: parse_int(TradeField::SessionType, raw(TradeField::SessionType))?,
        trade_date: parse_date(TradeField::TradeDate, raw(TradeField::TradeDate))?,
        buyer_code: parse_participant(TradeField::BuyerCode, raw(TradeField::BuyerCode))?,
        seller_code: parse_participant(TradeField::SellerCode, raw(TradeField::SellerCode))?,
    })
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(field: TradeField, value: &str) -> Result<NaiveDate, FormatError> {
    parse_iso_date(value).map_err(|_| FormatError::field(field, value, "expected YYYY-MM-DD"))
}

/// Parse a price such as `1.234,56` into `1234.56`.
pub fn parse_price(value: &str) -> Result<BigDecimal, FormatError> {
    let normalized = value.replace('.', "").replace(',', ".");

    let well_formed = !normalized.is_empty()
        && normalized.chars().all(|c| c.is_ascii_digit() || c == '.')
        && normalized.chars().any(|c| c.is_ascii_digit())
        && normalized.matches('.').count() <= 1;
    if !well_formed {
        return Err(FormatError::field(
            TradeField::TradePrice,
            value,
            "not a non-negative decimal",
        ));
    }

    BigDecimal::from_str(&normalized)
        .map_err(|e| FormatError::field(TradeField::TradePrice, value, e.to_string()))
}

/// Decode a `HHMMSSmmm` closing time.
pub fn parse_closing_time(value: &str) -> Result<NaiveTime, FormatError> {
    let invalid = |reason: &str| FormatError::field(TradeField::ClosingTime, value, reason);

    if value.len() != TIME_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected 9 digits HHMMSSmmm"));
    }

    // All ASCII digits, so byte slicing is on char boundaries
    let part = |range: std::ops::Range<usize>| value[range].parse::<u32>().unwrap_or(u32::MAX);
    let (hours, minutes, seconds, millis) = (part(0..2), part(2..4), part(4..6), part(6..9));

    // from_hms_milli_opt would accept second 60 via the leap-second millis range
    if seconds > 59 {
        return Err(invalid("time of day out of range"));
    }
    NaiveTime::from_hms_milli_opt(hours, minutes, seconds, millis)
        .ok_or_else(|| invalid("time of day out of range"))
}

/// Empty means absent; anything else must be an integer.
pub fn parse_participant(field: TradeField, value: &str) -> Result<Option<i64>, FormatError> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_int(field, value).map(Some)
}

fn parse_int<T>(field: TradeField, value: &str) -> Result<T, FormatError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    value
        .parse::<T>()
        .map_err(|e| FormatError::field(field, value, e.to_string()))
}
