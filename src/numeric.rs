use primitive_types::U256;
use thiserror::Error;

// The store holds amounts as NUMERIC and timestamps as microsecond epochs.
// Decimal strings are the only transport form for the 256-bit fields; nothing
// in this module touches floating point.

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NumericError {
    #[error("empty decimal string")]
    Empty,
    #[error("invalid decimal digit '{0}'")]
    InvalidDigit(char),
    #[error("decimal value exceeds 256 bits")]
    Overflow,
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

const MICROS_PER_SECOND: i64 = 1_000_000;

pub fn encode(value: &U256) -> String {
    value.to_string()
}

pub fn decode(input: &str) -> Result<U256, NumericError> {
    if input.is_empty() {
        return Err(NumericError::Empty);
    }

    let mut acc = U256::zero();
    for c in input.chars() {
        let digit = c.to_digit(10).ok_or(NumericError::InvalidDigit(c))?;
        acc = acc
            .checked_mul(U256::from(10u8))
            .and_then(|shifted| shifted.checked_add(U256::from(digit)))
            .ok_or(NumericError::Overflow)?;
    }
    Ok(acc)
}

/// Chain timestamps travel through the pipeline in seconds. The expansion to
/// microseconds happens once, at the bulk insert boundary.
pub fn micros_from_seconds(seconds: i64) -> Result<i64, NumericError> {
    if seconds < 0 {
        return Err(NumericError::TimestampOutOfRange(seconds));
    }
    seconds
        .checked_mul(MICROS_PER_SECOND)
        .ok_or(NumericError::TimestampOutOfRange(seconds))
}
