//! Numeric parsing and comparison helpers.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

/// Tries to read a JSON value as an arbitrary-precision decimal.
pub fn to_big_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Compares two optional values for change detection.
///
/// Values that both parse as decimals compare numerically, so `1.0` and
/// `1.00` count as equal. Everything else compares by text form.
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Value::Null), None) | (None, Some(Value::Null)) => true,
        (Some(a), Some(b)) => match (to_big_decimal(a), to_big_decimal(b)) {
            (Some(a), Some(b)) => a == b,
            _ => text_form(a) == text_form(b),
        },
        _ => false,
    }
}

fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses a monetary amount from its formatted source text.
///
/// Currency symbols and grouping characters are stripped; amounts wrapped
/// in parentheses or prefixed with a minus sign are negative.
pub fn parse_money(s: &str) -> SyncResult<BigDecimal> {
    let trimmed = s.trim();
    let negative =
        trimmed.starts_with('-') || (trimmed.starts_with('(') && trimmed.ends_with(')'));

    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        return Err(sync_error!(
            ErrorKind::ConversionError,
            "Invalid money value",
            format!("no digits in '{s}'")
        ));
    }

    let amount = BigDecimal::from_str(&digits).map_err(|e| {
        sync_error!(
            ErrorKind::ConversionError,
            "Invalid money value",
            format!("'{s}': {e}")
        )
    })?;

    Ok(if negative { -amount } else { amount })
}
