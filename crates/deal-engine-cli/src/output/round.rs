use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;

/// Round every decimal string in the output tree to `dp` places.
/// Dates, labels and integers are left alone.
pub fn round_decimals(value: &mut Value, dp: u32) {
    match value {
        Value::String(s) => {
            if !s.contains('.') {
                return;
            }
            if let Ok(d) = Decimal::from_str(s) {
                *s = d
                    .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
                    .to_string();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| round_decimals(v, dp)),
        Value::Object(map) => map.values_mut().for_each(|v| round_decimals(v, dp)),
        _ => {}
    }
}
