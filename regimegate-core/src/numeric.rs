//! Finite-real coercion shared by every gate and artifact reader.
//!
//! Missing and invalid inputs collapse to the same outcome: `None`. NaN,
//! ±infinity, booleans, nulls and strings that do not parse as a number all
//! mean "no usable value". Numeric strings (`"0.7"`) are accepted because
//! upstream stages round-trip metrics through CSV.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerce a JSON value into a finite `f64`.
///
/// ```
/// use regimegate_core::numeric::parse_finite_real;
/// use serde_json::json;
///
/// assert_eq!(parse_finite_real(&json!(0.5)), Some(0.5));
/// assert_eq!(parse_finite_real(&json!(" 0.25 ")), Some(0.25));
/// assert_eq!(parse_finite_real(&json!("NaN")), None);
/// assert_eq!(parse_finite_real(&json!(null)), None);
/// ```
pub fn parse_finite_real(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(finite),
        Value::String(s) => parse_finite_str(s),
        _ => None,
    }
}

/// Parse a text field (CSV cell, CLI argument) into a finite `f64`.
pub fn parse_finite_str(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().and_then(finite)
}

/// `Some(value)` iff `value` is finite.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Coerce to a finite `f64`, defaulting to 0.0.
pub fn finite_or_zero(value: &Value) -> f64 {
    parse_finite_real(value).unwrap_or(0.0)
}

/// Serde adapters for loosely typed JSON fields.
///
/// Use together with `#[serde(default)]` so an absent key keeps the field's
/// default while a present key of the wrong type degrades instead of failing
/// the whole document.
pub mod lenient {
    use super::*;

    /// Present key → coerced number (`None` if unusable).
    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(parse_finite_real(&value))
    }

    /// Like [`number`], but keeps "key present" distinguishable from
    /// "key absent": absent stays `None`, present becomes `Some(_)`.
    pub fn present_number<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Some(parse_finite_real(&value)))
    }

    /// Present key → string content, `None` for any non-string value.
    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Some(s),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_pass_through() {
        assert_eq!(parse_finite_real(&json!(1)), Some(1.0));
        assert_eq!(parse_finite_real(&json!(-0.125)), Some(-0.125));
    }

    #[test]
    fn numeric_strings_are_parsed() {
        assert_eq!(parse_finite_real(&json!("0.7")), Some(0.7));
        assert_eq!(parse_finite_str("  3 "), Some(3.0));
    }

    #[test]
    fn non_finite_and_non_numeric_collapse_to_none() {
        for value in [
            json!("nan"),
            json!("inf"),
            json!("-Infinity"),
            json!("abc"),
            json!(""),
            json!(true),
            json!(null),
            json!([1.0]),
            json!({"v": 1.0}),
        ] {
            assert_eq!(parse_finite_real(&value), None, "value {value}");
        }
    }

    #[test]
    fn finite_or_zero_defaults() {
        assert_eq!(finite_or_zero(&json!("oops")), 0.0);
        assert_eq!(finite_or_zero(&json!(0.42)), 0.42);
    }

    #[test]
    fn lenient_fields_degrade_instead_of_failing() {
        #[derive(Deserialize)]
        struct Sample {
            #[serde(default, deserialize_with = "lenient::number")]
            score: Option<f64>,
            #[serde(default, deserialize_with = "lenient::present_number")]
            limit: Option<Option<f64>>,
            #[serde(default, deserialize_with = "lenient::text")]
            status: Option<String>,
        }

        let sample: Sample =
            serde_json::from_str(r#"{"score": "x", "limit": null, "status": 3}"#).unwrap();
        assert_eq!(sample.score, None);
        assert_eq!(sample.limit, Some(None));
        assert_eq!(sample.status, None);

        let absent: Sample = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.limit, None);
    }
}
