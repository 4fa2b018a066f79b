//! Built-in validators.

mod format;
mod inclusion;
mod length;
mod numeric;
mod presence;

use std::cmp::Ordering;

use cmdx_types::{CmdxError, Message, Result, Value};

use crate::validator::ValidatorOptions;

pub use format::format;
pub use inclusion::{exclusion, inclusion};
pub use length::length;
pub use numeric::numeric;
pub use presence::presence;

/// Order two values of comparable kinds: numbers with numbers, text with
/// text, dates and times with each other.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x) | Value::Symbol(x), Value::String(y) | Value::Symbol(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::DateTime(x) | Value::Time(x), Value::DateTime(y) | Value::Time(y)) => Some(x.cmp(y)),
        (Value::Date(_), _) | (_, Value::Date(_)) => a.as_date()?.partial_cmp(&b.as_date()?),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Range options as `(start, end)`.
pub(crate) fn bounds<'a>(validator: &str, key: &str, value: &'a Value) -> Result<(&'a Value, &'a Value)> {
    match value {
        Value::Range(start, end) => Ok((start, end)),
        other => Err(CmdxError::Argument(format!(
            "{validator} option '{key}' must be a range, got {}",
            other.type_name()
        ))),
    }
}

fn number(validator: &str, key: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        CmdxError::Argument(format!(
            "{validator} option '{key}' must be numeric, got {}",
            value.type_name()
        ))
    })
}

/// Shared rules of the `length` and `numeric` validators, checked against an
/// already measured quantity. Exactly one rule applies, in this order:
/// `within`/`in`, `not_within`/`not_in`, `min` with `max`, `min`, `max`,
/// `is`, `is_not`.
pub(crate) fn check_measure(validator: &'static str, measure: f64, options: &ValidatorOptions) -> Result<()> {
    let reject = |rule: &str, args: &[(&str, &Value)]| -> CmdxError {
        let message = options.message_for(&[rule]).unwrap_or_else(|| {
            args.iter().fold(
                Message::key(format!("cmdx.validators.{validator}.{rule}")),
                |msg, (name, value)| msg.with(*name, value),
            )
        });
        CmdxError::validation(validator, message)
    };

    if let Some(range) = options.get_any(&["within", "in"]) {
        let (min, max) = bounds(validator, "within", range)?;
        let (lo, hi) = (number(validator, "within", min)?, number(validator, "within", max)?);
        if measure < lo || measure > hi {
            return Err(reject("within", &[("min", min), ("max", max)]));
        }
    } else if let Some(range) = options.get_any(&["not_within", "not_in"]) {
        let (min, max) = bounds(validator, "not_within", range)?;
        let (lo, hi) = (number(validator, "not_within", min)?, number(validator, "not_within", max)?);
        if measure >= lo && measure <= hi {
            return Err(reject("not_within", &[("min", min), ("max", max)]));
        }
    } else if let (Some(min), Some(max)) = (options.get("min"), options.get("max")) {
        let (lo, hi) = (number(validator, "min", min)?, number(validator, "max", max)?);
        if measure < lo || measure > hi {
            return Err(reject("within", &[("min", min), ("max", max)]));
        }
    } else if let Some(min) = options.get("min") {
        if measure < number(validator, "min", min)? {
            return Err(reject("min", &[("min", min)]));
        }
    } else if let Some(max) = options.get("max") {
        if measure > number(validator, "max", max)? {
            return Err(reject("max", &[("max", max)]));
        }
    } else if let Some(is) = options.get("is") {
        if measure != number(validator, "is", is)? {
            return Err(reject("is", &[("is", is)]));
        }
    } else if let Some(is_not) = options.get("is_not") {
        if measure == number(validator, "is_not", is_not)? {
            return Err(reject("is_not", &[("is_not", is_not)]));
        }
    } else {
        return Err(CmdxError::Argument(format!(
            "unknown {validator} validator options given"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn compare_mixed_numeric_kinds() {
        assert_eq!(compare(&Value::Integer(2), &Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(compare(&Value::Rational(1, 2), &Value::Float(0.5)), Some(Ordering::Equal));
        assert_eq!(compare(&Value::from("b"), &Value::from("a")), Some(Ordering::Greater));
        assert_eq!(compare(&Value::from("1"), &Value::Integer(1)), None);
    }

    #[test]
    fn compare_dates() {
        let a = Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let b = Value::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(compare(&a, &b), Some(Ordering::Less));
    }

    #[test]
    fn measure_requires_a_rule() {
        let err = check_measure("length", 3.0, &ValidatorOptions::new()).unwrap_err();
        assert!(matches!(err, CmdxError::Argument(_)));
    }

    #[test]
    fn min_and_max_together_report_within() {
        let opts = ValidatorOptions::new().set("min", 2).set("max", 4);
        let err = check_measure("numeric", 5.0, &opts).unwrap_err();
        assert_eq!(err.to_string(), "must be within 2 and 4");
        assert!(check_measure("numeric", 3.0, &opts).is_ok());
    }

    #[test]
    fn non_range_within_is_an_argument_error() {
        let opts = ValidatorOptions::new().set("within", 3);
        let err = check_measure("length", 3.0, &opts).unwrap_err();
        assert!(matches!(err, CmdxError::Argument(_)));
    }
}
