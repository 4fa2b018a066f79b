use cmdx_types::{CmdxError, Message, Result, Value};

use super::{bounds, compare};
use crate::validator::ValidatorOptions;

enum Membership<'a> {
    Of(&'a [Value]),
    Within(&'a Value, &'a Value),
}

impl<'a> Membership<'a> {
    fn from_options(validator: &str, options: &'a ValidatorOptions) -> Result<Self> {
        let set = options.get_any(&["in", "within"]).ok_or_else(|| {
            CmdxError::Argument(format!("{validator} validator requires an 'in' or 'within' option"))
        })?;
        match set {
            Value::Array(items) => Ok(Membership::Of(items)),
            range => {
                let (min, max) = bounds(validator, "in", range)?;
                Ok(Membership::Within(min, max))
            }
        }
    }

    fn contains(&self, value: &Value) -> bool {
        match self {
            Membership::Of(items) => items.contains(value),
            Membership::Within(min, max) => {
                compare(value, min).is_some_and(|o| o.is_ge())
                    && compare(value, max).is_some_and(|o| o.is_le())
            }
        }
    }

    fn reject(&self, validator: &'static str, options: &ValidatorOptions) -> CmdxError {
        let message = match self {
            Membership::Of(items) => options.message_for(&["of", "in"]).unwrap_or_else(|| {
                let values: Vec<String> = items.iter().map(Value::to_string).collect();
                Message::key(format!("cmdx.validators.{validator}.of")).with("values", values.join(", "))
            }),
            Membership::Within(min, max) => options.message_for(&["within", "in"]).unwrap_or_else(|| {
                Message::key(format!("cmdx.validators.{validator}.within"))
                    .with("min", min)
                    .with("max", max)
            }),
        };
        CmdxError::validation(validator, message)
    }
}

/// Value must be a member of the `in` array or fall inside the `in` range.
pub fn inclusion(value: &Value, options: &ValidatorOptions) -> Result<()> {
    let membership = Membership::from_options("inclusion", options)?;
    if membership.contains(value) {
        Ok(())
    } else {
        Err(membership.reject("inclusion", options))
    }
}

/// Inverse of [`inclusion`].
pub fn exclusion(value: &Value, options: &ValidatorOptions) -> Result<()> {
    let membership = Membership::from_options("exclusion", options)?;
    if membership.contains(value) {
        Err(membership.reject("exclusion", options))
    } else {
        Ok(())
    }
}
