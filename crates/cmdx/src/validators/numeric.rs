use cmdx_types::{CmdxError, Message, Result, Value};

use super::check_measure;
use crate::validator::ValidatorOptions;

/// Bounds checks on any real-valued number.
pub fn numeric(value: &Value, options: &ValidatorOptions) -> Result<()> {
    match value.as_f64() {
        Some(n) if !n.is_nan() => check_measure("numeric", n, options),
        _ => {
            let message = options
                .message_for(&["nil"])
                .unwrap_or_else(|| Message::key("cmdx.validators.numeric.nil_value"));
            Err(CmdxError::validation("numeric", message))
        }
    }
}
