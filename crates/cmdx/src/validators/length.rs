use cmdx_types::{CmdxError, Message, Result, Value};

use super::check_measure;
use crate::validator::ValidatorOptions;

/// Character count of text, element count of arrays and hashes.
pub fn length(value: &Value, options: &ValidatorOptions) -> Result<()> {
    match value.len() {
        Some(len) => check_measure("length", len as f64, options),
        None => {
            let message = options.message_for(&["nil"]).unwrap_or_else(|| {
                Message::key("cmdx.validators.length.nil_value").with("type", value.type_name())
            });
            Err(CmdxError::validation("length", message))
        }
    }
}
