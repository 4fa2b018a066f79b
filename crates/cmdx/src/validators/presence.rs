use cmdx_types::{CmdxError, Message, Result, Value};

use crate::validator::ValidatorOptions;

/// Rejects nil, whitespace-only text, and empty collections. `false` is
/// present.
pub fn presence(value: &Value, options: &ValidatorOptions) -> Result<()> {
    if value.is_blank() {
        let message = options
            .message_for(&[])
            .unwrap_or_else(|| Message::key("cmdx.validators.presence"));
        return Err(CmdxError::validation("presence", message));
    }
    Ok(())
}
