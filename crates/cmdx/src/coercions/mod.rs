//! Built-in coercions.
//!
//! Every handler either returns the converted value or a
//! [`CmdxError::Coercion`] carrying the `cmdx.coercions.into_a(n)` message
//! for its type.

mod collection;
mod numeric;
mod scalar;
mod temporal;

pub use collection::{array, hash};
pub use numeric::{big_decimal, complex, float, integer, rational};
pub use scalar::{boolean, string, symbol, virtual_};
pub use temporal::{date, datetime, time};

use cmdx_types::{CmdxError, Message};

/// Human label for a type tag: `big_decimal` reads as `big decimal`.
pub(crate) fn type_label(type_name: &str) -> String {
    type_name.replace('_', " ")
}

/// The failure raised when `type_name` rejects a value.
pub(crate) fn failure(type_name: &str) -> CmdxError {
    let label = type_label(type_name);
    let key = if label.starts_with(['a', 'e', 'i', 'o', 'u']) {
        "cmdx.coercions.into_an"
    } else {
        "cmdx.coercions.into_a"
    };
    CmdxError::coercion(type_name, Message::key(key).with("type", label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_picks_article_by_vowel() {
        assert_eq!(failure("integer").to_string(), "could not coerce into an integer");
        assert_eq!(failure("float").to_string(), "could not coerce into a float");
        assert_eq!(failure("big_decimal").to_string(), "could not coerce into a big decimal");
    }
}
