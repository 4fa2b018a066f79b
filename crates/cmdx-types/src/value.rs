//! Dynamic values carried through attribute evaluation.
//!
//! A [`Value`] is whatever a source produced, a default supplied, a transform
//! returned, or a coercion converted to. Numeric kinds beyond `i64`/`f64` are
//! represented exactly: big decimals as their canonical digit string, rationals
//! as a reduced numerator/denominator pair, complex numbers as a real/imaginary
//! pair.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;

use crate::Context;

/// Insertion-ordered string-keyed map used for hash values and contexts.
pub type Hash = IndexMap<String, Value>;

// ---------------------------------------------------------------------------
// Object: duck-typed receivers
// ---------------------------------------------------------------------------

/// An opaque host object that attribute derivation can read members from.
///
/// Derivation sends the attribute's name to the object via [`respond`]; a
/// `None` answer means the object does not respond to that name.
/// Callable objects are invoked with the task context instead of being read.
///
/// [`respond`]: Object::respond
pub trait Object: fmt::Debug + Send + Sync {
    /// Read the member called `name`.
    fn respond(&self, name: &str) -> Option<Value>;

    fn is_callable(&self) -> bool {
        false
    }

    /// Invoke a callable object. Only consulted when [`is_callable`](Object::is_callable) is true.
    fn call(&self, _context: &Context) -> Value {
        Value::Nil
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Arbitrary precision decimal, kept as a canonical digit string.
    Decimal(String),
    /// Reduced fraction with a positive denominator.
    Rational(i64, i64),
    Complex(f64, f64),
    String(String),
    Symbol(String),
    Array(Vec<Value>),
    Hash(Hash),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Time(DateTime<FixedOffset>),
    /// Inclusive range, used by inclusion/length/numeric validator options.
    Range(Box<Value>, Box<Value>),
    Object(Arc<dyn Object>),
}

impl Value {
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    pub fn range(start: impl Into<Value>, end: impl Into<Value>) -> Self {
        Value::Range(Box::new(start.into()), Box::new(end.into()))
    }

    pub fn object(object: impl Object + 'static) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Build a hash value from key/value pairs.
    pub fn hash<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Hash(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_hash_like(&self) -> bool {
        matches!(self, Value::Hash(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Value::Date(_) | Value::DateTime(_) | Value::Time(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Integer(_)
                | Value::Float(_)
                | Value::Decimal(_)
                | Value::Rational(..)
                | Value::Complex(..)
        )
    }

    /// Short type label, as used in messages and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "big_decimal",
            Value::Rational(..) => "rational",
            Value::Complex(..) => "complex",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Time(_) => "time",
            Value::Range(..) => "range",
            Value::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Real-valued view of any numeric kind. Complex numbers only qualify
    /// when their imaginary part is zero.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.parse().ok(),
            Value::Rational(n, d) => Some(*n as f64 / *d as f64),
            Value::Complex(re, im) if *im == 0.0 => Some(*re),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&Hash> {
        match self {
            Value::Hash(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) | Value::Time(dt) => Some(dt.date_naive()),
            _ => None,
        }
    }

    /// Key lookup on hash values.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_hash().and_then(|map| map.get(key))
    }

    /// Element count for strings (characters), arrays, and hashes.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) | Value::Symbol(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            Value::Hash(map) => Some(map.len()),
            _ => None,
        }
    }

    /// `nil`, whitespace-only strings, and empty collections are blank.
    /// `false` is a value and is not blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::String(s) | Value::Symbol(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Hash(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Render as JSON for logging and serialization helpers.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Nil => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Hash(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Range(start, end) => Json::Array(vec![start.to_json(), end.to_json()]),
            other => Json::String(other.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Rational(an, ad), Value::Rational(bn, bd)) => an == bn && ad == bd,
            (Value::Complex(ar, ai), Value::Complex(br, bi)) => ar == br && ai == bi,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Range(a0, a1), Value::Range(b0, b1)) => a0 == b0 && a1 == b1,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Decimal(d) => f.write_str(d),
            Value::Rational(n, d) => write!(f, "{n}/{d}"),
            Value::Complex(re, im) => {
                let sign = if *im < 0.0 || (*im == 0.0 && im.is_sign_negative()) {
                    '-'
                } else {
                    '+'
                };
                write!(f, "{}{sign}{}i", format_float(*re), format_float(im.abs()))
            }
            Value::String(s) | Value::Symbol(s) => f.write_str(s),
            Value::Array(_) | Value::Hash(_) => write!(f, "{}", self.to_json()),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Value::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S %z")),
            Value::Range(start, end) => write!(f, "{start}..{end}"),
            Value::Object(obj) => write!(f, "{obj:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        i64::try_from(i).map_or(Value::Float(i as f64), Value::Integer)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Hash> for Value {
    fn from(map: Hash) -> Self {
        Value::Hash(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Nil, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Hash(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Point;

    impl Object for Point {
        fn respond(&self, name: &str) -> Option<Value> {
            match name {
                "x" => Some(Value::Integer(3)),
                _ => None,
            }
        }
    }

    #[test]
    fn truthiness_matches_nil_and_false_only() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn blank_detection() {
        assert!(Value::from("  \t").is_blank());
        assert!(Value::Array(vec![]).is_blank());
        assert!(!Value::from("x").is_blank());
        assert!(!Value::Integer(0).is_blank());
        assert!(!Value::Bool(false).is_blank());
    }

    #[test]
    fn display_renders_scalars() {
        assert_eq!(Value::Nil.to_string(), "");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Rational(3, 4).to_string(), "3/4");
        assert_eq!(Value::Complex(1.0, -2.0).to_string(), "1.0-2.0i");
        assert_eq!(Value::range(1, 5).to_string(), "1..5");
    }

    #[test]
    fn json_conversion_preserves_structure() {
        let value = Value::from(json!({"a": [1, 2.5, null], "b": {"c": true}}));
        assert_eq!(value.get("b").and_then(|b| b.get("c")), Some(&Value::Bool(true)));
        assert_eq!(value.to_json(), json!({"a": [1, 2.5, null], "b": {"c": true}}));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Value::object(Point);
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Value::object(Point));
        if let Value::Object(obj) = &a {
            assert_eq!(obj.respond("x"), Some(Value::Integer(3)));
            assert!(obj.respond("y").is_none());
        }
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Decimal("1.25".into()).as_f64(), Some(1.25));
        assert_eq!(Value::Rational(1, 4).as_f64(), Some(0.25));
        assert_eq!(Value::Complex(2.0, 1.0).as_f64(), None);
        assert_eq!(Value::from("abc").len(), Some(3));
    }
}
