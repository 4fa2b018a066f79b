//! Integer, float, rational, complex, and big decimal coercions.
//!
//! Text is parsed strictly: surrounding whitespace and `_` digit separators
//! are accepted, trailing garbage is not.

use once_cell::sync::Lazy;
use regex::Regex;

use cmdx_types::{Result, Value};

use super::failure;
use crate::coercion::CoercionOptions;

const DEFAULT_PRECISION: usize = 14;
const MAX_EXPONENT: i64 = 1_000;

static DECIMAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-])?(\d+(?:_\d+)*)?(?:\.(\d+(?:_\d+)*))?(?:[eE]([+-]?\d+))?$").unwrap()
});

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let lower = body.to_ascii_lowercase();
    let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else {
        (10, lower.as_str())
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    let cleaned = digits.replace('_', "");
    let magnitude = i64::from_str_radix(&cleaned, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Decimal text split into sign, significant digits, and the position of the
/// decimal point relative to the start of the digits.
struct Decimal {
    negative: bool,
    digits: String,
    point: i64,
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let caps = DECIMAL.captures(text.trim())?;
    let whole = caps.get(2).map_or("", |m| m.as_str()).replace('_', "");
    let frac = caps.get(3).map_or("", |m| m.as_str()).replace('_', "");
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let exponent: i64 = match caps.get(4) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    if exponent.abs() > MAX_EXPONENT {
        return None;
    }
    Some(Decimal {
        negative: caps.get(1).is_some_and(|m| m.as_str() == "-"),
        digits: format!("{whole}{frac}"),
        point: whole.len() as i64 + exponent,
    })
}

impl Decimal {
    /// Plain notation without exponent, trailing fraction zeros, or leading
    /// integer zeros.
    fn canonical(&self) -> String {
        let digits = &self.digits;
        let len = digits.len() as i64;
        let (int_part, frac_part) = if self.point <= 0 {
            (
                "0".to_string(),
                format!("{}{digits}", "0".repeat(self.point.unsigned_abs() as usize)),
            )
        } else if self.point >= len {
            (
                format!("{digits}{}", "0".repeat((self.point - len) as usize)),
                String::new(),
            )
        } else {
            let (i, f) = digits.split_at(self.point as usize);
            (i.to_string(), f.to_string())
        };
        let int_part = int_part.trim_start_matches('0');
        let int_part = if int_part.is_empty() { "0" } else { int_part };
        let frac_part = frac_part.trim_end_matches('0');
        let body = if frac_part.is_empty() {
            int_part.to_string()
        } else {
            format!("{int_part}.{frac_part}")
        };
        if self.negative && body.chars().any(|c| c.is_ascii_digit() && c != '0') {
            format!("-{body}")
        } else {
            body
        }
    }

    /// Exact fraction, when numerator and denominator fit in `i64`.
    fn to_rational(&self) -> Option<(i64, i64)> {
        let digits = self.digits.trim_start_matches('0');
        let scale = self.digits.len() as i64 - self.point;
        let mut numerator: i64 = if digits.is_empty() { 0 } else { digits.parse().ok()? };
        let mut denominator: i64 = 1;
        if scale > 0 {
            denominator = 10_i64.checked_pow(u32::try_from(scale).ok()?)?;
        } else if scale < 0 {
            numerator = numerator.checked_mul(10_i64.checked_pow(u32::try_from(-scale).ok()?)?)?;
        }
        if self.negative {
            numerator = -numerator;
        }
        Some(reduce(numerator, denominator))
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn reduce(numerator: i64, denominator: i64) -> (i64, i64) {
    let divisor = gcd(numerator, denominator).max(1);
    let (mut n, mut d) = (numerator / divisor, denominator / divisor);
    if d < 0 {
        n = -n;
        d = -d;
    }
    (n, d)
}

fn parse_float(text: &str) -> Option<f64> {
    if let Some(decimal) = parse_decimal(text) {
        return decimal.canonical().parse().ok();
    }
    parse_integer(text).map(|i| i as f64)
}

fn parse_rational(text: &str) -> Option<(i64, i64)> {
    match text.split_once('/') {
        Some((num, den)) => {
            let (nn, nd) = parse_decimal(num)?.to_rational()?;
            let (dn, dd) = parse_decimal(den)?.to_rational()?;
            if dn == 0 {
                return None;
            }
            Some(reduce(nn.checked_mul(dd)?, nd.checked_mul(dn)?))
        }
        None => parse_decimal(text)?.to_rational(),
    }
}

/// Forms: `a`, `bi`, `a+bi`, `a-bi`, with `i` alone meaning `1i`.
fn parse_complex(text: &str) -> Option<(f64, f64)> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let Some(body) = compact.strip_suffix('i') else {
        return Some((parse_float(&compact)?, 0.0));
    };
    let bytes = body.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&i| matches!(bytes[i], b'+' | b'-') && !matches!(bytes[i - 1], b'e' | b'E'));
    let (real, imaginary) = match split {
        Some(i) => (parse_float(&body[..i])?, &body[i..]),
        None => (0.0, body),
    };
    let imaginary = match imaginary {
        "" | "+" => 1.0,
        "-" => -1.0,
        other => parse_float(other)?,
    };
    Some((real, imaginary))
}

fn float_to_rational(f: f64) -> Option<(i64, i64)> {
    if !f.is_finite() {
        return None;
    }
    parse_decimal(&f.to_string())?.to_rational()
}

fn round_significant(f: f64, precision: usize) -> Option<String> {
    if !f.is_finite() {
        return None;
    }
    let formatted = format!("{:.*e}", precision.max(1) - 1, f);
    parse_decimal(&formatted).map(|d| d.canonical())
}

fn truncate(f: f64) -> Option<i64> {
    if !f.is_finite() || f.abs() >= 9.223_372_036_854_776e18 {
        return None;
    }
    Some(f.trunc() as i64)
}

// ---------------------------------------------------------------------------
// Coercions
// ---------------------------------------------------------------------------

pub fn integer(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    let out = match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) => truncate(*f),
        Value::Decimal(d) => parse_decimal(d).and_then(|d| d.canonical().parse::<f64>().ok()).and_then(truncate),
        Value::Rational(n, d) => Some(n / d),
        Value::Complex(re, im) if *im == 0.0 => truncate(*re),
        Value::String(s) => parse_integer(s),
        _ => None,
    };
    out.map(Value::Integer).ok_or_else(|| failure("integer"))
}

pub fn float(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    let out = match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Decimal(d) => d.parse().ok(),
        Value::Rational(n, d) => Some(*n as f64 / *d as f64),
        Value::Complex(re, im) if *im == 0.0 => Some(*re),
        Value::String(s) => parse_float(s),
        _ => None,
    };
    out.map(Value::Float).ok_or_else(|| failure("float"))
}

pub fn rational(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    let out = match value {
        Value::Integer(i) => Some((*i, 1)),
        Value::Float(f) => float_to_rational(*f),
        Value::Decimal(d) => parse_decimal(d).and_then(|d| d.to_rational()),
        Value::Rational(n, d) => Some((*n, *d)),
        Value::Complex(re, im) if *im == 0.0 => float_to_rational(*re),
        Value::String(s) => parse_rational(s),
        _ => None,
    };
    out.map(|(n, d)| Value::Rational(n, d))
        .ok_or_else(|| failure("rational"))
}

pub fn complex(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    let out = match value {
        Value::Complex(re, im) => Some((*re, *im)),
        Value::String(s) => parse_complex(s),
        other => other.as_f64().map(|re| (re, 0.0)),
    };
    out.map(|(re, im)| Value::Complex(re, im))
        .ok_or_else(|| failure("complex"))
}

pub fn big_decimal(value: &Value, options: &CoercionOptions) -> Result<Value> {
    let precision = options.precision.unwrap_or(DEFAULT_PRECISION);
    let out = match value {
        Value::Decimal(d) => Some(d.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => round_significant(*f, precision),
        Value::Rational(n, d) => round_significant(*n as f64 / *d as f64, precision),
        Value::String(s) => parse_decimal(s).map(|d| d.canonical()),
        _ => None,
    };
    out.map(Value::Decimal).ok_or_else(|| failure("big_decimal"))
}
