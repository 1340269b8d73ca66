//! printf-style SCPI value formatting and reply parsing.
//!
//! Parameter declarations carry the format string used to render a value into
//! the argument of a SCPI write (`%d`, `%i`, `%.2f`, `%.8f`, `%s`). Replies are
//! parsed back according to the parameter's declared [`ValueType`].

use crate::error::{DriverError, DriverResult};
use crate::parameter::{ParamValue, ValueType};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Parsed printf format specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSpec {
    /// `%d` / `%i`: integer, floats truncated toward zero.
    Integer,
    /// `%f` / `%.Nf`: fixed point with the given number of decimals.
    Fixed(usize),
    /// `%s`: the value's display form.
    Text,
}

impl FromStr for FormatSpec {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "%d" | "%i" => Ok(FormatSpec::Integer),
            "%s" => Ok(FormatSpec::Text),
            "%f" => Ok(FormatSpec::Fixed(6)),
            _ => s
                .strip_prefix("%.")
                .and_then(|rest| rest.strip_suffix('f'))
                .and_then(|digits| digits.parse::<usize>().ok())
                .map(FormatSpec::Fixed)
                .ok_or_else(|| {
                    DriverError::InvalidConfiguration(format!("unsupported format string '{s}'"))
                }),
        }
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatSpec::Integer => write!(f, "%d"),
            FormatSpec::Fixed(precision) => write!(f, "%.{precision}f"),
            FormatSpec::Text => write!(f, "%s"),
        }
    }
}

impl Serialize for FormatSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FormatSpec {
    /// Render a value as a SCPI write argument.
    ///
    /// Returns `None` when the specifier cannot render the value (text into `%d`).
    pub fn encode(&self, value: &ParamValue) -> Option<String> {
        match (self, value) {
            (FormatSpec::Integer, ParamValue::Int(i)) => Some(i.to_string()),
            (FormatSpec::Integer, ParamValue::Float(v)) => integer_digits(*v),
            (FormatSpec::Integer, ParamValue::Bool(b)) => Some(u8::from(*b).to_string()),
            (FormatSpec::Integer, ParamValue::Str(_)) => None,
            (FormatSpec::Fixed(p), ParamValue::Float(v)) => {
                v.is_finite().then(|| format!("{v:.p$}", p = *p))
            }
            (FormatSpec::Fixed(p), ParamValue::Int(i)) => {
                Some(format!("{:.p$}", *i as f64, p = *p))
            }
            (FormatSpec::Fixed(p), ParamValue::Bool(b)) => {
                Some(format!("{:.p$}", f64::from(u8::from(*b)), p = *p))
            }
            (FormatSpec::Fixed(_), ParamValue::Str(_)) => None,
            (FormatSpec::Text, ParamValue::Bool(b)) => Some(u8::from(*b).to_string()),
            (FormatSpec::Text, other) => Some(other.to_string()),
        }
    }
}

/// Parse a (trimmed) instrument reply into a value of the given type.
pub fn parse_reply(parameter: &str, value_type: ValueType, reply: &str) -> DriverResult<ParamValue> {
    let reply = reply.trim();
    let parse_error = || DriverError::Parse {
        parameter: parameter.to_string(),
        reply: reply.to_string(),
    };

    match value_type {
        ValueType::Float => reply
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| parse_error()),
        ValueType::Int => parse_integer(reply)
            .map(ParamValue::Int)
            .ok_or_else(parse_error),
        ValueType::Bool => parse_bool(reply)
            .map(ParamValue::Bool)
            .ok_or_else(parse_error),
        ValueType::Str => Ok(ParamValue::Str(unquote(reply).to_string())),
    }
}

/// Decimal digits of the integer part of `v`, `None` when `v` is not finite.
///
/// Renders the exact value, so magnitudes beyond `i64` are not clamped.
fn integer_digits(v: f64) -> Option<String> {
    if !v.is_finite() {
        return None;
    }
    let whole = v.trunc();
    // trunc(-0.5) is -0.0, which would print as "-0"
    if whole == 0.0 {
        return Some("0".to_string());
    }
    Some(format!("{whole:.0}"))
}

/// Exact `i64` value of an integral float.
///
/// `None` for fractional, non-finite or out-of-range input.
pub fn integral_to_i64(v: f64) -> Option<i64> {
    // 2^63: exactly representable, unlike i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if v.is_finite() && v.fract() == 0.0 && (-LIMIT..LIMIT).contains(&v) {
        Some(v as i64)
    } else {
        None
    }
}

/// Parse an integer, also accepting the integral exponent form some firmware
/// uses for counts (`+2.01000000000E+002`).
pub fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(integral_to_i64))
}

/// Parse a float, rejecting `NaN` and infinities.
pub fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// SCPI boolean forms: `1`/`0`, `ON`/`OFF`, plus `true`/`false` for CLI input.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_uppercase().as_str() {
        "1" | "ON" | "TRUE" => Some(true),
        "0" | "OFF" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Strip one pair of surrounding double quotes from a SCPI string reply.
pub fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}
