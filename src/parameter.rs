//! Declarative parameter descriptions.
//!
//! A [`ParameterSpec`] describes one instrument-controllable quantity: the SCPI
//! command behind it, how values are formatted on the wire, the type exposed
//! to callers, its unit, whether it may be read and/or written, a cosmetic
//! group tag, and an optional mapping between wire tokens and readable labels.
//!
//! Specs are pure metadata. Building one never talks to the instrument.
//!
//! # Example
//!
//! ```rust
//! use fieldfox::parameter::{Access, ParameterSpec, Unit, ValueType};
//!
//! let span = ParameterSpec::scpi("span", "SENS1:FREQ:SPAN", "%d", ValueType::Float)
//!     .unwrap()
//!     .with_unit(Unit::Hz)
//!     .with_group("sweep");
//!
//! assert_eq!(span.access(), Access::GetSet);
//! assert_eq!(span.command(), Some("SENS1:FREQ:SPAN"));
//! ```

use crate::error::{DriverError, DriverResult};
use crate::format::{integral_to_i64, parse_bool, parse_finite, parse_integer, FormatSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Values
// =============================================================================

/// Semantic type of a parameter as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Signed integer (`i64`)
    Int,
    /// Floating point (`f64`)
    Float,
    /// Text, including mapped labels
    Str,
    /// On/off state
    Bool,
}

impl ValueType {
    /// Lowercase name used in listings and error messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::Bool => "bool",
        }
    }

    /// Convert a caller-supplied value to this type.
    ///
    /// Numeric values convert between `Int` and `Float`; strings convert to any
    /// type they parse as. Non-finite floats, fractional or out-of-range values
    /// for `Int`, and anything else are rejected with `None`.
    pub fn coerce(self, value: ParamValue) -> Option<ParamValue> {
        match (self, value) {
            (ValueType::Int, ParamValue::Int(i)) => Some(ParamValue::Int(i)),
            (ValueType::Int, ParamValue::Float(v)) => integral_to_i64(v).map(ParamValue::Int),
            (ValueType::Int, ParamValue::Str(s)) => parse_integer(&s).map(ParamValue::Int),
            (ValueType::Float, ParamValue::Float(v)) if v.is_finite() => Some(ParamValue::Float(v)),
            (ValueType::Float, ParamValue::Int(i)) => Some(ParamValue::Float(i as f64)),
            (ValueType::Float, ParamValue::Str(s)) => parse_finite(&s).map(ParamValue::Float),
            (ValueType::Bool, ParamValue::Bool(b)) => Some(ParamValue::Bool(b)),
            (ValueType::Bool, ParamValue::Int(i)) if i == 0 || i == 1 => {
                Some(ParamValue::Bool(i == 1))
            }
            (ValueType::Bool, ParamValue::Str(s)) => parse_bool(&s).map(ParamValue::Bool),
            (ValueType::Str, ParamValue::Str(s)) => Some(ParamValue::Str(s)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parameter value.
///
/// Serialized untagged, so JSON `true`, `3`, `2.5` and `"sweep"` map onto the
/// matching variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// On/off state
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text or mapped label
    Str(String),
}

impl ParamValue {
    /// The text of a `Str` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Read/write permissions of a parameter. Every parameter is readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    /// Read-only
    Get,
    /// Readable and writable
    GetSet,
}

impl Access {
    /// Whether writes are allowed.
    pub fn can_set(self) -> bool {
        self == Access::GetSet
    }
}

/// Physical unit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// Hertz
    Hz,
    /// Decibel-milliwatts
    #[serde(rename = "dBm")]
    Dbm,
    /// Seconds
    #[serde(rename = "s")]
    Seconds,
}

impl Unit {
    /// Symbol printed after values.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Hz => "Hz",
            Unit::Dbm => "dBm",
            Unit::Seconds => "s",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Bidirectional mapping between SCPI enum tokens and readable labels.
///
/// Order follows declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueMap {
    entries: Vec<(String, String)>,
}

impl ValueMap {
    /// Build a map from `(token, label)` pairs.
    ///
    /// Tokens and labels must each be unique so the mapping stays invertible.
    pub fn new(pairs: &[(&str, &str)]) -> DriverResult<Self> {
        let mut entries: Vec<(String, String)> = Vec::with_capacity(pairs.len());
        for (token, label) in pairs {
            if entries.iter().any(|(t, l)| t == token || l == label) {
                return Err(DriverError::InvalidConfiguration(format!(
                    "value map entry '{token}' -> '{label}' is not unique"
                )));
            }
            entries.push((token.to_string(), label.to_string()));
        }
        Ok(Self { entries })
    }

    /// Wire token -> label.
    pub fn label_of(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, l)| l.as_str())
    }

    /// Label -> wire token.
    pub fn token_of(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, l)| l == label)
            .map(|(t, _)| t.as_str())
    }
}

/// Where a parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Resolved SCPI command; reads append `?`, writes append the argument.
    Command(String),
    /// Value fixed at construction, answered without instrument I/O.
    Fixed(ParamValue),
}

// =============================================================================
// ParameterSpec
// =============================================================================

/// Complete description of one registered parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    name: String,
    source: Source,
    format: FormatSpec,
    value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<Unit>,
    access: Access,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_map: Option<ValueMap>,
}

impl ParameterSpec {
    /// Instrument-backed parameter. Defaults to `Access::GetSet`.
    ///
    /// `command` must already be resolved (see [`crate::command::resolve`]).
    pub fn scpi(
        name: impl Into<String>,
        command: impl Into<String>,
        format: &str,
        value_type: ValueType,
    ) -> DriverResult<Self> {
        Ok(Self {
            name: name.into(),
            source: Source::Command(command.into()),
            format: format.parse()?,
            value_type,
            unit: None,
            access: Access::GetSet,
            group: None,
            value_map: None,
        })
    }

    /// Read-only parameter answering a value fixed at construction.
    pub fn fixed(name: impl Into<String>, value: ParamValue) -> Self {
        let (value_type, format) = match &value {
            ParamValue::Bool(_) => (ValueType::Bool, FormatSpec::Integer),
            ParamValue::Int(_) => (ValueType::Int, FormatSpec::Integer),
            ParamValue::Float(_) => (ValueType::Float, FormatSpec::Fixed(6)),
            ParamValue::Str(_) => (ValueType::Str, FormatSpec::Text),
        };
        Self {
            name: name.into(),
            source: Source::Fixed(value),
            format,
            value_type,
            unit: None,
            access: Access::Get,
            group: None,
            value_map: None,
        }
    }

    /// Attach a unit.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Override the default access.
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Attach a cosmetic group tag.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Translate between wire tokens and labels on get and set.
    pub fn with_value_map(mut self, value_map: ValueMap) -> Self {
        self.value_map = Some(value_map);
        self
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command or fixed value behind the parameter.
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Resolved SCPI command, `None` for fixed parameters.
    pub fn command(&self) -> Option<&str> {
        match &self.source {
            Source::Command(cmd) => Some(cmd),
            Source::Fixed(_) => None,
        }
    }

    /// Write format.
    pub fn format(&self) -> FormatSpec {
        self.format
    }

    /// Type exposed to callers.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Physical unit, if any.
    pub fn unit(&self) -> Option<Unit> {
        self.unit
    }

    /// Read/write permissions.
    pub fn access(&self) -> Access {
        self.access
    }

    /// Group tag, if any.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Token/label map, if any.
    pub fn value_map(&self) -> Option<&ValueMap> {
        self.value_map.as_ref()
    }

    /// Turn a reply token into the caller-facing text (label when mapped).
    pub fn decode_token<'a>(&'a self, token: &'a str) -> DriverResult<&'a str> {
        match &self.value_map {
            None => Ok(token),
            Some(map) => map.label_of(token).ok_or_else(|| DriverError::NoMapping {
                parameter: self.name.clone(),
                token: token.to_string(),
            }),
        }
    }

    /// Turn a caller value into the SCPI write argument.
    ///
    /// Coerces to the declared type, maps labels to wire tokens, then applies
    /// the format specifier.
    pub fn encode_value(&self, value: ParamValue) -> DriverResult<String> {
        let found = format!("{value:?}");
        let typed = self
            .value_type
            .coerce(value)
            .ok_or_else(|| DriverError::TypeMismatch {
                parameter: self.name.clone(),
                expected: self.value_type.name(),
                found: found.clone(),
            })?;

        let typed = match (&self.value_map, typed) {
            (Some(map), ParamValue::Str(label)) => {
                let token = map.token_of(&label).ok_or_else(|| DriverError::NoMapping {
                    parameter: self.name.clone(),
                    token: label.clone(),
                })?;
                ParamValue::Str(token.to_string())
            }
            (_, typed) => typed,
        };

        self.format
            .encode(&typed)
            .ok_or_else(|| DriverError::TypeMismatch {
                parameter: self.name.clone(),
                expected: self.value_type.name(),
                found,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn averaging_mode() -> ParameterSpec {
        ParameterSpec::scpi("averaging_mode", "SENS1:AVER:MODE", "%s", ValueType::Str)
            .unwrap()
            .with_group("averaging")
            .with_value_map(ValueMap::new(&[("POIN", "point"), ("SWE", "sweep")]).unwrap())
    }

    #[test]
    fn command_parameters_default_to_get_set() {
        let spec =
            ParameterSpec::scpi("power", "SOUR1:POW", "%.2f", ValueType::Float).unwrap();
        assert_eq!(spec.access(), Access::GetSet);
        assert!(spec.access().can_set());
        assert_eq!(spec.format(), FormatSpec::Fixed(2));
    }

    #[test]
    fn fixed_parameters_are_get_only() {
        let spec = ParameterSpec::fixed("chan", ParamValue::Int(2));
        assert_eq!(spec.access(), Access::Get);
        assert_eq!(spec.value_type(), ValueType::Int);
        assert_eq!(spec.command(), None);
        assert!(!spec.access().can_set());
    }

    #[test]
    fn access_is_read_only_or_read_write() {
        assert_eq!(serde_json::to_value(Access::Get).unwrap(), "get");
        assert_eq!(serde_json::to_value(Access::GetSet).unwrap(), "getset");
        assert!(serde_json::from_str::<Access>("\"set\"").is_err());
        assert!(!Access::Get.can_set());
    }

    #[test]
    fn invalid_format_fails_construction() {
        let result = ParameterSpec::scpi("bad", "SENS1:BAND", "%q", ValueType::Float);
        assert!(matches!(result, Err(DriverError::InvalidConfiguration(_))));
    }

    #[test]
    fn value_map_is_bidirectional() {
        let spec = averaging_mode();
        assert_eq!(spec.encode_value("point".into()).unwrap(), "POIN");
        assert_eq!(spec.decode_token("SWE").unwrap(), "sweep");
    }

    #[test]
    fn value_map_rejects_unknown_entries() {
        let spec = averaging_mode();
        assert!(matches!(
            spec.encode_value("POIN".into()),
            Err(DriverError::NoMapping { .. })
        ));
        assert!(matches!(
            spec.decode_token("point"),
            Err(DriverError::NoMapping { .. })
        ));
    }

    #[test]
    fn value_map_rejects_duplicates() {
        assert!(ValueMap::new(&[("A", "x"), ("A", "y")]).is_err());
        assert!(ValueMap::new(&[("A", "x"), ("B", "x")]).is_err());
    }

    #[test]
    fn encode_coerces_numeric_and_boolean_input() {
        let points =
            ParameterSpec::scpi("points", "SENS1:SWE:POIN", "%d", ValueType::Int).unwrap();
        assert_eq!(points.encode_value(ParamValue::Float(401.0)).unwrap(), "401");
        assert_eq!(points.encode_value("1001".into()).unwrap(), "1001");
        assert!(matches!(
            points.encode_value(ParamValue::Float(1.5)),
            Err(DriverError::TypeMismatch { .. })
        ));

        let power_on = ParameterSpec::scpi("power_on", "OUTP", "%i", ValueType::Bool).unwrap();
        assert_eq!(power_on.encode_value("ON".into()).unwrap(), "1");
        assert_eq!(power_on.encode_value(ParamValue::Bool(false)).unwrap(), "0");
        assert!(power_on.encode_value("maybe".into()).is_err());
    }

    #[test]
    fn numeric_coercion_rejects_unrepresentable_values() {
        assert_eq!(ValueType::Float.coerce(ParamValue::Float(f64::NAN)), None);
        assert_eq!(ValueType::Float.coerce(ParamValue::Float(f64::INFINITY)), None);
        assert_eq!(ValueType::Float.coerce("NaN".into()), None);
        assert_eq!(ValueType::Int.coerce(ParamValue::Float(1.0e30)), None);
        assert_eq!(ValueType::Int.coerce(ParamValue::Float(f64::NEG_INFINITY)), None);
        assert_eq!(
            ValueType::Int.coerce("2.01E+002".into()),
            Some(ParamValue::Int(201))
        );
        assert_eq!(
            ValueType::Float.coerce(ParamValue::Float(1.0e20)),
            Some(ParamValue::Float(1.0e20))
        );
    }

    #[test]
    fn untagged_values_deserialize_from_json() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"[true, 3, 2.5, "sweep"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Bool(true),
                ParamValue::Int(3),
                ParamValue::Float(2.5),
                ParamValue::Str("sweep".into()),
            ]
        );
    }

    #[test]
    fn spec_serializes_with_unit_symbol() {
        let spec = ParameterSpec::scpi("span", "SENS1:FREQ:SPAN", "%d", ValueType::Float)
            .unwrap()
            .with_unit(Unit::Hz);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["unit"], "Hz");
        assert_eq!(json["format"], "%d");
        assert_eq!(json["access"], "getset");
        assert!(json.get("group").is_none());
    }
}
