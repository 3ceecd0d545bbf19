use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;
use vhl_core::errors::{ErrorInfo, LabError};

use crate::metadata::Metadata;

/// Placeholder bound to declared `str` parameters that have no default.
pub const STR_PLACEHOLDER: &str = "dummy_string";

/// Parameter values keyed by name, always iterated in name order.
pub type Params = BTreeMap<String, ParamValue>;

/// Declared type of a template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Float,
    Int,
    Str,
    Bool,
}

impl ParamType {
    /// Type-appropriate stand-in used when no default is declared.
    pub fn placeholder(self) -> ParamValue {
        match self {
            ParamType::Float => ParamValue::Float(0.0),
            ParamType::Int => ParamValue::Int(0),
            ParamType::Str => ParamValue::Str(STR_PLACEHOLDER.into()),
            ParamType::Bool => ParamValue::Bool(false),
        }
    }

    fn accepts(self, value: &ParamValue) -> bool {
        matches!(
            (self, value),
            (ParamType::Float, ParamValue::Float(_))
                | (ParamType::Float, ParamValue::Int(_))
                | (ParamType::Int, ParamValue::Int(_))
                | (ParamType::Str, ParamValue::Str(_))
                | (ParamType::Bool, ParamValue::Bool(_))
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ParamType::Float => "float",
            ParamType::Int => "int",
            ParamType::Str => "str",
            ParamType::Bool => "bool",
        }
    }
}

/// A single typed parameter value.
///
/// Untagged so that JSON and YAML scalars map onto it directly. Variant
/// order matters: integers must be tried before floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Converts a caller supplied JSON scalar.
    pub fn from_json(name: &str, value: &Value) -> Result<Self, LabError> {
        match value {
            Value::Bool(flag) => Ok(ParamValue::Bool(*flag)),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Ok(ParamValue::Int(int))
                } else if let Some(float) = number.as_f64() {
                    Ok(ParamValue::Float(float))
                } else {
                    Err(param_error(
                        "params.out_of_range",
                        name,
                        format!("number {number} does not fit a 64-bit value"),
                    ))
                }
            }
            Value::String(text) => Ok(ParamValue::Str(text.clone())),
            other => Err(param_error(
                "params.not_scalar",
                name,
                format!("expected a scalar value, found {other}"),
            )),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(value) => Some(*value as f64),
            ParamValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Bool(flag) => Value::Bool(*flag),
            ParamValue::Int(value) => Value::from(*value),
            ParamValue::Float(value) => Value::from(*value),
            ParamValue::Str(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(flag) => write!(f, "{flag}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Str(text) => f.write_str(text),
        }
    }
}

/// Declaration of a parameter inside a template's metadata block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Unrecognised type names leave the parameter untyped.
    #[serde(
        default,
        rename = "type",
        deserialize_with = "lenient_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<ParamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    /// Inclusive lower bound for numeric parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// Value used when a caller does not supply one.
    pub fn fallback(&self) -> Option<ParamValue> {
        self.default
            .clone()
            .or_else(|| self.kind.map(ParamType::placeholder))
    }

    fn check(&self, name: &str, value: &ParamValue) -> Result<(), LabError> {
        if let Some(kind) = self.kind {
            if !kind.accepts(value) {
                return Err(param_error(
                    "params.type_mismatch",
                    name,
                    format!("expected {}, got {value:?}", kind.as_str()),
                ));
            }
        }
        if let Some(number) = value.as_f64() {
            if let Some(min) = self.min {
                if number < min {
                    return Err(param_error(
                        "params.below_min",
                        name,
                        format!("{number} is below the minimum {min}"),
                    ));
                }
            }
            if let Some(max) = self.max {
                if number > max {
                    return Err(param_error(
                        "params.above_max",
                        name,
                        format!("{number} is above the maximum {max}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn lenient_type<'de, D>(deserializer: D) -> Result<Option<ParamType>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match serde_json::from_value::<ParamType>(raw.clone()) {
        Ok(kind) => Ok(Some(kind)),
        Err(_) => {
            warn!(declared = %raw, "unknown parameter type; treating as untyped");
            Ok(None)
        }
    }
}

/// Default parameter set derived from the metadata declarations.
///
/// Declared defaults win; otherwise a type placeholder is used. Parameters
/// declaring neither are left out.
pub fn default_params(metadata: &Metadata) -> Params {
    metadata
        .parameters()
        .into_iter()
        .filter_map(|(name, spec)| spec.fallback().map(|value| (name, value)))
        .collect()
}

/// Overlays caller supplied values on the metadata defaults and checks them.
///
/// Parameters that the metadata does not declare are passed through
/// unchecked so templates may reference ad-hoc values.
pub fn resolve_params(
    metadata: &Metadata,
    supplied: &BTreeMap<String, Value>,
) -> Result<Params, LabError> {
    let specs = metadata.parameters();
    let mut resolved = default_params(metadata);
    for (name, raw) in supplied {
        let value = ParamValue::from_json(name, raw)?;
        if let Some(spec) = specs.get(name) {
            spec.check(name, &value)?;
        }
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}

/// Converts a typed parameter set into JSON values.
pub fn params_to_json(params: &Params) -> BTreeMap<String, Value> {
    params
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

fn param_error(code: &str, name: &str, message: String) -> LabError {
    LabError::Validation(ErrorInfo::new(code, message).with_context("parameter", name))
}
