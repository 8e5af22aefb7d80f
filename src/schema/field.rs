//! Schema fields: type coercion on load, conversion on dump, and config-driven validation rules.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Wire type of a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Accepts and emits any JSON value unchanged.
    #[default]
    Raw,
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    /// RFC 3339 string on both sides.
    DateTime,
    /// Unix seconds on the wire, RFC 3339 string in the stored value.
    Timestamp,
    /// Unix milliseconds on the wire, RFC 3339 string in the stored value.
    MsTimestamp,
}

/// Per-field validation rules (all optional).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub required: bool,
    pub nullable: bool,
    /// Emitted on dump, ignored on load (e.g. generated ids).
    pub dump_only: bool,
    /// Accepted on load, never emitted on dump (e.g. secrets).
    pub load_only: bool,
    /// Applied on a full load when the field is missing.
    pub default: Option<Value>,
    pub description: Option<String>,
    pub validate: ValidationRule,
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Field {
            kind,
            ..Default::default()
        }
    }

    pub fn raw() -> Self {
        Field::new(FieldKind::Raw)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn dump_only(mut self) -> Self {
        self.dump_only = true;
        self
    }

    pub fn load_only(mut self) -> Self {
        self.load_only = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.validate = rule;
        self
    }

    /// Coerce a wire value into the stored representation and run validation rules.
    pub fn deserialize(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return if self.nullable || self.kind == FieldKind::Raw {
                Ok(Value::Null)
            } else {
                Err("Field may not be null.".into())
            };
        }
        let out = self.coerce(value)?;
        self.check_rules(&out)?;
        Ok(out)
    }

    /// Convert a stored value to its wire representation.
    pub fn serialize(&self, value: &Value) -> Value {
        match self.kind {
            FieldKind::Timestamp | FieldKind::MsTimestamp => {
                let Some(dt) = value
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                else {
                    return value.clone();
                };
                if self.kind == FieldKind::Timestamp {
                    Value::Number(dt.timestamp().into())
                } else {
                    Value::Number(dt.timestamp_millis().into())
                }
            }
            _ => value.clone(),
        }
    }

    /// JSON-schema fragment used for OpenAPI components.
    pub fn json_schema(&self) -> Value {
        let mut out = match self.kind {
            FieldKind::Raw => Map::new(),
            FieldKind::String => object(json!({"type": "string"})),
            FieldKind::Integer => object(json!({"type": "integer"})),
            FieldKind::Float => object(json!({"type": "number"})),
            FieldKind::Boolean => object(json!({"type": "boolean"})),
            FieldKind::Uuid => object(json!({"type": "string", "format": "uuid"})),
            FieldKind::DateTime => object(json!({"type": "string", "format": "date-time"})),
            FieldKind::Timestamp | FieldKind::MsTimestamp => object(json!({"type": "integer"})),
        };
        if self.dump_only {
            out.insert("readOnly".into(), Value::Bool(true));
        }
        if self.load_only {
            out.insert("writeOnly".into(), Value::Bool(true));
        }
        if self.nullable {
            out.insert("nullable".into(), Value::Bool(true));
        }
        if let Some(d) = &self.default {
            let d = match d {
                Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => d.clone(),
                other => Value::String(other.to_string()),
            };
            out.insert("default".into(), d);
        }
        if let Some(desc) = &self.description {
            out.insert("description".into(), Value::String(desc.clone()));
        }
        let rule = &self.validate;
        if let Some(n) = rule.max_length {
            out.insert("maxLength".into(), n.into());
        }
        if let Some(n) = rule.min_length {
            out.insert("minLength".into(), n.into());
        }
        if let Some(p) = &rule.pattern {
            out.insert("pattern".into(), Value::String(p.clone()));
        }
        if let Some(a) = &rule.allowed {
            out.insert("enum".into(), Value::Array(a.clone()));
        }
        if let Some(n) = rule.minimum.and_then(serde_json::Number::from_f64) {
            out.insert("minimum".into(), Value::Number(n));
        }
        if let Some(n) = rule.maximum.and_then(serde_json::Number::from_f64) {
            out.insert("maximum".into(), Value::Number(n));
        }
        Value::Object(out)
    }

    fn coerce(&self, value: &Value) -> Result<Value, String> {
        match self.kind {
            FieldKind::Raw => Ok(value.clone()),
            FieldKind::String => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err("Not a valid string.".into()),
            },
            FieldKind::Integer => as_i64(value)
                .map(|n| Value::Number(n.into()))
                .ok_or_else(|| "Not a valid integer.".into()),
            FieldKind::Float => as_f64(value)
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "Not a valid number.".into()),
            FieldKind::Boolean => as_bool(value)
                .map(Value::Bool)
                .ok_or_else(|| "Not a valid boolean.".into()),
            FieldKind::Uuid => value
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .map(|u| Value::String(u.hyphenated().to_string()))
                .ok_or_else(|| "Not a valid UUID.".into()),
            FieldKind::DateTime => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Value::String(rfc3339(dt.with_timezone(&Utc))))
                .ok_or_else(|| "Not a valid datetime.".into()),
            FieldKind::Timestamp | FieldKind::MsTimestamp => {
                let invalid = || "Not a valid timestamp.".to_string();
                // Whole numbers decode exactly; floats only carry fractional input.
                if let Some(n) = as_i64(value).filter(|n| *n != 0) {
                    let dt = if self.kind == FieldKind::MsTimestamp {
                        DateTime::<Utc>::from_timestamp_millis(n)
                    } else {
                        DateTime::<Utc>::from_timestamp(n, 0)
                    };
                    return dt.map(|dt| Value::String(rfc3339(dt))).ok_or_else(invalid);
                }
                let secs = as_f64(value).filter(|n| *n != 0.0).ok_or_else(invalid)?;
                let secs = if self.kind == FieldKind::MsTimestamp {
                    secs / 1e3
                } else {
                    secs
                };
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9).round() as u32;
                DateTime::<Utc>::from_timestamp(whole as i64, nanos.min(999_999_999))
                    .map(|dt| Value::String(rfc3339(dt)))
                    .ok_or_else(invalid)
            }
        }
    }

    fn check_rules(&self, v: &Value) -> Result<(), String> {
        let rule = &self.validate;
        if let Some(format) = &rule.format {
            check_format(v, format)?;
        }
        if let (Some(max), Some(s)) = (rule.max_length, v.as_str()) {
            if s.chars().count() > max as usize {
                return Err(format!("Longer than maximum length {}.", max));
            }
        }
        if let (Some(min), Some(s)) = (rule.min_length, v.as_str()) {
            if s.chars().count() < min as usize {
                return Err(format!("Shorter than minimum length {}.", min));
            }
        }
        if let (Some(pattern), Some(s)) = (&rule.pattern, v.as_str()) {
            let re = Regex::new(pattern).map_err(|_| "Invalid pattern.".to_string())?;
            if !re.is_match(s) {
                return Err("String does not match expected pattern.".into());
            }
        }
        if let Some(allowed) = &rule.allowed {
            if !allowed.iter().any(|a| values_equal(v, a)) {
                return Err("Not a valid choice.".into());
            }
        }
        if let (Some(min), Some(n)) = (rule.minimum, v.as_f64()) {
            if n < min {
                return Err(format!("Must be greater than or equal to {}.", min));
            }
        }
        if let (Some(max), Some(n)) = (rule.maximum, v.as_f64()) {
            if n > max {
                return Err(format!("Must be less than or equal to {}.", max));
            }
        }
        Ok(())
    }
}

fn object(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(v: &Value, format: &str) -> Result<(), String> {
    let Some(s) = v.as_str() else { return Ok(()) };
    match format.to_lowercase().as_str() {
        "email" => {
            if !s.contains('@') || s.len() < 3 {
                return Err("Not a valid email address.".into());
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err("Not a valid UUID.".into());
            }
        }
        _ => {}
    }
    Ok(())
}
