//! Declarative object schema: a named set of fields.

use crate::error::FieldErrors;
use crate::schema::{Field, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        ObjectSchema::default()
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

impl Schema for ObjectSchema {
    fn load(&self, raw: &Value, existing: Option<&Value>) -> (Value, FieldErrors) {
        let mut errors = FieldErrors::new();
        let Value::Object(input) = raw else {
            errors.insert("_schema".into(), vec!["Invalid input type.".into()]);
            return (existing.cloned().unwrap_or(Value::Null), errors);
        };
        let partial = existing.is_some();
        let mut out: Map<String, Value> = match existing {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };
        for (name, field) in &self.fields {
            if field.dump_only {
                continue;
            }
            match input.get(name) {
                Some(v) => match field.deserialize(v) {
                    Ok(v) => {
                        out.insert(name.clone(), v);
                    }
                    Err(msg) => errors.entry(name.clone()).or_default().push(msg),
                },
                None if partial => {}
                None => {
                    if let Some(d) = &field.default {
                        out.insert(name.clone(), d.clone());
                    } else if field.required {
                        errors
                            .entry(name.clone())
                            .or_default()
                            .push("Missing data for required field.".into());
                    }
                }
            }
        }
        (Value::Object(out), errors)
    }

    fn dump(&self, value: &Value) -> Value {
        let Value::Object(obj) = value else {
            return value.clone();
        };
        let mut out = Map::new();
        for (name, field) in &self.fields {
            if field.load_only {
                continue;
            }
            if let Some(v) = obj.get(name) {
                out.insert(name.clone(), field.serialize(v));
            }
        }
        Value::Object(out)
    }

    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, f)| (name.clone(), f.json_schema()))
            .collect();
        let required: Vec<Value> = self
            .fields
            .iter()
            .filter(|(_, f)| f.required && !f.dump_only)
            .map(|(name, _)| Value::String(name.clone()))
            .collect();
        let mut schema = Map::new();
        schema.insert("type".into(), Value::String("object".into()));
        if let Some(title) = &self.title {
            schema.insert("title".into(), Value::String(title.clone()));
        }
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        Value::Object(schema)
    }
}
