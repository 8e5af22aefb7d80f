//! Relational table description: columns and their PostgreSQL types.

use crate::schema::{Field, FieldKind, ObjectSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PgColumn {
    pub name: String,
    /// PostgreSQL type, e.g. `text`, `bigint`, `timestamptz`, `sample.order_status`.
    #[serde(rename = "type")]
    pub pg_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Column has a DB default (serial, `now()`, `gen_random_uuid()`); omitted from inserts when absent.
    #[serde(default)]
    pub has_default: bool,
    /// Never exposed in responses (password hashes, secrets).
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "public".into()
}

fn default_pk() -> String {
    "id".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PgTable {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    #[serde(default = "default_pk")]
    pub primary_key: String,
    pub columns: Vec<PgColumn>,
}

impl PgColumn {
    pub fn new(name: impl Into<String>, pg_type: impl Into<String>) -> Self {
        PgColumn {
            name: name.into(),
            pg_type: pg_type.into(),
            nullable: true,
            has_default: false,
            sensitive: false,
            comment: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Schema field kind for this column's type.
    pub fn kind(&self) -> FieldKind {
        let lower = self.pg_type.to_lowercase();
        if lower.contains("uuid") {
            FieldKind::Uuid
        } else if (lower.starts_with("int") && !lower.starts_with("interval"))
            || lower.ends_with("int")
            || lower.contains("serial")
        {
            FieldKind::Integer
        } else if lower == "real"
            || lower.starts_with("double")
            || lower.starts_with("float")
            || lower.starts_with("numeric")
            || lower.starts_with("decimal")
        {
            FieldKind::Float
        } else if lower.starts_with("bool") {
            FieldKind::Boolean
        } else if lower.starts_with("timestamp") {
            FieldKind::DateTime
        } else if lower.contains("char") || lower == "text" || lower.contains('.') {
            FieldKind::String
        } else {
            FieldKind::Raw
        }
    }

    /// Cast applied to bound parameters. Serial pseudo-types map to their storage type.
    pub fn cast(&self) -> String {
        let lower = self.pg_type.to_lowercase();
        match lower.as_str() {
            "serial" => "integer".into(),
            "bigserial" => "bigint".into(),
            "smallserial" => "smallint".into(),
            _ => self.pg_type.clone(),
        }
    }

    /// Coerce a path id or filter operand to this column's type; `None` when it does not fit.
    pub fn decode(&self, value: &Value) -> Option<Value> {
        match (self.kind(), value) {
            (FieldKind::String, Value::Number(_) | Value::Bool(_)) => Some(Value::String(value.to_string())),
            (kind, _) => Field::new(kind).deserialize(value).ok(),
        }
    }

    /// Select expression: custom enum and numeric types are read back as text.
    pub fn select_expr(&self) -> String {
        let q = super::quoted(&self.name);
        let lower = self.pg_type.to_lowercase();
        if lower.contains('.') || lower.starts_with("numeric") {
            format!("{q}::text AS {q}")
        } else {
            q
        }
    }
}

impl PgTable {
    pub fn new(name: impl Into<String>) -> Self {
        PgTable {
            schema: default_schema(),
            name: name.into(),
            primary_key: default_pk(),
            columns: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn column(mut self, column: PgColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PgColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn pk(&self) -> Option<&PgColumn> {
        self.get(&self.primary_key)
    }

    /// Schema derived from the columns: generated columns are dump-only, sensitive ones load-only,
    /// NOT NULL columns without a default are required.
    pub fn object_schema(&self) -> ObjectSchema {
        self.columns
            .iter()
            .fold(ObjectSchema::new().titled(self.name.clone()), |schema, c| {
                let mut field = Field::new(c.kind());
                field.nullable = c.nullable;
                if c.name == self.primary_key && c.has_default {
                    field = field.dump_only();
                } else if !c.nullable && !c.has_default {
                    field = field.required();
                }
                if c.sensitive {
                    field = field.load_only();
                }
                field.description = c.comment.clone();
                schema.with_field(c.name.clone(), field)
            })
    }
}
