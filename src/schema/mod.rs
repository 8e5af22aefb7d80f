//! Schema contract: load raw JSON into a domain value with field errors, dump values back out.

pub mod field;
pub mod object;

pub use field::{Field, FieldKind, ValidationRule};
pub use object::ObjectSchema;

use crate::error::FieldErrors;
use serde_json::Value;

pub trait Schema: Send + Sync {
    /// Validate `raw` and build a value. With `existing`, load is partial and merges into it.
    fn load(&self, raw: &Value, existing: Option<&Value>) -> (Value, FieldErrors);

    fn dump(&self, value: &Value) -> Value;

    fn dump_many(&self, values: &[Value]) -> Value {
        Value::Array(values.iter().map(|v| self.dump(v)).collect())
    }

    /// Declared field by name; used to build filter codecs.
    fn field(&self, _name: &str) -> Option<&Field> {
        None
    }

    fn json_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }
}
