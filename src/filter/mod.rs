//! Filter engine: parse the `where` query parameter into per-field operator lists.
//!
//! Parsing is backend-agnostic; each collection adapter applies a [`ParsedFilter`] in its own way
//! (SQL predicates, in-memory matching). Parsing fails open: bad JSON or an undecodable value
//! never rejects the request, the affected filter is just skipped.

pub mod eval;

use crate::schema::{Field, Schema};
use serde_json::{Map, Value};

/// Query parameter carrying the filter expression.
pub const FILTERS_ARG: &str = "where";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    Nin,
    Like,
    ILike,
    Contains,
    Starts,
    Ends,
    Between,
    Regexp,
    /// `$none`: true matches null values, false matches non-null ones.
    IsNull,
}

impl Operator {
    /// Comparison operators every backend understands.
    pub const BASE: &'static [Operator] = &[
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::Eq,
        Operator::Ne,
        Operator::In,
        Operator::Nin,
    ];

    pub const ALL: &'static [Operator] = &[
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::Eq,
        Operator::Ne,
        Operator::In,
        Operator::Nin,
        Operator::Like,
        Operator::ILike,
        Operator::Contains,
        Operator::Starts,
        Operator::Ends,
        Operator::Between,
        Operator::Regexp,
        Operator::IsNull,
    ];

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Operator::ALL.iter().copied().find(|op| op.symbol() == symbol)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Lt => "$lt",
            Operator::Le => "$le",
            Operator::Gt => "$gt",
            Operator::Ge => "$ge",
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Like => "$like",
            Operator::ILike => "$ilike",
            Operator::Contains => "$contains",
            Operator::Starts => "$starts",
            Operator::Ends => "$ends",
            Operator::Between => "$between",
            Operator::Regexp => "$regexp",
            Operator::IsNull => "$none",
        }
    }

    /// Operators whose value is a list and whose elements are decoded one by one.
    pub fn is_list(self) -> bool {
        matches!(self, Operator::In | Operator::Nin | Operator::Between)
    }
}

/// A filterable field: `name` is the item attribute, `query_key` the key used inside `where`.
#[derive(Clone, Debug)]
pub struct FilterSpec {
    pub name: String,
    pub query_key: String,
    pub field: Field,
}

impl FilterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        FilterSpec {
            query_key: name.clone(),
            name,
            field: Field::raw(),
        }
    }

    /// Bare field name resolved against a schema; untyped when the schema has no such field.
    pub fn from_schema(name: &str, schema: Option<&dyn Schema>) -> Self {
        let field = schema
            .and_then(|s| s.field(name))
            .cloned()
            .unwrap_or_else(Field::raw);
        FilterSpec::new(name).with_field(field)
    }

    pub fn with_query_key(mut self, key: impl Into<String>) -> Self {
        self.query_key = key.into();
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.field = field;
        self
    }

    /// Parse this filter's entry from the decoded `where` object.
    /// `Ok(None)` when the key is absent; `Err` when a value fails to decode.
    pub fn parse(
        &self,
        data: &Map<String, Value>,
        supported: &[Operator],
    ) -> Result<Option<ParsedFilter>, String> {
        let Some(raw) = data.get(&self.query_key) else {
            return Ok(None);
        };
        let ops = match raw {
            Value::Object(by_op) => {
                let mut ops = Vec::with_capacity(by_op.len());
                for (symbol, value) in by_op {
                    let Some(op) = Operator::from_symbol(symbol).filter(|op| supported.contains(op))
                    else {
                        continue;
                    };
                    ops.push(FilterOp {
                        op,
                        value: self.decode(op, value)?,
                    });
                }
                ops
            }
            literal => vec![FilterOp {
                op: Operator::Eq,
                value: self.field.deserialize(literal)?,
            }],
        };
        Ok(Some(ParsedFilter {
            name: self.name.clone(),
            query_key: self.query_key.clone(),
            ops,
        }))
    }

    fn decode(&self, op: Operator, value: &Value) -> Result<Value, String> {
        if op == Operator::IsNull {
            return match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err("Not a valid boolean.".into()),
            };
        }
        if !op.is_list() {
            return self.field.deserialize(value);
        }
        let Value::Array(items) = value else {
            return Err("Not a valid list.".into());
        };
        if op == Operator::Between && items.len() != 2 {
            return Err("Between needs exactly two values.".into());
        }
        items
            .iter()
            .map(|v| self.field.deserialize(v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterOp {
    pub op: Operator,
    pub value: Value,
}

/// One active filter of a request: all ops apply to `name` and combine with AND.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFilter {
    pub name: String,
    pub query_key: String,
    pub ops: Vec<FilterOp>,
}

/// Decode the raw `where` parameter. Missing, non-JSON or non-object input yields no filters.
pub fn parse_where(
    raw: Option<&str>,
    specs: &[FilterSpec],
    supported: &[Operator],
) -> Vec<ParsedFilter> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    if specs.is_empty() {
        return Vec::new();
    }
    let data = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(data)) => data,
        Ok(_) => return Vec::new(),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed filter expression");
            return Vec::new();
        }
    };
    tracing::debug!(filters = ?data, "filter resources");
    let mut out = Vec::new();
    for spec in specs {
        match spec.parse(&data, supported) {
            Ok(Some(parsed)) if !parsed.ops.is_empty() => out.push(parsed),
            Ok(_) => {}
            Err(reason) => {
                tracing::debug!(filter = %spec.query_key, %reason, "skipping filter");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use serde_json::json;

    fn int_spec() -> FilterSpec {
        FilterSpec::new("val").with_field(Field::new(FieldKind::Integer))
    }

    #[test]
    fn literal_means_equality_after_decode() {
        let parsed = parse_where(Some(r#"{"val": "22"}"#), &[int_spec()], Operator::BASE);
        assert_eq!(parsed.len(), 1);
        assert_eq!(
            parsed[0].ops,
            vec![FilterOp {
                op: Operator::Eq,
                value: json!(22)
            }]
        );
    }

    #[test]
    fn unknown_and_unsupported_operators_are_ignored() {
        let parsed = parse_where(
            Some(r#"{"val": {"$ge": 3, "$wat": 1, "$like": "x"}}"#),
            &[int_spec()],
            Operator::BASE,
        );
        assert_eq!(parsed[0].ops.len(), 1);
        assert_eq!(parsed[0].ops[0].op, Operator::Ge);
    }

    #[test]
    fn list_operators_decode_each_element() {
        let parsed = parse_where(
            Some(r#"{"val": {"$in": ["1", 2]}}"#),
            &[int_spec()],
            Operator::BASE,
        );
        assert_eq!(parsed[0].ops[0].value, json!([1, 2]));
    }

    #[test]
    fn decode_failure_skips_only_that_filter() {
        let specs = [
            int_spec(),
            FilterSpec::new("login").with_query_key("user"),
        ];
        let parsed = parse_where(
            Some(r#"{"val": "abc", "user": "mike"}"#),
            &specs,
            Operator::BASE,
        );
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "login");
    }

    #[test]
    fn malformed_expression_is_a_no_op() {
        assert!(parse_where(Some("{not json"), &[int_spec()], Operator::BASE).is_empty());
        assert!(parse_where(Some("[1, 2]"), &[int_spec()], Operator::BASE).is_empty());
        assert!(parse_where(None, &[int_spec()], Operator::BASE).is_empty());
    }

    #[test]
    fn between_requires_two_values() {
        let spec = int_spec();
        let data = json!({"val": {"$between": [1]}});
        assert!(spec
            .parse(data.as_object().unwrap(), Operator::ALL)
            .is_err());
    }

    #[test]
    fn schema_field_is_used_as_codec() {
        let schema = crate::schema::ObjectSchema::new()
            .with_field("age", Field::new(FieldKind::Integer));
        let spec = FilterSpec::from_schema("age", Some(&schema));
        assert_eq!(spec.field.kind, FieldKind::Integer);
        let spec = FilterSpec::from_schema("other", Some(&schema));
        assert_eq!(spec.field.kind, FieldKind::Raw);
    }
}
