//! In-memory evaluation of parsed filters against JSON items.

use crate::filter::{FilterOp, Operator, ParsedFilter};
use crate::schema::field::values_equal;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// True when `item` satisfies every op of `filter`. Object items are matched on the filter's
/// field; scalar items are matched as a whole.
pub fn matches(item: &Value, filter: &ParsedFilter) -> bool {
    let target = match item {
        Value::Object(obj) => obj.get(&filter.name).unwrap_or(&Value::Null),
        other => other,
    };
    filter.ops.iter().all(|op| op_matches(target, op))
}

/// Total order used for comparisons and sorting: null < bool < number < string; other
/// combinations are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Ordering for sort: like [`compare_values`] but ranks mismatched types instead of failing.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    compare_values(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn op_matches(target: &Value, filter_op: &FilterOp) -> bool {
    let value = &filter_op.value;
    let ord = || compare_values(target, value);
    match filter_op.op {
        Operator::Eq => values_equal(target, value),
        Operator::Ne => !values_equal(target, value),
        Operator::Lt => ord() == Some(Ordering::Less),
        Operator::Le => matches!(ord(), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => ord() == Some(Ordering::Greater),
        Operator::Ge => matches!(ord(), Some(Ordering::Greater | Ordering::Equal)),
        Operator::In => in_list(target, value),
        Operator::Nin => !in_list(target, value),
        Operator::Like => like(target, value, false),
        Operator::ILike => like(target, value, true),
        Operator::Contains => match (target, value) {
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
            _ => false,
        },
        Operator::Starts => match (target.as_str(), value.as_str()) {
            (Some(s), Some(prefix)) => s.starts_with(prefix),
            _ => false,
        },
        Operator::Ends => match (target.as_str(), value.as_str()) {
            (Some(s), Some(suffix)) => s.ends_with(suffix),
            _ => false,
        },
        Operator::Between => match value.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                matches!(
                    compare_values(target, low),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    compare_values(target, high),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            _ => false,
        },
        Operator::Regexp => match (target.as_str(), value.as_str()) {
            (Some(s), Some(pattern)) => Regex::new(pattern)
                .map(|re| re.is_match(s))
                .unwrap_or(false),
            _ => false,
        },
        Operator::IsNull => value.as_bool() == Some(target.is_null()),
    }
}

fn in_list(target: &Value, list: &Value) -> bool {
    list.as_array()
        .map(|items| items.iter().any(|i| values_equal(target, i)))
        .unwrap_or(false)
}

/// SQL LIKE semantics: `%` any run, `_` any single char, anchored at both ends.
fn like(target: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Some(s), Some(pattern)) = (target.as_str(), pattern.as_str()) else {
        return false;
    };
    let mut re = String::with_capacity(pattern.len() + 8);
    if case_insensitive {
        re.push_str("(?i)");
    }
    re.push('^');
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map(|re| re.is_match(s)).unwrap_or(false)
}
