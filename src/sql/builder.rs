//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE for a [`PgTable`].

use crate::filter::{FilterOp, Operator, ParsedFilter};
use crate::sort::SortField;
use crate::sql::table::{PgColumn, PgTable};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Quote identifier for PostgreSQL (safe: identifiers come from table descriptions only).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

fn placeholder(n: usize, column: &PgColumn) -> String {
    format!("${}::{}", n, column.cast())
}

/// Operands of comparison ops are decoded to the column's type so binds never fail their cast.
/// Text matches and null checks keep their operand as is.
fn typed_op(column: &PgColumn, filter_op: &FilterOp) -> Option<FilterOp> {
    let value = &filter_op.value;
    let value = match filter_op.op {
        Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
            if !value.is_null() =>
        {
            column.decode(value)?
        }
        Operator::In | Operator::Nin | Operator::Between => match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| column.decode(v))
                    .collect::<Option<Vec<_>>>()?,
            ),
            _ => value.clone(),
        },
        _ => value.clone(),
    };
    Some(FilterOp {
        op: filter_op.op,
        value,
    })
}

fn select_list(table: &PgTable) -> String {
    if table.columns.is_empty() {
        return "*".into();
    }
    table
        .columns
        .iter()
        .map(PgColumn::select_expr)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape LIKE wildcards so the value matches literally.
fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Composable SELECT over one table. Conditions accumulate with AND; parameters are numbered
/// in the order conditions are added.
#[derive(Clone, Debug)]
pub struct SelectQuery {
    table: Arc<PgTable>,
    conditions: Vec<String>,
    params: Vec<Value>,
    order: Vec<SortField>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectQuery {
    pub fn new(table: Arc<PgTable>) -> Self {
        SelectQuery {
            table,
            conditions: Vec::new(),
            params: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn table(&self) -> &PgTable {
        &self.table
    }

    fn bind(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// `column = value`; unknown columns are ignored.
    pub fn where_eq(self, column: &str, value: Value) -> Self {
        self.filter(&ParsedFilter {
            name: column.to_string(),
            query_key: column.to_string(),
            ops: vec![FilterOp {
                op: Operator::Eq,
                value,
            }],
        })
    }

    /// Add one predicate per filter op; unknown columns are ignored.
    pub fn filter(mut self, filter: &ParsedFilter) -> Self {
        let table = Arc::clone(&self.table);
        let Some(column) = table.get(&filter.name) else {
            tracing::debug!(column = %filter.name, table = %table.name, "filter on unknown column ignored");
            return self;
        };
        for op in &filter.ops {
            let Some(op) = typed_op(column, op) else {
                tracing::debug!(column = %column.name, op = ?op.op, "filter value does not fit the column type, ignored");
                continue;
            };
            let cond = self.condition(column, &op);
            self.conditions.push(cond);
        }
        self
    }

    fn condition(&mut self, column: &PgColumn, filter_op: &FilterOp) -> String {
        let col = quoted(&column.name);
        let value = &filter_op.value;
        let cmp = |q: &mut Self, sym: &str| {
            let n = q.bind(value.clone());
            format!("{col} {sym} {}", placeholder(n, column))
        };
        let text_match = |q: &mut Self, sym: &str, pattern: String| {
            let n = q.bind(Value::String(pattern));
            format!("{col}::text {sym} ${n}::text")
        };
        match filter_op.op {
            Operator::Eq if value.is_null() => format!("{col} IS NULL"),
            Operator::Ne if value.is_null() => format!("{col} IS NOT NULL"),
            Operator::Eq => cmp(self, "="),
            Operator::Ne => cmp(self, "IS DISTINCT FROM"),
            Operator::Lt => cmp(self, "<"),
            Operator::Le => cmp(self, "<="),
            Operator::Gt => cmp(self, ">"),
            Operator::Ge => cmp(self, ">="),
            Operator::In | Operator::Nin => {
                let items = value.as_array().cloned().unwrap_or_default();
                let negate = filter_op.op == Operator::Nin;
                if items.is_empty() {
                    return if negate { "TRUE".into() } else { "FALSE".into() };
                }
                let list = items
                    .into_iter()
                    .map(|v| {
                        let n = self.bind(v);
                        placeholder(n, column)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                if negate {
                    format!("({col} IS NULL OR {col} NOT IN ({list}))")
                } else {
                    format!("{col} IN ({list})")
                }
            }
            Operator::Between => {
                let items = value.as_array().cloned().unwrap_or_default();
                let [low, high] = items.as_slice() else {
                    return "FALSE".into();
                };
                let a = self.bind(low.clone());
                let b = self.bind(high.clone());
                format!(
                    "{col} BETWEEN {} AND {}",
                    placeholder(a, column),
                    placeholder(b, column)
                )
            }
            Operator::Like => text_match(self, "LIKE", as_text(value)),
            Operator::ILike => text_match(self, "ILIKE", as_text(value)),
            Operator::Contains => {
                text_match(self, "LIKE", format!("%{}%", like_escape(&as_text(value))))
            }
            Operator::Starts => text_match(self, "LIKE", format!("{}%", like_escape(&as_text(value)))),
            Operator::Ends => text_match(self, "LIKE", format!("%{}", like_escape(&as_text(value)))),
            Operator::Regexp => text_match(self, "~", as_text(value)),
            Operator::IsNull => {
                if value.as_bool().unwrap_or(false) {
                    format!("{col} IS NULL")
                } else {
                    format!("{col} IS NOT NULL")
                }
            }
        }
    }

    /// Replace the ordering; unknown columns are skipped.
    pub fn order_by(mut self, sorting: &[SortField]) -> Self {
        self.order = sorting
            .iter()
            .filter(|s| self.table.get(&s.name).is_some())
            .cloned()
            .collect();
        self
    }

    pub fn page(mut self, offset: u64, limit: u64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// SELECT with ordering (primary key as final tiebreaker) and LIMIT/OFFSET.
    pub fn select(&self) -> QueryBuf {
        let table = qualified_table(&self.table.schema, &self.table.name);
        let mut order: Vec<String> = self
            .order
            .iter()
            .map(|s| format!("{} {}", quoted(&s.name), if s.descending { "DESC" } else { "ASC" }))
            .collect();
        if self.table.pk().is_some() && !self.order.iter().any(|s| s.name == self.table.primary_key) {
            order.push(format!("{} ASC", quoted(&self.table.primary_key)));
        }
        let order_clause = if order.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", order.join(", "))
        };
        let limit_clause = self.limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let offset_clause = self.offset.map(|n| format!(" OFFSET {n}")).unwrap_or_default();
        QueryBuf {
            sql: format!(
                "SELECT {} FROM {}{}{}{}{}",
                select_list(&self.table),
                table,
                self.where_clause(),
                order_clause,
                limit_clause,
                offset_clause
            ),
            params: self.params.clone(),
        }
    }

    /// COUNT over the same conditions, ignoring order and paging.
    pub fn count(&self) -> QueryBuf {
        QueryBuf {
            sql: format!(
                "SELECT COUNT(*) FROM {}{}",
                qualified_table(&self.table.schema, &self.table.name),
                self.where_clause()
            ),
            params: self.params.clone(),
        }
    }
}

/// INSERT the body's known columns; absent columns fall back to DB defaults.
pub fn insert(table: &PgTable, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let qualified = qualified_table(&table.schema, &table.name);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &table.columns {
        let Some(v) = body.get(&c.name) else { continue };
        if v.is_null() && c.has_default {
            continue;
        }
        let n = q.push_param(v.clone());
        cols.push(quoted(&c.name));
        placeholders.push(placeholder(n, c));
    }
    q.sql = if cols.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {}",
            qualified,
            select_list(table)
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            qualified,
            cols.join(", "),
            placeholders.join(", "),
            select_list(table)
        )
    };
    q
}

/// UPDATE by primary key: SET the body's known non-key columns. Touches `updated_at` when the
/// table has one. With nothing to set this degrades to a SELECT by key.
pub fn update(table: &PgTable, id: &Value, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let qualified = qualified_table(&table.schema, &table.name);
    let pk = quoted(&table.primary_key);
    let mut sets = Vec::new();
    for c in &table.columns {
        if c.name == table.primary_key || c.name == "updated_at" {
            continue;
        }
        let Some(v) = body.get(&c.name) else { continue };
        let n = q.push_param(v.clone());
        sets.push(format!("{} = {}", quoted(&c.name), placeholder(n, c)));
    }
    let id_ph = |n: usize| match table.pk() {
        Some(c) => placeholder(n, c),
        None => format!("${n}"),
    };
    if sets.is_empty() {
        let n = q.push_param(id.clone());
        q.sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            select_list(table),
            qualified,
            pk,
            id_ph(n)
        );
        return q;
    }
    if table.get("updated_at").is_some() {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    let n = q.push_param(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified,
        sets.join(", "),
        pk,
        id_ph(n),
        select_list(table)
    );
    q
}

/// DELETE by primary key.
pub fn delete(table: &PgTable, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::default();
    let n = q.push_param(id.clone());
    let ph = match table.pk() {
        Some(c) => placeholder(n, c),
        None => format!("${n}"),
    };
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(&table.schema, &table.name),
        quoted(&table.primary_key),
        ph,
        select_list(table)
    );
    q
}
