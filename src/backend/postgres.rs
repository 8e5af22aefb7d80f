//! PostgreSQL backend: the collection is a [`SelectQuery`] built up by the pipeline and run once.

use crate::backend::CollectionAdapter;
use crate::context::ResourceRequest;
use crate::error::{ApiError, AppError};
use crate::filter::{Operator, ParsedFilter};
use crate::schema::ObjectSchema;
use crate::sort::SortField;
use crate::sql::{delete, insert, update, PgBindValue, PgTable, QueryBuf, SelectQuery};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct PgAdapter {
    pool: PgPool,
    table: Arc<PgTable>,
}

impl PgAdapter {
    pub fn new(pool: PgPool, table: PgTable) -> Self {
        PgAdapter {
            pool,
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &PgTable {
        &self.table
    }

    /// Schema derived from the table's columns.
    pub fn object_schema(&self) -> ObjectSchema {
        self.table.object_schema()
    }

    /// Path id decoded to the primary key's type; an id that cannot be a key addresses nothing.
    fn id_value(&self, id: &str) -> Result<Value, ApiError> {
        let raw = Value::String(id.to_string());
        match self.table.pk() {
            Some(pk) => pk.decode(&raw).ok_or_else(ApiError::not_found),
            None => Ok(raw),
        }
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_optional(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_json))
    }

    async fn query_count(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let n = query.fetch_one(&self.pool).await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

#[async_trait]
impl CollectionAdapter for PgAdapter {
    type Collection = SelectQuery;

    fn operators(&self) -> &'static [Operator] {
        Operator::ALL
    }

    async fn get_many(&self, _request: &ResourceRequest) -> Result<SelectQuery, AppError> {
        Ok(SelectQuery::new(Arc::clone(&self.table)))
    }

    /// Lookup is scoped to the collection query, so conditions set by `get_many` still apply.
    async fn get_one(&self, collection: &SelectQuery, id: &str) -> Result<Option<Value>, AppError> {
        let q = collection
            .clone()
            .where_eq(&self.table.primary_key, self.id_value(id)?)
            .page(0, 1)
            .select();
        match self.query_optional(&q).await? {
            Some(row) => Ok(Some(row)),
            None => Err(ApiError::not_found().into()),
        }
    }

    async fn apply_filter(
        &self,
        collection: SelectQuery,
        filter: &ParsedFilter,
    ) -> Result<SelectQuery, AppError> {
        Ok(collection.filter(filter))
    }

    async fn sort(&self, collection: SelectQuery, sorting: &[SortField]) -> Result<SelectQuery, AppError> {
        Ok(collection.order_by(sorting))
    }

    async fn paginate(
        &self,
        collection: SelectQuery,
        offset: u64,
        limit: u64,
    ) -> Result<(SelectQuery, u64), AppError> {
        let total = self.query_count(&collection.count()).await?;
        Ok((collection.page(offset, limit), total))
    }

    async fn fetch(&self, collection: &SelectQuery) -> Result<Vec<Value>, AppError> {
        self.query_many(&collection.select()).await
    }

    /// Update the row addressed by `id`, or by the item's own key; insert otherwise.
    async fn save(&self, item: Value, id: Option<&str>) -> Result<Value, AppError> {
        let Value::Object(body) = &item else {
            return Err(ApiError::new("Invalid input type.").into());
        };
        let key = match id {
            Some(id) => Some(self.id_value(id)?),
            None => body.get(&self.table.primary_key).filter(|v| !v.is_null()).cloned(),
        };
        let q = match &key {
            Some(key) => update(&self.table, key, body),
            None => insert(&self.table, body),
        };
        self.query_optional(&q)
            .await?
            .ok_or_else(|| ApiError::not_found().into())
    }

    async fn delete(&self, item: &Value, id: Option<&str>) -> Result<(), AppError> {
        let key = match id {
            Some(id) => self.id_value(id)?,
            None => item
                .get(&self.table.primary_key)
                .cloned()
                .ok_or_else(ApiError::not_found)?,
        };
        self.query_optional(&delete(&self.table, &key)).await?;
        Ok(())
    }
}

fn row_to_json(row: &PgRow) -> Value {
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(f64::from(n)) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::PgColumn;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;

    fn adapter() -> PgAdapter {
        // Never connects: every call below fails before reaching the pool.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        PgAdapter::new(
            pool,
            PgTable::new("accounts")
                .column(PgColumn::new("id", "uuid").not_null().with_default())
                .column(PgColumn::new("login", "text")),
        )
    }

    #[tokio::test]
    async fn ids_that_cannot_be_keys_are_not_found() {
        let adapter = adapter();
        let collection = adapter
            .get_many(&ResourceRequest::new(Method::GET, "/accounts/abc"))
            .await
            .unwrap();

        let err = adapter.get_one(&collection, "abc").await.unwrap_err();
        assert_eq!(err.as_api().unwrap().status, StatusCode::NOT_FOUND);

        let err = adapter
            .save(json!({"login": "mike"}), Some("abc"))
            .await
            .unwrap_err();
        assert_eq!(err.as_api().unwrap().status, StatusCode::NOT_FOUND);

        let err = adapter.delete(&json!({}), Some("abc")).await.unwrap_err();
        assert_eq!(err.as_api().unwrap().status, StatusCode::NOT_FOUND);
    }
}
