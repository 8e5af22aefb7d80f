//! Collection adapters: the storage seam behind a resource.

pub mod memory;
pub mod postgres;

pub use memory::{IdLookup, MemoryAdapter};
pub use postgres::PgAdapter;

use crate::context::ResourceRequest;
use crate::error::AppError;
use crate::filter::{Operator, ParsedFilter};
use crate::sort::SortField;
use async_trait::async_trait;
use serde_json::Value;

/// Storage contract used by the dispatcher. `Collection` is a backend-specific handle: a
/// snapshot of items, or a lazily built query.
#[async_trait]
pub trait CollectionAdapter: Send + Sync + 'static {
    type Collection: Send + Sync + 'static;

    /// Filter operators this backend can evaluate; others are dropped during parsing.
    fn operators(&self) -> &'static [Operator] {
        Operator::BASE
    }

    async fn get_many(&self, request: &ResourceRequest) -> Result<Self::Collection, AppError>;

    /// Item addressed by `id` within `collection`.
    async fn get_one(
        &self,
        collection: &Self::Collection,
        id: &str,
    ) -> Result<Option<Value>, AppError>;

    async fn apply_filter(
        &self,
        collection: Self::Collection,
        filter: &ParsedFilter,
    ) -> Result<Self::Collection, AppError>;

    async fn sort(
        &self,
        collection: Self::Collection,
        sorting: &[SortField],
    ) -> Result<Self::Collection, AppError>;

    /// Restrict to one page; also returns the total before paging.
    async fn paginate(
        &self,
        collection: Self::Collection,
        offset: u64,
        limit: u64,
    ) -> Result<(Self::Collection, u64), AppError>;

    /// Materialize the collection's items.
    async fn fetch(&self, collection: &Self::Collection) -> Result<Vec<Value>, AppError>;

    /// Store `item`. `id` is the path id it was resolved from; `None` creates.
    async fn save(&self, item: Value, id: Option<&str>) -> Result<Value, AppError>;

    /// Remove `item`, addressed by the path id it was resolved from.
    async fn delete(&self, item: &Value, id: Option<&str>) -> Result<(), AppError>;
}

/// Adapter for resources without storage: an empty collection whose items are the raw path ids.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStorage;

#[async_trait]
impl CollectionAdapter for NoStorage {
    type Collection = Vec<Value>;

    async fn get_many(&self, _request: &ResourceRequest) -> Result<Vec<Value>, AppError> {
        Ok(Vec::new())
    }

    async fn get_one(&self, _collection: &Vec<Value>, id: &str) -> Result<Option<Value>, AppError> {
        Ok(Some(Value::String(id.to_string())))
    }

    async fn apply_filter(
        &self,
        collection: Vec<Value>,
        _filter: &ParsedFilter,
    ) -> Result<Vec<Value>, AppError> {
        Ok(collection)
    }

    async fn sort(&self, collection: Vec<Value>, _sorting: &[SortField]) -> Result<Vec<Value>, AppError> {
        Ok(collection)
    }

    async fn paginate(
        &self,
        collection: Vec<Value>,
        _offset: u64,
        _limit: u64,
    ) -> Result<(Vec<Value>, u64), AppError> {
        let total = collection.len() as u64;
        Ok((collection, total))
    }

    async fn fetch(&self, collection: &Vec<Value>) -> Result<Vec<Value>, AppError> {
        Ok(collection.clone())
    }

    async fn save(&self, item: Value, _id: Option<&str>) -> Result<Value, AppError> {
        Ok(item)
    }

    async fn delete(&self, _item: &Value, _id: Option<&str>) -> Result<(), AppError> {
        Ok(())
    }
}
