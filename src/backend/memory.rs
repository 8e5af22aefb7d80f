//! In-memory list backend.

use crate::backend::CollectionAdapter;
use crate::context::ResourceRequest;
use crate::error::{ApiError, AppError};
use crate::filter::eval::{matches, sort_order};
use crate::filter::{Operator, ParsedFilter};
use crate::schema::field::values_equal;
use crate::sort::SortField;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// How a path id addresses an item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdLookup {
    /// Match the item's field (object items).
    Field(String),
    /// 1-based position in the list (scalar items).
    Position,
}

/// A shared list of JSON items. Clones share the same list.
#[derive(Clone, Debug)]
pub struct MemoryAdapter {
    items: Arc<RwLock<Vec<Value>>>,
    lookup: IdLookup,
}

fn id_matches(value: Option<&Value>, id: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

impl MemoryAdapter {
    /// Object items addressed by their `id` field.
    pub fn new(items: Vec<Value>) -> Self {
        MemoryAdapter {
            items: Arc::new(RwLock::new(items)),
            lookup: IdLookup::Field("id".into()),
        }
    }

    /// Items addressed by 1-based position.
    pub fn by_position(items: Vec<Value>) -> Self {
        MemoryAdapter {
            lookup: IdLookup::Position,
            ..MemoryAdapter::new(items)
        }
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.lookup = IdLookup::Field(field.into());
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Value>>, AppError> {
        self.items
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Value>>, AppError> {
        self.items
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    pub fn snapshot(&self) -> Result<Vec<Value>, AppError> {
        Ok(self.read()?.clone())
    }

    pub fn push(&self, item: Value) -> Result<(), AppError> {
        self.write()?.push(item);
        Ok(())
    }

    /// Replace the item at a 0-based index.
    pub fn replace_at(&self, index: usize, item: Value) -> Result<(), AppError> {
        let mut items = self.write()?;
        match items.get_mut(index) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(ApiError::not_found().into()),
        }
    }

    /// Index of the item addressed by a path id.
    fn locate(&self, items: &[Value], id: &str) -> Option<usize> {
        match &self.lookup {
            IdLookup::Position => id
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .filter(|i| *i < items.len()),
            IdLookup::Field(field) => items.iter().position(|i| id_matches(i.get(field), id)),
        }
    }

    fn next_id(items: &[Value], field: &str) -> i64 {
        items
            .iter()
            .filter_map(|i| i.get(field).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[async_trait]
impl CollectionAdapter for MemoryAdapter {
    type Collection = Vec<Value>;

    fn operators(&self) -> &'static [Operator] {
        Operator::ALL
    }

    async fn get_many(&self, _request: &ResourceRequest) -> Result<Vec<Value>, AppError> {
        self.snapshot()
    }

    async fn get_one(&self, collection: &Vec<Value>, id: &str) -> Result<Option<Value>, AppError> {
        match self.locate(collection, id) {
            Some(index) => Ok(Some(collection[index].clone())),
            None => Err(ApiError::not_found().into()),
        }
    }

    async fn apply_filter(
        &self,
        collection: Vec<Value>,
        filter: &ParsedFilter,
    ) -> Result<Vec<Value>, AppError> {
        Ok(collection.into_iter().filter(|i| matches(i, filter)).collect())
    }

    async fn sort(&self, mut collection: Vec<Value>, sorting: &[SortField]) -> Result<Vec<Value>, AppError> {
        if sorting.is_empty() {
            return Ok(collection);
        }
        collection.sort_by(|a, b| {
            sorting
                .iter()
                .map(|s| {
                    let (x, y) = match (a, b) {
                        (Value::Object(_), Value::Object(_)) => (
                            a.get(&s.name).unwrap_or(&Value::Null),
                            b.get(&s.name).unwrap_or(&Value::Null),
                        ),
                        _ => (a, b),
                    };
                    let ord = sort_order(x, y);
                    if s.descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(collection)
    }

    async fn paginate(
        &self,
        collection: Vec<Value>,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Value>, u64), AppError> {
        let total = collection.len() as u64;
        let page = collection
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    async fn fetch(&self, collection: &Vec<Value>) -> Result<Vec<Value>, AppError> {
        Ok(collection.clone())
    }

    async fn save(&self, mut item: Value, id: Option<&str>) -> Result<Value, AppError> {
        let mut items = self.write()?;
        if let Some(id) = id {
            let index = self.locate(&items, id).ok_or_else(ApiError::not_found)?;
            items[index] = item.clone();
            return Ok(item);
        }
        let IdLookup::Field(field) = &self.lookup else {
            items.push(item.clone());
            return Ok(item);
        };
        let existing = item
            .get(field)
            .filter(|v| !v.is_null())
            .and_then(|id| items.iter().position(|i| i.get(field).is_some_and(|v| values_equal(v, id))));
        match existing {
            Some(index) => items[index] = item.clone(),
            None => {
                if let Value::Object(obj) = &mut item {
                    if obj.get(field).map_or(true, Value::is_null) {
                        obj.insert(field.clone(), Value::from(Self::next_id(&items, field)));
                    }
                }
                items.push(item.clone());
            }
        }
        Ok(item)
    }

    async fn delete(&self, item: &Value, id: Option<&str>) -> Result<(), AppError> {
        let mut items = self.write()?;
        let index = match (id, &self.lookup, item.as_object()) {
            (Some(id), _, _) => self.locate(&items, id),
            (None, IdLookup::Field(field), Some(obj)) => match obj.get(field) {
                Some(id) => items
                    .iter()
                    .position(|i| i.get(field).is_some_and(|v| values_equal(v, id))),
                None => items.iter().position(|i| i == item),
            },
            _ => items.iter().position(|i| values_equal(i, item)),
        };
        if let Some(index) = index {
            items.remove(index);
        }
        Ok(())
    }
}
