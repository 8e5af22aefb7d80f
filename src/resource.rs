//! The resource contract: options, hooks and method handlers with overridable defaults.

use crate::backend::{CollectionAdapter, NoStorage};
use crate::config::{EndpointSpec, MetaConfig};
use crate::context::{Reply, RequestContext, ResourceRequest};
use crate::error::{ApiError, AppError};
use crate::filter::ParsedFilter;
use crate::handlers;
use crate::schema::Schema;
use crate::sort::SortField;
use async_trait::async_trait;
use axum::http::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type HandlerResult = Result<Reply, AppError>;

/// Collection handle type of a resource's adapter.
pub type Collection<R> = <<R as Resource>::Adapter as CollectionAdapter>::Collection;

/// Handler of a named endpoint.
pub type EndpointFn<R> = Arc<
    dyn for<'a> Fn(&'a R, &'a mut RequestContext<Collection<R>>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync,
>;

/// Authorization hook: returns the request identity or an error carrying the status to answer.
#[async_trait]
pub trait Authorize: Send + Sync {
    async fn authorize(&self, request: &ResourceRequest) -> Result<Value, AppError>;
}

/// Lets every request through with a null identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorize for AllowAll {
    async fn authorize(&self, _request: &ResourceRequest) -> Result<Value, AppError> {
        Ok(Value::Null)
    }
}

#[async_trait]
impl<F> Authorize for F
where
    F: Fn(&ResourceRequest) -> Result<Value, AppError> + Send + Sync,
{
    async fn authorize(&self, request: &ResourceRequest) -> Result<Value, AppError> {
        self(request)
    }
}

/// Named sub-routes of a resource: path template, allowed methods and handler.
pub struct Endpoints<R: Resource> {
    routes: BTreeMap<String, (EndpointSpec, EndpointFn<R>)>,
}

impl<R: Resource> Default for Endpoints<R> {
    fn default() -> Self {
        Endpoints {
            routes: BTreeMap::new(),
        }
    }
}

impl<R: Resource> Endpoints<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint at `path` (relative to the resource url). A repeated name replaces the
    /// earlier entry.
    ///
    /// Start the chain from `Endpoints::<Self>::new()`: the handler's argument types are only
    /// known once the resource type is.
    pub fn route<F>(mut self, name: &str, path: &str, methods: &[Method], handler: F) -> Self
    where
        F: for<'a> Fn(&'a R, &'a mut RequestContext<Collection<R>>) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        let spec = EndpointSpec {
            path: path.to_string(),
            methods: methods.to_vec(),
            description: None,
        };
        self.routes
            .insert(name.to_string(), (spec, Arc::new(handler)));
        self
    }

    /// Attach a description (used as the OpenAPI summary) to an endpoint added earlier.
    pub fn describe(mut self, name: &str, description: impl Into<String>) -> Self {
        if let Some((spec, _)) = self.routes.get_mut(name) {
            spec.description = Some(description.into());
        }
        self
    }

    pub fn specs(&self) -> BTreeMap<String, EndpointSpec> {
        self.routes
            .iter()
            .map(|(name, (spec, _))| (name.clone(), spec.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&(EndpointSpec, EndpointFn<R>)> {
        self.routes.get(name)
    }
}

/// A REST resource. Only `adapter` is required; every hook and handler has a default that
/// delegates to the adapter and the schema.
#[async_trait]
pub trait Resource: Send + Sync + Sized + 'static {
    type Adapter: CollectionAdapter;

    fn adapter(&self) -> &Self::Adapter;

    /// Option layers, lowest precedence first.
    fn meta(&self) -> Vec<MetaConfig> {
        Vec::new()
    }

    fn methods(&self) -> Vec<Method> {
        vec![Method::GET]
    }

    fn schema(&self) -> Option<&dyn Schema> {
        None
    }

    fn endpoints(&self) -> Endpoints<Self> {
        Endpoints::new()
    }

    /// Tag description in the OpenAPI document.
    fn description(&self) -> Option<String> {
        None
    }

    /// Defaults to the registry's hook.
    async fn authorize(
        &self,
        request: &ResourceRequest,
        fallback: &dyn Authorize,
    ) -> Result<Value, AppError> {
        fallback.authorize(request).await
    }

    async fn get_many(&self, request: &ResourceRequest) -> Result<Collection<Self>, AppError> {
        self.adapter().get_many(request).await
    }

    async fn get_one(
        &self,
        collection: &Collection<Self>,
        id: &str,
    ) -> Result<Option<Value>, AppError> {
        self.adapter().get_one(collection, id).await
    }

    /// Apply parsed filters in order; all must hold.
    async fn filter(
        &self,
        collection: Collection<Self>,
        filters: &[ParsedFilter],
    ) -> Result<Collection<Self>, AppError> {
        let mut collection = collection;
        for f in filters {
            collection = self.adapter().apply_filter(collection, f).await?;
        }
        Ok(collection)
    }

    async fn sort(
        &self,
        collection: Collection<Self>,
        sorting: &[SortField],
    ) -> Result<Collection<Self>, AppError> {
        tracing::debug!(?sorting, "sort collection");
        self.adapter().sort(collection, sorting).await
    }

    async fn paginate(
        &self,
        collection: Collection<Self>,
        offset: u64,
        limit: u64,
    ) -> Result<(Collection<Self>, u64), AppError> {
        tracing::debug!(offset, limit, "paginate collection");
        self.adapter().paginate(collection, offset, limit).await
    }

    /// `id` is the path id of the resolved item; `None` when creating.
    async fn save(&self, item: Value, id: Option<&str>) -> Result<Value, AppError> {
        self.adapter().save(item, id).await
    }

    async fn remove(&self, item: &Value, id: Option<&str>) -> Result<(), AppError> {
        self.adapter().delete(item, id).await
    }

    /// Validate a request body. Partial when `existing` is set. Without a schema the body is
    /// taken as is, shallow-merged over `existing` when both are objects.
    fn load(&self, raw: &Value, existing: Option<&Value>) -> Result<Value, AppError> {
        let Some(schema) = self.schema() else {
            return Ok(match (existing, raw) {
                (Some(Value::Object(old)), Value::Object(new)) => {
                    let mut merged = old.clone();
                    merged.extend(new.clone());
                    Value::Object(merged)
                }
                _ => raw.clone(),
            });
        };
        let (value, errors) = schema.load(raw, existing);
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(ApiError::invalid_data(errors).into())
        }
    }

    fn dump(&self, item: &Value) -> Value {
        match self.schema() {
            Some(schema) => schema.dump(item),
            None => item.clone(),
        }
    }

    fn dump_many(&self, items: &[Value]) -> Value {
        match self.schema() {
            Some(schema) => schema.dump_many(items),
            None => Value::Array(items.to_vec()),
        }
    }

    async fn get(&self, ctx: &mut RequestContext<Collection<Self>>) -> HandlerResult {
        handlers::get(self, ctx).await
    }

    async fn post(&self, ctx: &mut RequestContext<Collection<Self>>) -> HandlerResult {
        handlers::post(self, ctx).await
    }

    async fn put(&self, ctx: &mut RequestContext<Collection<Self>>) -> HandlerResult {
        handlers::put(self, ctx).await
    }

    async fn patch(&self, ctx: &mut RequestContext<Collection<Self>>) -> HandlerResult {
        handlers::put(self, ctx).await
    }

    async fn delete(&self, ctx: &mut RequestContext<Collection<Self>>) -> HandlerResult {
        handlers::delete(self, ctx).await
    }
}

/// Handler shared by every method of a [`FnResource`].
pub type FnHandler =
    Arc<dyn for<'a> Fn(&'a mut RequestContext<Vec<Value>>) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// A storage-less resource built from one handler serving all its methods.
pub struct FnResource {
    name: String,
    methods: Vec<Method>,
    meta: MetaConfig,
    handler: FnHandler,
    adapter: NoStorage,
}

impl FnResource {
    /// `methods` defaults to GET when empty.
    pub fn new<F>(name: &str, methods: &[Method], handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext<Vec<Value>>) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        let methods = if methods.is_empty() {
            vec![Method::GET]
        } else {
            methods.to_vec()
        };
        FnResource {
            name: name.to_string(),
            methods,
            meta: MetaConfig::new().with_name(name),
            handler: Arc::new(handler),
            adapter: NoStorage,
        }
    }

    pub fn with_meta(mut self, meta: MetaConfig) -> Self {
        self.meta = MetaConfig {
            name: Some(self.name.clone()),
            ..meta
        };
        self
    }

    async fn call(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        (self.handler)(ctx).await
    }
}

#[async_trait]
impl Resource for FnResource {
    type Adapter = NoStorage;

    fn adapter(&self) -> &NoStorage {
        &self.adapter
    }

    fn meta(&self) -> Vec<MetaConfig> {
        vec![self.meta.clone()]
    }

    fn methods(&self) -> Vec<Method> {
        self.methods.clone()
    }

    async fn get(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        self.call(ctx).await
    }

    async fn post(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        self.call(ctx).await
    }

    async fn put(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        self.call(ctx).await
    }

    async fn patch(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        self.call(ctx).await
    }

    async fn delete(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        self.call(ctx).await
    }
}
