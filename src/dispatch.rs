//! The request pipeline: strict check, authorize, load, endpoint or list enrichment, method.

use crate::backend::CollectionAdapter;
use crate::config::{resolve, MetaConfig, ResourceOptions};
use crate::context::{Reply, RequestContext, ResourceRequest};
use crate::error::{ApiError, AppError, ConfigError};
use crate::filter::{parse_where, FILTERS_ARG};
use crate::pagination::{page_request, pagination_headers};
use crate::resource::{Authorize, Endpoints, Resource};
use crate::sort::{parse_sort, SORT_ARG};
use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Object-safe view of a registered resource.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn options(&self) -> &Arc<ResourceOptions>;

    /// JSON schema of the resource's items, if it has a schema.
    fn schema_json(&self) -> Option<Value>;

    fn description(&self) -> Option<String>;

    async fn dispatch(&self, request: ResourceRequest) -> Result<Reply, AppError>;
}

pub struct Dispatcher<R: Resource> {
    resource: R,
    options: Arc<ResourceOptions>,
    endpoints: Endpoints<R>,
    authorizer: Arc<dyn Authorize>,
    span: tracing::Span,
}

fn method_not_allowed() -> Reply {
    Reply::Raw(StatusCode::METHOD_NOT_ALLOWED.into_response())
}

impl<R: Resource> Dispatcher<R> {
    /// Resolve options from the resource's own layers followed by `extra` layers.
    pub fn new(
        resource: R,
        extra: &[MetaConfig],
        authorizer: Arc<dyn Authorize>,
        span: tracing::Span,
    ) -> Result<Self, ConfigError> {
        let endpoints = resource.endpoints();
        let mut layers = resource.meta();
        layers.extend_from_slice(extra);
        let options = resolve(
            std::any::type_name::<R>(),
            &layers,
            resource.schema(),
            resource.methods(),
            endpoints.specs(),
        )?;
        Ok(Dispatcher {
            resource,
            options: Arc::new(options),
            endpoints,
            authorizer,
            span,
        })
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn into_resource(self) -> R {
        self.resource
    }

    /// Replace the resolved options (used to drop the detail route after resolution).
    pub fn map_options(mut self, f: impl FnOnce(&mut ResourceOptions)) -> Self {
        let mut options = (*self.options).clone();
        f(&mut options);
        self.options = Arc::new(options);
        self
    }

    async fn run(&self, request: ResourceRequest) -> Result<Reply, AppError> {
        let options = Arc::clone(&self.options);
        let resource = &self.resource;

        if let Some(param) = options.strict_violation(&request.query) {
            tracing::debug!(%param, "query param not allowed");
            return Err(ApiError::new("Invalid query params.").into());
        }

        let auth = resource
            .authorize(&request, self.authorizer.as_ref())
            .await?;
        let mut collection = resource.get_many(&request).await?;

        let item_id = request
            .arg(options.id_arg())
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let item = match item_id.as_deref() {
            Some(id) => resource.get_one(&collection, id).await?,
            None => None,
        };

        // Resolved options are the table routes and specs were built from.
        if let Some((spec, (_, handler))) = request
            .endpoint
            .as_deref()
            .and_then(|name| options.endpoint(name).zip(self.endpoints.get(name)))
        {
            if !spec.methods.contains(&request.method) {
                return Ok(method_not_allowed());
            }
            tracing::debug!(endpoint = ?request.endpoint, "loaded endpoint");
            let endpoint = request.endpoint.clone();
            let mut ctx = RequestContext {
                request,
                options,
                auth,
                collection,
                item,
                item_id,
                endpoint,
                filters: Vec::new(),
                headers: HeaderMap::new(),
            };
            let reply = handler(resource, &mut ctx).await?;
            return Ok(reply.with_headers(ctx.headers));
        }

        let mut filters = Vec::new();
        let mut headers = HeaderMap::new();
        if request.method == Method::GET && item.is_none() {
            filters = parse_where(
                request.query_param(FILTERS_ARG),
                &options.filters,
                resource.adapter().operators(),
            );
            if !filters.is_empty() {
                tracing::debug!(count = filters.len(), "filters active");
            }
            collection = resource.filter(collection, &filters).await?;

            if let Some(raw) = request.query_param(SORT_ARG) {
                let sorting = parse_sort(raw, &options.sorting);
                collection = resource.sort(collection, &sorting).await?;
            }

            if let Some(page) = page_request(&request.query, options.per_page)? {
                let (paged, total) = resource
                    .paginate(collection, page.offset(), page.per_page)
                    .await?;
                collection = paged;
                let link = options
                    .page_link_header
                    .then(|| (request.path.as_str(), request.query.as_slice()));
                headers = pagination_headers(page.per_page, page.page, total, link);
            }
        }

        if !options.allows(&request.method) {
            tracing::debug!(method = %request.method, "method not allowed");
            return Ok(method_not_allowed());
        }

        let mut ctx = RequestContext {
            request,
            options,
            auth,
            collection,
            item,
            item_id,
            endpoint: None,
            filters,
            headers,
        };
        let method = ctx.method().clone();
        let reply = match method {
            Method::GET => resource.get(&mut ctx).await?,
            Method::POST => resource.post(&mut ctx).await?,
            Method::PUT => resource.put(&mut ctx).await?,
            Method::PATCH => resource.patch(&mut ctx).await?,
            Method::DELETE => resource.delete(&mut ctx).await?,
            _ => return Ok(method_not_allowed()),
        };
        Ok(reply.with_headers(ctx.headers))
    }
}

#[async_trait]
impl<R: Resource> ResourceHandler for Dispatcher<R> {
    fn options(&self) -> &Arc<ResourceOptions> {
        &self.options
    }

    fn schema_json(&self) -> Option<Value> {
        self.resource.schema().map(|s| s.json_schema())
    }

    fn description(&self) -> Option<String> {
        self.resource.description()
    }

    async fn dispatch(&self, request: ResourceRequest) -> Result<Reply, AppError> {
        let span = tracing::debug_span!(
            parent: &self.span,
            "dispatch",
            resource = %self.options.name,
            method = %request.method,
        );
        self.run(request).instrument(span).await
    }
}
