//! Default method handlers. Resources call these from their own overrides to extend them.

use crate::backend::CollectionAdapter;
use crate::context::{Reply, RequestContext};
use crate::error::ApiError;
use crate::resource::{Collection, HandlerResult, Resource};
use serde_json::Value;

/// The resolved item, or the whole (filtered, sorted, paginated) collection.
pub async fn get<R: Resource>(resource: &R, ctx: &mut RequestContext<Collection<R>>) -> HandlerResult {
    if let Some(item) = &ctx.item {
        tracing::debug!(resource = %ctx.options.name, "get item");
        return Ok(Reply::json(resource.dump(item)));
    }
    let items = resource.adapter().fetch(&ctx.collection).await?;
    tracing::debug!(resource = %ctx.options.name, count = items.len(), "get collection");
    Ok(Reply::json(resource.dump_many(&items)))
}

/// Load the body (partially over the resolved item, if any), save, dump.
pub async fn post<R: Resource>(resource: &R, ctx: &mut RequestContext<Collection<R>>) -> HandlerResult {
    let raw = ctx.request.json_body()?;
    let item = resource.load(&raw, ctx.item.as_ref())?;
    let saved = resource.save(item, ctx.item_id.as_deref()).await?;
    tracing::debug!(resource = %ctx.options.name, "saved item");
    Ok(Reply::json(resource.dump(&saved)))
}

/// Update the resolved item; 404 without one.
pub async fn put<R: Resource>(resource: &R, ctx: &mut RequestContext<Collection<R>>) -> HandlerResult {
    if ctx.item.is_none() {
        return Err(ApiError::not_found().into());
    }
    post(resource, ctx).await
}

/// Remove the resolved item and answer `null`; 404 without one.
pub async fn delete<R: Resource>(resource: &R, ctx: &mut RequestContext<Collection<R>>) -> HandlerResult {
    let Some(item) = &ctx.item else {
        return Err(ApiError::not_found().into());
    };
    tracing::debug!(resource = %ctx.options.name, "delete item");
    resource.remove(item, ctx.item_id.as_deref()).await?;
    Ok(Reply::json(Value::Null))
}
