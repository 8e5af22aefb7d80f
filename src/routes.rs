//! HTTP binding: every mounted route goes to one catch-all handler that builds a
//! [`ResourceRequest`] and hands it to the resource's dispatcher.

use crate::context::{Reply, ResourceRequest};
use crate::dispatch::ResourceHandler;
use crate::error::AppError;
use crate::naming::to_router_path;
use crate::registry::Registry;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, Method, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

#[derive(Clone)]
struct RouteTarget {
    handler: Arc<dyn ResourceHandler>,
    endpoint: Option<String>,
}

async fn serve(
    State(target): State<RouteTarget>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    args: Option<Path<HashMap<String, String>>>,
    body: Bytes,
) -> Response {
    let mut request = ResourceRequest::new(method, uri.path());
    if let Some(qs) = uri.query() {
        request = request.with_query_string(qs);
    }
    if let Some(Path(args)) = args {
        request.args = args;
    }
    request.headers = headers;
    request.body = body;
    request.endpoint = target.endpoint.clone();

    let result: Result<Reply, AppError> = target.handler.dispatch(request).await;
    result.into_response()
}

const SPECS_HTML: &str = r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({ url: window.location.pathname.replace(/\/?$/, "/_specs"), dom_id: "#swagger-ui" });
  </script>
</body>
</html>
"##;

impl Registry {
    /// Build the axum router: resource routes, plus `_specs` and the viewer when specs are on.
    pub fn into_router(self) -> Router {
        let registry = Arc::new(self);
        let mut router = Router::new();

        for mounted in &registry.resources {
            for route in &mounted.routes {
                let target = RouteTarget {
                    handler: Arc::clone(&mounted.handler),
                    endpoint: route.endpoint.clone(),
                };
                tracing::debug!(path = %route.path, endpoint = ?route.endpoint, "route");
                router = router.route(&to_router_path(&route.path), any(serve).with_state(target));
            }
        }

        if registry.specs_enabled {
            let prefix = registry.prefix();
            let prefix = prefix.trim_end_matches('/');
            let specs_registry = Arc::clone(&registry);
            router = router
                .route(
                    &format!("{prefix}/_specs"),
                    get(move |headers: HeaderMap| {
                        let registry = Arc::clone(&specs_registry);
                        async move {
                            let host = headers
                                .get(header::HOST)
                                .and_then(|h| h.to_str().ok());
                            Json(registry.specs(host))
                        }
                    }),
                )
                .route(&format!("{prefix}/"), get(|| async { Html(SPECS_HTML) }));
        }

        router
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(registry.max_body_bytes))
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Reply;
    use crate::error::AppError;
    use crate::registry::Registry;
    use crate::resource::FnResource;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn specs_routes_follow_the_flag() {
        let mut registry = Registry::new("api");
        registry
            .register(FnResource::new("ping", &[], |_| {
                Box::pin(async { Ok::<_, AppError>(Reply::json(json!("pong"))) })
            }))
            .unwrap();
        let router = registry.into_router();

        let res = router
            .clone()
            .oneshot(Request::get("/1/_specs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = router
            .oneshot(Request::get("/1/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let html = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(html.to_vec()).unwrap();
        assert!(html.contains(r##"dom_id: "#swagger-ui""##));
        assert!(html.trim_end().ends_with("</html>"));

        let mut registry = Registry::new("api").with_specs(false);
        registry
            .register(FnResource::new("ping", &[Method::GET], |_| {
                Box::pin(async { Ok::<_, AppError>(Reply::json(json!("pong"))) })
            }))
            .unwrap();
        let res = registry
            .into_router()
            .oneshot(Request::get("/1/_specs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let mut registry = Registry::new("api").with_max_body_bytes(8);
        registry
            .register(FnResource::new("echo", &[Method::POST], |ctx| {
                Box::pin(async move { Ok::<_, AppError>(Reply::json(ctx.request.json_body()?)) })
            }))
            .unwrap();
        let res = registry
            .into_router()
            .oneshot(
                Request::post("/1/echo")
                    .header("content-type", "application/json")
                    .header("content-length", "24")
                    .body(Body::from(r#"{"text": "far too long"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
