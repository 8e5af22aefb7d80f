//! Request-scoped data: the parsed request, the per-request context, and handler replies.

use crate::config::ResourceOptions;
use crate::error::ApiError;
use crate::filter::{ParsedFilter, FILTERS_ARG};
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Transport-independent request: what the dispatcher needs from HTTP.
#[derive(Clone, Debug)]
pub struct ResourceRequest {
    pub method: Method,
    pub path: String,
    /// Path params by name.
    pub args: HashMap<String, String>,
    /// Query params in request order; keys may repeat.
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Named endpoint the request was routed to, if any.
    pub endpoint: Option<String>,
}

impl ResourceRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ResourceRequest {
            method,
            path: path.into(),
            args: HashMap::new(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            endpoint: None,
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append params from a raw `a=1&b=2` query string; malformed input is ignored.
    pub fn with_query_string(mut self, qs: &str) -> Self {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(qs).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "ignoring malformed query string");
            Vec::new()
        });
        self.query.extend(pairs);
        self
    }

    /// Set the `where` param from a JSON filter expression.
    pub fn with_where(self, expression: &Value) -> Self {
        self.with_query(FILTERS_ARG, expression.to_string())
    }

    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self.headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// First value of a query param.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    /// Decode the body as JSON; an empty body reads as `{}`.
    pub fn json_body(&self) -> Result<Value, ApiError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(json!({}));
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            tracing::debug!(error = %e, "invalid json body");
            ApiError::new("Invalid JSON body.")
        })
    }
}

/// Everything the pipeline knows about one request. Owned by that request only.
pub struct RequestContext<C> {
    pub request: ResourceRequest,
    pub options: Arc<ResourceOptions>,
    /// Identity returned by the authorization hook.
    pub auth: Value,
    pub collection: C,
    /// Item resolved from the path id, if any.
    pub item: Option<Value>,
    /// Path id `item` was resolved from.
    pub item_id: Option<String>,
    pub endpoint: Option<String>,
    pub filters: Vec<ParsedFilter>,
    /// Headers added to the final JSON response.
    pub headers: HeaderMap,
}

impl<C> RequestContext<C> {
    pub fn method(&self) -> &Method {
        &self.request.method
    }
}

/// Handler result: a JSON value to serialize, or a response to pass through untouched.
pub enum Reply {
    Json {
        status: StatusCode,
        body: Value,
        headers: HeaderMap,
    },
    Raw(Response),
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Reply::Json {
            status: StatusCode::OK,
            body,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_status(self, status: StatusCode) -> Self {
        match self {
            Reply::Json { body, headers, .. } => Reply::Json {
                status,
                body,
                headers,
            },
            raw => raw,
        }
    }

    /// Extend JSON headers; raw responses are left alone.
    pub fn with_headers(mut self, extra: HeaderMap) -> Self {
        if let Reply::Json { headers, .. } = &mut self {
            headers.extend(extra);
        }
        self
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            Reply::Json { body, .. } => Some(body),
            Reply::Raw(_) => None,
        }
    }

    pub fn into_body(self) -> Option<Value> {
        match self {
            Reply::Json { body, .. } => Some(body),
            Reply::Raw(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Reply::Json { status, .. } => *status,
            Reply::Raw(r) => r.status(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            Reply::Json { headers, .. } => headers,
            Reply::Raw(r) => r.headers(),
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Json { status, body, .. } => f
                .debug_struct("Json")
                .field("status", status)
                .field("body", body)
                .finish(),
            Reply::Raw(r) => f.debug_tuple("Raw").field(&r.status()).finish(),
        }
    }
}

impl From<Value> for Reply {
    fn from(body: Value) -> Self {
        Reply::json(body)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Raw(response)
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json {
                status,
                body,
                headers,
            } => (status, headers, Json(body)).into_response(),
            Reply::Raw(response) => response,
        }
    }
}
