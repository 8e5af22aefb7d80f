//! End-to-end dispatch through the axum router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use resource_sdk::{
    ApiError, AppError, Endpoints, Field, FieldKind, FnResource, HandlerResult, MemoryAdapter,
    MetaConfig, MountOptions, NoStorage, ObjectSchema, Registry, Reply, RequestContext, Resource,
    ResourceRequest, Schema,
};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn json_of(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn with_where(path: &str, expression: Value) -> String {
    let qs = serde_urlencoded::to_string([("where", expression.to_string())]).unwrap();
    format!("{path}?{qs}")
}

fn title(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

struct HelloResource;

#[async_trait]
impl Resource for HelloResource {
    type Adapter = NoStorage;

    fn adapter(&self) -> &NoStorage {
        &NoStorage
    }

    fn endpoints(&self) -> Endpoints<Self> {
        Endpoints::<Self>::new().route("world", "/world", &[Method::GET], |_, _| {
            Box::pin(async { Ok::<_, AppError>(Reply::json(json!("Hello, World!"))) })
        })
    }

    async fn get(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        let who = ctx
            .item
            .as_ref()
            .and_then(Value::as_str)
            .map(title)
            .unwrap_or_else(|| "World".into());
        Ok(Reply::json(json!(format!("Hello, {who}!"))))
    }
}

#[tokio::test]
async fn custom_get_and_mount_url() {
    let mut registry = Registry::new("api").with_prefix("/api/v1");
    registry.register(HelloResource).unwrap();
    let how_are_you = FnResource::new("howareyou", &[], |ctx| {
        Box::pin(async move {
            let name = title(ctx.request.arg("name").unwrap_or_default());
            Ok::<_, AppError>(Reply::json(json!(format!("Hello, {name}! How are you?"))))
        })
    });
    registry
        .mount(how_are_you, MountOptions::at("/greet/<name>/how-are-you"))
        .unwrap();
    let router = registry.into_router();

    let res = send(&router, Method::GET, "/api/v1/hello", None).await;
    assert_eq!(json_of(res).await, json!("Hello, World!"));

    let res = send(&router, Method::GET, "/api/v1/hello/mike", None).await;
    assert_eq!(json_of(res).await, json!("Hello, Mike!"));

    let res = send(&router, Method::POST, "/api/v1/hello", None).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    let res = send(&router, Method::GET, "/api/v1/greet/mike/how-are-you", None).await;
    assert_eq!(json_of(res).await, json!("Hello, Mike! How are you?"));
}

/// Scalar items addressed by position, with custom post/put and two endpoints.
struct SecondResource {
    data: MemoryAdapter,
}

#[async_trait]
impl Resource for SecondResource {
    type Adapter = MemoryAdapter;

    fn adapter(&self) -> &MemoryAdapter {
        &self.data
    }

    fn methods(&self) -> Vec<Method> {
        vec![Method::GET, Method::POST, Method::PUT]
    }

    fn meta(&self) -> Vec<MetaConfig> {
        vec![MetaConfig::new()
            .with_name("two")
            .with_filters(["val"])
            .with_strict(true)]
    }

    fn endpoints(&self) -> Endpoints<Self> {
        Endpoints::<Self>::new()
            .route("custom", "custom", &[Method::GET], |_, _| {
                Box::pin(async { Ok::<_, AppError>(Reply::json(json!("SecondResource"))) })
            })
            .route(
                "custom2",
                "/custom22/test",
                &[Method::GET, Method::POST],
                |_, _| Box::pin(async { Ok::<_, AppError>(Reply::json(json!("CUSTOM2"))) }),
            )
    }

    async fn post(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        self.data.push(ctx.request.json_body()?)?;
        Ok(Reply::json(Value::Array(self.data.snapshot()?)))
    }

    async fn put(&self, ctx: &mut RequestContext<Vec<Value>>) -> HandlerResult {
        let index = ctx
            .request
            .arg("two")
            .and_then(|id| id.parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(ApiError::not_found)?;
        self.data.replace_at(index, ctx.request.json_body()?)?;
        Ok(Reply::json(Value::Array(self.data.snapshot()?)))
    }
}

#[tokio::test]
async fn list_resource_with_endpoints_filters_and_strict_mode() {
    let mut registry = Registry::new("api").with_prefix("/api/v1");
    registry
        .register(SecondResource {
            data: MemoryAdapter::by_position(vec![json!(1), json!(2)]),
        })
        .unwrap();
    let options = registry.resource("two").unwrap().options().clone();
    assert_eq!(options.endpoints.len(), 2);
    let strict: Vec<&str> = options.strict.iter().flatten().map(String::as_str).collect();
    assert_eq!(strict, vec!["page", "per_page", "sort", "where"]);
    let router = registry.into_router();

    let res = send(&router, Method::GET, "/api/v1/two", None).await;
    assert_eq!(json_of(res).await, json!([1, 2]));

    let res = send(&router, Method::POST, "/api/v1/two", Some(json!(3))).await;
    assert_eq!(json_of(res).await, json!([1, 2, 3]));

    let res = send(&router, Method::GET, "/api/v1/two?per_page=2", None).await;
    assert_eq!(res.headers()["x-page"], "0");
    assert_eq!(res.headers()["x-page-last"], "1");
    assert_eq!(json_of(res).await, json!([1, 2]));

    let res = send(&router, Method::GET, "/api/v1/two?per_page=2&page=1", None).await;
    assert_eq!(json_of(res).await, json!([3]));

    let res = send(&router, Method::PUT, "/api/v1/two/2", Some(json!(22))).await;
    assert_eq!(json_of(res).await, json!([1, 22, 3]));

    let res = send(&router, Method::GET, &with_where("/api/v1/two", json!({"val": 22})), None).await;
    assert_eq!(json_of(res).await, json!([22]));

    let uri = with_where("/api/v1/two", json!({"val": {"$ge": 3}}));
    let res = send(&router, Method::GET, &uri, None).await;
    assert_eq!(json_of(res).await, json!([22, 3]));

    let res = send(&router, Method::GET, "/api/v1/two/custom", None).await;
    assert_eq!(json_of(res).await, json!("SecondResource"));

    let res = send(&router, Method::GET, "/api/v1/two/custom22/test", None).await;
    assert_eq!(json_of(res).await, json!("CUSTOM2"));

    let res = send(&router, Method::POST, "/api/v1/two/custom22/test", None).await;
    assert_eq!(json_of(res).await, json!("CUSTOM2"));

    let res = send(&router, Method::PUT, "/api/v1/two/custom22/test", None).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    let res = send(&router, Method::POST, "/api/v1/two/custom22/test?bla-bla=22", None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_of(res).await;
    assert_eq!(body["error"], "Invalid query params.");
    assert_eq!(body["code"], 400);
}

struct TestResource {
    data: MemoryAdapter,
}

impl Resource for TestResource {
    type Adapter = MemoryAdapter;

    fn adapter(&self) -> &MemoryAdapter {
        &self.data
    }

    fn meta(&self) -> Vec<MetaConfig> {
        vec![MetaConfig::new().with_per_page(20)]
    }
}

#[tokio::test]
async fn pagination_pages_and_headers() {
    let mut registry = Registry::new("api").with_prefix("/api/v1");
    registry
        .register(TestResource {
            data: MemoryAdapter::new((1..100).map(|n| json!(n)).collect()),
        })
        .unwrap();
    let router = registry.into_router();

    let res = send(&router, Method::GET, "/api/v1/test", None).await;
    assert_eq!(res.headers()["x-total-count"], "99");
    assert_eq!(json_of(res).await.as_array().unwrap().len(), 20);

    let res = send(&router, Method::GET, "/api/v1/test?page=2", None).await;
    let link = res.headers()["link"].to_str().unwrap().to_string();
    assert!(link.starts_with("</api/v1/test?page=0>; rel=\"first\""));
    assert!(link.contains("</api/v1/test?page=3>; rel=\"next\""));
    let items = json_of(res).await;
    assert_eq!(items.as_array().unwrap().len(), 20);
    assert_eq!(items[0], 41);

    let res = send(&router, Method::GET, "/api/v1/test?page=4", None).await;
    assert_eq!(res.headers()["x-page-last"], "4");
    let link = res.headers()["link"].to_str().unwrap().to_string();
    assert!(link.contains("</api/v1/test?page=3>; rel=\"prev\""));
    assert!(link.contains("</api/v1/test?page=4>; rel=\"last\""));
    assert!(!link.contains("rel=\"next\""));
    assert_eq!(json_of(res).await.as_array().unwrap().len(), 19);

    let res = send(&router, Method::GET, "/api/v1/test?page=-1", None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

/// Scalar items addressed by position, served by the default handlers.
struct NumsResource {
    data: MemoryAdapter,
}

impl Resource for NumsResource {
    type Adapter = MemoryAdapter;

    fn adapter(&self) -> &MemoryAdapter {
        &self.data
    }

    fn methods(&self) -> Vec<Method> {
        vec![Method::GET, Method::PUT, Method::PATCH, Method::DELETE]
    }

    fn meta(&self) -> Vec<MetaConfig> {
        vec![MetaConfig::new().with_per_page(2).with_filters(["val"])]
    }

    fn endpoints(&self) -> Endpoints<Self> {
        Endpoints::<Self>::new().route("summary", "summary", &[Method::GET], |resource, ctx| {
            Box::pin(async move {
                Ok::<_, AppError>(Reply::json(json!({
                    "items": ctx.collection.clone(),
                    "stored": resource.data.snapshot()?.len(),
                    "filters": ctx.filters.len(),
                    "endpoint": ctx.endpoint.clone(),
                    "where": ctx.request.query_param("where"),
                })))
            })
        })
    }
}

fn nums_router() -> Router {
    let mut registry = Registry::new("api");
    registry
        .register(NumsResource {
            data: MemoryAdapter::by_position(vec![json!(1), json!(2), json!(3), json!(4)]),
        })
        .unwrap();
    registry.into_router()
}

#[tokio::test]
async fn default_handlers_address_scalar_items_by_position() {
    let router = nums_router();

    let res = send(&router, Method::PUT, "/1/nums/2", Some(json!(22))).await;
    assert_eq!(json_of(res).await, json!(22));
    let res = send(&router, Method::GET, "/1/nums?per_page=0", None).await;
    assert_eq!(json_of(res).await, json!([1, 22, 3, 4]));

    let res = send(&router, Method::PATCH, "/1/nums/4", Some(json!(44))).await;
    assert_eq!(json_of(res).await, json!(44));

    // Same value as position 1; only the addressed position goes.
    send(&router, Method::PUT, "/1/nums/3", Some(json!(1))).await;
    let res = send(&router, Method::DELETE, "/1/nums/3", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_of(res).await, Value::Null);
    let res = send(&router, Method::GET, "/1/nums?per_page=0", None).await;
    assert_eq!(json_of(res).await, json!([1, 22, 44]));

    let res = send(&router, Method::PUT, "/1/nums/9", Some(json!(9))).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = send(&router, Method::DELETE, "/1/nums/0", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn endpoints_see_the_unprocessed_collection() {
    let router = nums_router();
    let query = serde_urlencoded::to_string([
        ("where", json!({"val": {"$ge": 3}}).to_string()),
        ("sort", "-val".to_string()),
        ("page", "1".to_string()),
    ])
    .unwrap();

    let res = send(&router, Method::GET, &format!("/1/nums/summary?{query}"), None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("x-page").is_none());
    assert!(res.headers().get("link").is_none());
    let body = json_of(res).await;
    assert_eq!(body["items"], json!([1, 2, 3, 4]));
    assert_eq!(body["stored"], 4);
    assert_eq!(body["filters"], 0);
    assert_eq!(body["endpoint"], "summary");
    assert_eq!(body["where"], r#"{"val":{"$ge":3}}"#);

    // The same query on the collection route is filtered and paged.
    let res = send(&router, Method::GET, &format!("/1/nums?{query}"), None).await;
    assert_eq!(res.headers()["x-page"], "1");
    assert_eq!(json_of(res).await, json!([]));

    let res = send(&router, Method::POST, "/1/nums/summary", None).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

struct NoteResource {
    store: MemoryAdapter,
    schema: ObjectSchema,
}

impl NoteResource {
    fn new() -> Self {
        NoteResource {
            store: MemoryAdapter::new(vec![
                json!({"id": 1, "text": "b", "tag": "x"}),
                json!({"id": 2, "text": "c", "tag": "y"}),
                json!({"id": 3, "text": "a", "tag": "x"}),
            ]),
            schema: ObjectSchema::new()
                .with_field("id", Field::new(FieldKind::Integer).dump_only())
                .with_field("text", Field::new(FieldKind::String).required())
                .with_field("tag", Field::new(FieldKind::String).nullable()),
        }
    }
}

impl Resource for NoteResource {
    type Adapter = MemoryAdapter;

    fn adapter(&self) -> &MemoryAdapter {
        &self.store
    }

    fn methods(&self) -> Vec<Method> {
        vec![Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE]
    }

    fn schema(&self) -> Option<&dyn Schema> {
        Some(&self.schema)
    }

    fn meta(&self) -> Vec<MetaConfig> {
        vec![MetaConfig::new()
            .with_filters(["tag", "text"])
            .with_sorting(["text"])]
    }
}

fn notes_router() -> Router {
    let mut registry = Registry::new("api");
    registry.register(NoteResource::new()).unwrap();
    registry.into_router()
}

#[tokio::test]
async fn crud_with_schema() {
    let router = notes_router();

    let res = send(&router, Method::POST, "/1/note", Some(json!({"tag": "z"}))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_of(res).await;
    assert_eq!(body["code"], 400);
    assert!(body["errors"]["text"].is_array());

    let res = send(&router, Method::POST, "/1/note", Some(json!({"text": "d"}))).await;
    assert_eq!(res.status(), StatusCode::OK);
    let created = json_of(res).await;
    assert_eq!(created["id"], 4);
    assert_eq!(created["text"], "d");

    let res = send(&router, Method::PATCH, "/1/note/4", Some(json!({"tag": "w"}))).await;
    assert_eq!(json_of(res).await, json!({"id": 4, "text": "d", "tag": "w"}));

    let res = send(&router, Method::PUT, "/1/note/99", Some(json!({"text": "q"}))).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_of(res).await["code"], 404);

    let res = send(&router, Method::DELETE, "/1/note/99", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = send(&router, Method::DELETE, "/1/note/4", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_of(res).await, Value::Null);

    let res = send(&router, Method::GET, "/1/note/4", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn filters_and_sorting_on_object_fields() {
    let router = notes_router();

    let res = send(&router, Method::GET, &with_where("/1/note", json!({"tag": "x"})), None).await;
    let ids: Vec<Value> = json_of(res).await.as_array().unwrap().iter().map(|n| n["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(3)]);

    let res = send(&router, Method::GET, "/1/note?sort=-text", None).await;
    let texts: Vec<Value> = json_of(res).await.as_array().unwrap().iter().map(|n| n["text"].clone()).collect();
    assert_eq!(texts, vec![json!("c"), json!("b"), json!("a")]);

    // "tag" is not sortable; the list keeps its order.
    let res = send(&router, Method::GET, "/1/note?sort=tag", None).await;
    let ids: Vec<Value> = json_of(res).await.as_array().unwrap().iter().map(|n| n["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);

    // Malformed filter expressions are ignored.
    let res = send(&router, Method::GET, "/1/note?where=notjson", None).await;
    assert_eq!(json_of(res).await.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn specs_document() {
    let mut registry = Registry::new("api").with_prefix("/api/v1");
    registry.register(HelloResource).unwrap();
    let router = registry.into_router();

    let res = send(&router, Method::GET, "/api/v1/_specs", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let specs = json_of(res).await;
    assert!(specs["paths"]["/hello"]["get"].is_object());
    assert!(specs["paths"]["/hello/world"]["get"].is_object());
    assert_eq!(specs["tags"][0]["name"], "hello");
}

fn token_required(request: &ResourceRequest) -> Result<Value, AppError> {
    match request.headers.get("authorization") {
        Some(token) => Ok(json!({ "token": token.to_str().unwrap_or_default() })),
        None => Err(ApiError::new("Forbidden")
            .with_status(StatusCode::FORBIDDEN)
            .into()),
    }
}

#[tokio::test]
async fn authorization_and_programmatic_run() {
    let mut registry = Registry::new("api").authorization(token_required);
    registry
        .register(TestResource {
            data: MemoryAdapter::new((1..10).map(|n| json!(n)).collect()),
        })
        .unwrap();

    let err = registry
        .run("test", ResourceRequest::new(Method::GET, "/1/test"))
        .await
        .unwrap_err();
    assert_eq!(err.as_api().map(|e| e.status), Some(StatusCode::FORBIDDEN));

    let request = ResourceRequest::new(Method::GET, "/1/test")
        .with_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("secret"),
        )
        .with_where(&json!({"val": {"$ge": 8}}));
    let reply = registry.run("test", request).await.unwrap();
    // No filters are configured for this resource, so the full first page comes back.
    assert_eq!(reply.body().and_then(Value::as_array).map(Vec::len), Some(9));

    let err = registry
        .run("missing", ResourceRequest::new(Method::GET, "/"))
        .await
        .unwrap_err();
    assert_eq!(err.as_api().map(|e| e.status), Some(StatusCode::NOT_FOUND));

    let router = registry.into_router();
    let res = send(&router, Method::GET, "/1/test", None).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn run_applies_filters() {
    let mut registry = Registry::new("api");
    registry
        .register(SecondResource {
            data: MemoryAdapter::by_position((1..10).map(|n| json!(n)).collect()),
        })
        .unwrap();
    let request = ResourceRequest::new(Method::GET, "/1/two").with_where(&json!({"val": {"$ge": 8}}));
    let reply = registry.run("two", request).await.unwrap();
    assert_eq!(reply.into_body(), Some(json!([8, 9])));

    let request = ResourceRequest::new(Method::GET, "/1/two/2").with_arg("two", "2");
    let reply = registry.run("two", request).await.unwrap();
    assert_eq!(reply.into_body(), Some(json!(2)));
}
