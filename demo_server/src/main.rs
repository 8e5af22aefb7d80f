//! Demo server: an in-memory `notes` resource, plus a PostgreSQL `users` resource when
//! `DATABASE_URL` is set.
//!
//! Run from repo root: `cargo run -p demo-server`

use axum::http::Method;
use resource_sdk::{
    init_tracing, load_config_from_path, load_overrides_from_pool, ApiError, AppError, Endpoints,
    Field, FieldKind, MemoryAdapter, MetaConfig, ObjectSchema, PgAdapter, PgColumn, PgTable,
    Registry, Reply, Resource, ResourceRequest, Schema,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

struct NotesResource {
    store: MemoryAdapter,
    schema: ObjectSchema,
}

impl NotesResource {
    fn new() -> Self {
        let schema = ObjectSchema::new()
            .titled("Note")
            .with_field("id", Field::new(FieldKind::Integer).dump_only())
            .with_field("text", Field::new(FieldKind::String).required())
            .with_field("tag", Field::new(FieldKind::String).nullable())
            .with_field("created", Field::new(FieldKind::Timestamp).dump_only());
        let store = MemoryAdapter::new(vec![
            json!({"id": 1, "text": "buy milk", "tag": "home"}),
            json!({"id": 2, "text": "ship release", "tag": "work"}),
        ]);
        NotesResource { store, schema }
    }
}

impl Resource for NotesResource {
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
            .with_per_page(20)
            .with_filters(["text", "tag"])
            .with_sorting(["id", "text"])]
    }

    fn endpoints(&self) -> Endpoints<Self> {
        Endpoints::<Self>::new()
            .route("count", "count", &[Method::GET], |resource, _ctx| {
                Box::pin(async move {
                    let total = resource.store.snapshot()?.len();
                    Ok::<_, AppError>(Reply::json(json!({ "count": total })))
                })
            })
            .describe("count", "Number of stored notes")
    }

    fn description(&self) -> Option<String> {
        Some("Short notes kept in memory".into())
    }
}

struct UsersResource {
    store: PgAdapter,
    schema: ObjectSchema,
}

impl Resource for UsersResource {
    type Adapter = PgAdapter;

    fn adapter(&self) -> &PgAdapter {
        &self.store
    }

    fn methods(&self) -> Vec<Method> {
        vec![Method::GET, Method::POST, Method::PATCH, Method::DELETE]
    }

    fn schema(&self) -> Option<&dyn Schema> {
        Some(&self.schema)
    }

    fn meta(&self) -> Vec<MetaConfig> {
        vec![MetaConfig::new()
            .with_per_page(50)
            .with_filters(["email", "active"])
            .with_sorting(["email", "created_at"])]
    }
}

fn users_table() -> PgTable {
    PgTable::new("users")
        .column(PgColumn::new("id", "uuid").not_null().with_default())
        .column(PgColumn::new("email", "text").not_null())
        .column(PgColumn::new("active", "boolean").with_default())
        .column(PgColumn::new("password_hash", "text").sensitive())
        .column(PgColumn::new("created_at", "timestamptz").not_null().with_default())
        .column(PgColumn::new("updated_at", "timestamptz").with_default())
}

/// Requests need an `Authorization` header; its value becomes the request identity.
fn token_auth(request: &ResourceRequest) -> Result<Value, AppError> {
    match request
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        Some(token) if !token.is_empty() => Ok(json!({ "token": token })),
        _ => Err(ApiError::new("Authorization required.")
            .with_status(axum::http::StatusCode::UNAUTHORIZED)
            .into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("resource_sdk=info,demo_server=info");

    let mut registry = match std::env::var("CONFIG_PATH") {
        Ok(path) => Registry::from_config(load_config_from_path(&path).await?),
        Err(_) => Registry::new("demo").with_description("Demo resources"),
    };
    if std::env::var("REQUIRE_TOKEN").is_ok() {
        registry = registry.authorization(token_auth);
    }
    registry = registry.with_span(tracing::info_span!("api"));

    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;
        if let Ok(table) = std::env::var("OVERRIDES_TABLE") {
            for (name, layer) in load_overrides_from_pool(&pool, &table).await? {
                registry = registry.with_overrides(name, layer);
            }
        }
        let store = PgAdapter::new(pool, users_table());
        let schema = store.object_schema();
        registry.register(UsersResource { store, schema })?;
    }
    registry.register(NotesResource::new())?;

    let app = registry.into_router();
    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("Demo server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
