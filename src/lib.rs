//! Resource SDK: declarative REST resources over pluggable collections, with query-string
//! filtering, sorting, pagination and a generated OpenAPI document.

pub mod backend;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod naming;
pub mod openapi;
pub mod pagination;
pub mod registry;
pub mod resource;
pub mod routes;
pub mod schema;
pub mod sort;
pub mod sql;
pub mod telemetry;

pub use backend::{CollectionAdapter, IdLookup, MemoryAdapter, NoStorage, PgAdapter};
pub use config::{load_config_from_path, load_overrides_from_pool, FilterConfig, MetaConfig, RegistryConfig, ResourceOptions, StrictConfig};
pub use context::{Reply, RequestContext, ResourceRequest};
pub use dispatch::{Dispatcher, ResourceHandler};
pub use error::{ApiError, AppError, ConfigError, FieldErrors};
pub use filter::{FilterSpec, Operator, ParsedFilter};
pub use registry::{DetailRoute, MountOptions, Registry, RouteSpec};
pub use resource::{AllowAll, Authorize, BoxFuture, Collection, Endpoints, FnResource, HandlerResult, Resource};
pub use schema::{Field, FieldKind, ObjectSchema, Schema, ValidationRule};
pub use sort::SortField;
pub use sql::{PgColumn, PgTable};
pub use telemetry::init_tracing;
