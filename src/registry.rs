//! API registry: binds resources to URLs under a versioned prefix and holds the shared
//! authorization hook, logging span and per-resource option overrides.

use crate::config::{MetaConfig, RegistryConfig};
use crate::context::{Reply, ResourceRequest};
use crate::dispatch::{Dispatcher, ResourceHandler};
use crate::error::{ApiError, AppError, ConfigError};
use crate::naming::join_path;
use crate::openapi;
use crate::resource::{AllowAll, Authorize, Resource};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Detail (single item) route of a mounted resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DetailRoute {
    /// `<url>/{<name>}` unless the resource's options set one.
    #[default]
    Default,
    Disabled,
    Custom(String),
}

#[derive(Clone, Debug, Default)]
pub struct MountOptions {
    pub url: Option<String>,
    pub detail: DetailRoute,
}

impl MountOptions {
    pub fn at(url: impl Into<String>) -> Self {
        MountOptions {
            url: Some(url.into()),
            detail: DetailRoute::Default,
        }
    }

    pub fn detail(mut self, detail: DetailRoute) -> Self {
        self.detail = detail;
        self
    }
}

/// A route served by one resource: full path template, and the endpoint it selects, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSpec {
    pub path: String,
    pub endpoint: Option<String>,
}

pub(crate) struct Mounted {
    pub(crate) handler: Arc<dyn ResourceHandler>,
    pub(crate) routes: Vec<RouteSpec>,
}

pub struct Registry {
    pub(crate) name: String,
    pub(crate) version: String,
    prefix: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) specs_enabled: bool,
    pub(crate) spec_overrides: Map<String, Value>,
    pub(crate) max_body_bytes: usize,
    authorizer: Arc<dyn Authorize>,
    span: tracing::Span,
    overrides: HashMap<String, MetaConfig>,
    pub(crate) resources: Vec<Mounted>,
}

impl Registry {
    pub fn new(name: impl Into<String>) -> Self {
        Registry {
            name: name.into(),
            version: "1".into(),
            prefix: None,
            description: None,
            specs_enabled: true,
            spec_overrides: Map::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            authorizer: Arc::new(AllowAll),
            span: tracing::Span::none(),
            overrides: HashMap::new(),
            resources: Vec::new(),
        }
    }

    /// Apply a loaded config file; unset fields keep their current values.
    pub fn from_config(config: RegistryConfig) -> Self {
        let mut registry = Registry::new(config.name.unwrap_or_else(|| "api".into()));
        if let Some(version) = config.version {
            registry.version = version;
        }
        registry.prefix = config.prefix;
        if let Some(specs) = config.specs {
            registry.specs_enabled = specs;
        }
        if let Some(max) = config.max_body_bytes {
            registry.max_body_bytes = max;
        }
        registry.overrides = config.resources;
        registry
    }

    /// Also sets the prefix to `/<version>` unless one was given explicitly.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Serve `<prefix>/_specs` and the HTML viewer at `<prefix>/`.
    pub fn with_specs(mut self, enabled: bool) -> Self {
        self.specs_enabled = enabled;
        self
    }

    /// Top-level fields merged over the generated OpenAPI document.
    pub fn with_spec_overrides(mut self, overrides: Map<String, Value>) -> Self {
        self.spec_overrides = overrides;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Option layer applied last to the resource with this name.
    pub fn with_overrides(mut self, resource: impl Into<String>, layer: MetaConfig) -> Self {
        self.overrides.insert(resource.into(), layer);
        self
    }

    /// Parent span of every dispatch span.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Registry-wide authorization hook; resources may override it.
    pub fn authorization(mut self, hook: impl Authorize + 'static) -> Self {
        self.authorizer = Arc::new(hook);
        self
    }

    pub fn prefix(&self) -> String {
        self.prefix
            .clone()
            .unwrap_or_else(|| format!("/{}", self.version))
    }

    pub fn register<R: Resource>(&mut self, resource: R) -> Result<(), ConfigError> {
        self.mount(resource, MountOptions::default())
    }

    pub fn mount<R: Resource>(&mut self, resource: R, mount: MountOptions) -> Result<(), ConfigError> {
        let mut extra = Vec::new();
        if mount.url.is_some() {
            extra.push(MetaConfig {
                url: mount.url.clone(),
                ..MetaConfig::default()
            });
        }
        if let DetailRoute::Custom(detail) = &mount.detail {
            extra.push(MetaConfig::new().with_url_detail(detail.clone()));
        }

        // The name is only known after resolution; resolve again when an override exists for it.
        let mut dispatcher = Dispatcher::new(resource, &extra, Arc::clone(&self.authorizer), self.span.clone())?;
        if let Some(layer) = self.overrides.get(&dispatcher.options().name).cloned() {
            extra.push(layer);
            let resource = dispatcher.into_resource();
            dispatcher = Dispatcher::new(resource, &extra, Arc::clone(&self.authorizer), self.span.clone())?;
        }
        if mount.detail == DetailRoute::Disabled {
            dispatcher = dispatcher.map_options(|o| o.url_detail = None);
        }

        let options = Arc::clone(dispatcher.options());
        if self
            .resources
            .iter()
            .any(|m| m.handler.options().name == options.name)
        {
            return Err(ConfigError::DuplicateName(options.name.clone()));
        }

        let prefix = self.prefix();
        let prefix = prefix.trim_end_matches('/');
        let url = &options.url;
        let mut routes = vec![RouteSpec {
            path: format!("{prefix}{url}"),
            endpoint: None,
        }];
        for (name, endpoint) in &options.endpoints {
            routes.push(RouteSpec {
                path: format!("{prefix}{}", join_path(url, &endpoint.path)),
                endpoint: Some(name.clone()),
            });
        }
        if let Some(detail) = &options.url_detail {
            routes.push(RouteSpec {
                path: format!("{prefix}{detail}"),
                endpoint: None,
            });
        }
        let taken = self.routes();
        if let Some(clash) = routes.iter().find(|r| taken.iter().any(|t| t.path == r.path)) {
            return Err(ConfigError::InvalidOption {
                resource: options.name.clone(),
                message: format!("route {} is already mounted", clash.path),
            });
        }
        tracing::debug!(resource = %options.name, routes = routes.len(), "mounted resource");
        self.resources.push(Mounted {
            handler: Arc::new(dispatcher),
            routes,
        });
        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.resources
            .iter()
            .find(|m| m.handler.options().name == name)
            .map(|m| Arc::clone(&m.handler))
    }

    pub fn routes(&self) -> Vec<RouteSpec> {
        self.resources
            .iter()
            .flat_map(|m| m.routes.iter().cloned())
            .collect()
    }

    /// Dispatch a request to the named resource without HTTP and return its raw reply.
    pub async fn run(&self, name: &str, request: ResourceRequest) -> Result<Reply, AppError> {
        let handler = self.resource(name).ok_or_else(ApiError::not_found)?;
        handler.dispatch(request).await
    }

    /// OpenAPI document for every mounted resource.
    pub fn specs(&self, host: Option<&str>) -> Value {
        openapi::build(self, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryAdapter;
    use crate::resource::FnResource;
    use axum::http::Method;
    use serde_json::json;

    struct Notes {
        store: MemoryAdapter,
    }

    impl Resource for Notes {
        type Adapter = MemoryAdapter;

        fn adapter(&self) -> &MemoryAdapter {
            &self.store
        }
    }

    fn notes() -> Notes {
        Notes {
            store: MemoryAdapter::new(vec![json!({"id": 1, "text": "a"})]),
        }
    }

    #[test]
    fn prefix_follows_version() {
        assert_eq!(Registry::new("api").prefix(), "/1");
        assert_eq!(Registry::new("api").with_version("2").prefix(), "/2");
        assert_eq!(
            Registry::new("api").with_version("2").with_prefix("/api/v2").prefix(),
            "/api/v2"
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = Registry::new("api");
        registry.register(notes()).unwrap();
        let err = registry.register(notes()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(name) if name == "notes"));
    }

    #[test]
    fn mount_options_shape_routes() {
        let mut registry = Registry::new("api").with_prefix("/api/v1");
        registry
            .mount(notes(), MountOptions::at("/memo").detail(DetailRoute::Disabled))
            .unwrap();
        let hello = FnResource::new("hello", &[], |ctx| {
            Box::pin(async move { Ok::<_, AppError>(Reply::json(json!(ctx.request.path.clone()))) })
        });
        registry
            .mount(hello, MountOptions::at("/greet/<name>/how-are-you"))
            .unwrap();
        let paths: Vec<_> = registry.routes().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![
                "/api/v1/memo",
                "/api/v1/greet/{name}/how-are-you",
                "/api/v1/greet/{name}/how-are-you/{hello}",
            ]
        );
    }

    #[test]
    fn overrides_apply_by_resource_name() {
        let mut registry =
            Registry::new("api").with_overrides("notes", MetaConfig::new().with_per_page(5));
        registry.register(notes()).unwrap();
        let handler = registry.resource("notes").unwrap();
        assert_eq!(handler.options().per_page, Some(5));
        assert_eq!(handler.options().methods, vec![Method::GET]);
    }
}
