//! Merge option layers, resolve them into [`ResourceOptions`], and load registry config.

use crate::config::resolved::{EndpointSpec, ResourceOptions, RESERVED_ARGS};
use crate::config::types::{FilterConfig, MetaConfig, RegistryConfig, StrictConfig};
use crate::config::validate_options;
use crate::error::ConfigError;
use crate::filter::FilterSpec;
use crate::naming::{normalize_template, resource_name_from_type};
use crate::schema::{Field, Schema};
use crate::sql::quoted;
use axum::http::Method;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Merge layers field by field; a later layer's `Some` replaces an earlier one.
pub fn merge_layers(layers: &[MetaConfig]) -> MetaConfig {
    layers.iter().fold(MetaConfig::default(), |mut acc, layer| {
        macro_rules! take {
            ($($f:ident),*) => {
                $( if layer.$f.is_some() { acc.$f = layer.$f.clone(); } )*
            };
        }
        take!(
            name,
            per_page,
            page_link_header,
            url,
            url_detail,
            filters,
            sorting,
            strict,
            specs
        );
        acc
    })
}

/// Build resource options from `layers` (applied over the defaults), in order.
pub fn resolve(
    type_name: &str,
    layers: &[MetaConfig],
    schema: Option<&dyn Schema>,
    methods: Vec<Method>,
    endpoints: BTreeMap<String, EndpointSpec>,
) -> Result<ResourceOptions, ConfigError> {
    let mut all = Vec::with_capacity(layers.len() + 1);
    all.push(MetaConfig::defaults());
    all.extend_from_slice(layers);
    let merged = merge_layers(&all);

    let name = merged
        .name
        .clone()
        .unwrap_or_else(|| resource_name_from_type(type_name));
    let url = normalize_template(&merged.url.clone().unwrap_or_else(|| format!("/{name}")));
    let url_detail = Some(
        merged
            .url_detail
            .as_deref()
            .map(normalize_template)
            .unwrap_or_else(|| format!("{}/{{{}}}", url.trim_end_matches('/'), name)),
    );

    let strict = match merged.strict {
        None | Some(StrictConfig::Flag(false)) => None,
        Some(StrictConfig::Flag(true)) => Some(reserved()),
        Some(StrictConfig::Names(names)) => {
            let mut set = reserved();
            set.extend(names);
            Some(set)
        }
    };

    let filters = merged
        .filters
        .unwrap_or_default()
        .into_iter()
        .map(|f| filter_spec(f, schema))
        .collect();

    let endpoints = endpoints
        .into_iter()
        .map(|(n, mut spec)| {
            spec.path = normalize_template(&spec.path);
            (n, spec)
        })
        .collect();

    let options = ResourceOptions {
        name,
        per_page: merged.per_page.filter(|n| *n > 0),
        page_link_header: merged.page_link_header.unwrap_or(true),
        url,
        url_detail,
        filters,
        sorting: merged.sorting.unwrap_or_default().into_iter().collect(),
        strict,
        specs: merged.specs,
        endpoints,
        methods,
    };
    validate_options(&options)?;
    Ok(options)
}

fn reserved() -> BTreeSet<String> {
    RESERVED_ARGS.iter().map(|s| s.to_string()).collect()
}

fn filter_spec(config: FilterConfig, schema: Option<&dyn Schema>) -> FilterSpec {
    match config {
        FilterConfig::Name(name) => FilterSpec::from_schema(&name, schema),
        FilterConfig::Spec {
            name,
            query_key,
            field,
        } => {
            let field = field
                .or_else(|| schema.and_then(|s| s.field(&name)).cloned())
                .unwrap_or_else(Field::raw);
            let query_key = query_key.unwrap_or_else(|| name.clone());
            FilterSpec::new(name)
                .with_query_key(query_key)
                .with_field(field)
        }
    }
}

/// Load a registry config from a JSON file.
pub async fn load_config_from_path(path: impl AsRef<Path>) -> Result<RegistryConfig, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let config: RegistryConfig =
        serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    tracing::debug!(path = %path.display(), resources = config.resources.len(), "loaded registry config");
    Ok(config)
}

/// Load per-resource overrides stored as `(name text, payload jsonb)` rows in `table`.
pub async fn load_overrides_from_pool(
    pool: &PgPool,
    table: &str,
) -> Result<HashMap<String, MetaConfig>, ConfigError> {
    let sql = format!("SELECT name, payload FROM {} ORDER BY name", quoted(table));
    tracing::debug!(sql = %sql, "query");
    let rows = sqlx::query_as::<_, (String, Value)>(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let mut out = HashMap::with_capacity(rows.len());
    for (name, payload) in rows {
        let layer: MetaConfig =
            serde_json::from_value(payload).map_err(|e| ConfigError::Load(format!("{name}: {e}")))?;
        out.insert(name, layer);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, ObjectSchema};

    #[test]
    fn later_layers_win_per_field() {
        let merged = merge_layers(&[
            MetaConfig::new().with_per_page(10).with_sorting(["a"]),
            MetaConfig::new().with_per_page(20),
        ]);
        assert_eq!(merged.per_page, Some(20));
        assert_eq!(merged.sorting, Some(vec!["a".to_string()]));
    }

    #[test]
    fn name_and_urls_are_derived() {
        let opts = resolve("app::UserResource", &[], None, vec![Method::GET], BTreeMap::new()).unwrap();
        assert_eq!(opts.name, "user");
        assert_eq!(opts.url, "/user");
        assert_eq!(opts.url_detail.as_deref(), Some("/user/{user}"));
        assert_eq!(opts.per_page, Some(100));
        assert!(opts.page_link_header);
        assert!(opts.strict.is_none());
    }

    #[test]
    fn strict_always_contains_reserved_args() {
        let opts = resolve(
            "X",
            &[MetaConfig::new().with_name("x").with_strict_names(["login"])],
            None,
            vec![Method::GET],
            BTreeMap::new(),
        )
        .unwrap();
        let strict = opts.strict.unwrap();
        for arg in RESERVED_ARGS.iter().chain(["login"].iter()) {
            assert!(strict.contains(*arg));
        }
    }

    #[test]
    fn zero_per_page_disables_pagination() {
        let opts = resolve(
            "Notes",
            &[MetaConfig::new().with_per_page(0)],
            None,
            vec![Method::GET],
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(opts.per_page, None);
    }

    #[test]
    fn filters_resolve_against_schema() {
        let schema = ObjectSchema::new().with_field("age", Field::new(FieldKind::Integer));
        let opts = resolve(
            "User",
            &[MetaConfig::new().with_filters(vec![
                FilterConfig::from("age"),
                FilterConfig::spec("login", "user", None),
            ])],
            Some(&schema),
            vec![Method::GET],
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(opts.filters[0].field.kind, FieldKind::Integer);
        assert_eq!(opts.filters[1].query_key, "user");
        assert_eq!(opts.filters[1].field.kind, FieldKind::Raw);
    }

    #[test]
    fn meta_config_parses_from_json() {
        let layer: MetaConfig = serde_json::from_str(
            r#"{"per_page": 5, "strict": ["q"], "filters": ["a", {"name": "b", "query_key": "bee"}]}"#,
        )
        .unwrap();
        assert_eq!(layer.per_page, Some(5));
        assert_eq!(layer.strict, Some(StrictConfig::Names(vec!["q".into()])));
        assert_eq!(layer.filters.unwrap()[1].name(), "b");
        assert!(serde_json::from_str::<MetaConfig>(r#"{"per_pages": 5}"#).is_err());
    }

    #[tokio::test]
    async fn missing_config_file_is_a_load_error() {
        let err = load_config_from_path("/nonexistent/registry.json").await.unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
