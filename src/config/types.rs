//! Raw config types: partial per-resource option layers and the registry config file.

use crate::schema::Field;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Strict query checking: `true` allows only the reserved params; a list adds more names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StrictConfig {
    Flag(bool),
    Names(Vec<String>),
}

impl From<bool> for StrictConfig {
    fn from(flag: bool) -> Self {
        StrictConfig::Flag(flag)
    }
}

/// A filter entry: a bare field name, or an explicit spec with its own query key and codec.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterConfig {
    Name(String),
    Spec {
        name: String,
        #[serde(default)]
        query_key: Option<String>,
        #[serde(default)]
        field: Option<Field>,
    },
}

impl FilterConfig {
    pub fn spec(name: impl Into<String>, query_key: impl Into<String>, field: Option<Field>) -> Self {
        FilterConfig::Spec {
            name: name.into(),
            query_key: Some(query_key.into()),
            field,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FilterConfig::Name(n) => n,
            FilterConfig::Spec { name, .. } => name,
        }
    }
}

impl From<&str> for FilterConfig {
    fn from(name: &str) -> Self {
        FilterConfig::Name(name.to_string())
    }
}

impl From<String> for FilterConfig {
    fn from(name: String) -> Self {
        FilterConfig::Name(name)
    }
}

/// One layer of resource options. Every field is optional; layers are merged last-write-wins.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetaConfig {
    pub name: Option<String>,
    /// Page size; `0` disables pagination.
    pub per_page: Option<u64>,
    pub page_link_header: Option<bool>,
    pub url: Option<String>,
    pub url_detail: Option<String>,
    pub filters: Option<Vec<FilterConfig>>,
    pub sorting: Option<Vec<String>>,
    pub strict: Option<StrictConfig>,
    /// Extra OpenAPI fields merged into every operation of the resource.
    pub specs: Option<Map<String, Value>>,
}

impl MetaConfig {
    pub fn new() -> Self {
        MetaConfig::default()
    }

    /// Base layer applied under every resource.
    pub fn defaults() -> Self {
        MetaConfig {
            per_page: Some(100),
            page_link_header: Some(true),
            filters: Some(Vec::new()),
            sorting: Some(Vec::new()),
            strict: Some(StrictConfig::Flag(false)),
            ..MetaConfig::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_per_page(mut self, per_page: u64) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn with_page_link_header(mut self, enabled: bool) -> Self {
        self.page_link_header = Some(enabled);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_url_detail(mut self, url_detail: impl Into<String>) -> Self {
        self.url_detail = Some(url_detail.into());
        self
    }

    pub fn with_filters<I, F>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FilterConfig>,
    {
        self.filters = Some(filters.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_sorting<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sorting = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_strict(mut self, strict: impl Into<StrictConfig>) -> Self {
        self.strict = Some(strict.into());
        self
    }

    pub fn with_strict_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strict = Some(StrictConfig::Names(
            names.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn with_specs(mut self, specs: Map<String, Value>) -> Self {
        self.specs = Some(specs);
        self
    }
}

/// Registry-level configuration, typically loaded from a JSON file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub name: Option<String>,
    pub version: Option<String>,
    pub prefix: Option<String>,
    /// Serve `/_specs` and the HTML viewer.
    pub specs: Option<bool>,
    pub max_body_bytes: Option<usize>,
    /// Per-resource overrides keyed by resource name, merged as the last layer.
    pub resources: HashMap<String, MetaConfig>,
}
