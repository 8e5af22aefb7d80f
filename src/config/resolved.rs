//! Resolved resource options: layers merged and normalised once at registration.

use crate::filter::{FilterSpec, FILTERS_ARG};
use crate::pagination::{PAGE_ARG, PER_PAGE_ARG};
use crate::sort::SORT_ARG;
use axum::http::Method;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Query params the dispatcher itself consumes; always allowed in strict mode.
pub const RESERVED_ARGS: [&str; 4] = [FILTERS_ARG, SORT_ARG, PAGE_ARG, PER_PAGE_ARG];

/// A named sub-route of a resource.
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointSpec {
    /// Path template relative to the resource url, `{param}` style.
    pub path: String,
    pub methods: Vec<Method>,
    pub description: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ResourceOptions {
    pub name: String,
    /// `None` disables pagination.
    pub per_page: Option<u64>,
    pub page_link_header: bool,
    pub url: String,
    /// `None` when the resource has no detail route.
    pub url_detail: Option<String>,
    pub filters: Vec<FilterSpec>,
    pub sorting: BTreeSet<String>,
    pub strict: Option<BTreeSet<String>>,
    pub specs: Option<Map<String, Value>>,
    pub endpoints: BTreeMap<String, EndpointSpec>,
    pub methods: Vec<Method>,
}

impl ResourceOptions {
    /// First query param outside the strict allow-list, if strict mode is on.
    pub fn strict_violation<'a>(&self, query: &'a [(String, String)]) -> Option<&'a str> {
        let allowed = self.strict.as_ref()?;
        query
            .iter()
            .map(|(k, _)| k.as_str())
            .find(|k| !allowed.contains(*k))
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointSpec> {
        self.endpoints.get(name)
    }

    /// Path arg carrying the item id: named after the resource.
    pub fn id_arg(&self) -> &str {
        &self.name
    }
}
