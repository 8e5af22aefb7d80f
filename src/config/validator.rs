//! Option validation: names usable as path params, well-formed urls and endpoints.

use crate::config::ResourceOptions;
use crate::error::ConfigError;

fn invalid(options: &ResourceOptions, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidOption {
        resource: options.name.clone(),
        message: message.into(),
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn validate_options(options: &ResourceOptions) -> Result<(), ConfigError> {
    if !is_identifier(&options.name) {
        return Err(invalid(
            options,
            "name must be non-empty and contain only letters, digits, '_' or '-'",
        ));
    }
    if !options.url.starts_with('/') {
        return Err(invalid(options, format!("url '{}' must start with '/'", options.url)));
    }
    if let Some(detail) = &options.url_detail {
        if !detail.starts_with('/') {
            return Err(invalid(options, format!("url_detail '{detail}' must start with '/'")));
        }
    }
    if options.methods.is_empty() {
        return Err(invalid(options, "at least one method required"));
    }
    for (name, endpoint) in &options.endpoints {
        if name.is_empty() || endpoint.path.trim_matches('/').is_empty() {
            return Err(invalid(options, format!("endpoint '{name}' needs a name and a path")));
        }
        if endpoint.methods.is_empty() {
            return Err(invalid(options, format!("endpoint '{name}' has no methods")));
        }
    }
    let mut keys = std::collections::HashSet::new();
    for f in &options.filters {
        if !keys.insert(f.query_key.as_str()) {
            return Err(invalid(options, format!("duplicate filter key '{}'", f.query_key)));
        }
    }
    if options.sorting.iter().any(|s| s.is_empty() || s.starts_with('-')) {
        return Err(invalid(options, "sorting names must be plain field names"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::{resolve, EndpointSpec, MetaConfig};
    use crate::error::ConfigError;
    use axum::http::Method;
    use std::collections::BTreeMap;

    #[test]
    fn rejects_bad_name_and_url() {
        let err = resolve("X", &[MetaConfig::new().with_name("a b")], None, vec![Method::GET], BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));
        let err = resolve("X", &[MetaConfig::new().with_url("x")], None, vec![Method::GET], BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));
    }

    #[test]
    fn rejects_endpoint_without_methods() {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            "login".to_string(),
            EndpointSpec {
                path: "/login".into(),
                methods: vec![],
                description: None,
            },
        );
        assert!(resolve("User", &[], None, vec![Method::GET], endpoints).is_err());
    }
}
