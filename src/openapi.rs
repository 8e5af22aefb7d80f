//! OpenAPI document for a registry. Info, tags and servers come from utoipa's builders; paths and
//! component schemas are assembled as JSON since they derive from runtime options.

use crate::dispatch::ResourceHandler;
use crate::registry::Registry;
use axum::http::Method;
use serde_json::{json, Map, Value};
use utoipa::openapi::info::InfoBuilder;
use utoipa::openapi::server::ServerBuilder;
use utoipa::openapi::tag::TagBuilder;
use utoipa::openapi::OpenApiBuilder;

const COLLECTION_METHODS: [(Method, &str); 2] = [
    (Method::GET, "List items"),
    (Method::POST, "Create an item"),
];

const DETAIL_METHODS: [(Method, &str); 4] = [
    (Method::GET, "Get an item"),
    (Method::PUT, "Update an item"),
    (Method::PATCH, "Partially update an item"),
    (Method::DELETE, "Delete an item"),
];

pub fn build(registry: &Registry, host: Option<&str>) -> Value {
    let prefix = registry.prefix();
    let server_url = match host {
        Some(host) => format!("//{host}{prefix}"),
        None => prefix,
    };

    let tags = registry.resources.iter().map(|m| {
        TagBuilder::new()
            .name(m.handler.options().name.clone())
            .description(m.handler.description())
            .build()
    });
    let doc = OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(registry.name.clone())
                .version(registry.version.clone())
                .description(registry.description.clone())
                .build(),
        )
        .servers(Some([ServerBuilder::new().url(server_url).build()]))
        .tags(Some(tags.collect::<Vec<_>>()))
        .build();

    let mut paths = Map::new();
    let mut schemas = Map::new();
    for mounted in &registry.resources {
        resource_paths(mounted.handler.as_ref(), &mut paths, &mut schemas);
    }

    let mut specs = serde_json::to_value(&doc).unwrap_or_default();
    if let Value::Object(root) = &mut specs {
        root.insert("paths".into(), Value::Object(paths));
        root.insert("components".into(), json!({ "schemas": schemas }));
        for (key, value) in &registry.spec_overrides {
            root.insert(key.clone(), value.clone());
        }
    }
    specs
}

fn resource_paths(handler: &dyn ResourceHandler, paths: &mut Map<String, Value>, schemas: &mut Map<String, Value>) {
    let options = handler.options();
    let name = options.name.as_str();

    let mut content = Map::new();
    let body_schema = match handler.schema_json() {
        Some(schema) => {
            schemas.insert(name.to_string(), schema);
            let reference = json!({ "$ref": format!("#/components/schemas/{name}") });
            content.insert("schema".into(), reference.clone());
            reference
        }
        None => json!({}),
    };
    let defaults = json!({
        "tags": [name],
        "security": [{ "api_key": [] }],
        "responses": {
            "200": {
                "description": "OK",
                "content": { "application/json": Value::Object(content) },
            }
        }
    });
    let body_param = json!({
        "in": "body",
        "name": "body",
        "description": "resource body",
        "required": true,
        "schema": body_schema,
    });

    for (endpoint_name, endpoint) in &options.endpoints {
        let mut item = Map::new();
        for method in &endpoint.methods {
            let summary = endpoint.description.clone().unwrap_or_else(|| endpoint_name.clone());
            let mut op = operation(&defaults, &summary);
            merge(&mut op, options.specs.as_ref());
            item.insert(method.as_str().to_lowercase(), op);
        }
        paths.insert(crate::naming::join_path(&options.url, &endpoint.path), Value::Object(item));
    }

    let mut collection = Map::new();
    for (method, summary) in COLLECTION_METHODS {
        if !options.allows(&method) {
            continue;
        }
        let mut op = operation(&defaults, summary);
        if method == Method::POST {
            op["parameters"] = json!([body_param.clone()]);
        }
        merge(&mut op, options.specs.as_ref());
        collection.insert(method.as_str().to_lowercase(), op);
    }
    paths.insert(options.url.clone(), Value::Object(collection));

    let Some(detail) = &options.url_detail else {
        return;
    };
    let mut item = Map::new();
    for (method, summary) in DETAIL_METHODS {
        if !options.allows(&method) {
            continue;
        }
        let mut op = operation(&defaults, summary);
        let mut params = vec![json!({
            "name": name,
            "in": "path",
            "description": "ID of resource",
            "required": true,
            "schema": { "type": "string" },
        })];
        if method == Method::PUT || method == Method::PATCH {
            params.push(body_param.clone());
        }
        op["parameters"] = Value::Array(params);
        merge(&mut op, options.specs.as_ref());
        item.insert(method.as_str().to_lowercase(), op);
    }
    paths.insert(detail.clone(), Value::Object(item));
}

fn operation(defaults: &Value, summary: &str) -> Value {
    let mut op = defaults.clone();
    op["summary"] = json!(summary);
    op["description"] = json!(summary);
    op
}

fn merge(op: &mut Value, specs: Option<&Map<String, Value>>) {
    let (Value::Object(target), Some(specs)) = (op, specs) else {
        return;
    };
    for (key, value) in specs {
        target.insert(key.clone(), value.clone());
    }
}
