//! Resource names and URL templates.

/// Derive a resource name from a Rust type path: last segment, generics stripped, lowercased,
/// cut at the first "resource". `app::UserResource` -> `user`.
pub fn resource_name_from_type(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let last = base.rsplit("::").next().unwrap_or(base);
    let lower = last.to_lowercase();
    match lower.split_once("resource") {
        Some((head, _)) => head.to_string(),
        None => lower,
    }
}

/// Normalise a path template to `{param}` style; `<param>` is accepted too.
/// e.g. "/user/<id>" -> "/user/{id}"
pub fn normalize_template(path: &str) -> String {
    path.replace('<', "{").replace('>', "}")
}

/// Convert a `{param}` template to the router's `:param` syntax.
pub fn to_router_path(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut in_param = false;
    for c in template.chars() {
        match c {
            '{' => {
                in_param = true;
                out.push(':');
            }
            '}' if in_param => in_param = false,
            other => out.push(other),
        }
    }
    out
}

/// Join a resource url and a relative endpoint path with exactly one slash.
pub fn join_path(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_matches('/'))
}
