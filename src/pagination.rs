//! Page/per_page parsing and the `X-*` / `Link` pagination headers.

use crate::error::ApiError;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const PAGE_ARG: &str = "page";
pub const PER_PAGE_ARG: &str = "per_page";

const X_TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");
const X_LIMIT: HeaderName = HeaderName::from_static("x-limit");
const X_PAGE_LAST: HeaderName = HeaderName::from_static("x-page-last");
const X_PAGE: HeaderName = HeaderName::from_static("x-page");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.per_page)
    }
}

fn first<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Requested page, or `None` when pagination is disabled (no default, or a zero page size).
pub fn page_request(
    query: &[(String, String)],
    default_per_page: Option<u64>,
) -> Result<Option<PageRequest>, ApiError> {
    let Some(default) = default_per_page.filter(|n| *n > 0) else {
        return Ok(None);
    };
    let invalid = |_| ApiError::new("Pagination params are invalid.");
    let per_page = match first(query, PER_PAGE_ARG) {
        Some(raw) => raw.trim().parse::<u64>().map_err(invalid)?,
        None => default,
    };
    if per_page == 0 {
        return Ok(None);
    }
    let page = match first(query, PAGE_ARG) {
        Some(raw) => raw.trim().parse::<u64>().map_err(invalid)?,
        None => 0,
    };
    Ok(Some(PageRequest { page, per_page }))
}

/// Index of the last page; zero for an empty collection.
pub fn last_page(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit).saturating_sub(1)
}

/// Build pagination headers. `link` carries the request path and query used to render `Link`.
pub fn pagination_headers(
    limit: u64,
    page: u64,
    total: u64,
    link: Option<(&str, &[(String, String)])>,
) -> HeaderMap {
    let last = last_page(total, limit);
    let mut headers = HeaderMap::new();
    headers.insert(X_TOTAL_COUNT, HeaderValue::from(total));
    headers.insert(X_LIMIT, HeaderValue::from(limit));
    headers.insert(X_PAGE_LAST, HeaderValue::from(last));
    headers.insert(X_PAGE, HeaderValue::from(page));

    let Some((path, query)) = link else {
        return headers;
    };
    let mut rels = vec![("first", 0), ("last", last)];
    if page > 0 {
        rels.push(("prev", page - 1));
    }
    if page < last {
        rels.push(("next", page + 1));
    }
    let links: Option<Vec<String>> = rels
        .into_iter()
        .map(|(rel, target)| {
            page_url(path, query, target).map(|url| format!("<{url}>; rel=\"{rel}\""))
        })
        .collect();
    match links.and_then(|l| HeaderValue::from_str(&l.join(",")).ok()) {
        Some(value) => {
            headers.insert(axum::http::header::LINK, value);
        }
        None => tracing::debug!(%path, "could not render pagination link header"),
    }
    headers
}

/// `path?query` with `page` rewritten in place, or appended when absent. Repeated keys collapse
/// to their first value.
fn page_url(path: &str, query: &[(String, String)], page: u64) -> Option<String> {
    let page = page.to_string();
    let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(query.len() + 1);
    for (k, v) in query {
        if pairs.iter().any(|(seen, _)| seen == k) {
            continue;
        }
        if k == PAGE_ARG {
            pairs.push((k, &page));
        } else {
            pairs.push((k, v));
        }
    }
    if !pairs.iter().any(|(k, _)| *k == PAGE_ARG) {
        pairs.push((PAGE_ARG, &page));
    }
    serde_urlencoded::to_string(&pairs)
        .ok()
        .map(|qs| format!("{path}?{qs}"))
}
