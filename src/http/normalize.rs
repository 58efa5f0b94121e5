//! Request normalization applied once per request, before routing.
//!
//! Two rewrites run in order:
//!
//! 1. **Method override**: a POST carrying a urlencoded form field `_method`
//!    with an allowed verb is dispatched as that verb. Clients limited to
//!    GET/POST (HTML forms) use this to reach PATCH/DELETE handlers.
//! 2. **Suffix negotiation**: a path suffix from [`SUFFIX_RULES`] selects the
//!    response representation; the matching headers are set and the suffix is
//!    stripped from the dispatch path.
//!
//! Normalization never fails. Malformed, oversized, or unparseable input
//! passes through unchanged and is dispatched as-is, with one best-effort
//! exception: a form body that fails mid-read cannot be reconstructed and
//! is dispatched with an empty body.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::{header, HeaderValue, Method, Uri};

/// Form field carrying the override verb.
const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Verbs a POST may be rewritten to. Anything else leaves the method as POST.
const ALLOWED_OVERRIDES: &[Method] = &[Method::GET, Method::POST, Method::PATCH, Method::DELETE];

/// Largest form body inspected for a method override.
const MAX_FORM_BODY_BYTES: usize = 1024 * 1024;

/// A path suffix and the representation headers it selects.
struct SuffixRule {
    suffix: &'static str,
    accept: &'static str,
    /// Content-Type to force, if the rule rewrites it.
    content_type: Option<&'static str>,
}

/// Suffix-to-header mapping table. Rules are checked in order; the first
/// matching suffix wins and is stripped from the dispatch path.
const SUFFIX_RULES: &[SuffixRule] = &[
    SuffixRule {
        suffix: ".json",
        accept: "application/json",
        content_type: Some("application/json"),
    },
    SuffixRule {
        suffix: ".csv",
        accept: "text/csv",
        content_type: None,
    },
];

/// Middleware entry point. Layered on the router so the rewritten method and
/// path are what routing sees.
pub async fn normalize_request(req: Request, next: Next) -> Response {
    let req = apply_method_override(req).await;
    let req = apply_suffix_rules(req);
    next.run(req).await
}

/// Rewrite the method of a POST whose form body requests an allowed verb.
///
/// The body is buffered, inspected, and re-attached unchanged so downstream
/// form extractors still see it. Bodies with a declared length above the cap
/// are left alone; bodies without a declared length (chunked transfer) are
/// inspected too, with `to_bytes` enforcing the cap. Best-effort edge: a
/// body that fails mid-read is past recovery and dispatches with an empty
/// body instead of the original.
async fn apply_method_override(req: Request) -> Request {
    if req.method() != Method::POST || !is_form_urlencoded(&req) {
        return req;
    }
    if matches!(declared_content_length(&req), Some(len) if len > MAX_FORM_BODY_BYTES) {
        return req;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_FORM_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(error = %err, "Form body unreadable, skipping method override");
            return Request::from_parts(parts, Body::empty());
        }
    };

    if let Some(method) = override_method(&bytes) {
        tracing::debug!(from = %parts.method, to = %method, "Method override");
        parts.method = method;
    }
    Request::from_parts(parts, Body::from(bytes))
}

/// Extract the override verb from a urlencoded body, if present and allowed.
fn override_method(body: &[u8]) -> Option<Method> {
    let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
    let value = fields
        .into_iter()
        .find(|(name, _)| name == METHOD_OVERRIDE_FIELD)?
        .1;
    let method = Method::from_bytes(value.as_bytes()).ok()?;
    ALLOWED_OVERRIDES.contains(&method).then_some(method)
}

/// Apply the first matching suffix rule: set representation headers and strip
/// the suffix from the dispatch path, preserving the query string.
fn apply_suffix_rules(mut req: Request) -> Request {
    let found = {
        let path = req.uri().path();
        SUFFIX_RULES.iter().find_map(|rule| {
            path.strip_suffix(rule.suffix)
                .map(|stripped| (rule, stripped.to_string()))
        })
    };
    let Some((rule, stripped)) = found else {
        return req;
    };

    let path_and_query = match req.uri().query() {
        Some(query) => format!("{stripped}?{query}"),
        None => stripped,
    };
    let mut uri_parts = req.uri().clone().into_parts();
    uri_parts.path_and_query = match path_and_query.parse() {
        Ok(pq) => Some(pq),
        Err(_) => return req,
    };
    let Ok(uri) = Uri::from_parts(uri_parts) else {
        return req;
    };

    tracing::debug!(from = %req.uri(), to = %uri, accept = rule.accept, "Suffix negotiation");
    *req.uri_mut() = uri;
    req.headers_mut()
        .insert(header::ACCEPT, HeaderValue::from_static(rule.accept));
    if let Some(content_type) = rule.content_type {
        req.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    req
}

fn is_form_urlencoded(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

fn declared_content_length(req: &Request) -> Option<usize> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
