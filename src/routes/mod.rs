//! Router assembly.
//!
//! The host brings its own router; the core contributes one built-in
//! diagnostic route and the request-processing layers. Everything else about
//! routing (prefixes, verb filters, handlers) is the host's business.

pub mod hello;

use axum::{middleware, routing::get, Router};

use crate::http::normalize::normalize_request;
use crate::middleware::request_id_layer;

/// Merge the diagnostic route into the host router and apply the
/// normalization and request-id layers.
///
/// The normalization layer wraps the router itself, so the rewritten method
/// and path are what route matching sees. The request-id layer is outermost
/// so its span covers normalization too.
pub fn build(host: Router) -> Router {
    Router::new()
        .route("/helloworld", get(hello::helloworld))
        .merge(host)
        .layer(middleware::from_fn(normalize_request))
        .layer(middleware::from_fn(request_id_layer))
}
