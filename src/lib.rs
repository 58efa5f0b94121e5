//! Workshop: a self-hosting HTTP front-end.
//!
//! The core is the server lifecycle and request-normalization layer: a
//! [`Server`] built from an immutable configuration and a host-supplied
//! router, with explicit open/close operations, automatic TLS certificate
//! management when a domain is configured, and a per-request normalization
//! pass (method override, suffix-based content negotiation) applied before
//! dispatch. A bounded [`jobs::Controller`] runs background work
//! independently of the server lifecycle.

pub mod config;
pub mod http;
pub mod jobs;
pub mod middleware;
pub mod routes;

pub use http::{Server, ServerConfig, ServerError, SHUTDOWN_TIMEOUT};
