//! HTTP server lifecycle and request normalization.
//!
//! Two listener modes, selected by configuration:
//! - **Plain**: TCP on the configured address (empty address binds an
//!   ephemeral port).
//! - **ACME**: automatic certificate provisioning for the configured domain,
//!   serving TLS on port 443 with an HTTP->HTTPS redirect on port 80.
//!
//! Every request passes through the normalization layer (method override,
//! suffix-based content negotiation) before routing.

pub mod normalize;
pub mod redirect;
pub mod server;

pub use server::{Server, ServerConfig, ServerError, SHUTDOWN_TIMEOUT};
