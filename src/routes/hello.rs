//! Built-in diagnostic route.

/// Smoke-test handler confirming the serve loop is up and dispatching.
pub async fn helloworld() -> &'static str {
    tracing::info!("Hello World!");
    "Hello World!\n"
}
