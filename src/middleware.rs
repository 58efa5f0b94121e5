//! Request ID middleware for correlating logs with requests.
//!
//! Each inbound request gets a UUID v4 and a tracing span wrapping its whole
//! lifecycle, so every log line emitted while handling it carries the
//! request_id field.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Request ID stored in request extensions for handlers that need it.
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Outermost middleware layer: opens the per-request span and records the
/// response status and duration when the request completes.
pub async fn request_id_layer(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    request.extensions_mut().insert(RequestId(request_id));
    let start = Instant::now();

    async move {
        let response = next.run(request).await;
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await
}
