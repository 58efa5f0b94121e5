//! HTTP to HTTPS redirect listener.
//!
//! When TLS is active the plain-HTTP port would otherwise be dead; this
//! spawns a lightweight listener on port 80 that answers every request with
//! a permanent redirect to the HTTPS origin.

use std::net::SocketAddr;

use axum::http::{StatusCode, Uri};
use axum::response::Redirect;
use axum::routing::any;
use axum::Router;
use axum_extra::extract::Host;

/// Port the redirect listener binds.
const REDIRECT_PORT: u16 = 80;

/// Spawn the redirect listener in the background.
///
/// Bind or serve failures are logged, not fatal: the TLS listener is the
/// primary surface and keeps running regardless.
pub fn spawn_redirect_server(https_port: u16) {
    tokio::spawn(async move {
        let addr = SocketAddr::from(([0, 0, 0, 0], REDIRECT_PORT));
        tracing::info!(%addr, https_port, "Starting HTTP->HTTPS redirect listener");

        let app = Router::new().fallback(any(move |Host(host): Host, uri: Uri| async move {
            redirect_to_https(&host, &uri, https_port)
        }));

        if let Err(err) = axum_server::bind(addr).serve(app.into_make_service()).await {
            tracing::error!(error = %err, "HTTP redirect listener failed");
        }
    });
}

fn redirect_to_https(host: &str, uri: &Uri, https_port: u16) -> Result<Redirect, StatusCode> {
    Ok(Redirect::permanent(&https_location(host, uri, https_port)))
}

/// Build the HTTPS URL for a redirect, dropping any port from the Host
/// header and omitting ":443" from the result.
fn https_location(host: &str, uri: &Uri, https_port: u16) -> String {
    let host = host.split(':').next().unwrap_or(host);
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if https_port == 443 {
        format!("https://{host}{path_and_query}")
    } else {
        format!("https://{host}:{https_port}{path_and_query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_port_from_host_header() {
        let uri: Uri = "/a/b?c=1".parse().unwrap();
        assert_eq!(
            https_location("example.com:80", &uri, 443),
            "https://example.com/a/b?c=1"
        );
    }

    #[test]
    fn keeps_non_default_https_port() {
        let uri: Uri = "/".parse().unwrap();
        assert_eq!(
            https_location("example.com", &uri, 8443),
            "https://example.com:8443/"
        );
    }
}
