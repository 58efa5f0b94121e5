//! Server lifecycle: listener selection, supervised serving, graceful close.
//!
//! A [`Server`] is constructed from an immutable [`ServerConfig`] and a
//! host-supplied router, then driven through an explicit state machine:
//!
//! ```text
//! Unopened --open()--> Open --close()--> Closed
//! ```
//!
//! `open()` binds the listener synchronously (plain TCP, or an ACME-managed
//! TLS listener when a domain is configured) and spawns the serving loop on a
//! supervised task. `close()` stops accepting connections, waits up to
//! [`SHUTDOWN_TIMEOUT`] for in-flight requests to drain, then force-stops.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use futures::StreamExt;
use rustls_acme::caches::DirCache;
use rustls_acme::AcmeConfig;
use tokio::task::JoinHandle;

use crate::config::{AcmeSettings, AppConfig};
use crate::routes;

use super::redirect;

/// Bounded window granted to in-flight requests during `close()`.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Port bound by the TLS listener when a domain is configured.
const TLS_PORT: u16 = 443;

/// Immutable server configuration, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Bind address for plain HTTP. Empty binds an ephemeral port; a bare
    /// ":port" binds all interfaces. Ignored when `domain` is set.
    pub addr: String,
    /// TLS domain for automatic certificate management. Empty disables TLS.
    pub domain: String,
    /// Reserved for a future cookie-signing collaborator.
    pub hash_key: String,
    /// Reserved for a future cookie-encryption collaborator.
    pub block_key: String,
    /// ACME account and cache settings, used only when `domain` is set.
    pub acme: AcmeSettings,
}

impl From<&AppConfig> for ServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            addr: config.http.addr.clone(),
            domain: config.http.domain.clone(),
            hash_key: config.http.hash_key.clone(),
            block_key: config.http.block_key.clone(),
            acme: config.acme.clone(),
        }
    }
}

/// Server lifecycle error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("Certificate provisioning failed: {0}")]
    Certificate(String),

    #[error("Server is already open")]
    AlreadyOpen,

    #[error("Graceful shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Server error: {0}")]
    Serve(String),
}

enum State {
    Unopened,
    Open {
        local_addr: SocketAddr,
        handle: Handle,
        serve_task: JoinHandle<io::Result<()>>,
        acme_task: Option<JoinHandle<()>>,
    },
    Closed,
}

/// HTTP front-end with explicit open/close lifecycle.
pub struct Server {
    config: ServerConfig,
    router: Option<Router>,
    state: State,
}

impl Server {
    /// Create a server from an immutable configuration and the host's router.
    ///
    /// The built-in diagnostic route and the request-normalization layers are
    /// merged into the router here; no network I/O happens until [`open`].
    ///
    /// [`open`]: Server::open
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self {
            config,
            router: Some(routes::build(router)),
            state: State::Unopened,
        }
    }

    /// Whether the server terminates TLS.
    pub fn use_tls(&self) -> bool {
        !self.config.domain.is_empty()
    }

    /// "https" when a TLS domain is configured, else "http".
    pub fn scheme(&self) -> &'static str {
        if self.use_tls() {
            "https"
        } else {
            "http"
        }
    }

    /// The actual bound port, or 0 if the server is not open.
    pub fn port(&self) -> u16 {
        match &self.state {
            State::Open { local_addr, .. } => local_addr.port(),
            State::Unopened | State::Closed => 0,
        }
    }

    /// Base URL of the server, omitting the port for (http, 80) and
    /// (https, 443).
    pub fn url(&self) -> String {
        let host = if self.config.domain.is_empty() {
            "localhost"
        } else {
            &self.config.domain
        };
        compose_url(self.scheme(), host, self.port())
    }

    /// Bind the listener and spawn the serving loop, returning once the
    /// listener is live.
    ///
    /// With a configured domain this binds port 443 behind an ACME acceptor
    /// (certificate challenges, issuance, and renewal run in the background)
    /// and additionally spawns an HTTP-to-HTTPS redirect listener on port 80.
    /// Otherwise it binds plain TCP on the configured address.
    ///
    /// Errors that occur inside the serving loop after a successful return
    /// surface when [`close`] joins the supervised task.
    ///
    /// [`close`]: Server::close
    pub async fn open(&mut self) -> Result<(), ServerError> {
        if !matches!(self.state, State::Unopened) {
            return Err(ServerError::AlreadyOpen);
        }

        let (listener, local_addr, acme) = if self.use_tls() {
            let bind_addr = format!("0.0.0.0:{TLS_PORT}");
            let listener = bind_tcp(SocketAddr::from(([0, 0, 0, 0], TLS_PORT))).map_err(
                |source| ServerError::Bind {
                    addr: bind_addr.clone(),
                    source,
                },
            )?;
            let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
                addr: bind_addr,
                source,
            })?;
            let (acceptor, acme_task) = self.start_acme()?;
            (listener, local_addr, Some((acceptor, acme_task)))
        } else {
            let addr = resolve_addr(&self.config.addr).map_err(|source| ServerError::Bind {
                addr: self.config.addr.clone(),
                source,
            })?;
            let listener = bind_tcp(addr).map_err(|source| ServerError::Bind {
                addr: self.config.addr.clone(),
                source,
            })?;
            let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
                addr: self.config.addr.clone(),
                source,
            })?;
            (listener, local_addr, None)
        };

        // Fallible setup is done; taking the router only now keeps a failed
        // open retryable.
        let router = self.router.take().ok_or(ServerError::AlreadyOpen)?;
        let app = router.into_make_service();
        let handle = Handle::new();

        let (serve_task, acme_task) = match acme {
            Some((acceptor, acme_task)) => {
                tracing::info!(
                    domain = %self.config.domain,
                    %local_addr,
                    "Starting HTTPS server (ACME)"
                );
                redirect::spawn_redirect_server(local_addr.port());
                let serve_task = tokio::spawn(
                    axum_server::from_tcp(listener)
                        .acceptor(acceptor)
                        .handle(handle.clone())
                        .serve(app),
                );
                (serve_task, Some(acme_task))
            }
            None => {
                tracing::info!(%local_addr, "Starting HTTP server (no TLS)");
                let serve_task = tokio::spawn(
                    axum_server::from_tcp(listener)
                        .handle(handle.clone())
                        .serve(app),
                );
                (serve_task, None)
            }
        };

        self.state = State::Open {
            local_addr,
            handle,
            serve_task,
            acme_task,
        };
        Ok(())
    }

    /// Build the ACME acceptor and spawn the certificate event loop.
    fn start_acme(&self) -> Result<(rustls_acme::axum::AxumAcceptor, JoinHandle<()>), ServerError> {
        let settings = &self.config.acme;

        std::fs::create_dir_all(&settings.cache_dir).map_err(|e| {
            ServerError::Certificate(format!(
                "failed to create ACME cache directory '{}': {e}",
                settings.cache_dir
            ))
        })?;

        let mut acme_config = AcmeConfig::new([self.config.domain.clone()])
            .cache(DirCache::new(settings.cache_dir.clone()))
            .directory_lets_encrypt(settings.production);
        if let Some(contact) = &settings.contact {
            acme_config = acme_config.contact_push(format!("mailto:{contact}"));
        }

        let mut acme_state = acme_config.state();
        let acceptor = acme_state.axum_acceptor(acme_state.default_rustls_config());

        // Drives challenges, issuance, and renewal; aborted on close.
        let acme_task = tokio::spawn(async move {
            loop {
                match acme_state.next().await {
                    Some(Ok(event)) => tracing::info!(event = ?event, "ACME event"),
                    Some(Err(err)) => tracing::error!(error = %err, "ACME error"),
                    None => {
                        tracing::debug!("ACME state stream ended");
                        break;
                    }
                }
            }
        });

        Ok((acceptor, acme_task))
    }

    /// Gracefully shut the server down.
    ///
    /// Stops accepting new connections, then waits up to [`SHUTDOWN_TIMEOUT`]
    /// for in-flight requests to finish. If they drain in time the supervised
    /// serving task is joined and any serving error it recorded is returned;
    /// otherwise remaining connections are force-closed and
    /// [`ServerError::ShutdownTimeout`] is returned.
    ///
    /// Calling `close` on a server that was never opened, or was already
    /// closed, is a no-op returning `Ok(())`.
    pub async fn close(&mut self) -> Result<(), ServerError> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Unopened | State::Closed => Ok(()),
            State::Open {
                handle,
                serve_task,
                acme_task,
                ..
            } => {
                if let Some(task) = acme_task {
                    task.abort();
                }

                handle.graceful_shutdown(None);
                match tokio::time::timeout(SHUTDOWN_TIMEOUT, serve_task).await {
                    Ok(Ok(Ok(()))) => {
                        tracing::info!("Server shut down gracefully");
                        Ok(())
                    }
                    Ok(Ok(Err(err))) => Err(ServerError::Serve(err.to_string())),
                    Ok(Err(join_err)) => Err(ServerError::Serve(join_err.to_string())),
                    Err(_) => {
                        tracing::warn!(
                            timeout = ?SHUTDOWN_TIMEOUT,
                            "Shutdown timed out, force-closing connections"
                        );
                        handle.shutdown();
                        Err(ServerError::ShutdownTimeout(SHUTDOWN_TIMEOUT))
                    }
                }
            }
        }
    }
}

/// Resolve a configured address string to a socket address.
///
/// Empty binds an ephemeral port on all interfaces; a bare ":port" binds all
/// interfaces on that port.
fn resolve_addr(addr: &str) -> io::Result<SocketAddr> {
    if addr.is_empty() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], 0)));
    }
    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    addr.parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn bind_tcp(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn compose_url(scheme: &str, host: &str, port: u16) -> String {
    if (scheme == "http" && port == 80) || (scheme == "https" && port == 443) {
        format!("{scheme}://{host}")
    } else {
        format!("{scheme}://{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_with_domain(domain: &str) -> Server {
        let config = ServerConfig {
            domain: domain.to_string(),
            ..Default::default()
        };
        Server::new(config, Router::new())
    }

    #[test]
    fn scheme_follows_domain() {
        assert_eq!(server_with_domain("").scheme(), "http");
        assert_eq!(server_with_domain("example.com").scheme(), "https");
    }

    #[test]
    fn port_is_zero_before_open() {
        assert_eq!(server_with_domain("").port(), 0);
    }

    #[test]
    fn url_uses_domain_or_localhost() {
        assert_eq!(server_with_domain("").url(), "http://localhost:0");
        assert_eq!(
            server_with_domain("example.com").url(),
            "https://example.com:0"
        );
    }

    #[test]
    fn compose_url_omits_default_ports() {
        assert_eq!(compose_url("http", "localhost", 80), "http://localhost");
        assert_eq!(compose_url("https", "example.com", 443), "https://example.com");
        assert_eq!(compose_url("http", "localhost", 443), "http://localhost:443");
        assert_eq!(compose_url("https", "example.com", 80), "https://example.com:80");
        assert_eq!(compose_url("http", "localhost", 8080), "http://localhost:8080");
    }

    #[test]
    fn resolve_addr_variants() {
        assert_eq!(
            resolve_addr("").unwrap(),
            SocketAddr::from(([0, 0, 0, 0], 0))
        );
        assert_eq!(
            resolve_addr(":8123").unwrap(),
            SocketAddr::from(([0, 0, 0, 0], 8123))
        );
        assert_eq!(
            resolve_addr("127.0.0.1:9000").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 9000))
        );
        assert!(resolve_addr("not-an-address").is_err());
    }

    #[tokio::test]
    async fn close_without_open_is_a_noop() {
        let mut server = server_with_domain("");
        assert!(server.close().await.is_ok());
        assert!(server.close().await.is_ok());
    }

    #[tokio::test]
    async fn open_fails_on_occupied_port() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let config = ServerConfig {
            addr: addr.to_string(),
            ..Default::default()
        };
        let mut server = Server::new(config, Router::new());
        match server.open().await {
            Err(ServerError::Bind { .. }) => {}
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_can_be_retried_after_bind_failure() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let config = ServerConfig {
            addr: addr.to_string(),
            ..Default::default()
        };
        let mut server = Server::new(config, Router::new());
        assert!(matches!(
            server.open().await,
            Err(ServerError::Bind { .. })
        ));

        // A failed open leaves the server Unopened; freeing the port must
        // let the same open succeed.
        drop(occupied);
        server.open().await.expect("retry after bind failure");
        assert_eq!(server.port(), addr.port());
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_fails_with_invalid_address() {
        let config = ServerConfig {
            addr: "definitely not an address".to_string(),
            ..Default::default()
        };
        let mut server = Server::new(config, Router::new());
        assert!(matches!(
            server.open().await,
            Err(ServerError::Bind { .. })
        ));
    }
}
