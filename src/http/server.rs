//! HTTP/HTTPS server startup logic.
//!
//! One process, one bind attempt, one listener. The listen target comes from
//! [`super::port`], the transport from [`super::tls`], and shutdown is driven
//! externally through the [`ServerHandle`] handed to the shutdown
//! coordinator at startup.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::{Handle, HttpConfig};
use tokio::sync::watch;

use crate::config::AppConfig;

use super::port::{self, ListenTarget};
use super::tls::{self, TlsMaterial, TransportMode};

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind server: {0}")]
    Bind(#[from] std::io::Error),

    #[error("Invalid listen address: {0}")]
    Address(String),

    #[error("Failed to load TLS configuration: {0}")]
    TlsConfig(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// Lifecycle of the single listener.
///
/// The only success path is `Unbound → Binding → Listening`; a failed bind
/// never reaches `Listening` and ends the process instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Unbound,
    Binding,
    Listening,
    Closing,
    Closed,
}

/// Control handle for the listener.
///
/// The serving side owns the listener; everything else (the shutdown
/// coordinator, tests) holds a clone of this handle purely to observe state
/// and request a close.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Handle,
    state: Arc<watch::Sender<ListenerState>>,
}

impl ServerHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ListenerState::Unbound);
        Self {
            inner: Handle::new(),
            state: Arc::new(state),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Resolves with the local address once the listener is accepting
    /// connections, or `None` when the server stops before ever listening.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.inner.listening().await
    }

    /// Number of currently open connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connection_count()
    }

    /// Stop accepting new connections and wait for in-flight ones to finish.
    /// There is no drain deadline; a stuck connection holds the process up.
    pub fn graceful_shutdown(&self) {
        self.transition(ListenerState::Closing);
        self.inner.graceful_shutdown(None);
    }

    /// Close everything now, in-flight connections included.
    pub fn immediate_shutdown(&self) {
        self.transition(ListenerState::Closing);
        self.inner.shutdown();
    }

    pub(super) fn transition(&self, next: ListenerState) {
        self.state.send_replace(next);
    }

    fn axum_handle(&self) -> Handle {
        self.inner.clone()
    }
}

impl Default for ServerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind the resolved listen target and serve `app` until shutdown.
///
/// Blocks until the listener has fully closed. Bind errors are returned,
/// never retried; retry only ever happens at the port-selection level.
pub async fn start_server(
    app: Router,
    config: &AppConfig,
    handle: ServerHandle,
) -> Result<(), ServerError> {
    let ip: IpAddr = config
        .http
        .ip
        .parse()
        .map_err(|_| ServerError::Address(config.http.ip.clone()))?;

    let mode = tls::select(&config.http)?;
    let scheme = mode.scheme();
    let desired_port = match mode {
        TransportMode::Plain => config.http.port,
        TransportMode::Encrypted(_) => config.http.https_port(),
    };
    let target = port::resolve(ip, desired_port, config.http.systemd_socket)?;

    spawn_startup_banner(
        handle.clone(),
        scheme,
        config.http.ip.clone(),
        config.http.base_url.clone(),
    );

    let http_config = transport_options(config.http.timeout_seconds);

    handle.transition(ListenerState::Binding);
    let served = match (target, mode) {
        (ListenTarget::Port(port), TransportMode::Plain) => {
            axum_server::bind(SocketAddr::new(ip, port))
                .handle(handle.axum_handle())
                .http_config(http_config)
                .serve(app.into_make_service())
                .await
        }
        (ListenTarget::Inherited { fd }, TransportMode::Plain) => {
            let listener = adopt_inherited_listener(fd)?;
            axum_server::from_tcp(listener)
                .handle(handle.axum_handle())
                .http_config(http_config)
                .serve(app.into_make_service())
                .await
        }
        (ListenTarget::Port(port), TransportMode::Encrypted(material)) => {
            let rustls = rustls_config(material).await?;
            axum_server::bind_rustls(SocketAddr::new(ip, port), rustls)
                .handle(handle.axum_handle())
                .http_config(http_config)
                .serve(app.into_make_service())
                .await
        }
        (ListenTarget::Inherited { fd }, TransportMode::Encrypted(material)) => {
            let listener = adopt_inherited_listener(fd)?;
            let rustls = rustls_config(material).await?;
            axum_server::from_tcp_rustls(listener, rustls)
                .handle(handle.axum_handle())
                .http_config(http_config)
                .serve(app.into_make_service())
                .await
        }
    };
    served.map_err(|e| ServerError::Server(e.to_string()))?;

    handle.transition(ListenerState::Closed);
    Ok(())
}

/// Build the rustls acceptor configuration from loaded PEM material.
async fn rustls_config(material: TlsMaterial) -> Result<RustlsConfig, ServerError> {
    RustlsConfig::from_pem(
        material.cert_pem.into_bytes(),
        material.key_pem.into_bytes(),
    )
    .await
    .map_err(|e| ServerError::TlsConfig(format!("Failed to load certificates: {}", e)))
}

/// Transport-level HTTP options. The idle timeout bounds how long a
/// connection may sit between requests before the server closes it.
fn transport_options(timeout_seconds: u64) -> HttpConfig {
    if timeout_seconds > 0 {
        HttpConfig::new()
            .http1_header_read_timeout(Duration::from_secs(timeout_seconds))
            .build()
    } else {
        HttpConfig::new().build()
    }
}

/// Adopt the listening socket the service manager bound for us.
#[cfg(unix)]
fn adopt_inherited_listener(fd: i32) -> Result<std::net::TcpListener, ServerError> {
    use std::os::unix::io::FromRawFd;

    // Safety: the service manager passed this descriptor to us and nothing
    // else in the process has claimed it.
    let listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
    listener.set_nonblocking(true)?;
    Ok(listener)
}

#[cfg(not(unix))]
fn adopt_inherited_listener(_fd: i32) -> Result<std::net::TcpListener, ServerError> {
    Err(ServerError::Server(
        "systemd socket activation is only supported on Unix".to_string(),
    ))
}

/// Emit the startup banner once the listener is actually accepting.
fn spawn_startup_banner(
    handle: ServerHandle,
    scheme: &'static str,
    bind_ip: String,
    base_url: String,
) {
    tokio::spawn(async move {
        if let Some(addr) = handle.listening().await {
            handle.transition(ListenerState::Listening);
            let url = banner_url(scheme, &bind_ip, addr.port(), &base_url);
            tracing::info!("Welcome to Quarry! Visit {} to get started", url);
        }
    });
}

/// Reachable URL shown to the operator.
fn banner_url(scheme: &str, bind_ip: &str, port: u16, base_url: &str) -> String {
    format!("{}://{}:{}{}", scheme, display_host(bind_ip), port, base_url)
}

/// A wildcard bind address is not something a client can connect to, so the
/// banner shows `localhost` in its place.
fn display_host(bind_ip: &str) -> &str {
    match bind_ip.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => "localhost",
        _ => bind_ip,
    }
}
