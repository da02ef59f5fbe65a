//! HTTP/HTTPS server startup logic.
//!
//! The listening socket is bound before anything else so an occupied port fails
//! fast. TLS mode provisions a self-signed certificate and serves through rustls;
//! if that fails, `tls.on_failure` decides between aborting and plain HTTP on the
//! already bound socket.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum_server::accept::DefaultAcceptor;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use axum_server::Handle;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::cert::{self, ProvisionError, Provisioned};
use crate::config::{HttpServerConfig, TlsConfig, TlsFailurePolicy};

use super::accept::QuietAcceptor;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Port {port} is already in use")]
    PortUnavailable { port: u16 },

    #[error("None of the candidate ports {ports:?} is available")]
    NoPortAvailable { ports: Vec<u16> },

    #[error("Failed to bind {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Certificate provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Failed to load TLS configuration: {0}")]
    TlsConfig(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// Owns the listening socket from bind until shutdown.
pub struct ServerRuntime {
    listener: TcpListener,
    addr: SocketAddr,
    handle: Handle,
}

impl ServerRuntime {
    /// Bind the configured port, or the first free candidate port.
    ///
    /// With a single port, `AddrInUse` is reported immediately. Candidates are
    /// tried strictly in order.
    pub fn bind(config: &HttpServerConfig) -> Result<Self, ServerError> {
        let ports = config.ports();
        let single = ports.len() == 1;

        for &port in &ports {
            match TcpListener::bind((config.host.as_str(), port)) {
                Ok(listener) => return Self::from_listener(listener, &config.host, port),
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    if single {
                        return Err(ServerError::PortUnavailable { port });
                    }
                    tracing::warn!(port, "Port in use, trying next candidate");
                }
                Err(source) => {
                    return Err(ServerError::Bind {
                        host: config.host.clone(),
                        port,
                        source,
                    })
                }
            }
        }

        Err(ServerError::NoPortAvailable { ports })
    }

    fn from_listener(listener: TcpListener, host: &str, port: u16) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind {
            host: host.to_string(),
            port,
            source,
        };
        listener.set_nonblocking(true).map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;
        tracing::debug!(%addr, "Listener bound");

        Ok(Self {
            listener,
            addr,
            handle: Handle::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle for triggering shutdown of this server
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Serve `app` until the handle shuts the server down.
    pub async fn serve(self, app: Router, tls: TlsConfig) -> Result<(), ServerError> {
        if !tls.enabled {
            return self.serve_plain(app).await;
        }

        match load_tls(&tls).await {
            Ok(rustls_config) => self.serve_tls(app, rustls_config).await,
            Err(e) if tls.on_failure == TlsFailurePolicy::PlainHttp => {
                tracing::warn!(
                    error = %e,
                    "TLS unavailable, falling back to plain HTTP on the same port"
                );
                self.serve_plain(app).await
            }
            Err(e) => Err(e),
        }
    }

    /// Start a plain HTTP server (no TLS).
    async fn serve_plain(self, app: Router) -> Result<(), ServerError> {
        tracing::info!(addr = %self.addr, "Serving at http://localhost:{}", self.addr.port());

        axum_server::from_tcp(self.listener)
            .handle(self.handle)
            .acceptor(QuietAcceptor::new(DefaultAcceptor::new()))
            .serve(app.into_make_service())
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }

    /// Start HTTPS server with the provisioned certificate.
    async fn serve_tls(self, app: Router, config: RustlsConfig) -> Result<(), ServerError> {
        tracing::info!(addr = %self.addr, "Serving at https://localhost:{}", self.addr.port());
        tracing::info!("Self-signed certificate in use; accept the browser warning to continue");

        axum_server::from_tcp(self.listener)
            .handle(self.handle)
            .acceptor(QuietAcceptor::new(RustlsAcceptor::new(config)))
            .serve(app.into_make_service())
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }
}

/// Provision the certificate off the async threads, then build the TLS context.
async fn load_tls(tls: &TlsConfig) -> Result<RustlsConfig, ServerError> {
    let cert_path = tls.cert_path.clone();
    let key_path = tls.key_path.clone();

    let provisioned = tokio::task::spawn_blocking(move || cert::ensure(&cert_path, &key_path))
        .await
        .map_err(|e| ServerError::Server(format!("certificate task failed: {e}")))??;
    if provisioned == Provisioned::Generated {
        tracing::info!(cert = %tls.cert_path.display(), "Using newly generated certificate");
    }

    let server_config = rustls_server_config(&tls.cert_path, &tls.key_path)?;
    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

/// Build a rustls server context from PEM files, offering HTTP/1.1 only.
pub fn rustls_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<rustls::ServerConfig, ServerError> {
    let certs = CertificateDer::pem_file_iter(cert_path)
        .map_err(|e| tls_error(cert_path, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(cert_path, e))?;
    let key = PrivateKeyDer::from_pem_file(key_path).map_err(|e| tls_error(key_path, e))?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::TlsConfig(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::TlsConfig(e.to_string()))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(config)
}

fn tls_error(path: &Path, err: impl std::fmt::Display) -> ServerError {
    ServerError::TlsConfig(format!("{}: {err}", path.display()))
}
