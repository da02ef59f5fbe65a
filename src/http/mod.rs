//! HTTP server runtime.
//!
//! Binds the listening socket, serves the router over plain HTTP or HTTPS with
//! a self-signed certificate, and shuts down gracefully on SIGTERM/SIGINT.
//! Clients that drop mid-handshake are logged quietly rather than as failures.

mod accept;
mod server;
mod shutdown;

pub use accept::QuietAcceptor;
pub use server::{rustls_server_config, ServerError, ServerRuntime};
pub use shutdown::{setup_shutdown_handler, shutdown};
