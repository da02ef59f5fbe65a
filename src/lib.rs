//! envserve - environment-aware static file server for local development
//!
//! Serves a build output directory over HTTP or HTTPS with a self-signed
//! certificate, injects `.env` values into HTML and JS config stubs at request
//! time, and refuses to serve anything on its path denylist.

pub mod access;
pub mod cert;
pub mod config;
pub mod env;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod transform;

pub use config::AppConfig;
pub use env::EnvironmentStore;
pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
