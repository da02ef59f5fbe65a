//! HTTP routing for the static site.
//!
//! Every request goes to a single fallback handler that runs the
//! resolve / guard / load / transform pipeline. Responses default to
//! `Cache-Control: no-cache` unless the handler set something stricter.
//!
//! Request tracing is enabled via middleware that generates a unique request ID
//! for each incoming request, allowing correlation of all logs within a request.

pub mod serve;

use axum::{middleware, Router};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CACHE_CONTROL_DEFAULT;
use crate::middleware::request_span_layer;
use crate::state::AppState;

/// Creates the Axum router serving the configured site.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(serve::serve)
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_DEFAULT),
        ))
        // outermost, so the completion line sees the final headers and outcome
        .layer(middleware::from_fn(request_span_layer))
}
