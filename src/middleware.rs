//! Per-request logging.
//!
//! Each request runs inside a `request` span carrying a UUID v4 `request_id`, so
//! guard denials and transform fallbacks logged by the handler can be correlated.
//! The handler tags its response with a [`ServeOutcome`], which is recorded on
//! the span and in the completion line.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::AppError;

/// What the static handler did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// File sent as stored
    Static,
    /// File sent after environment injection
    Transformed,
    /// Transformable file sent raw because it could not be read as text
    Untransformed,
    Redirected,
    /// Blocked by the denylist or a traversal check
    Denied,
    Missing,
    /// Undecodable path or unsupported method
    Rejected,
    Failed,
}

impl ServeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ServeOutcome::Static => "static",
            ServeOutcome::Transformed => "transformed",
            ServeOutcome::Untransformed => "untransformed",
            ServeOutcome::Redirected => "redirected",
            ServeOutcome::Denied => "denied",
            ServeOutcome::Missing => "missing",
            ServeOutcome::Rejected => "rejected",
            ServeOutcome::Failed => "failed",
        }
    }
}

impl From<&AppError> for ServeOutcome {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Forbidden => ServeOutcome::Denied,
            AppError::NotFound(_) => ServeOutcome::Missing,
            AppError::BadRequest | AppError::NotImplemented(_) => ServeOutcome::Rejected,
            AppError::Io(_) => ServeOutcome::Failed,
        }
    }
}

/// Outermost layer: opens the request span and logs one completion line.
pub async fn request_span_layer(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
        outcome = tracing::field::Empty,
    );
    let start = Instant::now();

    async move {
        let response = next.run(request).await;
        let outcome = response
            .extensions()
            .get::<ServeOutcome>()
            .map_or("unknown", |o| o.as_str());
        tracing::Span::current().record("outcome", outcome);

        tracing::info!(
            status = response.status().as_u16(),
            outcome,
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await
}
