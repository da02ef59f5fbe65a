use std::io;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

/// Request outcomes other than a served resource.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Malformed request path")]
    BadRequest,

    /// Never carries the matched rule, so neither the body nor the log can leak it.
    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported method: {0}")]
    NotImplemented(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Io(_) => {
                tracing::error!("Internal error: {:?}", self);
                "Internal server error".to_string()
            }
            AppError::Forbidden => "Access to this resource is not allowed".to_string(),
            AppError::NotFound(_) => "The requested file was not found".to_string(),
            _ => self.to_string(),
        };

        let body = format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <title>Error {}</title>
</head>
<body>
    <h1>Error {}</h1>
    <p>{}</p>
</body>
</html>"#,
            status.as_u16(),
            status.as_u16(),
            html_escape::encode_text(&message)
        );

        (status, Html(body)).into_response()
    }
}

/// Whether an I/O error only means the peer went away (reset, broken pipe,
/// aborted handshake). These are routine for a browser-facing dev server and are
/// not logged as errors.
pub fn is_peer_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
    )
}
