//! Connection acceptor that keeps dropped clients out of the error log.
//!
//! Browsers routinely abandon TLS handshakes against a self-signed certificate
//! and close idle keep-alive sockets. Those surface as accept errors that carry no
//! information for the developer, so they are logged at trace level. Anything
//! else is logged at debug level; the connection is dropped either way and the
//! server keeps running.

use std::io;

use axum_server::accept::Accept;
use futures::future::BoxFuture;

use crate::error::is_peer_disconnect;

/// Wraps another acceptor and classifies its failures.
#[derive(Debug, Clone)]
pub struct QuietAcceptor<A> {
    inner: A,
}

impl<A> QuietAcceptor<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

impl<A, I, S> Accept<I, S> for QuietAcceptor<A>
where
    A: Accept<I, S>,
    A::Future: Send + 'static,
    A::Stream: Send + 'static,
    A::Service: Send + 'static,
{
    type Stream = A::Stream;
    type Service = A::Service;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let accepting = self.inner.accept(stream, service);
        Box::pin(async move { accepting.await.inspect_err(log_accept_error) })
    }
}

fn log_accept_error(err: &io::Error) {
    if is_peer_disconnect(err) {
        tracing::trace!(error = %err, "Client disconnected during connection setup");
    } else {
        tracing::debug!(error = %err, "Connection setup failed");
    }
}
