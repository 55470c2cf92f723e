//! Response handling and transformation.
//!
//! # Responsibilities
//! - Carry the upstream status, headers and lazy body (`ProxyResponse`)
//! - Hand them to the caller with hop-by-hop headers stripped
//! - Stream the body chunk by chunk as the caller pulls it
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body; hyper only polls for the
//!   next chunk once the previous one is written, so a slow caller slows the
//!   upstream read
//! - Status and headers are fixed before the first body byte
//! - A body failure after headers went out cannot change the status: the
//!   stream yields an error and hyper cuts the connection

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures_util::{stream::BoxStream, Stream, StreamExt};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::http::error::ProxyError;
use crate::observability::RequestTimer;
use crate::security::headers::{sanitize, Direction};

/// Lazy, pull-based body.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProxyError>>;

/// An upstream response whose headers have arrived.
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` for HEAD, 1xx, 204 and 304.
    pub body: Option<ByteStream>,
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .finish()
    }
}

impl ProxyResponse {
    /// Build the caller-facing response.
    ///
    /// `timer` is held until the body finishes, fails or is dropped by a
    /// departing caller. `cancel` aborts the transfer mid-stream.
    pub fn into_streaming_response(
        self,
        timer: RequestTimer,
        cancel: CancellationToken,
    ) -> Response {
        let ProxyResponse {
            status,
            headers,
            body,
        } = self;

        let body = match body {
            Some(stream) => Body::from_stream(StreamingBody::new(stream, timer, cancel)),
            None => Body::empty(),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = sanitize(headers, Direction::Response);
        response
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Streaming,
    Complete,
    Failed,
}

/// Upstream body on its way to the caller.
struct StreamingBody {
    inner: ByteStream,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    progress: Progress,
    bytes_sent: u64,
    timer: RequestTimer,
}

impl StreamingBody {
    fn new(inner: ByteStream, timer: RequestTimer, cancel: CancellationToken) -> Self {
        Self {
            inner,
            cancelled: Box::pin(cancel.cancelled_owned()),
            progress: Progress::Streaming,
            bytes_sent: 0,
            timer,
        }
    }

    fn fail(&mut self, error: ProxyError) -> Poll<Option<Result<Bytes, ProxyError>>> {
        self.progress = Progress::Failed;
        tracing::error!(
            error = %error,
            bytes_sent = self.bytes_sent,
            "Upstream body failed after headers were sent; truncating response"
        );
        Poll::Ready(Some(Err(error)))
    }
}

impl Stream for StreamingBody {
    type Item = Result<Bytes, ProxyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.progress != Progress::Streaming {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            return this.fail(ProxyError::Cancelled);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => this.fail(error),
            Poll::Ready(None) => {
                this.progress = Progress::Complete;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for StreamingBody {
    fn drop(&mut self) {
        if self.progress == Progress::Streaming {
            tracing::debug!(
                bytes_sent = self.bytes_sent,
                elapsed_secs = self.timer.elapsed_secs(),
                "Caller went away mid-stream; releasing upstream"
            );
        }
    }
}
