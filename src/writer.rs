//! The outbound response channel handed to the backend forwarder.
//!
//! [`ResponseWriter`] is the narrow surface the forwarder and the relay need from
//! the HTTP layer: a status, mutable headers, and raw byte writes. Status and
//! headers are committed by the first write, the same way a classic HTTP
//! response writer behaves; anything changed afterwards has no effect on the
//! client.

use std::convert::Infallible;
use std::io;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub trait ResponseWriter {
    fn status(&self) -> StatusCode;

    fn set_status(&mut self, status: StatusCode);

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Write raw bytes, returning how many bytes were accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    fn set_content_type(&mut self, content_type: &'static str) {
        self.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
}

/// Status line and headers, sent once when the response is committed.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn into_response(self, body: BodyStream) -> Response {
        let mut response = Body::from_stream(body).into_response();
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

pub type BodyStream = UnboundedReceiverStream<Result<Bytes, Infallible>>;

/// Pass-through writer feeding a streaming axum body.
///
/// The body channel is unbounded: a client reading slower than the backend
/// generates lets that response queue in memory. The queue holds at most one
/// request's model output and is freed when the connection drops, at which
/// point the next write fails with `BrokenPipe`.
#[derive(Debug)]
pub struct ChannelWriter {
    status: StatusCode,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: mpsc::UnboundedSender<Result<Bytes, Infallible>>,
}

/// Create a writer together with the receiving ends the HTTP handler answers from.
pub fn response_channel() -> (ChannelWriter, oneshot::Receiver<ResponseHead>, BodyStream) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::unbounded_channel();
    let writer = ChannelWriter {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        head_tx: Some(head_tx),
        body_tx,
    };
    (writer, head_rx, UnboundedReceiverStream::new(body_rx))
}

impl ChannelWriter {
    pub fn is_committed(&self) -> bool {
        self.head_tx.is_none()
    }

    fn commit(&mut self) {
        if let Some(tx) = self.head_tx.take() {
            // The handler may have given up waiting; the body send reports that.
            let _ = tx.send(ResponseHead {
                status: self.status,
                headers: self.headers.clone(),
            });
        }
    }
}

impl ResponseWriter for ChannelWriter {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        if !self.is_committed() {
            self.status = status;
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.commit();
        self.body_tx
            .send(Ok(Bytes::copy_from_slice(data)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))?;
        Ok(data.len())
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        self.commit();
    }
}
