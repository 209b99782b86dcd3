//! Response relay that rewrites native backend writes into `OpenAI` wire format.
//!
//! The [`ResponseRelay`] wraps the real [`ResponseWriter`] and is handed to the
//! backend forwarder in its place. Every write is decoded as a native payload
//! and replaced by its `OpenAI` equivalent:
//!
//! - non-OK status: a native `{"error": ...}` body becomes an `OpenAI` error
//!   envelope; anything else is dropped
//! - OK, non-streaming: the response becomes one `chat.completion` object
//! - OK, streaming: each fragment becomes one `data: <chunk>\n\n` SSE frame,
//!   followed by `data: [DONE]\n\n` after the final fragment
//!
//! Writes the relay cannot decode under OK status pass through untouched.

use std::io;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};

use super::native_types::{self, ChatResponse};
use super::response::{native_error_to_openai, native_to_chunk, native_to_completion};
use crate::clock::{Clock, SystemClock};
use crate::writer::ResponseWriter;

const JSON: &str = "application/json";
const EVENT_STREAM: &str = "text/event-stream";
const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

pub struct ResponseRelay<W> {
    inner: W,
    stream: bool,
    id: String,
    clock: Arc<dyn Clock>,
}

impl<W: ResponseWriter> ResponseRelay<W> {
    pub fn new(inner: W, stream: bool, id: impl Into<String>) -> Self {
        Self {
            inner,
            stream,
            id: id.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp streamed chunks from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_error(&mut self, data: &[u8]) -> io::Result<usize> {
        let Ok(err) = serde_json::from_slice::<native_types::ErrorResponse>(data) else {
            return Ok(data.len());
        };

        self.inner.set_content_type(JSON);
        match serde_json::to_vec(&native_error_to_openai(&err)) {
            Ok(body) => self.inner.write(&body),
            Err(_) => Ok(data.len()),
        }
    }

    fn write_completion(&mut self, data: &[u8], resp: &ChatResponse) -> io::Result<usize> {
        let Ok(body) = serde_json::to_vec(&native_to_completion(&self.id, resp)) else {
            return Ok(data.len());
        };

        self.inner.set_content_type(JSON);
        self.inner.write(&body)
    }

    fn write_chunk(&mut self, data: &[u8], resp: &ChatResponse) -> io::Result<usize> {
        let created = self.clock.now().timestamp();
        let Ok(chunk) = serde_json::to_vec(&native_to_chunk(&self.id, resp, created)) else {
            return Ok(data.len());
        };

        self.inner.set_content_type(EVENT_STREAM);

        let mut frame = Vec::with_capacity(chunk.len() + 8);
        frame.extend_from_slice(b"data: ");
        frame.extend_from_slice(&chunk);
        frame.extend_from_slice(b"\n\n");
        self.inner.write(&frame)?;

        if resp.done {
            return self.inner.write(DONE_FRAME);
        }

        Ok(data.len())
    }
}

impl<W: ResponseWriter> ResponseWriter for ResponseRelay<W> {
    fn status(&self) -> StatusCode {
        self.inner.status()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.inner.status() != StatusCode::OK {
            return self.write_error(data);
        }

        let resp: ChatResponse = match serde_json::from_slice(data) {
            Ok(r) => r,
            Err(_) => return self.inner.write(data),
        };

        if self.stream {
            self.write_chunk(data, &resp)
        } else {
            self.write_completion(data, &resp)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use axum::http::header;
    use chrono::{TimeZone, Utc};

    /// Records every write so tests can inspect exactly what reached the client.
    #[derive(Default)]
    struct RecordingWriter {
        status: Option<StatusCode>,
        headers: HeaderMap,
        writes: Vec<Vec<u8>>,
        /// 1-based index of the write that fails with `BrokenPipe`.
        fail_on_write: Option<usize>,
        attempts: usize,
    }

    impl RecordingWriter {
        fn with_status(status: StatusCode) -> Self {
            Self {
                status: Some(status),
                ..Default::default()
            }
        }

        fn content_type(&self) -> Option<&str> {
            self.headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
        }

        fn frames(&self) -> Vec<String> {
            self.writes
                .iter()
                .map(|w| String::from_utf8_lossy(w).into_owned())
                .collect()
        }
    }

    impl ResponseWriter for RecordingWriter {
        fn status(&self) -> StatusCode {
            self.status.unwrap_or(StatusCode::OK)
        }

        fn set_status(&mut self, status: StatusCode) {
            self.status = Some(status);
        }

        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            if self.fail_on_write == Some(self.attempts) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            self.writes.push(data.to_vec());
            Ok(data.len())
        }
    }

    fn fragment(content: &str, done: bool) -> Vec<u8> {
        let mut value = serde_json::json!({
            "model": "llama3",
            "created_at": "2024-02-01T10:00:00Z",
            "message": {"role": "assistant", "content": content},
            "done": done,
        });
        if done {
            value["prompt_eval_count"] = serde_json::json!(5);
            value["eval_count"] = serde_json::json!(10);
        }
        serde_json::to_vec(&value).unwrap()
    }

    fn sse_payload(frame: &str) -> serde_json::Value {
        let json = frame
            .strip_prefix("data: ")
            .and_then(|f| f.strip_suffix("\n\n"))
            .expect("frame should be an SSE data line");
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_non_streaming_completion() {
        let mut relay = ResponseRelay::new(RecordingWriter::default(), false, "chatcmpl-1");
        let data = fragment("Hello!", true);

        let n = relay.write(&data).unwrap();
        let inner = relay.into_inner();

        assert!(n > 0);
        assert_eq!(inner.content_type(), Some("application/json"));
        assert_eq!(inner.writes.len(), 1);

        let body: serde_json::Value = serde_json::from_slice(&inner.writes[0]).unwrap();
        assert_eq!(body["id"], "chatcmpl-1");
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["choices"][0]["message"]["content"], "Hello!");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        assert_eq!(
            body["usage"],
            serde_json::json!({"prompt_tokens": 5, "completion_tokens": 10, "total_tokens": 15})
        );
    }

    #[test]
    fn test_streaming_frames_then_done() {
        let mut relay = ResponseRelay::new(RecordingWriter::default(), true, "chatcmpl-7");

        relay.write(&fragment("Hel", false)).unwrap();
        relay.write(&fragment("lo", true)).unwrap();
        let inner = relay.into_inner();

        assert_eq!(inner.content_type(), Some("text/event-stream"));
        let frames = inner.frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], "data: [DONE]\n\n");

        let first = sse_payload(&frames[0]);
        assert_eq!(first["id"], "chatcmpl-7");
        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(first["choices"][0]["delta"]["content"], "Hel");
        assert!(first["choices"][0]["finish_reason"].is_null());

        let second = sse_payload(&frames[1]);
        assert_eq!(second["id"], "chatcmpl-7");
        assert_eq!(second["choices"][0]["delta"]["content"], "lo");
        assert_eq!(second["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_streaming_intermediate_write_reports_input_length() {
        let mut relay = ResponseRelay::new(RecordingWriter::default(), true, "chatcmpl-1");
        let data = fragment("Hel", false);
        assert_eq!(relay.write(&data).unwrap(), data.len());
    }

    #[test]
    fn test_streaming_done_reports_sentinel_length() {
        let mut relay = ResponseRelay::new(RecordingWriter::default(), true, "chatcmpl-1");
        assert_eq!(relay.write(&fragment("", true)).unwrap(), DONE_FRAME.len());
    }

    #[test]
    fn test_unrecognized_payload_passes_through() {
        let mut relay = ResponseRelay::new(RecordingWriter::default(), true, "chatcmpl-1");
        let data = br#"{"status":"pulling manifest"}"#;

        assert_eq!(relay.write(data).unwrap(), data.len());
        let inner = relay.into_inner();
        assert_eq!(inner.writes, vec![data.to_vec()]);
        assert_eq!(inner.content_type(), None);
    }

    #[test]
    fn test_backend_error_becomes_api_error() {
        let writer = RecordingWriter::with_status(StatusCode::NOT_FOUND);
        let mut relay = ResponseRelay::new(writer, false, "chatcmpl-1");

        relay
            .write(br#"{"error":"model \"nope\" not found"}"#)
            .unwrap();
        let inner = relay.into_inner();

        assert_eq!(inner.content_type(), Some("application/json"));
        assert_eq!(inner.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&inner.writes[0]).unwrap();
        assert_eq!(body["error"]["type"], "api_error");
        assert_eq!(body["error"]["message"], "model \"nope\" not found");
        assert!(body["error"]["param"].is_null());
        assert!(body["error"]["code"].is_null());
    }

    #[test]
    fn test_unparseable_backend_error_is_swallowed() {
        let writer = RecordingWriter::with_status(StatusCode::INTERNAL_SERVER_ERROR);
        let mut relay = ResponseRelay::new(writer, true, "chatcmpl-1");
        let data = b"upstream exploded";

        assert_eq!(relay.write(data).unwrap(), data.len());
        let inner = relay.into_inner();
        assert!(inner.writes.is_empty());
        assert_eq!(inner.content_type(), None);
    }

    #[test]
    fn test_chat_response_under_error_status_is_not_translated() {
        let writer = RecordingWriter::with_status(StatusCode::BAD_REQUEST);
        let mut relay = ResponseRelay::new(writer, false, "chatcmpl-1");
        let data = fragment("Hello", true);

        assert_eq!(relay.write(&data).unwrap(), data.len());
        assert!(relay.into_inner().writes.is_empty());
    }

    #[test]
    fn test_streaming_write_failure_propagates() {
        let writer = RecordingWriter {
            fail_on_write: Some(1),
            ..Default::default()
        };
        let mut relay = ResponseRelay::new(writer, true, "chatcmpl-1");

        let err = relay.write(&fragment("Hel", false)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_done_sentinel_write_failure_propagates() {
        let writer = RecordingWriter {
            fail_on_write: Some(2),
            ..Default::default()
        };
        let mut relay = ResponseRelay::new(writer, true, "chatcmpl-1");

        let err = relay.write(&fragment("lo", true)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let inner = relay.into_inner();
        let frames = inner.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(sse_payload(&frames[0])["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_chunks_stamped_with_relay_clock() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut relay = ResponseRelay::new(RecordingWriter::default(), true, "chatcmpl-1")
            .with_clock(Arc::new(FixedClock(now)));

        relay.write(&fragment("Hel", false)).unwrap();
        relay.write(&fragment("lo", true)).unwrap();
        let frames = relay.into_inner().frames();

        for frame in &frames[..2] {
            let chunk = sse_payload(frame);
            assert_eq!(chunk["created"], now.timestamp());
            assert_ne!(chunk["created"], 1_706_781_600);
        }
    }
}
