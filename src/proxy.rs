use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::translate::native_types;
use crate::writer::ResponseWriter;

use axum::http::StatusCode;
use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;

/// Send an encoded native chat request to the backend and write its answer
/// into `writer`.
///
/// Error and non-streaming responses arrive as one write holding the whole
/// body. Streaming responses arrive as one write per newline-delimited JSON
/// fragment, in backend order. Failures to reach the backend are written as a
/// native error payload under `502 Bad Gateway` before being returned.
pub async fn forward_chat<W: ResponseWriter>(
    payload: Vec<u8>,
    stream: bool,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
    request_id: &str,
    writer: &mut W,
) -> Result<()> {
    let url = config.effective_chat_url()?;

    logger.request(
        LogLevel::Info,
        request_id,
        "proxy",
        format!("POST {} stream={}", url, stream),
    );

    let response = match client
        .post(&url)
        .header("Content-Type", "application/json")
        .body(payload)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            let message = format!("Backend request failed: {}", e);
            return Err(fail_before_write(writer, logger, request_id, message));
        }
    };

    let status = response.status();
    writer.set_status(status);

    if status != StatusCode::OK || !stream {
        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                let message = format!("Failed to read backend response: {}", e);
                return Err(fail_before_write(writer, logger, request_id, message));
            }
        };

        if status != StatusCode::OK {
            logger.request(
                LogLevel::Warn,
                request_id,
                "proxy",
                format!("Backend error status={}: {}", status, truncate(&body, 300)),
            );
        }

        writer.write(&body)?;
        return Ok(());
    }

    let lines = ndjson_lines(response.bytes_stream());
    tokio::pin!(lines);

    let mut fragments = 0usize;
    while let Some(line) = lines.next().await {
        let line = line.map_err(|e| {
            logger.request(
                LogLevel::Error,
                request_id,
                "stream",
                format!("Backend stream error: {}", e),
            );
            e
        })?;
        writer.write(&line)?;
        fragments += 1;
    }

    tracing::debug!(request_id, fragments, "backend stream finished");
    logger.request(
        LogLevel::Info,
        request_id,
        "stream",
        format!("Stream completed after {} fragments", fragments),
    );

    Ok(())
}

/// Report a failure while nothing has been written yet, in the backend's own
/// error shape so the relay can translate it.
fn fail_before_write<W: ResponseWriter>(
    writer: &mut W,
    logger: &SharedLogger,
    request_id: &str,
    message: String,
) -> ProxyError {
    logger.request(LogLevel::Error, request_id, "proxy", message.clone());

    writer.set_status(StatusCode::BAD_GATEWAY);
    match serde_json::to_vec(&native_types::ErrorResponse::new(message.clone())) {
        Ok(body) => {
            if let Err(e) = writer.write(&body) {
                tracing::warn!(request_id, error = %e, "could not report backend failure");
            }
        }
        Err(e) => tracing::warn!(request_id, error = %e, "could not encode backend failure"),
    }

    ProxyError::backend(message)
}

/// Split a byte stream into newline-terminated lines, skipping blank ones.
/// A trailing line without a newline is still yielded at end of stream.
pub fn ndjson_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<Bytes>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<ProxyError>,
{
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    let err: ProxyError = e.into();
                    yield Err(err);
                    buffer.clear();
                    break;
                }
            };

            // The carried-over tail never holds a newline; only new bytes are scanned.
            let mut scan_from = buffer.len();
            let mut start = 0;
            buffer.extend_from_slice(&chunk);

            while let Some(offset) = buffer[scan_from..].iter().position(|b| *b == b'\n') {
                let end = scan_from + offset + 1;
                let line = &buffer[start..end];
                if !is_blank(line) {
                    let line = Bytes::copy_from_slice(line);
                    yield Ok(line);
                }
                start = end;
                scan_from = end;
            }
            buffer.drain(..start);
        }

        if !is_blank(&buffer) {
            yield Ok(Bytes::from(buffer));
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn truncate(body: &[u8], max: usize) -> String {
    String::from_utf8_lossy(&body[..body.len().min(max)]).into_owned()
}
