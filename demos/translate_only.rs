//! Demonstrate the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use axum::http::{HeaderMap, StatusCode};
use openai_shim::translate::openai_types::{ChatCompletionRequest, ChatMessage, Stop};
use openai_shim::translate::relay::ResponseRelay;
use openai_shim::translate::request::openai_to_native;
use openai_shim::writer::ResponseWriter;
use std::io;

/// Prints whatever the relay writes instead of sending it anywhere.
struct StdoutWriter {
    headers: HeaderMap,
}

impl ResponseWriter for StdoutWriter {
    fn status(&self) -> StatusCode {
        StatusCode::OK
    }

    fn set_status(&mut self, _status: StatusCode) {}

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        print!("{}", String::from_utf8_lossy(data));
        Ok(data.len())
    }
}

fn main() -> anyhow::Result<()> {
    // An OpenAI chat request, as a client would send it
    let request = ChatCompletionRequest {
        model: "llama3".to_string(),
        messages: vec![
            ChatMessage::new("system", "You are a geography expert. Be concise."),
            ChatMessage::new("user", "What is the capital of France?"),
        ],
        stream: true,
        max_tokens: Some(64),
        seed: Some(7),
        stop: Stop::Many(vec!["\n\n".to_string()]),
        temperature: Some(0.7),
        frequency_penalty: Some(0.5),
        ..Default::default()
    };

    println!("=== Native request ===");
    println!("{}", serde_json::to_string_pretty(&openai_to_native(&request))?);

    // What the backend streams back, one JSON object per line
    let fragments = [
        r#"{"model":"llama3","created_at":"2024-02-01T10:00:00Z","message":{"role":"assistant","content":"Paris"},"done":false}"#,
        r#"{"model":"llama3","created_at":"2024-02-01T10:00:01Z","message":{"role":"assistant","content":"."},"done":true,"prompt_eval_count":21,"eval_count":2}"#,
    ];

    println!();
    println!("=== OpenAI stream ===");
    let writer = StdoutWriter {
        headers: HeaderMap::new(),
    };
    let mut relay = ResponseRelay::new(writer, request.stream, "chatcmpl-demo");
    for fragment in fragments {
        relay.write(fragment.as_bytes())?;
    }

    let writer = relay.into_inner();
    println!("content-type: {:?}", writer.headers.get("content-type"));

    Ok(())
}
