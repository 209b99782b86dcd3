//! Type definitions for the [OpenAI Chat Completions API](https://platform.openai.com/docs/api-reference/chat).
//!
//! These types cover the request clients send to us and the completion, chunk and
//! error bodies we send back to them.

use serde::{Deserialize, Deserializer, Serialize};

pub const SYSTEM_FINGERPRINT: &str = "fp_ollama";

// ---------------------------------------------------------------------------
// Request types (what clients send TO us)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Stop::is_absent")]
    pub stop: Stop,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// `stop` may be a single string or an array. Array elements that are not
/// strings are dropped while decoding; any other JSON type counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Stop {
    #[default]
    Absent,
    Single(String),
    Many(Vec<String>),
}

impl Stop {
    pub fn is_absent(&self) -> bool {
        matches!(self, Stop::Absent)
    }
}

impl<'de> Deserialize<'de> for Stop {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::String(s) => Stop::Single(s),
            serde_json::Value::Array(items) => Stop::Many(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => Stop::Absent,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type", default)]
    pub format_type: String,
}

// ---------------------------------------------------------------------------
// Response types (what we send back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Streaming chunk types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChatMessage,
    pub finish_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub param: Option<serde_json::Value>,
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.to_string(),
                param: None,
                code: None,
            },
        }
    }

    /// Pick the error type from the HTTP status the error is reported with.
    pub fn for_status(status: u16, message: impl Into<String>) -> Self {
        let error_type = match status {
            400 => "invalid_request_error",
            404 => "not_found_error",
            _ => "api_error",
        };
        Self::new(error_type, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_single_string() {
        let req: ChatCompletionRequest =
            serde_json::from_str(r#"{"model":"m","messages":[],"stop":"foo"}"#).unwrap();
        assert_eq!(req.stop, Stop::Single("foo".to_string()));
    }

    #[test]
    fn test_stop_array_drops_non_strings() {
        let req: ChatCompletionRequest =
            serde_json::from_str(r#"{"model":"m","messages":[],"stop":["foo",7,"bar",null]}"#)
                .unwrap();
        assert_eq!(
            req.stop,
            Stop::Many(vec!["foo".to_string(), "bar".to_string()])
        );
    }

    #[test]
    fn test_stop_missing_or_null_or_other() {
        for body in [
            r#"{"messages":[]}"#,
            r#"{"messages":[],"stop":null}"#,
            r#"{"messages":[],"stop":42}"#,
        ] {
            let req: ChatCompletionRequest = serde_json::from_str(body).unwrap();
            assert!(req.stop.is_absent(), "body {body} should have no stop");
        }
    }

    #[test]
    fn test_request_defaults() {
        let req: ChatCompletionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.model.is_empty());
        assert!(req.messages.is_empty());
        assert!(!req.stream);
        assert!(req.response_format.is_none());
    }

    #[test]
    fn test_error_type_by_status() {
        assert_eq!(
            ErrorResponse::for_status(400, "x").error.error_type,
            "invalid_request_error"
        );
        assert_eq!(
            ErrorResponse::for_status(404, "x").error.error_type,
            "not_found_error"
        );
        assert_eq!(ErrorResponse::for_status(500, "x").error.error_type, "api_error");
        assert_eq!(ErrorResponse::for_status(502, "x").error.error_type, "api_error");
    }

    #[test]
    fn test_error_envelope_shape() {
        let json = serde_json::to_value(ErrorResponse::for_status(500, "boom")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error": {
                    "message": "boom",
                    "type": "api_error",
                    "param": null,
                    "code": null,
                }
            })
        );
    }
}
