use super::native_types::{self, ChatResponse};
use super::openai_types::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, Choice, ChunkChoice, ErrorResponse, Usage,
    SYSTEM_FINGERPRINT,
};

/// Translate a complete native response into an `OpenAI` chat completion.
///
/// The backend reports `prompt_eval_count = 0` when the prompt was served from
/// its cache, so `prompt_tokens` can read low; it is passed on as-is.
pub fn native_to_completion(id: &str, resp: &ChatResponse) -> ChatCompletion {
    ChatCompletion {
        id: id.to_string(),
        object: "chat.completion".to_string(),
        created: resp.created_at.timestamp(),
        model: resp.model.clone(),
        system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage::new(resp.message.role.clone(), resp.message.content.clone()),
            finish_reason: finish_reason(resp.done),
        }],
        usage: Usage {
            prompt_tokens: resp.prompt_eval_count,
            completion_tokens: resp.eval_count,
            total_tokens: resp.prompt_eval_count + resp.eval_count,
        },
    }
}

/// Translate one native fragment into an `OpenAI` streaming chunk.
/// Chunks are stamped with the time they are relayed (`created`), not the
/// backend's `created_at`.
pub fn native_to_chunk(id: &str, resp: &ChatResponse, created: i64) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: resp.model.clone(),
        system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChatMessage::new("assistant", resp.message.content.clone()),
            finish_reason: finish_reason(resp.done),
        }],
    }
}

/// Backend failures always surface as a generic server error.
pub fn native_error_to_openai(err: &native_types::ErrorResponse) -> ErrorResponse {
    ErrorResponse::for_status(500, err.error.clone())
}

fn finish_reason(done: bool) -> Option<String> {
    done.then(|| "stop".to_string())
}
