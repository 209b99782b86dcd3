//! Translate `OpenAI` chat completion requests into native backend chat requests.
//!
//! Messages copy through unchanged. Sampling parameters land in the native
//! `options` map, with the penalties rescaled from `[-2, 2]` to `[0, 1]`.

use std::collections::BTreeMap;

use serde_json::Value;

use super::native_types::{ChatRequest, Message};
use super::openai_types::{ChatCompletionRequest, Stop};

/// Translate an `OpenAI` request into a native chat request.
/// Pure function: an empty message list is the caller's problem.
pub fn openai_to_native(req: &ChatCompletionRequest) -> ChatRequest {
    let messages = req
        .messages
        .iter()
        .map(|m| Message {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();

    let mut options: BTreeMap<String, Value> = BTreeMap::new();

    match &req.stop {
        Stop::Single(s) => {
            options.insert("stop".to_string(), Value::from(vec![s.clone()]));
        }
        Stop::Many(stops) => {
            options.insert("stop".to_string(), Value::from(stops.clone()));
        }
        Stop::Absent => {}
    }

    if let Some(max_tokens) = req.max_tokens {
        options.insert("num_predict".to_string(), Value::from(max_tokens));
    }

    if let Some(temperature) = req.temperature {
        options.insert("temperature".to_string(), Value::from(temperature));
    }

    if let Some(seed) = req.seed {
        options.insert("seed".to_string(), Value::from(seed));
        // reproducible sampling needs temperature 0
        options.insert("temperature".to_string(), Value::from(0.0));
    }

    if let Some(penalty) = req.frequency_penalty {
        options.insert(
            "frequency_penalty".to_string(),
            Value::from(rescale_penalty(penalty)),
        );
    }

    if let Some(penalty) = req.presence_penalty {
        options.insert(
            "presence_penalty".to_string(),
            Value::from(rescale_penalty(penalty)),
        );
    }

    if let Some(top_p) = req.top_p {
        options.insert("top_p".to_string(), Value::from(top_p));
    }

    let format = match &req.response_format {
        Some(rf) if rf.format_type == "json_object" => "json".to_string(),
        _ => String::new(),
    };

    ChatRequest {
        model: req.model.clone(),
        messages,
        format,
        options,
        stream: req.stream,
    }
}

/// Map an `OpenAI` penalty in `[-2, 2]` onto the backend's `[0, 1]`.
fn rescale_penalty(value: f64) -> f64 {
    (value + 2.0) / 4.0
}
