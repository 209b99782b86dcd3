//! Completion id generation.
//!
//! Ids only correlate the chunks of one response for the client, so a short
//! random suffix is enough. The generator is injected through `AppState`.

use std::sync::atomic::{AtomicU64, Ordering};

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// `chatcmpl-` plus eight random hex characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("chatcmpl-{}", &suffix[..8])
    }
}

/// `chatcmpl-1`, `chatcmpl-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("chatcmpl-{n}")
    }
}
