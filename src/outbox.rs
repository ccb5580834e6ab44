//! Single-slot prompt handoff between views.
//!
//! The mood tracker, exercise guide and clinic finder deep-link into the chat
//! by leaving one prompt here; the chat view consumes it exactly once and
//! sends it automatically. Setting a new prompt replaces an unconsumed one.

#[derive(Debug, Default)]
pub struct PromptOutbox {
    pending: Option<String>,
}

impl PromptOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, prompt: impl Into<String>) {
        self.pending = Some(prompt.into());
    }

    /// Consume-once: the slot is empty after this returns.
    pub fn take(&mut self) -> Option<String> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
