pub mod client;

use crate::conversation::Turn;
use crate::error::LlmError;
use async_trait::async_trait;

pub use client::LlmClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Anything that can turn a prompt, a history and a new message into a reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[Turn],
        new_message: &str,
    ) -> Result<Completion, LlmError>;
}
