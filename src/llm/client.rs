use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChatModel, Completion, TokenUsage};
use crate::config::Config;
use crate::conversation::{Role, Turn};
use crate::error::LlmError;
use crate::settings::{mask_secret, Settings};

/// Chat-completions client for an OpenAI-compatible endpoint.
///
/// The API key is read from [`Settings`] on every request, so a rotated key takes
/// effect on the next call without rebuilding the client.
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    settings: Arc<Settings>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl LlmClient {
    pub fn new(config: &Config, settings: Arc<Settings>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            settings,
        })
    }

    async fn chat(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<Completion, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| LlmError::Protocol(format!("failed to build request: {}", e)))?;

        let api_key = self.settings.api_key();
        info!(
            model = %self.model,
            message_count = request.messages.len(),
            api_key = %mask_secret(&api_key),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            warn!("LLM request failed with status {}", status);
            return Err(classify_status(status, &body));
        }

        let completion = parse_completion(&body)?;
        if let Some(usage) = completion.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Chat completion usage"
            );
        }
        Ok(completion)
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[Turn],
        new_message: &str,
    ) -> Result<Completion, LlmError> {
        let messages = build_messages(system_prompt, history, new_message)?;
        self.chat(messages).await
    }
}

/// System prompt first, then the history oldest-first, then the new user message.
pub fn build_messages(
    system_prompt: &str,
    history: &[Turn],
    new_message: &str,
) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    let build_err = |e: async_openai::error::OpenAIError| {
        LlmError::Protocol(format!("failed to build message: {}", e))
    };

    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 2);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt.to_string())
            .build()
            .map_err(build_err)?
            .into(),
    );

    for turn in history {
        let message: ChatCompletionRequestMessage = match turn.role {
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(build_err)?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(build_err)?
                .into(),
        };
        messages.push(message);
    }

    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(new_message.to_string())
            .build()
            .map_err(build_err)?
            .into(),
    );

    Ok(messages)
}

fn parse_completion(body: &str) -> Result<Completion, LlmError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::Protocol(format!("undecodable response: {}", e)))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| LlmError::Protocol("response contained no content".to_string()))?;

    Ok(Completion {
        content,
        usage: response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
    })
}

fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let detail = format!("{}: {}", status, error_message(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::PAYMENT_REQUIRED => {
            LlmError::Auth(detail)
        }
        // An exhausted quota is also reported as 429.
        StatusCode::TOO_MANY_REQUESTS if is_quota_exhausted(body) => LlmError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimit(detail),
        StatusCode::REQUEST_TIMEOUT => LlmError::Transient(detail),
        s if s.is_server_error() => LlmError::Transient(detail),
        _ => LlmError::Protocol(detail),
    }
}

fn classify_transport_error(err: reqwest::Error) -> LlmError {
    if err.is_decode() {
        LlmError::Protocol(err.to_string())
    } else {
        // Timeouts and connection failures.
        LlmError::Transient(err.to_string())
    }
}

fn is_quota_exhausted(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    ["/error/code", "/error/type", "/error/message", "/message"]
        .iter()
        .filter_map(|pointer| value.pointer(pointer).and_then(|v| v.as_str()))
        .map(str::to_lowercase)
        .any(|text| text.contains("quota") || text.contains("billing"))
}

/// Pulls a human readable message out of an error body, whichever shape the provider uses.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });
    message.unwrap_or_else(|| body.chars().take(200).collect())
}
