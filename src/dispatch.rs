//! Command dispatch.
//!
//! Every slash command becomes a [`Command`] value wrapped in an [`Invocation`]. The
//! [`Dispatcher`] validates permissions, runs the command against the conversation and
//! display stores, and always hands back a [`Reply`]: either the result or a classified
//! failure message. The Discord layer only renders replies.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{Config, HistoryScope};
use crate::conversation::{ConversationKey, ConversationStore, Role};
use crate::display::{DisplayMode, DisplayStore};
use crate::error::{CommandError, LlmError};
use crate::llm::{ChatModel, Completion};
use crate::settings::{mask_secret, Settings};
use crate::system_prompt::{compose_system_prompt, PromptStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send {
        message: String,
    },
    Reset,
    Settings {
        mode: Option<DisplayMode>,
        ephemeral: Option<bool>,
    },
    UpdateKey {
        new_key: String,
    },
    UpdateSystemPrompt {
        prompt: String,
        reset_conversations: bool,
    },
    ListAdmins,
    SetAdmin {
        user_id: u64,
        add: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Send { .. } => "send",
            Command::Reset => "reset",
            Command::Settings { .. } => "settings",
            Command::UpdateKey { .. } => "update_key",
            Command::UpdateSystemPrompt { .. } => "update_system_prompt",
            Command::ListAdmins => "admins",
            Command::SetAdmin { .. } => "set_admin",
        }
    }

    /// Conversation replies follow the user's visibility preference; everything else is private.
    fn follows_display_setting(&self) -> bool {
        matches!(self, Command::Send { .. } | Command::Reset)
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub user_id: u64,
    pub channel_id: u64,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replied,
    Failed(CommandError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub footer: Option<String>,
    pub ephemeral: bool,
    pub outcome: Outcome,
}

impl Reply {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

struct Success {
    content: String,
    footer: Option<String>,
}

impl Success {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            footer: None,
        }
    }
}

/// The knobs from [`Config`] that shape dispatch.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub history_scope: HistoryScope,
    pub llm_timeout: Duration,
    pub retry_transient: bool,
    pub retry_backoff: Duration,
    pub record_failed_user_turns: bool,
    pub include_datetime: bool,
    /// Config file that receives key and admin changes, if any.
    pub persist_path: Option<PathBuf>,
    /// `LLM_API_KEY` supplied the key at startup and will win again on the next restart.
    pub api_key_from_env: bool,
}

impl DispatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            history_scope: config.history_scope,
            llm_timeout: Duration::from_secs(config.llm_timeout_secs),
            retry_transient: config.retry_transient,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            record_failed_user_turns: config.record_failed_user_turns,
            include_datetime: config.include_datetime,
            persist_path: config
                .persist_updates
                .then(|| config.config_path.clone())
                .filter(|p| !p.as_os_str().is_empty()),
            api_key_from_env: config.api_key_from_env,
        }
    }
}

pub struct Dispatcher {
    policy: DispatchPolicy,
    settings: Arc<Settings>,
    prompts: PromptStore,
    conversations: ConversationStore,
    display: DisplayStore,
    model: Arc<dyn ChatModel>,
}

impl Dispatcher {
    pub fn new(
        policy: DispatchPolicy,
        settings: Arc<Settings>,
        prompts: PromptStore,
        conversations: ConversationStore,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            policy,
            settings,
            prompts,
            conversations,
            display: DisplayStore::new(),
            model,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn display(&self) -> &DisplayStore {
        &self.display
    }

    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    pub fn key_for(&self, user_id: u64, channel_id: u64) -> ConversationKey {
        ConversationKey::for_scope(self.policy.history_scope, user_id, channel_id)
    }

    /// Whether the reply to `command` is private. Known before dispatch so the Discord
    /// layer can acknowledge the interaction with matching visibility.
    pub fn reply_is_ephemeral(&self, user_id: u64, command: &Command) -> bool {
        if command.follows_display_setting() {
            self.display.get(user_id).ephemeral
        } else {
            true
        }
    }

    pub async fn dispatch(&self, invocation: Invocation) -> Reply {
        let Invocation {
            user_id,
            channel_id,
            command,
        } = invocation;
        let name = command.name();
        info!("Command /chat {} received from user {}", name, user_id);

        let ephemeral = self.reply_is_ephemeral(user_id, &command);

        let result = match command {
            Command::Send { message } => self.send(user_id, channel_id, message).await,
            Command::Reset => self.reset(user_id, channel_id).await,
            Command::Settings { mode, ephemeral } => self.update_display(user_id, mode, ephemeral),
            Command::UpdateKey { new_key } => self.update_key(user_id, new_key),
            Command::UpdateSystemPrompt {
                prompt,
                reset_conversations,
            } => self.update_system_prompt(user_id, prompt, reset_conversations),
            Command::ListAdmins => self.list_admins(user_id),
            Command::SetAdmin {
                user_id: target,
                add,
            } => self.set_admin(user_id, target, add),
        };

        match result {
            Ok(success) => Reply {
                content: success.content,
                footer: success.footer,
                ephemeral,
                outcome: Outcome::Replied,
            },
            Err(err) => {
                if err.is_system_fault() {
                    error!("/chat {} failed for user {}: {}", name, user_id, err);
                } else {
                    warn!("/chat {} rejected for user {}: {}", name, user_id, err);
                }
                Reply {
                    content: err.user_message(),
                    footer: None,
                    ephemeral,
                    outcome: Outcome::Failed(err),
                }
            }
        }
    }

    async fn send(
        &self,
        user_id: u64,
        channel_id: u64,
        message: String,
    ) -> Result<Success, CommandError> {
        let message = message.trim().to_string();
        if message.is_empty() {
            return Err(CommandError::Validation(
                "Message cannot be empty.".to_string(),
            ));
        }

        let key = self.key_for(user_id, channel_id);
        let _guard = self.conversations.lock(key).await;

        let history = self.conversations.snapshot(key);
        let system_prompt =
            compose_system_prompt(&self.prompts.get(), self.policy.include_datetime);

        match self.generate(&system_prompt, &history, &message).await {
            Ok(completion) => {
                self.conversations
                    .record_exchange(key, message, completion.content.clone());
                info!(
                    "Reply generated for {} ({} turns of history)",
                    key,
                    history.len()
                );

                let footer = match (self.display.get(user_id).mode, completion.usage) {
                    (DisplayMode::Verbose, Some(usage)) => Some(format!(
                        "Token usage: input {}, output {}",
                        usage.input_tokens, usage.output_tokens
                    )),
                    _ => None,
                };
                Ok(Success {
                    content: completion.content,
                    footer,
                })
            }
            Err(err) => {
                if self.policy.record_failed_user_turns {
                    self.conversations.append(key, Role::User, message);
                }
                Err(CommandError::Llm(err))
            }
        }
    }

    /// One call with the mandatory timeout, plus a single retry for transient failures
    /// when the policy allows it.
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[crate::conversation::Turn],
        message: &str,
    ) -> Result<Completion, LlmError> {
        let mut retried = false;
        loop {
            let result = match tokio::time::timeout(
                self.policy.llm_timeout,
                self.model.generate(system_prompt, history, message),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Transient(format!(
                    "no response within {:?}",
                    self.policy.llm_timeout
                ))),
            };

            match result {
                Err(LlmError::Transient(reason)) if self.policy.retry_transient && !retried => {
                    warn!(
                        "Transient LLM failure ({}), retrying in {:?}",
                        reason, self.policy.retry_backoff
                    );
                    retried = true;
                    tokio::time::sleep(self.policy.retry_backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn reset(&self, user_id: u64, channel_id: u64) -> Result<Success, CommandError> {
        let key = self.key_for(user_id, channel_id);
        let guard = self.conversations.lock(key).await;
        self.conversations.reset(key);
        drop(guard);
        self.conversations.release_lock(key);
        info!("Conversation {} reset", key);
        Ok(Success::text("🧹 Conversation history has been reset."))
    }

    fn update_display(
        &self,
        user_id: u64,
        mode: Option<DisplayMode>,
        ephemeral: Option<bool>,
    ) -> Result<Success, CommandError> {
        if mode.is_none() && ephemeral.is_none() {
            return Err(CommandError::Validation(
                "Please specify at least one setting to change (mode or ephemeral).".to_string(),
            ));
        }

        let updated = self.display.update(user_id, mode, ephemeral);
        let visibility = if updated.ephemeral { "private" } else { "public" };
        Ok(Success::text(format!(
            "✅ Display settings updated: mode **{}**, replies **{}**.",
            updated.mode.label(),
            visibility
        )))
    }

    fn update_key(&self, user_id: u64, new_key: String) -> Result<Success, CommandError> {
        if !self.settings.is_master_admin(user_id) {
            return Err(CommandError::Permission);
        }

        let new_key = new_key.trim().to_string();
        if new_key.is_empty() {
            return Err(CommandError::Validation(
                "API key cannot be empty.".to_string(),
            ));
        }

        if let Some(path) = &self.policy.persist_path {
            Config::persist_value(path, "api_key", toml::Value::String(new_key.clone()))
                .map_err(|e| CommandError::Internal(format!("failed to persist API key: {}", e)))?;
        }

        self.settings.set_api_key(new_key.clone());
        info!("API key rotated to {}", mask_secret(&new_key));

        if self.policy.api_key_from_env {
            warn!("LLM_API_KEY is set; the rotated key will be replaced by it on restart");
            return Ok(Success::text(
                "🔑 API key has been updated.\n⚠️ `LLM_API_KEY` is set in the environment and will override this key when the bot restarts.",
            ));
        }
        Ok(Success::text("🔑 API key has been updated."))
    }

    fn update_system_prompt(
        &self,
        user_id: u64,
        prompt: String,
        reset_conversations: bool,
    ) -> Result<Success, CommandError> {
        if !self.settings.is_admin(user_id) {
            return Err(CommandError::Permission);
        }

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(CommandError::Validation(
                "System prompt cannot be empty.".to_string(),
            ));
        }

        self.prompts
            .update(prompt)
            .map_err(|e| CommandError::Internal(format!("failed to save system prompt: {}", e)))?;

        if reset_conversations {
            self.conversations.clear_all();
            info!("All conversations cleared after system prompt update");
            Ok(Success::text(
                "📝 System prompt updated and every conversation history has been reset.",
            ))
        } else {
            Ok(Success::text("📝 System prompt updated."))
        }
    }

    fn list_admins(&self, user_id: u64) -> Result<Success, CommandError> {
        if !self.settings.is_master_admin(user_id) {
            return Err(CommandError::Permission);
        }

        let mut lines = vec![
            "**Master admin**".to_string(),
            format!("• <@{}>", self.settings.master_admin_id()),
            String::new(),
            "**Admins**".to_string(),
        ];
        let admins = self.settings.admins();
        if admins.is_empty() {
            lines.push("_None_".to_string());
        } else {
            lines.extend(admins.iter().map(|id| format!("• <@{}>", id)));
        }
        Ok(Success::text(lines.join("\n")))
    }

    fn set_admin(&self, user_id: u64, target: u64, add: bool) -> Result<Success, CommandError> {
        if !self.settings.is_master_admin(user_id) {
            return Err(CommandError::Permission);
        }
        if self.settings.is_master_admin(target) {
            return Err(CommandError::Validation(
                "The master admin's permissions cannot be changed.".to_string(),
            ));
        }

        if !self.settings.set_admin(target, add) {
            let message = if add {
                format!("<@{}> is already an admin.", target)
            } else {
                format!("<@{}> is not an admin.", target)
            };
            return Ok(Success::text(message));
        }

        if let Some(path) = &self.policy.persist_path {
            let ids = self
                .settings
                .admins()
                .into_iter()
                .map(|id| toml::Value::Integer(id as i64))
                .collect();
            if let Err(e) = Config::persist_value(path, "admin_user_ids", toml::Value::Array(ids)) {
                self.settings.set_admin(target, !add);
                return Err(CommandError::Internal(format!(
                    "failed to persist admin list: {}",
                    e
                )));
            }
        }

        info!(
            "Admin {} {} by master admin",
            target,
            if add { "added" } else { "removed" }
        );
        let message = if add {
            format!("✅ <@{}> is now an admin.", target)
        } else {
            format!("✅ <@{}> is no longer an admin.", target)
        };
        Ok(Success::text(message))
    }
}
