use crate::error::ConfigError;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Which identifier scopes a conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryScope {
    #[default]
    User,
    Channel,
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord_token: String,
    #[serde(default)]
    pub api_key: String,
    pub master_admin_id: Option<u64>,
    #[serde(default)]
    pub admin_user_ids: Vec<u64>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    #[serde(default)]
    pub history_scope: HistoryScope,
    #[serde(default = "default_prompt_path")]
    pub prompt_path: PathBuf,
    #[serde(default = "default_true")]
    pub retry_transient: bool,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub record_failed_user_turns: bool,
    #[serde(default)]
    pub include_datetime: bool,
    #[serde(default = "default_true")]
    pub persist_updates: bool,
    pub dev_guild_id: Option<u64>,
    #[serde(default = "default_status_message")]
    pub status_message: String,
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Set when `LLM_API_KEY` replaced the file's key; it will do so again on restart.
    #[serde(skip)]
    pub api_key_from_env: bool,
}

fn default_api_base() -> String {
    "https://api.cohere.ai/compatibility/v1".to_string()
}

fn default_model() -> String {
    "command-r-plus-08-2024".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_max_history_turns() -> usize {
    20
}

fn default_prompt_path() -> PathBuf {
    PathBuf::from("assistant/prompt.json")
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_status_message() -> String {
    "/chat send".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads `.env`, then the TOML file named by `PARLEY_CONFIG` (or the default path),
    /// then applies secret overrides from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        let path = env::var("PARLEY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::read_file(Path::new(&path))?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file without consulting the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("DISCORD_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.discord_token = token;
        }
        if let Some(key) = lookup("LLM_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.api_key = key;
            self.api_key_from_env = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord_token.trim().is_empty() {
            return Err(ConfigError::Missing("discord_token"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("api_key"));
        }
        if self.master_admin_id.is_none() {
            return Err(ConfigError::Missing("master_admin_id"));
        }
        if self.max_history_turns == 0 {
            return Err(ConfigError::Malformed(
                "max_history_turns must be at least 1".to_string(),
            ));
        }
        if self.llm_timeout_secs == 0 {
            return Err(ConfigError::Malformed(
                "llm_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Only meaningful after `validate` has succeeded.
    pub fn master_admin(&self) -> u64 {
        self.master_admin_id.unwrap_or_default()
    }

    /// Rewrites one top-level key of the config file in place, keeping the other keys.
    pub fn persist_value(path: &Path, key: &str, value: toml::Value) -> anyhow::Result<()> {
        let content = fs::read_to_string(path)?;
        let mut table: toml::Table = toml::from_str(&content)?;
        table.insert(key.to_string(), value);
        fs::write(path, toml::to_string(&table)?)?;
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("api_key", &"[REDACTED]")
            .field("master_admin_id", &self.master_admin_id)
            .field("admin_user_ids", &self.admin_user_ids)
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("max_history_turns", &self.max_history_turns)
            .field("history_scope", &self.history_scope)
            .field("prompt_path", &self.prompt_path)
            .field("retry_transient", &self.retry_transient)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("record_failed_user_turns", &self.record_failed_user_turns)
            .field("include_datetime", &self.include_datetime)
            .field("persist_updates", &self.persist_updates)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("status_message", &self.status_message)
            .field("config_path", &self.config_path)
            .field("api_key_from_env", &self.api_key_from_env)
            .finish()
    }
}

/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::parse(
        r#"
        discord_token = "test_token"
        api_key = "test_key"
        master_admin_id = 1
        "#,
    )
    .unwrap()
}
