use thiserror::Error;

/// Fatal problems found while loading configuration at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    Malformed(String),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Classified failures from the inference provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("provider rejected credentials: {0}")]
    Auth(String),

    #[error("provider rate limit hit: {0}")]
    RateLimit(String),

    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("unexpected provider response: {0}")]
    Protocol(String),
}

/// Why a command ended in the `Failed` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("permission denied")]
    Permission,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Text shown to the Discord user. Never includes provider details.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Permission => "⛔ You are not allowed to run this command.".to_string(),
            CommandError::Validation(reason) => format!("❌ {}", reason),
            CommandError::Llm(LlmError::Transient(_)) => {
                "⏳ The assistant is temporarily unavailable. Please try again in a moment."
                    .to_string()
            }
            CommandError::Llm(LlmError::RateLimit(_)) => {
                "🐢 The assistant is receiving too many requests. Please wait a bit and try again."
                    .to_string()
            }
            CommandError::Llm(LlmError::Auth(_))
            | CommandError::Llm(LlmError::Protocol(_))
            | CommandError::Internal(_) => {
                "❌ Something went wrong. Please try again later.".to_string()
            }
        }
    }

    /// Faults on our side (bad key, broken provider, bugs) as opposed to user mistakes.
    pub fn is_system_fault(&self) -> bool {
        matches!(
            self,
            CommandError::Llm(LlmError::Auth(_))
                | CommandError::Llm(LlmError::Protocol(_))
                | CommandError::Internal(_)
        )
    }
}
