pub mod commands;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod llm;
pub mod settings;
pub mod system_prompt;

/// Custom data passed to all commands
pub struct Data {
    pub dispatcher: dispatch::Dispatcher,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
