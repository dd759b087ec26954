use parley::commands::chat;
use parley::config::Config;
use parley::conversation::ConversationStore;
use parley::dispatch::{DispatchPolicy, Dispatcher};
use parley::llm::LlmClient;
use parley::settings::Settings;
use parley::system_prompt::PromptStore;
use parley::Data;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    info!("Loaded configuration: {:?}", config);
    let discord_token = config.discord_token.clone();

    let settings = Arc::new(Settings::from_config(&config));
    let llm_client = LlmClient::new(&config, settings.clone())?;
    let dispatcher = Dispatcher::new(
        DispatchPolicy::from_config(&config),
        settings,
        PromptStore::load(&config.prompt_path),
        ConversationStore::new(config.max_history_turns),
        Arc::new(llm_client),
    );

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![chat::chat()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);

                match config.dev_guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        info!("Registered commands in guild {}", guild_id);
                    }
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                        info!("Registered commands globally");
                    }
                }

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                Ok(Data { dispatcher })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
