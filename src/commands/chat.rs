use crate::config::DISCORD_EMBED_LIMIT;
use crate::dispatch::{Command, Invocation, Reply};
use crate::display::DisplayMode;
use crate::{Context, Error};
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateEmbedFooter};

const REPLY_COLOR: u32 = 0x56F0FA;
const FAILURE_COLOR: u32 = 0xED4245;

/// Chat with the assistant
#[poise::command(
    slash_command,
    subcommands(
        "send",
        "reset",
        "settings",
        "update_key",
        "update_system_prompt",
        "admins",
        "set_admin"
    )
)]
pub async fn chat(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Send a message to the assistant
#[poise::command(slash_command)]
pub async fn send(
    ctx: Context<'_>,
    #[description = "Your message to the assistant"] message: String,
) -> Result<(), Error> {
    let reply = dispatch(&ctx, Command::Send { message }).await?;
    send_reply(&ctx, &reply).await
}

/// Reset your conversation history
#[poise::command(slash_command)]
pub async fn reset(ctx: Context<'_>) -> Result<(), Error> {
    let reply = dispatch(&ctx, Command::Reset).await?;
    send_reply(&ctx, &reply).await
}

/// Change how replies are shown to you
#[poise::command(slash_command)]
pub async fn settings(
    ctx: Context<'_>,
    #[description = "Verbose replies include token usage"] mode: Option<DisplayMode>,
    #[description = "Only you can see the replies"] ephemeral: Option<bool>,
) -> Result<(), Error> {
    let reply = dispatch(&ctx, Command::Settings { mode, ephemeral }).await?;
    send_reply(&ctx, &reply).await
}

/// Replace the LLM API key (master admin only)
#[poise::command(slash_command)]
pub async fn update_key(
    ctx: Context<'_>,
    #[description = "New API key"] api_key: String,
) -> Result<(), Error> {
    let reply = dispatch(&ctx, Command::UpdateKey { new_key: api_key }).await?;
    send_reply(&ctx, &reply).await
}

/// Replace the system prompt (admins only)
#[poise::command(slash_command)]
pub async fn update_system_prompt(
    ctx: Context<'_>,
    #[description = "New system prompt"] prompt: String,
    #[description = "Also reset every conversation history"] reset_conversations: Option<bool>,
) -> Result<(), Error> {
    let command = Command::UpdateSystemPrompt {
        prompt,
        reset_conversations: reset_conversations.unwrap_or(false),
    };
    let reply = dispatch(&ctx, command).await?;
    send_reply(&ctx, &reply).await
}

/// List the bot admins (master admin only)
#[poise::command(slash_command)]
pub async fn admins(ctx: Context<'_>) -> Result<(), Error> {
    let reply = dispatch(&ctx, Command::ListAdmins).await?;
    send_reply(&ctx, &reply).await
}

/// Grant or revoke admin rights (master admin only)
#[poise::command(slash_command)]
pub async fn set_admin(
    ctx: Context<'_>,
    #[description = "User to change"] user: serenity::User,
    #[description = "True to grant admin, false to revoke"] add: bool,
) -> Result<(), Error> {
    let command = Command::SetAdmin {
        user_id: user.id.get(),
        add,
    };
    let reply = dispatch(&ctx, command).await?;
    send_reply(&ctx, &reply).await
}

/// Acknowledges the interaction first (a reset may wait on an in-flight send, well past
/// Discord's 3 second window), then runs the command.
async fn dispatch(ctx: &Context<'_>, command: Command) -> Result<Reply, Error> {
    let dispatcher = &ctx.data().dispatcher;
    let user_id = ctx.author().id.get();
    if dispatcher.reply_is_ephemeral(user_id, &command) {
        ctx.defer_ephemeral().await?;
    } else {
        ctx.defer().await?;
    }

    let invocation = Invocation {
        user_id,
        channel_id: ctx.channel_id().get(),
        command,
    };
    Ok(dispatcher.dispatch(invocation).await)
}

/// Send a reply as one or more embeds, splitting content past the embed limit
async fn send_reply(ctx: &Context<'_>, reply: &Reply) -> Result<(), Error> {
    for embed in build_embeds(reply) {
        ctx.send(
            poise::CreateReply::default()
                .embed(embed)
                .ephemeral(reply.ephemeral),
        )
        .await?;
    }
    Ok(())
}

fn build_embeds(reply: &Reply) -> Vec<CreateEmbed> {
    let color = if reply.is_failure() {
        FAILURE_COLOR
    } else {
        REPLY_COLOR
    };
    let chunks = split_content(&reply.content, DISCORD_EMBED_LIMIT - 100);
    let total = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut embed = CreateEmbed::new().description(chunk).color(color);
            if total > 1 {
                embed = embed.title(format!("Response (Part {}/{})", i + 1, total));
            }
            if i + 1 == total {
                if let Some(footer) = &reply.footer {
                    embed = embed.footer(CreateEmbedFooter::new(footer));
                }
            }
            embed
        })
        .collect()
}

/// Splits on line boundaries where possible, never inside a character. Always returns at
/// least one chunk.
pub fn split_content(content: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in content.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            for ch in line.chars() {
                if current_len == limit {
                    chunks.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push(ch);
                current_len += 1;
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    let chunks: Vec<String> = chunks
        .into_iter()
        .map(|c| c.trim_end().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if chunks.is_empty() {
        vec!["…".to_string()]
    } else {
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_single_chunk() {
        assert_eq!(split_content("Hi there", 100), vec!["Hi there"]);
        assert_eq!(split_content("", 100), vec!["…"]);
    }

    #[test]
    fn test_split_on_lines() {
        let content = "aaaa\nbbbb\ncccc";
        assert_eq!(split_content(content, 10), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn test_split_long_line_by_chars() {
        let content = "é".repeat(25);
        let chunks = split_content(&content, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn test_chunks_fit_embed_limit() {
        let content = "line of text\n".repeat(1000);
        let limit = DISCORD_EMBED_LIMIT - 100;
        let chunks = split_content(&content, limit);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= limit));
    }
}
