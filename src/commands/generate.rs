use super::{build_filter, describe_error, follow_task, truncate_for_discord, Scope};
use crate::engine::{GenerateRequest, TaskOutput, TaskRequest};
use crate::markov::{TokenMode, MAX_ORDER};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Generate a message in the style of the collected chat
#[poise::command(slash_command, guild_only)]
pub async fn generate(
    ctx: Context<'_>,
    #[description = "Where to learn from (default: this server)"] scope: Option<Scope>,
    #[description = "Imitate a single user"] user: Option<serenity::User>,
    #[description = "Words to start the message with"] seed: Option<String>,
    #[description = "Minimum length in words"]
    #[min = 1]
    #[max = 200]
    min_length: Option<u32>,
    #[description = "Maximum length in words"]
    #[min = 1]
    #[max = 200]
    max_length: Option<u32>,
    #[description = "How many previous words to consider (1-3)"]
    #[min = 1]
    #[max = 3]
    order: Option<u8>,
    #[description = "Build the message letter by letter instead of word by word"]
    characters: Option<bool>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let config = &ctx.data().config;

    let filter = build_filter(
        scope.unwrap_or(Scope::Server),
        &guild_id.to_string(),
        &ctx.channel_id().to_string(),
        user.as_ref().map(|u| u.id.to_string()),
    );
    let order = order
        .map(usize::from)
        .unwrap_or(config.default_model_order)
        .clamp(1, MAX_ORDER);
    let token_mode = if characters.unwrap_or(false) {
        TokenMode::Character
    } else {
        TokenMode::Word
    };
    let request = GenerateRequest {
        filter,
        min_length: min_length
            .map(|n| n as usize)
            .unwrap_or(config.generate_min_length),
        max_length: max_length
            .map(|n| n as usize)
            .unwrap_or(config.generate_max_length),
        seed: seed.filter(|s| !s.trim().is_empty()),
        order,
        token_mode,
    };
    info!(
        "User {} requested generation in guild {} (order {}, {:?})",
        ctx.author().id,
        guild_id,
        order,
        token_mode
    );

    let handle = match ctx
        .data()
        .bridge
        .submit_or_restart(TaskRequest::Generate(request))
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            ctx.say(describe_error(&e)).await?;
            return Ok(());
        }
    };

    let reply = ctx.say("🔎 Loading messages…").await?;
    let content = match follow_task(ctx, &reply, handle)
        .await
        .and_then(TaskOutput::into_text)
    {
        Ok(text) if text.trim().is_empty() => "🤐 Couldn't come up with anything this time.".to_string(),
        Ok(text) => truncate_for_discord(&text),
        Err(e) => describe_error(&e),
    };
    reply
        .edit(ctx, poise::CreateReply::default().content(content))
        .await?;
    Ok(())
}
