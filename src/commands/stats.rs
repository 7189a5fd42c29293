use super::{build_filter, describe_error, follow_task, Scope};
use crate::engine::{CorpusStats, TaskOutput, TaskRequest};
use crate::{Context, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use poise::ChoiceParameter;

fn format_day(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn stats_embed(title: String, stats: &CorpusStats) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title)
        .field("Messages", stats.message_count.to_string(), true)
        .field("Authors", stats.author_count.to_string(), true)
        .field("Channels", stats.channel_count.to_string(), true)
        .field("Words", stats.total_word_count.to_string(), true)
        .field("Unique words", stats.unique_word_count.to_string(), true)
        .field(
            "Words per message",
            format!("{:.1}", stats.avg_words_per_message),
            true,
        )
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} to {} across {} server(s)",
            format_day(stats.oldest_timestamp),
            format_day(stats.newest_timestamp),
            stats.guild_count
        )))
        .color(0x5865F2)
}

/// Show statistics about the collected corpus
#[poise::command(slash_command, guild_only)]
pub async fn stats(
    ctx: Context<'_>,
    #[description = "Which messages to count (default: this server)"] scope: Option<Scope>,
    #[description = "Only count messages from this user"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let scope = scope.unwrap_or(Scope::Server);
    let filter = build_filter(
        scope,
        &guild_id.to_string(),
        &ctx.channel_id().to_string(),
        user.as_ref().map(|u| u.id.to_string()),
    );

    let handle = match ctx
        .data()
        .bridge
        .submit_or_restart(TaskRequest::Stats(filter))
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            ctx.say(describe_error(&e)).await?;
            return Ok(());
        }
    };

    let reply = ctx.say("📊 Counting messages…").await?;
    let update = match follow_task(ctx, &reply, handle)
        .await
        .and_then(TaskOutput::into_stats)
    {
        Ok(stats) => {
            let title = match &user {
                Some(user) => format!("📊 Corpus stats for {}", user.name),
                None => format!("📊 Corpus stats ({})", scope.name()),
            };
            poise::CreateReply::default()
                .content("")
                .embed(stats_embed(title, &stats))
        }
        Err(e) => poise::CreateReply::default().content(describe_error(&e)),
    };
    reply.edit(ctx, update).await?;
    Ok(())
}
