use super::{describe_error, follow_task, parse_limit};
use crate::corpus::ChannelRef;
use crate::engine::{CollectLimit, CollectRequest, TaskOutput, TaskRequest};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Held while a whole-history collection runs; only one may run at a time.
struct EntireRunGuard<'a>(&'a AtomicBool);

impl<'a> EntireRunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for EntireRunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Collect channel history into the corpus
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn collect(
    ctx: Context<'_>,
    #[description = "Channel to collect from (default: this channel)"] channel: Option<
        serenity::Channel,
    >,
    #[description = "Number of messages, or \"entire\" for the whole history (default 1000)"]
    limit: Option<String>,
    #[description = "Only collect messages from this user"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let limit = match parse_limit(limit.as_deref()) {
        Ok(limit) => limit,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };
    let channel_id = channel.map(|c| c.id()).unwrap_or_else(|| ctx.channel_id());

    let _guard = match limit {
        CollectLimit::Entire => match EntireRunGuard::acquire(&ctx.data().collecting_entire) {
            Some(guard) => Some(guard),
            None => {
                ctx.say("⏳ A full-history collection is already running. Try again when it finishes.")
                    .await?;
                return Ok(());
            }
        },
        CollectLimit::Count(_) => None,
    };

    let request = CollectRequest {
        channel: ChannelRef::new(guild_id.to_string(), channel_id.to_string()),
        author_id: user.map(|u| u.id.to_string()),
        limit,
    };
    info!(
        "User {} started collection in channel {} ({:?})",
        ctx.author().id,
        channel_id,
        limit
    );

    let handle = match ctx
        .data()
        .bridge
        .submit_or_restart(TaskRequest::Collect(request))
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            ctx.say(describe_error(&e)).await?;
            return Ok(());
        }
    };

    let reply = ctx.say("📥 Starting collection…").await?;
    let content = match follow_task(ctx, &reply, handle)
        .await
        .and_then(TaskOutput::into_collected)
    {
        Ok(0) => format!("✅ <#{}> is already up to date, nothing new to collect.", channel_id),
        Ok(count) => format!("✅ Collected **{}** new messages from <#{}>.", count, channel_id),
        Err(e) => describe_error(&e),
    };
    reply
        .edit(ctx, poise::CreateReply::default().content(content))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entire_run_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = EntireRunGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(EntireRunGuard::acquire(&flag).is_none());

        drop(guard);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(EntireRunGuard::acquire(&flag).is_some());
    }
}
