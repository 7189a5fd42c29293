pub mod collect;
pub mod generate;
pub mod stats;

use crate::bridge::TaskHandle;
use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::corpus::Filter;
use crate::engine::{
    CollectLimit, EngineError, ErrorKind, ProgressEvent, Step, TaskOutput, TaskProgress,
};
use crate::Context;
use std::time::{Duration, Instant};
use tracing::warn;

/// Messages collected when no limit is given.
pub const DEFAULT_COLLECT_LIMIT: usize = 1000;

/// Minimum gap between progress edits, to stay clear of Discord rate limits.
const PROGRESS_EDIT_INTERVAL: Duration = Duration::from_secs(2);

/// Which part of the corpus a command reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum Scope {
    #[name = "This channel"]
    Channel,
    #[name = "This server"]
    Server,
    #[name = "Every server"]
    Global,
}

/// Parses a collect limit: a positive count, or `entire`/`all` for the whole history.
pub fn parse_limit(input: Option<&str>) -> Result<CollectLimit, String> {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(CollectLimit::Count(DEFAULT_COLLECT_LIMIT));
    };
    if raw.eq_ignore_ascii_case("entire") || raw.eq_ignore_ascii_case("all") {
        return Ok(CollectLimit::Entire);
    }
    match raw.parse::<usize>() {
        Ok(0) => Err("Limit must be at least 1.".to_string()),
        Ok(n) => Ok(CollectLimit::Count(n)),
        Err(_) => Err(format!(
            "Invalid limit `{}`. Use a number or `entire`.",
            raw
        )),
    }
}

pub fn build_filter(
    scope: Scope,
    guild_id: &str,
    channel_id: &str,
    author_id: Option<String>,
) -> Filter {
    let filter = match scope {
        Scope::Channel => Filter::for_guild(guild_id).with_channel(channel_id),
        Scope::Server => Filter::for_guild(guild_id),
        Scope::Global => Filter::global(),
    };
    match author_id {
        Some(author) => filter.with_author(author),
        None => filter,
    }
}

fn format_eta(seconds: f64) -> String {
    let secs = if seconds.is_finite() {
        seconds.max(0.0).round() as u64
    } else {
        0
    };
    humantime::format_duration(Duration::from_secs(secs)).to_string()
}

fn describe_step(verb: &str, progress: &TaskProgress) -> String {
    let mut line = match progress.step {
        Step::Querying => "🔎 Loading messages…".to_string(),
        Step::Training => format!(
            "🧠 Learning from {}/{} messages",
            progress.progress, progress.total
        ),
        Step::Processing => format!(
            "📊 {} {}/{} messages",
            verb, progress.progress, progress.total
        ),
        Step::Generating => "✍️ Writing…".to_string(),
    };
    if let Some(eta) = progress.estimated_time_remaining_seconds {
        line.push_str(&format!(" (~{} left)", format_eta(eta)));
    }
    line
}

/// One-line status text for a progress event.
pub fn describe_progress(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Collect {
            batch_number,
            total_collected,
            limit,
            percent_complete,
            messages_per_second,
            estimated_time_remaining_seconds,
        } => {
            let mut line = match limit {
                CollectLimit::Count(n) => format!(
                    "📥 Collecting… {}/{} messages (batch {})",
                    total_collected, n, batch_number
                ),
                CollectLimit::Entire => format!(
                    "📥 Collecting… {} messages (batch {})",
                    total_collected, batch_number
                ),
            };
            if *percent_complete > 0.0 {
                line.push_str(&format!(", {:.0}%", percent_complete));
            }
            line.push_str(&format!(", {:.1} msg/s", messages_per_second));
            if let Some(eta) = estimated_time_remaining_seconds {
                line.push_str(&format!(", ~{} left", format_eta(*eta)));
            }
            line
        }
        ProgressEvent::CollectComplete {
            total_collected, ..
        } => format!("💾 Saving {} messages…", total_collected),
        ProgressEvent::Generate(progress) => describe_step("Reading", progress),
        ProgressEvent::Stats(progress) => describe_step("Counted", progress),
    }
}

/// User-facing text for a failed task.
pub fn describe_error(err: &EngineError) -> String {
    match (err.kind(), err) {
        (ErrorKind::NoData, EngineError::ModelEmpty) => {
            "📭 Those messages don't have enough words to learn from yet.".to_string()
        }
        (ErrorKind::NoData, _) => {
            "📭 No messages found for that. Try `/collect` first.".to_string()
        }
        (ErrorKind::Transient, _) => format!(
            "⚠️ Couldn't finish that right now, please try again shortly. ({})",
            err
        ),
        (ErrorKind::Internal, _) => format!("❌ {}", err),
    }
}

/// Cuts `text` to fit a single Discord message.
pub fn truncate_for_discord(text: &str) -> String {
    if text.chars().count() <= DISCORD_MESSAGE_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(DISCORD_MESSAGE_LIMIT - 1).collect();
    out.push('…');
    out
}

/// Mirrors task progress into `reply` until the task finishes, then returns its result.
pub async fn follow_task(
    ctx: Context<'_>,
    reply: &poise::ReplyHandle<'_>,
    mut handle: TaskHandle,
) -> Result<TaskOutput, EngineError> {
    let mut last_edit: Option<Instant> = None;
    while let Some(event) = handle.next_progress().await {
        if last_edit.map_or(false, |at| at.elapsed() < PROGRESS_EDIT_INTERVAL) {
            continue;
        }
        last_edit = Some(Instant::now());
        let status = poise::CreateReply::default().content(describe_progress(&event));
        if let Err(e) = reply.edit(ctx, status).await {
            warn!("Failed to update progress for task {}: {}", handle.task_id(), e);
        }
    }
    handle.wait().await
}
