use super::progress::CollectTracker;
use super::{CollectLimit, CollectRequest, EngineError, EngineSettings, ProgressReporter};
use crate::corpus::{CorpusStore, MessageRecord, MessageSource};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Upstream page size cap.
pub const MAX_BATCH_SIZE: usize = 100;

/// Walks a channel's history backwards and stores what it finds.
pub struct Collector<'a> {
    store: &'a dyn CorpusStore,
    source: &'a dyn MessageSource,
    settings: &'a EngineSettings,
}

impl<'a> Collector<'a> {
    pub fn new(
        store: &'a dyn CorpusStore,
        source: &'a dyn MessageSource,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            store,
            source,
            settings,
        }
    }

    /// Collects up to `request.limit` messages, newest first, and returns how
    /// many new records were gathered.
    ///
    /// On a channel that was fully swept before, the walk stops at the first
    /// message already in the store, so only the newer history is fetched.
    /// Records are written once, after the walk; a fatal fetch error leaves
    /// earlier runs' data untouched.
    pub async fn collect(
        &self,
        request: &CollectRequest,
        progress: &ProgressReporter,
    ) -> Result<usize, EngineError> {
        let guild_id = request.channel.guild_id.as_str();
        let channel_id = request.channel.channel_id.as_str();
        let entire = request.limit == CollectLimit::Entire;

        let resumable = self
            .store
            .is_channel_fully_collected(guild_id, channel_id)
            .await
            .map_err(EngineError::transport)?;
        let known_ids = if resumable {
            let ids = self
                .store
                .get_existing_message_ids(guild_id, channel_id)
                .await
                .map_err(EngineError::transport)?;
            info!(
                "Collector: channel {} was swept before, resuming against {} known messages",
                channel_id,
                ids.len()
            );
            ids
        } else {
            HashSet::new()
        };

        let target = match request.limit {
            CollectLimit::Count(n) => Some(n as u64),
            CollectLimit::Entire if request.author_id.is_none() => {
                let total = self.source.count_messages(guild_id, channel_id).await;
                if total.is_none() {
                    debug!("Collector: no message total for channel {}, progress is indeterminate", channel_id);
                }
                total
            }
            CollectLimit::Entire => None,
        };

        info!(
            "Collector: starting collection in channel {} (limit: {:?}, author: {:?})",
            channel_id, request.limit, request.author_id
        );

        let mut tracker = CollectTracker::new(request.limit, target);
        let mut collected: Vec<MessageRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut before: Option<String> = None;
        let mut batch_number: u32 = 0;

        loop {
            let remaining = match request.limit {
                CollectLimit::Count(n) => n.saturating_sub(collected.len()),
                CollectLimit::Entire => usize::MAX,
            };
            if remaining == 0 {
                break;
            }

            if batch_number > 0 && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
            batch_number += 1;

            let fetch_limit = remaining.min(MAX_BATCH_SIZE) as u8;
            let batch = self
                .fetch_with_retry(channel_id, before.as_deref(), fetch_limit)
                .await?;

            let Some(oldest) = batch.last() else {
                debug!("Collector: reached the start of channel {}", channel_id);
                break;
            };
            before = Some(oldest.message_id.clone());
            let fetched = batch.len();

            let mut eligible: Vec<MessageRecord> = batch
                .into_iter()
                .filter(|m| m.has_text())
                .filter(|m| {
                    request
                        .author_id
                        .as_deref()
                        .map_or(true, |author| m.author_id == author)
                })
                .map(|mut m| {
                    if m.guild_id.is_empty() {
                        m.guild_id = guild_id.to_string();
                    }
                    m
                })
                .collect();

            let mut reached_known = false;
            if resumable {
                if let Some(pos) = eligible
                    .iter()
                    .position(|m| known_ids.contains(&m.message_id))
                {
                    eligible.truncate(pos);
                    reached_known = true;
                }
            }

            for record in eligible {
                if seen.insert(record.message_id.clone()) {
                    collected.push(record);
                }
            }
            if let CollectLimit::Count(n) = request.limit {
                collected.truncate(n);
            }

            debug!(
                "Collector: batch {} fetched {} messages, {} collected so far",
                batch_number,
                fetched,
                collected.len()
            );
            progress.emit(tracker.batch(batch_number, collected.len()));

            if reached_known {
                info!(
                    "Collector: reached previously collected history in channel {}",
                    channel_id
                );
                break;
            }
        }

        let total = collected.len();
        if total > 0 {
            // An author-filtered sweep leaves other authors' history behind.
            let fully_collected = (entire && request.author_id.is_none()).then_some(channel_id);
            self.store
                .add_messages(collected, guild_id, fully_collected)
                .await
                .map_err(EngineError::transport)?;
        }

        info!(
            "Collector: finished channel {} with {} new messages in {} batches",
            channel_id, total, batch_number
        );
        progress.emit(tracker.complete(total));
        Ok(total)
    }

    async fn fetch_with_retry(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<MessageRecord>, EngineError> {
        let attempts = self.settings.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.source.fetch_batch(channel_id, before, limit).await {
                Ok(batch) => return Ok(batch),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Collector: fetch attempt {}/{} for channel {} failed: {}",
                        attempt, attempts, channel_id, e
                    );
                    tokio::time::sleep(self.settings.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Collector: giving up on channel {} after {} attempts: {}",
                        channel_id, attempts, e
                    );
                    return Err(EngineError::Transport(format!(
                        "fetching channel {} failed after {} attempts: {:#}",
                        channel_id, attempts, e
                    )));
                }
            }
        }
    }
}
