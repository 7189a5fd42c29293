use super::progress::StepTracker;
use super::{EngineError, ProgressReporter, Step};
use crate::corpus::{CorpusStore, Filter};
use crate::markov::words;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub message_count: usize,
    pub author_count: usize,
    pub channel_count: usize,
    pub guild_count: usize,
    pub total_word_count: usize,
    pub unique_word_count: usize,
    pub avg_words_per_message: f64,
    /// Milliseconds since the Unix epoch.
    pub oldest_timestamp: i64,
    pub newest_timestamp: i64,
}

#[derive(Default)]
struct Accumulator {
    messages: usize,
    authors: HashSet<String>,
    channels: HashSet<String>,
    guilds: HashSet<String>,
    total_words: usize,
    unique_words: HashSet<String>,
    oldest: Option<i64>,
    newest: Option<i64>,
}

impl Accumulator {
    fn finish(self) -> CorpusStats {
        CorpusStats {
            message_count: self.messages,
            author_count: self.authors.len(),
            channel_count: self.channels.len(),
            guild_count: self.guilds.len(),
            total_word_count: self.total_words,
            unique_word_count: self.unique_words.len(),
            avg_words_per_message: if self.messages == 0 {
                0.0
            } else {
                self.total_words as f64 / self.messages as f64
            },
            oldest_timestamp: self.oldest.unwrap_or_default(),
            newest_timestamp: self.newest.unwrap_or_default(),
        }
    }
}

/// Aggregates the filtered corpus in one streaming pass.
pub async fn compute(
    store: &dyn CorpusStore,
    filter: &Filter,
    chunk_size: usize,
    progress: &ProgressReporter,
) -> Result<CorpusStats, EngineError> {
    let tracker = StepTracker::stats();

    progress.emit(tracker.event(Step::Querying, 0, 0));
    let records = store
        .get_messages(filter)
        .await
        .map_err(EngineError::transport)?;
    if records.is_empty() {
        return Err(EngineError::EmptyCorpus);
    }

    let total = records.len();
    let mut acc = Accumulator::default();
    for chunk in records.chunks(chunk_size.max(1)) {
        for record in chunk {
            acc.messages += 1;
            acc.authors.insert(record.author_id.clone());
            acc.channels.insert(record.channel_id.clone());
            acc.guilds.insert(record.guild_id.clone());
            for word in words(&record.text) {
                acc.total_words += 1;
                acc.unique_words.insert(word.to_lowercase());
            }
            let ts = record.timestamp_millis;
            acc.oldest = Some(acc.oldest.map_or(ts, |o| o.min(ts)));
            acc.newest = Some(acc.newest.map_or(ts, |n| n.max(ts)));
        }
        progress.emit(tracker.event(Step::Processing, acc.messages, total));
        tokio::task::yield_now().await;
    }

    let stats = acc.finish();
    info!(
        "Stats: {} messages from {} authors in {} channels",
        stats.message_count, stats.author_count, stats.channel_count
    );
    Ok(stats)
}
