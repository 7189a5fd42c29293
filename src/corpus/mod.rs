//! Corpus records and the two capabilities the engine is built on:
//! durable storage ([`CorpusStore`]) and the upstream history feed
//! ([`MessageSource`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One stored chat message.
///
/// `(channel_id, message_id)` is unique across the corpus and `text` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: String,
    pub author_id: String,
    pub channel_id: String,
    pub guild_id: String,
    pub text: String,
    pub timestamp_millis: i64,
}

impl MessageRecord {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Selects a slice of the corpus.
///
/// `global` drops the guild scope; channel and author restrictions still apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub author_id: Option<String>,
    pub global: bool,
}

impl Filter {
    pub fn for_guild(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: Some(guild_id.into()),
            ..Default::default()
        }
    }

    pub fn global() -> Self {
        Self {
            global: true,
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    /// Guild restriction after `global` has been applied.
    pub fn effective_guild(&self) -> Option<&str> {
        if self.global {
            None
        } else {
            self.guild_id.as_deref()
        }
    }
}

/// A channel together with the guild it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub guild_id: String,
    pub channel_id: String,
}

impl ChannelRef {
    pub fn new(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// Durable message storage plus per-channel collection bookkeeping.
///
/// Writes are append-only and reads are snapshot queries, so implementations
/// need no coordination between a running collection and readers.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Stores `records`, silently skipping ones already present. A row that
    /// was only captured live becomes collected history.
    ///
    /// When `fully_collected_channel_id` is set, that channel is marked as
    /// fully collected for `guild_id` in the same write.
    async fn add_messages(
        &self,
        records: Vec<MessageRecord>,
        guild_id: &str,
        fully_collected_channel_id: Option<&str>,
    ) -> anyhow::Result<()>;

    /// All records matching `filter`, oldest first.
    async fn get_messages(&self, filter: &Filter) -> anyhow::Result<Vec<MessageRecord>>;

    async fn is_channel_fully_collected(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> anyhow::Result<bool>;

    /// Ids stored by collection runs for this channel. Rows captured live
    /// are left out until a collection run reaches them.
    async fn get_existing_message_ids(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> anyhow::Result<HashSet<String>>;
}

/// Paginated upstream history for a channel.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Up to `limit` messages older than `before` (or the newest ones), newest first.
    async fn fetch_batch(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> anyhow::Result<Vec<MessageRecord>>;

    /// Authoritative message count for a channel, if the upstream can tell.
    async fn count_messages(&self, guild_id: &str, channel_id: &str) -> Option<u64>;
}
