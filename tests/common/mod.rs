// Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parrot::corpus::{MessageRecord, MessageSource};
use parrot::db::Database;
use parrot::engine::EngineSettings;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const GUILD: &str = "g1";
pub const CHANNEL: &str = "c1";

/// An in-memory channel that pages its history the way Discord does:
/// newest first, strictly older than the `before` cursor.
pub struct ChannelSimulator {
    history: Mutex<Vec<MessageRecord>>,
    fetches: AtomicUsize,
    report_total: bool,
}

impl ChannelSimulator {
    pub fn with_messages(count: usize) -> Self {
        let sim = Self {
            history: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            report_total: true,
        };
        for _ in 0..count {
            sim.post(None);
        }
        sim
    }

    pub fn without_total(mut self) -> Self {
        self.report_total = false;
        self
    }

    /// Appends a new message at the head of the channel and returns its id.
    /// Authors alternate between `u1` and `u2` unless one is given.
    pub fn post(&self, author: Option<&str>) -> String {
        let mut history = self.history.lock().unwrap();
        let n = history.len() + 1;
        let author = author
            .map(str::to_string)
            .unwrap_or_else(|| if n % 2 == 0 { "u2".to_string() } else { "u1".to_string() });
        let record = MessageRecord {
            message_id: (1000 + n).to_string(),
            author_id: author,
            channel_id: CHANNEL.to_string(),
            guild_id: GUILD.to_string(),
            text: format!("message number {} says hello to the channel", n),
            timestamp_millis: n as i64 * 1000,
        };
        let id = record.message_id.clone();
        history.push(record);
        id
    }

    /// The message at the head of the channel.
    pub fn newest(&self) -> MessageRecord {
        let history = self.history.lock().unwrap();
        history.last().cloned().expect("channel is empty")
    }

    pub fn len(&self) -> usize {
        self.history.lock().unwrap().len()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for ChannelSimulator {
    async fn fetch_batch(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> anyhow::Result<Vec<MessageRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if channel_id != CHANNEL {
            anyhow::bail!("Unknown channel {}", channel_id);
        }
        let before: Option<u64> = before.map(|b| b.parse()).transpose()?;
        let history = self.history.lock().unwrap();
        Ok(history
            .iter()
            .rev()
            .filter(|m| {
                before.map_or(true, |b| m.message_id.parse::<u64>().map_or(false, |id| id < b))
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_messages(&self, _guild_id: &str, _channel_id: &str) -> Option<u64> {
        if self.report_total {
            Some(self.len() as u64)
        } else {
            None
        }
    }
}

/// A source whose every fetch panics, for exercising worker crashes.
pub struct PanickingSource;

#[async_trait]
impl MessageSource for PanickingSource {
    async fn fetch_batch(
        &self,
        _channel_id: &str,
        _before: Option<&str>,
        _limit: u8,
    ) -> anyhow::Result<Vec<MessageRecord>> {
        panic!("upstream exploded");
    }

    async fn count_messages(&self, _guild_id: &str, _channel_id: &str) -> Option<u64> {
        None
    }
}

/// Panics on its first fetch, then serves `inner` like a recovered upstream.
pub struct CrashOnceSource {
    crashed: AtomicBool,
    inner: ChannelSimulator,
}

impl CrashOnceSource {
    pub fn new(inner: ChannelSimulator) -> Self {
        Self {
            crashed: AtomicBool::new(false),
            inner,
        }
    }
}

#[async_trait]
impl MessageSource for CrashOnceSource {
    async fn fetch_batch(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> anyhow::Result<Vec<MessageRecord>> {
        if !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("upstream exploded once");
        }
        self.inner.fetch_batch(channel_id, before, limit).await
    }

    async fn count_messages(&self, guild_id: &str, channel_id: &str) -> Option<u64> {
        self.inner.count_messages(guild_id, channel_id).await
    }
}

pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        batch_delay: Duration::ZERO,
        retry_attempts: 3,
        retry_delay: Duration::ZERO,
        chunk_size: 50,
    }
}

pub fn test_db() -> Database {
    let db = Database::open(":memory:").unwrap();
    db.execute_init().unwrap();
    db
}
