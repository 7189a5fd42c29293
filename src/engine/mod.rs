//! The corpus engine: collection, chain generation and statistics, written
//! once over injected [`CorpusStore`] and [`MessageSource`] capabilities.
//!
//! The engine runs one task at a time and knows nothing about threads; the
//! isolation boundary lives in [`crate::bridge`].

pub mod collector;
pub mod error;
pub mod generation;
pub mod progress;
pub mod stats;

use crate::config::Config;
use crate::corpus::{ChannelRef, CorpusStore, Filter, MessageSource};
use crate::markov::TokenMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use error::{EngineError, ErrorKind};
pub use progress::{ProgressEvent, ProgressReporter, Step, TaskProgress};
pub use stats::CorpusStats;

/// Tunables for a running engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Pause between upstream batch fetches.
    pub batch_delay: Duration,
    pub retry_attempts: u32,
    /// Base retry delay, multiplied by the attempt number.
    pub retry_delay: Duration,
    /// Records processed between progress checkpoints.
    pub chunk_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(1000),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            chunk_size: 1000,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_delay: Duration::from_millis(config.collect_batch_delay_ms),
            retry_attempts: config.collect_retry_attempts.max(1),
            retry_delay: Duration::from_millis(config.collect_retry_delay_ms),
            chunk_size: config.corpus_chunk_size.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectLimit {
    Count(usize),
    /// Walk the whole channel history.
    Entire,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectRequest {
    pub channel: ChannelRef,
    pub author_id: Option<String>,
    pub limit: CollectLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub filter: Filter,
    pub min_length: usize,
    pub max_length: usize,
    pub seed: Option<String>,
    pub order: usize,
    #[serde(default)]
    pub token_mode: TokenMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRequest {
    Collect(CollectRequest),
    Generate(GenerateRequest),
    Stats(Filter),
}

impl TaskRequest {
    pub fn name(&self) -> &'static str {
        match self {
            TaskRequest::Collect(_) => "collect",
            TaskRequest::Generate(_) => "generate",
            TaskRequest::Stats(_) => "stats",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskOutput {
    Collected { count: usize },
    Generated { text: String },
    Stats(CorpusStats),
}

impl TaskOutput {
    fn mismatch(&self, expected: &str) -> EngineError {
        EngineError::Protocol(format!("expected {} result, got {:?}", expected, self))
    }

    pub fn into_collected(self) -> Result<usize, EngineError> {
        match self {
            TaskOutput::Collected { count } => Ok(count),
            other => Err(other.mismatch("collect")),
        }
    }

    pub fn into_text(self) -> Result<String, EngineError> {
        match self {
            TaskOutput::Generated { text } => Ok(text),
            other => Err(other.mismatch("generate")),
        }
    }

    pub fn into_stats(self) -> Result<CorpusStats, EngineError> {
        match self {
            TaskOutput::Stats(stats) => Ok(stats),
            other => Err(other.mismatch("stats")),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn CorpusStore>,
    source: Arc<dyn MessageSource>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        source: Arc<dyn MessageSource>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            source,
            settings,
        }
    }

    pub async fn collect(
        &self,
        request: &CollectRequest,
        progress: &ProgressReporter,
    ) -> Result<usize, EngineError> {
        collector::Collector::new(self.store.as_ref(), self.source.as_ref(), &self.settings)
            .collect(request, progress)
            .await
    }

    pub async fn generate(
        &self,
        request: &GenerateRequest,
        progress: &ProgressReporter,
    ) -> Result<String, EngineError> {
        generation::generate(self.store.as_ref(), request, self.settings.chunk_size, progress).await
    }

    pub async fn stats(
        &self,
        filter: &Filter,
        progress: &ProgressReporter,
    ) -> Result<CorpusStats, EngineError> {
        stats::compute(self.store.as_ref(), filter, self.settings.chunk_size, progress).await
    }

    pub async fn run(
        &self,
        task: &TaskRequest,
        progress: &ProgressReporter,
    ) -> Result<TaskOutput, EngineError> {
        match task {
            TaskRequest::Collect(request) => self
                .collect(request, progress)
                .await
                .map(|count| TaskOutput::Collected { count }),
            TaskRequest::Generate(request) => self
                .generate(request, progress)
                .await
                .map(|text| TaskOutput::Generated { text }),
            TaskRequest::Stats(filter) => self.stats(filter, progress).await.map(TaskOutput::Stats),
        }
    }
}
