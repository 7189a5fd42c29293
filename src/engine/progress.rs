//! Progress events emitted while a task runs, and the per-call sink they go to.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use super::CollectLimit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Querying,
    Training,
    Processing,
    Generating,
}

/// Progress of a generate or stats task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub step: Step,
    pub progress: usize,
    pub total: usize,
    pub elapsed_millis: u64,
    pub estimated_time_remaining_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum ProgressEvent {
    Collect {
        batch_number: u32,
        total_collected: usize,
        limit: CollectLimit,
        percent_complete: f64,
        messages_per_second: f64,
        estimated_time_remaining_seconds: Option<f64>,
    },
    CollectComplete {
        total_collected: usize,
        elapsed_millis: u64,
    },
    Generate(TaskProgress),
    Stats(TaskProgress),
}

impl ProgressEvent {
    /// Event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Collect { .. } => "collect_progress",
            ProgressEvent::CollectComplete { .. } => "collect_complete",
            ProgressEvent::Generate(_) => "generate_progress",
            ProgressEvent::Stats(_) => "stats_progress",
        }
    }
}

type Sink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Where a running task reports progress. Reporting never fails the task.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sink: Option<Sink>,
}

impl ProgressReporter {
    pub fn new(sink: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            sink: Some(Arc::new(sink)),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Self::new(move |event| {
            let _ = tx.send(event);
        });
        (reporter, rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("attached", &self.sink.is_some())
            .finish()
    }
}

/// Throughput-based ETA over a known amount of work.
pub(crate) fn eta_seconds(done: u64, target: u64, elapsed_secs: f64) -> Option<f64> {
    if done == 0 || elapsed_secs <= 0.0 {
        return None;
    }
    let rate = done as f64 / elapsed_secs;
    Some(target.saturating_sub(done) as f64 / rate)
}

/// Builds batch events for one collection run.
pub(crate) struct CollectTracker {
    started: Instant,
    target: Option<u64>,
    limit: CollectLimit,
    last_percent: f64,
}

impl CollectTracker {
    pub(crate) fn new(limit: CollectLimit, target: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            target,
            limit,
            last_percent: 0.0,
        }
    }

    pub(crate) fn batch(&mut self, batch_number: u32, total_collected: usize) -> ProgressEvent {
        let elapsed = self.started.elapsed().as_secs_f64();
        let collected = total_collected as u64;
        let messages_per_second = if elapsed > 0.0 {
            collected as f64 / elapsed
        } else {
            0.0
        };

        let percent = match self.target {
            Some(target) if target > 0 => (collected as f64 * 100.0 / target as f64).min(100.0),
            _ => 0.0,
        };
        // Percent never moves backwards within a run.
        self.last_percent = self.last_percent.max(percent);

        ProgressEvent::Collect {
            batch_number,
            total_collected,
            limit: self.limit,
            percent_complete: self.last_percent,
            messages_per_second,
            estimated_time_remaining_seconds: self
                .target
                .and_then(|target| eta_seconds(collected, target, elapsed)),
        }
    }

    pub(crate) fn complete(&self, total_collected: usize) -> ProgressEvent {
        ProgressEvent::CollectComplete {
            total_collected,
            elapsed_millis: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Builds step events for a generate or stats run.
pub(crate) struct StepTracker {
    started: Instant,
    wrap: fn(TaskProgress) -> ProgressEvent,
}

impl StepTracker {
    pub(crate) fn generate() -> Self {
        Self {
            started: Instant::now(),
            wrap: ProgressEvent::Generate,
        }
    }

    pub(crate) fn stats() -> Self {
        Self {
            started: Instant::now(),
            wrap: ProgressEvent::Stats,
        }
    }

    pub(crate) fn event(&self, step: Step, progress: usize, total: usize) -> ProgressEvent {
        let elapsed = self.started.elapsed();
        (self.wrap)(TaskProgress {
            step,
            progress,
            total,
            elapsed_millis: elapsed.as_millis() as u64,
            estimated_time_remaining_seconds: eta_seconds(
                progress as u64,
                total as u64,
                elapsed.as_secs_f64(),
            ),
        })
    }
}
