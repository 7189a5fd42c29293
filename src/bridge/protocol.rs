//! Messages exchanged between [`super::EngineBridge`] and its worker.

use crate::corpus::Filter;
use crate::engine::{CollectRequest, EngineError, GenerateRequest, ProgressEvent, TaskOutput, TaskRequest};
use serde::{Deserialize, Serialize};

/// What the worker needs to open its own upstream session and store.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineCredentials {
    pub discord_token: String,
    pub database_url: String,
}

impl std::fmt::Debug for EngineCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCredentials")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Initialize { credentials: EngineCredentials },
    Collect { task_id: u64, options: CollectRequest },
    Generate { task_id: u64, options: GenerateRequest },
    Stats { task_id: u64, options: Filter },
}

impl WorkerRequest {
    pub fn task(task_id: u64, task: TaskRequest) -> Self {
        match task {
            TaskRequest::Collect(options) => WorkerRequest::Collect { task_id, options },
            TaskRequest::Generate(options) => WorkerRequest::Generate { task_id, options },
            TaskRequest::Stats(options) => WorkerRequest::Stats { task_id, options },
        }
    }

    pub fn into_task(self) -> Option<(u64, TaskRequest)> {
        match self {
            WorkerRequest::Initialize { .. } => None,
            WorkerRequest::Collect { task_id, options } => Some((task_id, TaskRequest::Collect(options))),
            WorkerRequest::Generate { task_id, options } => {
                Some((task_id, TaskRequest::Generate(options)))
            }
            WorkerRequest::Stats { task_id, options } => Some((task_id, TaskRequest::Stats(options))),
        }
    }
}

/// Replies from the worker. Progress carries no task id: the worker runs one
/// task at a time, so it always belongs to the oldest outstanding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    Initialized,
    InitializeFailed { error: EngineError },
    Result { task_id: u64, data: TaskOutput },
    Error { task_id: u64, error: EngineError },
    Progress { event: String, data: ProgressEvent },
}

impl WorkerResponse {
    pub fn progress(event: ProgressEvent) -> Self {
        WorkerResponse::Progress {
            event: event.name().to_string(),
            data: event,
        }
    }
}
