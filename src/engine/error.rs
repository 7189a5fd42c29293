use crate::markov::ModelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of an engine task. Serializable so it can cross the worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum EngineError {
    /// Upstream fetch or storage failure, after any retries.
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("no messages matched the requested filter")]
    EmptyCorpus,
    #[error("not enough text to build a chain")]
    ModelEmpty,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Coarse classification for whoever reports the failure to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing to work with; retrying won't help until more data exists.
    NoData,
    /// Retrying later may succeed.
    Transient,
    Internal,
}

impl EngineError {
    pub fn transport(err: anyhow::Error) -> Self {
        EngineError::Transport(format!("{err:#}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::EmptyCorpus | EngineError::ModelEmpty => ErrorKind::NoData,
            EngineError::Transport(_) | EngineError::EngineUnavailable(_) => ErrorKind::Transient,
            EngineError::InvalidRequest(_) | EngineError::Protocol(_) | EngineError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Empty => EngineError::ModelEmpty,
            ModelError::InvalidOrder(_) => EngineError::InvalidRequest(err.to_string()),
        }
    }
}
