use thiserror::Error;

use crate::task::{ListId, TaskId};

/// Failures surfaced by the task store and its persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("list not found: {0}")]
    ListNotFound(ListId),

    #[error("failed to parse data: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("failed to serialize data: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("unsupported schema version {found} (this build reads up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn invalid_snapshot(msg: impl Into<String>) -> Self {
        StoreError::InvalidSnapshot(msg.into())
    }

    /// Not-found errors leave state untouched and are treated as no-ops by callers.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::TaskNotFound(_) | StoreError::ListNotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
