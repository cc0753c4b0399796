//! Optimistic task list for the signed-in user.
//!
//! Mutations are applied to local state immediately, sent to the task
//! resource, and then reconciled: confirmed with the server's
//! representation on success, rolled back on failure. Tasks created while
//! offline from the server's point of view carry placeholder IDs until the
//! create response arrives.

pub mod list;
pub mod manager;

pub use list::{
    AddResolution, DeletePlan, LocalTask, PendingState, TaskFields, TaskList, UpdatePlan,
};
pub use manager::TaskManager;

use alldone_proto::task::{TaskId, TaskTextError};
use thiserror::Error;

use crate::api::ApiError;

/// Errors surfaced by task operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// No user is signed in.
    #[error("not signed in")]
    Unauthenticated,
    /// The task is not in the local list (stale ID).
    #[error("task not found: {0}")]
    NotFoundLocally(TaskId),
    /// Another mutation of this task is still in flight.
    #[error("task {0} has a change in progress")]
    TaskBusy(TaskId),
    /// Task text is empty or whitespace only.
    #[error("task text cannot be empty")]
    TextEmpty,
    /// The server answered with a non-2xx status.
    #[error("request rejected ({status}): {message}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided or status-derived message.
        message: String,
    },
    /// The request never produced a response.
    #[error("network failure: {message}")]
    NetworkFailure {
        /// Transport-level description.
        message: String,
    },
}

impl From<ApiError> for TaskError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::RemoteRejected { status, message } => Self::RemoteRejected { status, message },
            ApiError::NetworkFailure { message } => Self::NetworkFailure { message },
        }
    }
}

impl From<TaskTextError> for TaskError {
    fn from(err: TaskTextError) -> Self {
        match err {
            TaskTextError::Empty => Self::TextEmpty,
        }
    }
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Something completed.
    Info,
    /// An action was refused locally.
    Warning,
    /// A remote call failed and local state was rolled back.
    Error,
}

/// A transient, user-facing notification emitted by the task manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Human-readable text.
    pub message: String,
}

impl Notice {
    /// Creates an informational notice.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    /// Creates a warning notice.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    /// Creates an error notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}
