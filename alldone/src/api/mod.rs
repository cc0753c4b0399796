//! Task resource API abstraction.
//!
//! Defines the [`TaskApi`] trait the task manager talks to. Concrete
//! implementations:
//! - [`rest::RestClient`]: HTTP client for the Alldone REST server
//! - [`scripted::ScriptedApi`]: in-process fake with scriptable failures
//!   and held calls, for testing

pub mod rest;
pub mod scripted;

use std::future::Future;

use alldone_proto::task::{Task, TaskCreate, TaskId, TaskUpdate};

/// Errors reported by a [`TaskApi`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    ///
    /// `message` is the server's `detail` when one was provided, otherwise
    /// the status text.
    #[error("request rejected ({status}): {message}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided or status-derived message.
        message: String,
    },

    /// The request never produced an HTTP response.
    #[error("network failure: {message}")]
    NetworkFailure {
        /// Transport-level description.
        message: String,
    },
}

impl ApiError {
    /// Builds a [`ApiError::RemoteRejected`].
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status,
            message: message.into(),
        }
    }

    /// Builds a [`ApiError::NetworkFailure`].
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            message: message.into(),
        }
    }

    /// Returns the HTTP status for rejections, `None` for network failures.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRejected { status, .. } => Some(*status),
            Self::NetworkFailure { .. } => None,
        }
    }
}

/// The remote task resource, scoped by bearer token.
///
/// Every call is independent and may complete in any order relative to
/// other calls; callers must not assume completion order matches issue
/// order.
pub trait TaskApi: Send + Sync + 'static {
    /// `GET /tasks/`: all tasks of the token's user.
    fn list(&self, token: &str) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// `POST /tasks/`: create a task; the server assigns `id` and
    /// `created_at`.
    fn create(
        &self,
        token: &str,
        create: &TaskCreate,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// `PUT /tasks/{id}`: change the fields present in `update`.
    fn update(
        &self,
        token: &str,
        id: &TaskId,
        update: &TaskUpdate,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// `DELETE /tasks/{id}`.
    fn delete(&self, token: &str, id: &TaskId)
    -> impl Future<Output = Result<(), ApiError>> + Send;
}
