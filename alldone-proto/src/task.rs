//! Task resource types for the Alldone REST API.
//!
//! Defines the persisted [`Task`] representation returned by the server,
//! the request bodies for creating and updating tasks, the JSON error body,
//! and the identifier newtypes used on both sides of the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix that marks a client-generated placeholder ID.
pub const PLACEHOLDER_PREFIX: &str = "temp-";

/// Opaque task identifier.
///
/// Server IDs are opaque strings assigned by the resource API. While a
/// create request is in flight the client uses a placeholder ID
/// (`temp-<uuid>`) instead; see [`TaskId::placeholder`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh server-side identifier (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Generates a client-side placeholder identifier.
    #[must_use]
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::now_v7()))
    }

    /// Returns `true` if this ID was generated by [`TaskId::placeholder`].
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Returns the string form of this ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the user that owns a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps an existing user identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted task as returned by the resource API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier.
    pub id: TaskId,
    /// Owner of the task. Never editable by the client.
    #[serde(default, alias = "userId")]
    pub user_id: UserId,
    /// Task text.
    pub text: String,
    /// Whether the task has been completed.
    #[serde(default)]
    pub completed: bool,
    /// Creation time; the sort key for list display.
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Time of the last modification.
    #[serde(
        default,
        alias = "updatedAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /tasks/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCreate {
    /// Text of the new task.
    pub text: String,
    /// Initial completion flag.
    #[serde(default)]
    pub completed: bool,
}

impl TaskCreate {
    /// Creates a request for a new, not yet completed task.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }
}

/// Body of `PUT /tasks/{id}`.
///
/// Only the fields that are present are changed on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// Replacement text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Replacement completion flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskUpdate {
    /// Returns `true` if the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none() && self.completed.is_none()
    }
}

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub detail: String,
}

impl ErrorBody {
    /// Creates an error body with the given detail message.
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Reasons task text can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskTextError {
    /// Text is empty or whitespace only.
    #[error("task text cannot be empty")]
    Empty,
}

/// Normalizes task text by trimming surrounding whitespace.
///
/// # Errors
///
/// Returns [`TaskTextError::Empty`] if nothing remains after trimming.
pub fn normalize_text(text: &str) -> Result<&str, TaskTextError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TaskTextError::Empty);
    }
    Ok(trimmed)
}
