//! In-memory, per-user task store.
//!
//! The [`TaskStore`] holds every task keyed by ID. All operations are scoped
//! to an owner: a task that exists but belongs to someone else is reported as
//! [`StoreError::Forbidden`] rather than silently ignored.

use std::collections::HashMap;

use alldone_proto::task::{Task, TaskCreate, TaskId, TaskUpdate, UserId};
use chrono::Utc;
use tokio::sync::RwLock;

/// Errors returned by [`TaskStore`] mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No task with this ID exists.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The task exists but belongs to another user.
    #[error("task {0} belongs to another user")]
    Forbidden(TaskId),
}

/// Thread-safe in-memory task table.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all tasks owned by `user`, oldest first.
    pub async fn list(&self, user: &UserId) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut owned: Vec<Task> = tasks
            .values()
            .filter(|t| &t.user_id == user)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        owned
    }

    /// Inserts a new task for `user` and returns the stored representation.
    ///
    /// The server assigns the ID and both timestamps.
    pub async fn create(&self, user: &UserId, create: TaskCreate) -> Task {
        let now = Utc::now();
        let task = Task {
            id: TaskId::generate(),
            user_id: user.clone(),
            text: create.text,
            completed: create.completed,
            created_at: now,
            updated_at: Some(now),
        };
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        task
    }

    /// Applies the present fields of `update` to a task owned by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task does not exist, or
    /// [`StoreError::Forbidden`] if it belongs to another user.
    pub async fn update(
        &self,
        user: &UserId,
        id: &TaskId,
        update: TaskUpdate,
    ) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if &task.user_id != user {
            return Err(StoreError::Forbidden(id.clone()));
        }
        if let Some(text) = update.text {
            task.text = text;
        }
        if let Some(completed) = update.completed {
            task.completed = completed;
        }
        task.updated_at = Some(Utc::now());
        Ok(task.clone())
    }

    /// Removes a task owned by `user`.
    ///
    /// # Errors
    ///
    /// Same as [`TaskStore::update`].
    pub async fn delete(&self, user: &UserId, id: &TaskId) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get(id) {
            None => Err(StoreError::NotFound(id.clone())),
            Some(task) if &task.user_id != user => Err(StoreError::Forbidden(id.clone())),
            Some(_) => {
                tasks.remove(id);
                Ok(())
            }
        }
    }

    /// Returns the total number of stored tasks across all users.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Returns `true` if no user has any task.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}
