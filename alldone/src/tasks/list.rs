//! Pure local state of the task list and its reconciliation rules.
//!
//! [`TaskList`] holds [`LocalTask`]s sorted by `created_at` and implements
//! every optimistic transition as a synchronous method: the `begin_*`
//! methods apply a change locally and say what (if anything) must be sent,
//! and the `confirm_*` / `abandon_*` / `roll_back_*` / `restore` methods
//! fold the remote outcome back in. No I/O happens here; the
//! [`TaskManager`](super::TaskManager) drives these methods around its
//! network calls.

use std::collections::HashSet;

use alldone_proto::task::{Task, TaskId, TaskUpdate, UserId};
use chrono::{DateTime, Utc};

use super::TaskError;

/// The persisted, user-editable fields of a task; the rollback snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    /// Task text.
    pub text: String,
    /// Completion flag.
    pub completed: bool,
    /// Last server-side modification time.
    pub updated_at: Option<DateTime<Utc>>,
}

/// In-flight mutation state of a local task.
///
/// A rollback snapshot only exists while an update is pending, and only
/// placeholder tasks can be `PendingAdd` or `PendingDelete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingState {
    /// Matches the server; no request in flight.
    Confirmed,
    /// Created locally; the create request has not resolved yet.
    PendingAdd,
    /// Edited locally; the update request has not resolved yet.
    PendingUpdate {
        /// Fields to restore if the update fails.
        rollback: TaskFields,
    },
    /// Deleted by the user while its create request was still in flight.
    PendingDelete,
}

impl PendingState {
    /// Returns `true` unless the task is [`PendingState::Confirmed`].
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !matches!(self, Self::Confirmed)
    }
}

/// A task as held by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTask {
    /// Server ID, or a placeholder while the create is in flight.
    pub id: TaskId,
    /// Owner.
    pub user_id: UserId,
    /// Task text.
    pub text: String,
    /// Completion flag.
    pub completed: bool,
    /// Sort key.
    pub created_at: DateTime<Utc>,
    /// Last server-side modification time.
    pub updated_at: Option<DateTime<Utc>>,
    /// In-flight mutation state.
    pub pending: PendingState,
}

impl LocalTask {
    /// Wraps a server task as [`PendingState::Confirmed`].
    #[must_use]
    pub fn confirmed(task: Task) -> Self {
        Self {
            id: task.id,
            user_id: task.user_id,
            text: task.text,
            completed: task.completed,
            created_at: task.created_at,
            updated_at: task.updated_at,
            pending: PendingState::Confirmed,
        }
    }

    /// Returns `true` if this task still carries a placeholder ID.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.id.is_placeholder()
    }

    /// Snapshot of the user-editable fields.
    #[must_use]
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            text: self.text.clone(),
            completed: self.completed,
            updated_at: self.updated_at,
        }
    }

    fn restore_fields(&mut self, fields: TaskFields) {
        self.text = fields.text;
        self.completed = fields.completed;
        self.updated_at = fields.updated_at;
    }

    fn apply(&mut self, update: &TaskUpdate) {
        if let Some(text) = &update.text {
            self.text.clone_from(text);
        }
        if let Some(completed) = update.completed {
            self.completed = completed;
        }
    }

    /// Drops the fields of `update` that already hold the requested value.
    fn changes(&self, update: TaskUpdate) -> TaskUpdate {
        TaskUpdate {
            text: update.text.filter(|text| *text != self.text),
            completed: update.completed.filter(|c| *c != self.completed),
        }
    }
}

/// Outcome of [`TaskList::confirm_add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddResolution {
    /// The placeholder was replaced by the server task.
    Confirmed(TaskId),
    /// The user deleted the placeholder while the create was in flight.
    /// The server task was not inserted and must be deleted remotely; it is
    /// returned so it can be restored if that delete fails.
    DeleteRequested(LocalTask),
    /// The placeholder was edited while the create was in flight. The
    /// local edits were kept over the server's fields, the task is now
    /// [`PendingState::PendingUpdate`], and `update` must be sent.
    Edited {
        /// Server ID of the task.
        id: TaskId,
        /// Fields that differ from what the server stored.
        update: TaskUpdate,
    },
    /// The placeholder is gone (the list was cleared in the meantime);
    /// carries the server ID of the created task.
    Orphaned(TaskId),
}

/// What [`TaskList::begin_update`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlan {
    /// Nothing differs from the current values; no request needed.
    Unchanged,
    /// Applied to a placeholder; it travels with the pending create.
    Deferred,
    /// Applied optimistically; send these fields.
    Remote(TaskUpdate),
}

/// What [`TaskList::begin_delete`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePlan {
    /// Placeholder marked [`PendingState::PendingDelete`]; removal waits for
    /// the create to resolve.
    Deferred,
    /// Removed optimistically; send the delete. The removed task is
    /// returned so it can be restored on failure.
    Remote(LocalTask),
}

/// Tasks of the signed-in user, sorted by `created_at` ascending.
///
/// Ties are ordered by ID, so every task has exactly one sorted position.
/// IDs are unique. Lists compare equal when they show the same tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Vec<LocalTask>,
    fetch: Option<FetchJournal>,
}

/// What happened locally while the initial fetch was outstanding.
#[derive(Debug, Clone, Default)]
struct FetchJournal {
    /// Server IDs removed locally since the fetch started.
    removed: HashSet<TaskId>,
    /// The fetched set, once it has arrived.
    fetched: Option<Vec<Task>>,
    /// Placeholders whose created task may already be in `fetched`.
    awaiting: HashSet<TaskId>,
}

impl PartialEq for TaskList {
    fn eq(&self, other: &Self) -> bool {
        self.tasks == other.tasks
    }
}

impl Eq for TaskList {}

impl TaskList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks, including pending ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the list holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in display order.
    #[must_use]
    pub fn as_slice(&self) -> &[LocalTask] {
        &self.tasks
    }

    /// Iterates tasks in display order.
    pub fn iter(&self) -> std::slice::Iter<'_, LocalTask> {
        self.tasks.iter()
    }

    /// Looks up a task by ID.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&LocalTask> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Drops every task and forgets any outstanding fetch.
    pub fn clear(&mut self) {
        self.tasks.clear();
        self.fetch = None;
    }

    /// Empties the list ahead of a full fetch and starts journaling the
    /// local changes that [`TaskList::merge_fetched`] must respect.
    pub fn begin_fetch(&mut self) {
        self.tasks.clear();
        self.fetch = Some(FetchJournal::default());
    }

    /// Folds a fetched set into the list.
    ///
    /// Tasks already in the list were created, edited or restored while
    /// the fetch was in flight and win over their fetched copies. Tasks
    /// deleted in that window stay out. If creates issued before the
    /// response are still unresolved, the fetched set is held back until
    /// they resolve, since any of them may already be in it under its
    /// server ID.
    pub fn merge_fetched(&mut self, fetched: Vec<Task>) {
        let mut journal = self.fetch.take().unwrap_or_default();
        journal.awaiting = self
            .tasks
            .iter()
            .filter(|t| t.is_placeholder())
            .map(|t| t.id.clone())
            .collect();
        journal.fetched = Some(fetched);
        self.fetch = Some(journal);
        self.settle_fetch();
    }

    /// Inserts a [`PendingState::PendingAdd`] task with a new placeholder
    /// ID and returns that ID.
    pub fn insert_placeholder(
        &mut self,
        text: &str,
        user_id: &UserId,
        created_at: DateTime<Utc>,
    ) -> TaskId {
        let id = TaskId::placeholder();
        self.tasks.push(LocalTask {
            id: id.clone(),
            user_id: user_id.clone(),
            text: text.to_string(),
            completed: false,
            created_at,
            updated_at: None,
            pending: PendingState::PendingAdd,
        });
        self.sort();
        id
    }

    /// Folds a successful create response into the list.
    ///
    /// Locally applied edits win over the server's fields; the server only
    /// contributes `id`, `user_id` and the timestamps.
    pub fn confirm_add(&mut self, placeholder: &TaskId, created: Task) -> AddResolution {
        let Some(local) = self.take(placeholder) else {
            self.placeholder_resolved(placeholder);
            return AddResolution::Orphaned(created.id);
        };
        if local.pending == PendingState::PendingDelete {
            return AddResolution::DeleteRequested(self.withhold(placeholder, created));
        }

        let mut task = LocalTask::confirmed(created);
        let update = task.changes(TaskUpdate {
            text: Some(local.text),
            completed: Some(local.completed),
        });
        let id = task.id.clone();
        let resolution = if update.is_empty() {
            AddResolution::Confirmed(id)
        } else {
            let rollback = task.fields();
            task.apply(&update);
            task.pending = PendingState::PendingUpdate { rollback };
            AddResolution::Edited { id, update }
        };
        self.upsert(task);
        self.placeholder_resolved(placeholder);
        resolution
    }

    /// Keeps a created task out of the list because the user deleted its
    /// placeholder, and returns it for the remote delete.
    ///
    /// The placeholder is dropped if still present, and a fetched copy of
    /// the task will not surface either.
    pub fn withhold(&mut self, placeholder: &TaskId, created: Task) -> LocalTask {
        self.take(placeholder);
        let task = LocalTask::confirmed(created);
        self.record_removed(&task.id);
        self.placeholder_resolved(placeholder);
        task
    }

    /// Removes a placeholder whose create failed. Returns `false` if it was
    /// already gone.
    pub fn abandon_add(&mut self, placeholder: &TaskId) -> bool {
        let removed = self.take(placeholder).is_some();
        self.placeholder_resolved(placeholder);
        removed
    }

    /// Applies an edit locally.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFoundLocally`] for an unknown ID, or
    /// [`TaskError::TaskBusy`] if an update or delete is already pending.
    pub fn begin_update(&mut self, id: &TaskId, update: TaskUpdate) -> Result<UpdatePlan, TaskError> {
        let task = self
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFoundLocally(id.clone()))?;
        if matches!(
            task.pending,
            PendingState::PendingUpdate { .. } | PendingState::PendingDelete
        ) {
            return Err(TaskError::TaskBusy(id.clone()));
        }

        let update = task.changes(update);
        if update.is_empty() {
            return Ok(UpdatePlan::Unchanged);
        }

        if task.pending == PendingState::PendingAdd {
            task.apply(&update);
            return Ok(UpdatePlan::Deferred);
        }

        let rollback = task.fields();
        task.apply(&update);
        task.pending = PendingState::PendingUpdate { rollback };
        Ok(UpdatePlan::Remote(update))
    }

    /// Adopts the server's representation after a successful update.
    /// Returns `false` if the task is no longer in the list.
    pub fn confirm_update(&mut self, updated: Task) -> bool {
        let Some(task) = self.get_mut(&updated.id) else {
            return false;
        };
        task.text = updated.text;
        task.completed = updated.completed;
        task.updated_at = updated.updated_at;
        task.pending = PendingState::Confirmed;
        true
    }

    /// Restores the rollback snapshot after a failed update. Returns
    /// `false` if there was nothing to roll back.
    pub fn roll_back_update(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        match std::mem::replace(&mut task.pending, PendingState::Confirmed) {
            PendingState::PendingUpdate { rollback } => {
                task.restore_fields(rollback);
                true
            }
            other => {
                task.pending = other;
                false
            }
        }
    }

    /// Applies a delete locally.
    ///
    /// # Errors
    ///
    /// Same as [`TaskList::begin_update`].
    pub fn begin_delete(&mut self, id: &TaskId) -> Result<DeletePlan, TaskError> {
        let task = self
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFoundLocally(id.clone()))?;
        match task.pending {
            PendingState::PendingAdd => {
                task.pending = PendingState::PendingDelete;
                Ok(DeletePlan::Deferred)
            }
            PendingState::PendingUpdate { .. } | PendingState::PendingDelete => {
                Err(TaskError::TaskBusy(id.clone()))
            }
            PendingState::Confirmed => {
                let removed = self
                    .take(id)
                    .ok_or_else(|| TaskError::NotFoundLocally(id.clone()))?;
                self.record_removed(id);
                Ok(DeletePlan::Remote(removed))
            }
        }
    }

    /// Re-inserts a task whose remote delete failed, as
    /// [`PendingState::Confirmed`], at its sorted position. Returns `false`
    /// if a task with the same ID is already present.
    pub fn restore(&mut self, mut task: LocalTask) -> bool {
        if self.get(&task.id).is_some() {
            return false;
        }
        if let Some(journal) = &mut self.fetch {
            journal.removed.remove(&task.id);
        }
        task.pending = PendingState::Confirmed;
        self.tasks.push(task);
        self.sort();
        true
    }

    fn record_removed(&mut self, id: &TaskId) {
        if let Some(journal) = &mut self.fetch {
            journal.removed.insert(id.clone());
        }
    }

    fn placeholder_resolved(&mut self, placeholder: &TaskId) {
        if let Some(journal) = &mut self.fetch {
            journal.awaiting.remove(placeholder);
        }
        self.settle_fetch();
    }

    /// Applies a held-back fetched set once no create it may contain is
    /// still unresolved.
    fn settle_fetch(&mut self) {
        let ready = self
            .fetch
            .as_ref()
            .is_some_and(|j| j.fetched.is_some() && j.awaiting.is_empty());
        if !ready {
            return;
        }
        let Some(journal) = self.fetch.take() else {
            return;
        };
        for task in journal.fetched.unwrap_or_default() {
            if !journal.removed.contains(&task.id) && self.get(&task.id).is_none() {
                self.tasks.push(LocalTask::confirmed(task));
            }
        }
        self.sort();
    }

    fn get_mut(&mut self, id: &TaskId) -> Option<&mut LocalTask> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    fn take(&mut self, id: &TaskId) -> Option<LocalTask> {
        let idx = self.tasks.iter().position(|t| &t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    fn upsert(&mut self, task: LocalTask) {
        self.tasks.retain(|t| t.id != task.id);
        self.tasks.push(task);
        self.sort();
    }

    fn sort(&mut self) {
        self.tasks
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    }
}

impl<'a> IntoIterator for &'a TaskList {
    type Item = &'a LocalTask;
    type IntoIter = std::slice::Iter<'a, LocalTask>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}
