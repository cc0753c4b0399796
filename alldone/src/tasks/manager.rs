//! Optimistic task manager.
//!
//! `TaskManager` applies every mutation to its [`TaskList`] before the
//! matching request is issued, then folds the response back in. Handles
//! are cheap to clone; clones share one list, so a front end can run
//! several operations at once and let their responses arrive in any order.
//!
//! Every request remembers the scope epoch it was issued under. Signing out
//! or switching users bumps the epoch, and responses from an older epoch
//! are dropped without touching the list.

use std::collections::HashSet;
use std::sync::Arc;

use alldone_proto::task::{TaskCreate, TaskId, TaskUpdate, UserId, normalize_text};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::list::{AddResolution, DeletePlan, LocalTask, TaskList, UpdatePlan};
use super::{Notice, TaskError};
use crate::api::TaskApi;
use crate::session::{Session, SessionState};

/// Shared handle to the signed-in user's task list.
pub struct TaskManager<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for TaskManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A> {
    api: A,
    state: Mutex<ManagerState>,
    notices: mpsc::UnboundedSender<Notice>,
}

#[derive(Default)]
struct ManagerState {
    session: Option<Session>,
    list: TaskList,
    /// User whose list has been fetched (or is being fetched).
    loaded_for: Option<UserId>,
    loading: bool,
    epoch: u64,
    /// Placeholders the user deleted while their create was in flight.
    /// Outlives list clears so the created task is always deleted.
    deferred_deletes: HashSet<TaskId>,
}

/// What a request needs to be issued and later reconciled.
struct Scope {
    user_id: UserId,
    token: String,
    epoch: u64,
}

impl<A: TaskApi> TaskManager<A> {
    /// Creates a signed-out manager on top of `api`.
    ///
    /// Returns the manager and the receiver for user-facing [`Notice`]s.
    pub fn new(api: A) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let manager = Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(ManagerState::default()),
                notices,
            }),
        };
        (manager, notice_rx)
    }

    /// The underlying API.
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    /// Snapshot of the list in display order.
    #[must_use]
    pub fn tasks(&self) -> Vec<LocalTask> {
        self.inner.state.lock().list.as_slice().to_vec()
    }

    /// Looks up one task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<LocalTask> {
        self.inner.state.lock().list.get(id).cloned()
    }

    /// `true` while the initial list fetch for the current user is in
    /// flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    /// The user the manager is acting for.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.inner
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.user_id.clone())
    }

    /// Adopts `session` and fetches its user's tasks if they have not been
    /// fetched yet.
    ///
    /// `None` is the signed-out state: the list is cleared and `Ok(())` is
    /// returned. A new token for the already loaded user is adopted without
    /// a request.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::RemoteRejected`] or [`TaskError::NetworkFailure`]
    /// if the fetch fails. The list is then empty and the next call for the
    /// same user fetches again.
    pub async fn load_tasks(&self, session: Option<Session>) -> Result<(), TaskError> {
        let scope = {
            let mut state = self.inner.state.lock();
            let Some(session) = session else {
                if state.session.is_some() || !state.list.is_empty() {
                    tracing::info!("signed out, clearing task list");
                }
                state.session = None;
                state.list.clear();
                state.loaded_for = None;
                state.loading = false;
                state.epoch += 1;
                return Ok(());
            };

            if state.loaded_for.as_ref() == Some(&session.user_id) {
                tracing::debug!(user = %session.user_id, "tasks already loaded, adopting token");
                state.session = Some(session);
                return Ok(());
            }

            state.epoch += 1;
            state.list.begin_fetch();
            state.loaded_for = Some(session.user_id.clone());
            state.loading = true;
            let scope = Scope {
                user_id: session.user_id.clone(),
                token: session.access_token.clone(),
                epoch: state.epoch,
            };
            state.session = Some(session);
            scope
        };

        tracing::debug!(user = %scope.user_id, "fetching tasks");
        let result = self.inner.api.list(&scope.token).await;

        let mut state = self.inner.state.lock();
        if state.epoch != scope.epoch {
            tracing::debug!(user = %scope.user_id, "dropping task list for a stale session");
            return Ok(());
        }
        state.loading = false;
        match result {
            Ok(tasks) => {
                tracing::info!(user = %scope.user_id, count = tasks.len(), "tasks loaded");
                state.list.merge_fetched(tasks);
                Ok(())
            }
            Err(err) => {
                state.list.clear();
                state.loaded_for = None;
                drop(state);
                tracing::warn!(user = %scope.user_id, error = %err, "failed to load tasks");
                self.notify(Notice::error(format!("Could not load tasks: {err}")));
                Err(err.into())
            }
        }
    }

    /// Feeds every settled [`SessionState`] from `sessions` into
    /// [`TaskManager::load_tasks`] until the provider is dropped.
    pub async fn follow_session(&self, mut sessions: watch::Receiver<SessionState>) {
        loop {
            let state = sessions.borrow_and_update().clone();
            if !state.is_loading {
                if let Err(err) = self.load_tasks(state.session).await {
                    tracing::debug!(error = %err, "session change did not load tasks");
                }
            }
            if sessions.changed().await.is_err() {
                tracing::debug!("session provider dropped");
                break;
            }
        }
    }

    /// Adds a task.
    ///
    /// The task appears at once under a placeholder ID and is replaced by
    /// the server's task when the create succeeds. If the placeholder was
    /// deleted or edited in the meantime, the matching delete or update is
    /// sent right after; the outcome of that follow-up is reported through
    /// a [`Notice`].
    ///
    /// Returns the server-assigned ID once the create succeeds. The task is
    /// not necessarily in the list then: if the session changed while the
    /// create was in flight the response is not applied, and if the user
    /// deleted the placeholder the created task is deleted again at once.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Unauthenticated`] when signed out (nothing changes)
    /// - [`TaskError::TextEmpty`] for blank text
    /// - [`TaskError::RemoteRejected`] / [`TaskError::NetworkFailure`] if the
    ///   create fails; the placeholder is removed
    pub async fn add_task(&self, text: &str) -> Result<TaskId, TaskError> {
        let (scope, placeholder, text) = {
            let mut state = self.inner.state.lock();
            let scope = self.authorize(&state)?;
            let text = normalize_text(text)?;
            let placeholder = state
                .list
                .insert_placeholder(text, &scope.user_id, Utc::now());
            (scope, placeholder, text.to_string())
        };
        tracing::debug!(task_id = %placeholder, "task added locally");

        let result = self
            .inner
            .api
            .create(&scope.token, &TaskCreate::new(text))
            .await;

        let resolution = {
            let mut state = self.inner.state.lock();
            let delete_requested = state.deferred_deletes.remove(&placeholder);
            let current = state.epoch == scope.epoch;
            match result {
                Ok(task) if delete_requested => {
                    let task = if current {
                        state.list.withhold(&placeholder, task)
                    } else {
                        LocalTask::confirmed(task)
                    };
                    AddResolution::DeleteRequested(task)
                }
                Ok(task) if current => state.list.confirm_add(&placeholder, task),
                Ok(task) => {
                    tracing::debug!(task_id = %task.id, "dropping create response for a stale session");
                    return Ok(task.id);
                }
                Err(err) if !current => {
                    tracing::debug!(task_id = %placeholder, error = %err, "create failed for a stale session");
                    return Err(err.into());
                }
                Err(err) => {
                    state.list.abandon_add(&placeholder);
                    drop(state);
                    tracing::warn!(task_id = %placeholder, error = %err, "create failed, task removed");
                    self.notify(Notice::error(format!("Could not add task: {err}")));
                    return Err(err.into());
                }
            }
        };

        match resolution {
            AddResolution::Confirmed(id) => {
                tracing::info!(task_id = %id, "task created");
                Ok(id)
            }
            AddResolution::Orphaned(id) => {
                tracing::debug!(task_id = %id, "created task no longer tracked locally");
                Ok(id)
            }
            AddResolution::DeleteRequested(task) => {
                let id = task.id.clone();
                tracing::info!(task_id = %id, "task created after delete was requested, deleting");
                let scope = self.refresh(scope);
                if let Err(err) = self.finish_delete(&scope, task).await {
                    tracing::debug!(task_id = %id, error = %err, "deferred delete failed");
                }
                Ok(id)
            }
            AddResolution::Edited { id, update } => {
                tracing::info!(task_id = %id, "task created, sending local edits");
                let scope = self.refresh(scope);
                if let Err(err) = self.finish_update(&scope, &id, update).await {
                    tracing::debug!(task_id = %id, error = %err, "deferred update failed");
                }
                Ok(id)
            }
        }
    }

    /// Replaces the text of a task and optionally its completion flag.
    ///
    /// Only fields that differ from the current values are sent; when none
    /// differ no request is made. Edits to a task whose create is still in
    /// flight stay local and are carried into the created task.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Unauthenticated`], [`TaskError::TextEmpty`]
    /// - [`TaskError::NotFoundLocally`] for an unknown ID
    /// - [`TaskError::TaskBusy`] while another change of the task is in flight
    /// - [`TaskError::RemoteRejected`] / [`TaskError::NetworkFailure`]; the
    ///   task's previous fields are restored
    pub async fn update_task(
        &self,
        id: &TaskId,
        text: &str,
        completed: Option<bool>,
    ) -> Result<(), TaskError> {
        let update = normalize_text(text)
            .map(|text| TaskUpdate {
                text: Some(text.to_string()),
                completed,
            })
            .map_err(TaskError::from);
        self.edit(id, update).await
    }

    /// Sets the completion flag of a task. Same contract as
    /// [`TaskManager::update_task`].
    ///
    /// # Errors
    ///
    /// See [`TaskManager::update_task`].
    pub async fn toggle_complete(&self, id: &TaskId, completed: bool) -> Result<(), TaskError> {
        let update = TaskUpdate {
            text: None,
            completed: Some(completed),
        };
        self.edit(id, Ok(update)).await
    }

    /// Deletes a task.
    ///
    /// A confirmed task disappears at once and is restored if the delete
    /// fails. A task whose create is still in flight stays visible as
    /// pending-delete and is deleted as soon as its server ID is known.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Unauthenticated`]
    /// - [`TaskError::NotFoundLocally`] / [`TaskError::TaskBusy`]
    /// - [`TaskError::RemoteRejected`] / [`TaskError::NetworkFailure`]; the
    ///   task is restored
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), TaskError> {
        let (scope, plan) = {
            let mut state = self.inner.state.lock();
            let scope = self.authorize(&state)?;
            let plan = state.list.begin_delete(id)?;
            if plan == DeletePlan::Deferred {
                state.deferred_deletes.insert(id.clone());
            }
            (scope, plan)
        };
        match plan {
            DeletePlan::Deferred => {
                tracing::debug!(task_id = %id, "delete deferred until create resolves");
                Ok(())
            }
            DeletePlan::Remote(task) => self.finish_delete(&scope, task).await,
        }
    }

    async fn edit(&self, id: &TaskId, update: Result<TaskUpdate, TaskError>) -> Result<(), TaskError> {
        let (scope, plan) = {
            let mut state = self.inner.state.lock();
            let scope = self.authorize(&state)?;
            (scope, state.list.begin_update(id, update?)?)
        };
        match plan {
            UpdatePlan::Unchanged => {
                tracing::debug!(task_id = %id, "nothing to update");
                Ok(())
            }
            UpdatePlan::Deferred => {
                tracing::debug!(task_id = %id, "edited task with create in flight");
                Ok(())
            }
            UpdatePlan::Remote(update) => self.finish_update(&scope, id, update).await,
        }
    }

    async fn finish_update(
        &self,
        scope: &Scope,
        id: &TaskId,
        update: TaskUpdate,
    ) -> Result<(), TaskError> {
        let result = self.inner.api.update(&scope.token, id, &update).await;

        let mut state = self.inner.state.lock();
        if state.epoch != scope.epoch {
            tracing::debug!(task_id = %id, "dropping update response for a stale session");
            return result.map(drop).map_err(Into::into);
        }
        match result {
            Ok(task) => {
                state.list.confirm_update(task);
                tracing::info!(task_id = %id, "task updated");
                Ok(())
            }
            Err(err) => {
                state.list.roll_back_update(id);
                drop(state);
                tracing::warn!(task_id = %id, error = %err, "update failed, rolled back");
                self.notify(Notice::error(format!("Could not update task: {err}")));
                Err(err.into())
            }
        }
    }

    async fn finish_delete(&self, scope: &Scope, task: LocalTask) -> Result<(), TaskError> {
        let result = self.inner.api.delete(&scope.token, &task.id).await;
        match result {
            Ok(()) => {
                tracing::info!(task_id = %task.id, "task deleted");
                self.notify(Notice::info("Task deleted."));
                Ok(())
            }
            Err(err) => {
                let id = task.id.clone();
                {
                    let mut state = self.inner.state.lock();
                    if state.epoch == scope.epoch {
                        state.list.restore(task);
                    } else {
                        tracing::debug!(task_id = %id, "not restoring task for a stale session");
                    }
                }
                tracing::warn!(task_id = %id, error = %err, "delete failed, task restored");
                self.notify(Notice::error(format!("Could not delete task: {err}")));
                Err(err.into())
            }
        }
    }

    /// Captures the current session, or refuses with a warning.
    fn authorize(&self, state: &ManagerState) -> Result<Scope, TaskError> {
        let Some(session) = &state.session else {
            tracing::debug!("task mutation refused while signed out");
            self.notify(Notice::warning("Sign in to manage your tasks."));
            return Err(TaskError::Unauthenticated);
        };
        Ok(Scope {
            user_id: session.user_id.clone(),
            token: session.access_token.clone(),
            epoch: state.epoch,
        })
    }

    /// Picks up a rotated token for a follow-up request of the same scope.
    fn refresh(&self, scope: Scope) -> Scope {
        let state = self.inner.state.lock();
        match &state.session {
            Some(session) if state.epoch == scope.epoch => Scope {
                token: session.access_token.clone(),
                ..scope
            },
            _ => scope,
        }
    }

    fn notify(&self, notice: Notice) {
        // No receiver just means nobody is displaying notices.
        let _ = self.inner.notices.send(notice);
    }
}
