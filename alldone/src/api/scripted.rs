//! In-process [`TaskApi`] for testing.
//!
//! [`ScriptedApi`] behaves like a well-mannered server holding one user's
//! tasks, and lets a test:
//! - inject the next failure of an endpoint ([`ScriptedApi::fail_next`]),
//! - hold the next call of an endpoint in flight until released
//!   ([`ScriptedApi::hold_next`]), which is how add/delete races are staged,
//! - choose server-assigned IDs and timestamps,
//! - inspect every call that was made.
//!
//! Clones share state, so a test can keep one handle while the manager owns
//! another.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use alldone_proto::task::{Task, TaskCreate, TaskId, TaskUpdate, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{ApiError, TaskApi};

/// The four resource operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `GET /tasks/`
    List,
    /// `POST /tasks/`
    Create,
    /// `PUT /tasks/{id}`
    Update,
    /// `DELETE /tasks/{id}`
    Delete,
}

/// A recorded call, in the order calls were issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// A list call.
    List {
        /// Bearer token used.
        token: String,
    },
    /// A create call.
    Create {
        /// Bearer token used.
        token: String,
        /// Requested text.
        text: String,
    },
    /// An update call.
    Update {
        /// Bearer token used.
        token: String,
        /// Target task.
        id: TaskId,
        /// Fields sent.
        update: TaskUpdate,
    },
    /// A delete call.
    Delete {
        /// Bearer token used.
        token: String,
        /// Target task.
        id: TaskId,
    },
}

impl ApiCall {
    /// Returns which endpoint this call hit.
    #[must_use]
    pub const fn endpoint(&self) -> Endpoint {
        match self {
            Self::List { .. } => Endpoint::List,
            Self::Create { .. } => Endpoint::Create,
            Self::Update { .. } => Endpoint::Update,
            Self::Delete { .. } => Endpoint::Delete,
        }
    }
}

/// Handle to a call held in flight by [`ScriptedApi::hold_next`].
pub struct HeldCall {
    started: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl HeldCall {
    /// Waits until the held call has been issued.
    ///
    /// Everything the caller did before issuing the request (such as an
    /// optimistic insert) is visible once this returns.
    pub async fn started(&mut self) {
        let _ = (&mut self.started).await;
    }

    /// Lets the held call complete.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

struct Hold {
    started: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

impl Hold {
    async fn wait(self) {
        let _ = self.started.send(());
        // A dropped HeldCall releases the call too.
        let _ = self.release.await;
    }
}

#[derive(Default)]
struct Script {
    user: UserId,
    tasks: Vec<Task>,
    next_ids: VecDeque<TaskId>,
    next_created_at: VecDeque<DateTime<Utc>>,
    id_counter: u64,
    failures: HashMap<Endpoint, VecDeque<ApiError>>,
    holds: HashMap<Endpoint, VecDeque<Hold>>,
    calls: Vec<ApiCall>,
}

impl Script {
    fn record(&mut self, call: ApiCall) -> Option<Hold> {
        let endpoint = call.endpoint();
        self.calls.push(call);
        self.holds.get_mut(&endpoint).and_then(VecDeque::pop_front)
    }

    fn take_failure(&mut self, endpoint: Endpoint) -> Option<ApiError> {
        self.failures.get_mut(&endpoint).and_then(VecDeque::pop_front)
    }

    fn next_id(&mut self) -> TaskId {
        self.next_ids.pop_front().unwrap_or_else(|| {
            self.id_counter += 1;
            TaskId::new(format!("task-{}", self.id_counter))
        })
    }
}

/// Scriptable fake of the task resource.
#[derive(Clone, Default)]
pub struct ScriptedApi {
    script: Arc<Mutex<Script>>,
}

impl ScriptedApi {
    /// Creates a fake with no tasks, owned by user `"user-1"`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    /// Creates a fake whose server already holds `tasks`.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let api = Self::default();
        {
            let mut script = api.script.lock();
            script.user = UserId::new("user-1");
            script.tasks = tasks;
        }
        api
    }

    /// Uses `id` for the next created task.
    pub fn queue_id(&self, id: impl Into<String>) {
        self.script.lock().next_ids.push_back(TaskId::new(id));
    }

    /// Uses `created_at` for the next created task.
    pub fn queue_created_at(&self, created_at: DateTime<Utc>) {
        self.script.lock().next_created_at.push_back(created_at);
    }

    /// Makes the next call to `endpoint` fail with `error`.
    ///
    /// Failures queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
        self.script
            .lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Holds the next call to `endpoint` until the returned handle is
    /// released.
    ///
    /// The call's outcome (including any queued failure) is decided at
    /// release time.
    #[must_use]
    pub fn hold_next(&self, endpoint: Endpoint) -> HeldCall {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.script
            .lock()
            .holds
            .entry(endpoint)
            .or_default()
            .push_back(Hold {
                started: started_tx,
                release: release_rx,
            });
        HeldCall {
            started: started_rx,
            release: release_tx,
        }
    }

    /// Returns every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.script.lock().calls.clone()
    }

    /// Returns the number of calls made to `endpoint`.
    #[must_use]
    pub fn calls_to(&self, endpoint: Endpoint) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .count()
    }

    /// Returns the tasks the fake server currently holds.
    #[must_use]
    pub fn server_tasks(&self) -> Vec<Task> {
        self.script.lock().tasks.clone()
    }

    fn record(&self, call: ApiCall) -> Option<Hold> {
        self.script.lock().record(call)
    }
}

fn not_found() -> ApiError {
    ApiError::rejected(404, "Task not found.")
}

impl TaskApi for ScriptedApi {
    async fn list(&self, token: &str) -> Result<Vec<Task>, ApiError> {
        if let Some(hold) = self.record(ApiCall::List {
            token: token.to_string(),
        }) {
            hold.wait().await;
        }

        let mut script = self.script.lock();
        if let Some(err) = script.take_failure(Endpoint::List) {
            return Err(err);
        }
        let mut tasks = script.tasks.clone();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn create(&self, token: &str, create: &TaskCreate) -> Result<Task, ApiError> {
        if let Some(hold) = self.record(ApiCall::Create {
            token: token.to_string(),
            text: create.text.clone(),
        }) {
            hold.wait().await;
        }

        let mut script = self.script.lock();
        if let Some(err) = script.take_failure(Endpoint::Create) {
            return Err(err);
        }
        let created_at = script.next_created_at.pop_front().unwrap_or_else(Utc::now);
        let task = Task {
            id: script.next_id(),
            user_id: script.user.clone(),
            text: create.text.clone(),
            completed: create.completed,
            created_at,
            updated_at: Some(created_at),
        };
        script.tasks.push(task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        token: &str,
        id: &TaskId,
        update: &TaskUpdate,
    ) -> Result<Task, ApiError> {
        if let Some(hold) = self.record(ApiCall::Update {
            token: token.to_string(),
            id: id.clone(),
            update: update.clone(),
        }) {
            hold.wait().await;
        }

        let mut script = self.script.lock();
        if let Some(err) = script.take_failure(Endpoint::Update) {
            return Err(err);
        }
        let task = script
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(not_found)?;
        if let Some(text) = &update.text {
            task.text.clone_from(text);
        }
        if let Some(completed) = update.completed {
            task.completed = completed;
        }
        task.updated_at = Some(Utc::now());
        Ok(task.clone())
    }

    async fn delete(&self, token: &str, id: &TaskId) -> Result<(), ApiError> {
        if let Some(hold) = self.record(ApiCall::Delete {
            token: token.to_string(),
            id: id.clone(),
        }) {
            hold.wait().await;
        }

        let mut script = self.script.lock();
        if let Some(err) = script.take_failure(Endpoint::Delete) {
            return Err(err);
        }
        let before = script.tasks.len();
        script.tasks.retain(|t| &t.id != id);
        if script.tasks.len() == before {
            return Err(not_found());
        }
        Ok(())
    }
}
