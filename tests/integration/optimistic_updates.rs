//! Optimistic update and reconciliation scenarios.
//!
//! Uses `ScriptedApi` to hold requests in flight and inject failures, so
//! the interleavings that are hard to hit against a real server (deleting a
//! task whose create is still on the wire, responses arriving out of order)
//! can be staged deterministically.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use alldone::api::ApiError;
use alldone::api::scripted::{ApiCall, Endpoint, ScriptedApi};
use alldone::session::Session;
use alldone::tasks::{LocalTask, Notice, NoticeLevel, PendingState, TaskError, TaskManager};
use alldone_proto::task::{Task, TaskId, TaskUpdate, UserId};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn day(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
}

fn server_task(id: &str, text: &str, created_at: DateTime<Utc>) -> Task {
    Task {
        id: TaskId::new(id),
        user_id: UserId::new("user-1"),
        text: text.to_string(),
        completed: false,
        created_at,
        updated_at: Some(created_at),
    }
}

async fn signed_in(
    seed: Vec<Task>,
) -> (
    TaskManager<ScriptedApi>,
    ScriptedApi,
    mpsc::UnboundedReceiver<Notice>,
) {
    let api = ScriptedApi::with_tasks(seed);
    let (manager, notices) = TaskManager::new(api.clone());
    manager
        .load_tasks(Some(Session::new(UserId::new("user-1"), "tok")))
        .await
        .unwrap();
    (manager, api, notices)
}

fn only_placeholder(tasks: &[LocalTask]) -> TaskId {
    let placeholders: Vec<_> = tasks.iter().filter(|t| t.is_placeholder()).collect();
    assert_eq!(placeholders.len(), 1, "expected one placeholder in {tasks:?}");
    placeholders[0].id.clone()
}

fn drain(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(n) = notices.try_recv() {
        out.push(n);
    }
    out
}

// ---------------------------------------------------------------------------
// Basic scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_yields_fetched_task() {
    let (manager, _api, _notices) = signed_in(vec![server_task("1", "A", day(1, 1))]).await;
    let tasks = manager.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, TaskId::new("1"));
    assert_eq!(tasks[0].text, "A");
    assert!(!tasks[0].completed);
}

#[tokio::test]
async fn add_leaves_only_server_task() {
    let (manager, api, _notices) = signed_in(Vec::new()).await;
    api.queue_id("42");
    api.queue_created_at(day(2, 1));

    let id = manager.add_task("Buy milk").await.unwrap();
    assert_eq!(id, TaskId::new("42"));
    let tasks = manager.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, TaskId::new("42"));
    assert_eq!(tasks[0].created_at, day(2, 1));
    assert!(tasks.iter().all(|t| !t.is_placeholder()));
}

#[tokio::test]
async fn placeholder_is_visible_while_create_is_in_flight() {
    let (manager, api, _notices) = signed_in(Vec::new()).await;
    let mut held = api.hold_next(Endpoint::Create);

    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("Buy milk").await })
    };
    held.started().await;

    let tasks = manager.tasks();
    let placeholder = only_placeholder(&tasks);
    assert_eq!(tasks[0].text, "Buy milk");
    assert_eq!(tasks[0].pending, PendingState::PendingAdd);

    held.release();
    let id = add.await.unwrap().unwrap();
    assert!(manager.task(&placeholder).is_none());
    assert!(manager.task(&id).is_some());
}

#[tokio::test]
async fn failed_update_reverts_text() {
    let (manager, api, mut notices) = signed_in(vec![server_task("1", "A", day(1, 1))]).await;
    api.fail_next(Endpoint::Update, ApiError::rejected(404, "Task not found."));
    let id = TaskId::new("1");
    let before = manager.task(&id).unwrap();

    let err = manager.update_task(&id, "B", None).await.unwrap_err();
    assert_eq!(
        err,
        TaskError::RemoteRejected {
            status: 404,
            message: "Task not found.".to_string()
        }
    );
    assert_eq!(manager.task(&id).unwrap(), before);
    assert_eq!(drain(&mut notices)[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn failed_delete_restores_original_position() {
    let (manager, api, mut notices) = signed_in(vec![
        server_task("0", "before", day(1, 1)),
        server_task("1", "A", day(1, 2)),
        server_task("2", "after", day(1, 3)),
    ])
    .await;
    api.fail_next(Endpoint::Delete, ApiError::network("connection reset by peer"));

    let err = manager.delete_task(&TaskId::new("1")).await.unwrap_err();
    assert!(matches!(err, TaskError::NetworkFailure { .. }));

    let ids: Vec<_> = manager.tasks().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, [TaskId::new("0"), TaskId::new("1"), TaskId::new("2")]);
    assert_eq!(
        manager.task(&TaskId::new("1")).unwrap().pending,
        PendingState::Confirmed
    );
    assert_eq!(drain(&mut notices)[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn failed_delete_restores_position_among_tied_timestamps() {
    let same = day(1, 1);
    let (manager, api, _notices) = signed_in(vec![
        server_task("a", "first", same),
        server_task("b", "second", same),
        server_task("c", "third", same),
    ])
    .await;
    let before = manager.tasks();
    api.fail_next(Endpoint::Delete, ApiError::rejected(500, "Internal Server Error"));

    manager.delete_task(&TaskId::new("a")).await.unwrap_err();
    assert_eq!(manager.tasks(), before);
}

#[tokio::test]
async fn delete_is_optimistic() {
    let (manager, api, _notices) = signed_in(vec![server_task("1", "A", day(1, 1))]).await;
    let mut held = api.hold_next(Endpoint::Delete);

    let delete = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.delete_task(&TaskId::new("1")).await })
    };
    held.started().await;
    assert!(manager.tasks().is_empty());

    held.release();
    delete.await.unwrap().unwrap();
    assert!(manager.tasks().is_empty());
    assert!(api.server_tasks().is_empty());
}

// ---------------------------------------------------------------------------
// Add/delete race
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_during_create_removes_task_and_deletes_server_id() {
    let (manager, api, _notices) = signed_in(Vec::new()).await;
    api.queue_id("42");
    let mut held = api.hold_next(Endpoint::Create);

    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("Buy milk").await })
    };
    held.started().await;

    let placeholder = only_placeholder(&manager.tasks());
    manager.delete_task(&placeholder).await.unwrap();
    // Still on screen until the server ID is known.
    assert_eq!(
        manager.task(&placeholder).unwrap().pending,
        PendingState::PendingDelete
    );
    assert_eq!(api.calls_to(Endpoint::Delete), 0);

    held.release();
    assert_eq!(add.await.unwrap().unwrap(), TaskId::new("42"));

    assert!(manager.tasks().is_empty());
    assert_eq!(
        api.calls().last(),
        Some(&ApiCall::Delete {
            token: "tok".to_string(),
            id: TaskId::new("42"),
        })
    );
    assert!(api.server_tasks().is_empty());
}

#[tokio::test]
async fn failed_deferred_delete_restores_created_task() {
    let (manager, api, mut notices) = signed_in(Vec::new()).await;
    api.queue_id("42");
    api.fail_next(Endpoint::Delete, ApiError::rejected(500, "Internal Server Error"));
    let mut held = api.hold_next(Endpoint::Create);

    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("Buy milk").await })
    };
    held.started().await;
    manager
        .delete_task(&only_placeholder(&manager.tasks()))
        .await
        .unwrap();

    held.release();
    add.await.unwrap().unwrap();

    let tasks = manager.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, TaskId::new("42"));
    assert_eq!(tasks[0].pending, PendingState::Confirmed);
    assert!(
        drain(&mut notices)
            .iter()
            .any(|n| n.level == NoticeLevel::Error)
    );
}

#[tokio::test]
async fn failed_create_after_delete_request_sends_no_delete() {
    let (manager, api, _notices) = signed_in(Vec::new()).await;
    api.fail_next(Endpoint::Create, ApiError::network("timed out"));
    let mut held = api.hold_next(Endpoint::Create);

    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("Buy milk").await })
    };
    held.started().await;
    manager
        .delete_task(&only_placeholder(&manager.tasks()))
        .await
        .unwrap();

    held.release();
    assert!(add.await.unwrap().is_err());
    assert!(manager.tasks().is_empty());
    assert_eq!(api.calls_to(Endpoint::Delete), 0);
}

// ---------------------------------------------------------------------------
// Mutations during the initial fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn task_deleted_during_fetch_does_not_resurface() {
    let api = ScriptedApi::new();
    let (manager, _notices) = TaskManager::new(api.clone());
    api.queue_id("42");
    let mut held_list = api.hold_next(Endpoint::List);
    let mut held_create = api.hold_next(Endpoint::Create);
    let mut held_delete = api.hold_next(Endpoint::Delete);

    let load = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .load_tasks(Some(Session::new(UserId::new("user-1"), "tok")))
                .await
        })
    };
    held_list.started().await;
    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("X").await })
    };
    held_create.started().await;
    manager
        .delete_task(&only_placeholder(&manager.tasks()))
        .await
        .unwrap();

    // The create resolves and its delete goes out, but the list response
    // is computed while the server still holds the task.
    held_create.release();
    held_delete.started().await;
    held_list.release();
    load.await.unwrap().unwrap();
    assert!(manager.tasks().is_empty());

    held_delete.release();
    add.await.unwrap().unwrap();
    assert!(manager.tasks().is_empty());
    assert!(api.server_tasks().is_empty());
}

#[tokio::test]
async fn task_created_during_fetch_appears_once() {
    let api = ScriptedApi::with_tasks(vec![server_task("1", "A", day(1, 1))]);
    let (manager, _notices) = TaskManager::new(api.clone());
    api.queue_id("42");
    let mut held_list = api.hold_next(Endpoint::List);
    let mut held_create = api.hold_next(Endpoint::Create);

    let load = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .load_tasks(Some(Session::new(UserId::new("user-1"), "tok")))
                .await
        })
    };
    held_list.started().await;
    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("B").await })
    };
    held_create.started().await;
    let placeholder = only_placeholder(&manager.tasks());

    // Created server-side before the list is computed.
    api.queue_created_at(day(2, 1));
    held_create.release();
    let id = add.await.unwrap().unwrap();
    assert_eq!(id, TaskId::new("42"));

    held_list.release();
    load.await.unwrap().unwrap();
    let ids: Vec<_> = manager.tasks().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, [TaskId::new("1"), TaskId::new("42")]);
    assert!(manager.task(&placeholder).is_none());
}

#[tokio::test]
async fn fetched_tasks_wait_for_create_in_flight() {
    let api = ScriptedApi::with_tasks(vec![server_task("1", "A", day(1, 1))]);
    let (manager, _notices) = TaskManager::new(api.clone());
    api.queue_id("42");
    api.queue_created_at(day(2, 1));
    let mut held_list = api.hold_next(Endpoint::List);
    let mut held_create = api.hold_next(Endpoint::Create);

    let load = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .load_tasks(Some(Session::new(UserId::new("user-1"), "tok")))
                .await
        })
    };
    held_list.started().await;
    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("B").await })
    };
    held_create.started().await;
    let placeholder = only_placeholder(&manager.tasks());

    // The list answers while the create is still unresolved; its tasks are
    // held back until the create settles.
    held_list.release();
    load.await.unwrap().unwrap();
    let ids: Vec<_> = manager.tasks().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, [placeholder]);

    held_create.release();
    add.await.unwrap().unwrap();
    let ids: Vec<_> = manager.tasks().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, [TaskId::new("1"), TaskId::new("42")]);
}

#[tokio::test]
async fn placeholder_refuses_second_delete_and_edits() {
    let (manager, api, _notices) = signed_in(Vec::new()).await;
    let mut held = api.hold_next(Endpoint::Create);

    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("X").await })
    };
    held.started().await;
    let placeholder = only_placeholder(&manager.tasks());
    manager.delete_task(&placeholder).await.unwrap();

    assert_eq!(
        manager.delete_task(&placeholder).await,
        Err(TaskError::TaskBusy(placeholder.clone()))
    );
    assert_eq!(
        manager.toggle_complete(&placeholder, true).await,
        Err(TaskError::TaskBusy(placeholder.clone()))
    );

    held.release();
    add.await.unwrap().unwrap();
    assert_eq!(api.calls_to(Endpoint::Delete), 1);
}

// ---------------------------------------------------------------------------
// Edits while a create is in flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn local_edit_during_create_wins_and_is_persisted() {
    let (manager, api, _notices) = signed_in(Vec::new()).await;
    api.queue_id("42");
    let mut held = api.hold_next(Endpoint::Create);

    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("draft").await })
    };
    held.started().await;
    let placeholder = only_placeholder(&manager.tasks());

    manager.update_task(&placeholder, "final", None).await.unwrap();
    manager.toggle_complete(&placeholder, true).await.unwrap();
    assert_eq!(api.calls_to(Endpoint::Update), 0);
    let local = manager.task(&placeholder).unwrap();
    assert_eq!(local.text, "final");
    assert!(local.completed);
    assert_eq!(local.pending, PendingState::PendingAdd);

    held.release();
    let id = add.await.unwrap().unwrap();

    let task = manager.task(&id).unwrap();
    assert_eq!(task.text, "final");
    assert!(task.completed);
    assert_eq!(task.pending, PendingState::Confirmed);
    assert_eq!(
        api.calls().last(),
        Some(&ApiCall::Update {
            token: "tok".to_string(),
            id: TaskId::new("42"),
            update: TaskUpdate {
                text: Some("final".to_string()),
                completed: Some(true),
            },
        })
    );
    let stored = &api.server_tasks()[0];
    assert_eq!(stored.text, "final");
    assert!(stored.completed);
}

#[tokio::test]
async fn failed_follow_up_update_falls_back_to_server_fields() {
    let (manager, api, mut notices) = signed_in(Vec::new()).await;
    api.queue_id("42");
    api.fail_next(Endpoint::Update, ApiError::network("connection reset"));
    let mut held = api.hold_next(Endpoint::Create);

    let add = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("draft").await })
    };
    held.started().await;
    manager
        .update_task(&only_placeholder(&manager.tasks()), "final", None)
        .await
        .unwrap();

    held.release();
    let id = add.await.unwrap().unwrap();

    let task = manager.task(&id).unwrap();
    assert_eq!(task.text, "draft");
    assert_eq!(task.pending, PendingState::Confirmed);
    assert!(
        drain(&mut notices)
            .iter()
            .any(|n| n.level == NoticeLevel::Error)
    );
}

// ---------------------------------------------------------------------------
// Interleaving
// ---------------------------------------------------------------------------

#[tokio::test]
async fn other_tasks_stay_usable_while_one_is_pending() {
    let (manager, api, _notices) = signed_in(vec![
        server_task("1", "A", day(1, 1)),
        server_task("2", "B", day(1, 2)),
    ])
    .await;
    let mut held = api.hold_next(Endpoint::Update);

    let slow = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.toggle_complete(&TaskId::new("1"), true).await })
    };
    held.started().await;

    manager.toggle_complete(&TaskId::new("2"), true).await.unwrap();
    manager.add_task("C").await.unwrap();
    assert_eq!(
        manager.update_task(&TaskId::new("1"), "A2", None).await,
        Err(TaskError::TaskBusy(TaskId::new("1")))
    );

    held.release();
    slow.await.unwrap().unwrap();
    assert!(manager.tasks().iter().all(|t| !t.pending.is_pending()));
    assert_eq!(manager.tasks().len(), 3);
}

#[tokio::test]
async fn order_follows_created_at_not_completion_order() {
    let (manager, api, _notices) = signed_in(vec![server_task("1", "old", day(1, 1))]).await;
    // Timestamps are handed out as creates are processed: B is processed
    // first and gets the later one.
    api.queue_created_at(day(3, 1));
    api.queue_created_at(day(2, 1));
    let mut held = api.hold_next(Endpoint::Create);

    let slow = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add_task("A").await })
    };
    held.started().await;
    manager.add_task("B").await.unwrap();

    held.release();
    slow.await.unwrap().unwrap();

    let texts: Vec<_> = manager.tasks().into_iter().map(|t| t.text).collect();
    assert_eq!(texts, ["old", "A", "B"]);
}

#[tokio::test]
async fn signed_out_operations_make_no_calls() {
    let api = ScriptedApi::with_tasks(vec![server_task("1", "A", day(1, 1))]);
    let (manager, mut notices) = TaskManager::new(api.clone());
    let id = TaskId::new("1");

    assert_eq!(manager.add_task("X").await, Err(TaskError::Unauthenticated));
    assert_eq!(
        manager.update_task(&id, "B", Some(true)).await,
        Err(TaskError::Unauthenticated)
    );
    assert_eq!(
        manager.toggle_complete(&id, true).await,
        Err(TaskError::Unauthenticated)
    );
    assert_eq!(manager.delete_task(&id).await, Err(TaskError::Unauthenticated));

    assert!(manager.tasks().is_empty());
    assert!(api.calls().is_empty());
    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 4);
    assert!(notices.iter().all(|n| n.level == NoticeLevel::Warning));
}
