//! Property-based tests for `TaskList` reconciliation.
//!
//! Uses proptest to verify:
//! 1. After any sequence of operations (including fetches that overlap
//!    creates and deletes) the list is sorted by `created_at` then ID and
//!    holds each ID once.
//! 2. A failed update (begin + roll back) leaves the list exactly as it was.
//! 3. A failed delete (begin + restore) leaves the list exactly as it was.
//! 4. A placeholder deleted during its create never surfaces.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use alldone::tasks::{AddResolution, DeletePlan, PendingState, TaskList, UpdatePlan};
use alldone_proto::task::{Task, TaskId, TaskUpdate, UserId};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

// --- Strategies ---

/// Timestamps from a small range so ties are common.
fn arb_time() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..50).prop_map(|s| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap())
}

fn arb_update() -> impl Strategy<Value = TaskUpdate> {
    (
        proptest::option::of("[a-z]{1,8}"),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(text, completed)| TaskUpdate { text, completed })
}

#[derive(Debug, Clone)]
enum Op {
    BeginFetch,
    Merge(Vec<DateTime<Utc>>),
    Insert(DateTime<Utc>),
    ConfirmAdd { pick: usize, at: DateTime<Utc> },
    AbandonAdd(usize),
    Edit { pick: usize, update: TaskUpdate },
    ConfirmUpdate(usize),
    RollBack(usize),
    Delete(usize),
    RestoreLastDeleted,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::BeginFetch),
        prop::collection::vec(arb_time(), 0..6).prop_map(Op::Merge),
        arb_time().prop_map(Op::Insert),
        (any::<usize>(), arb_time()).prop_map(|(pick, at)| Op::ConfirmAdd { pick, at }),
        any::<usize>().prop_map(Op::AbandonAdd),
        (any::<usize>(), arb_update()).prop_map(|(pick, update)| Op::Edit { pick, update }),
        any::<usize>().prop_map(Op::ConfirmUpdate),
        any::<usize>().prop_map(Op::RollBack),
        any::<usize>().prop_map(Op::Delete),
        Just(Op::RestoreLastDeleted),
    ]
}

fn confirmed_list() -> impl Strategy<Value = TaskList> {
    prop::collection::vec((arb_time(), "[a-z]{1,8}", any::<bool>()), 1..8).prop_map(|rows| {
        let mut list = TaskList::new();
        list.merge_fetched(
            rows.into_iter()
                .enumerate()
                .map(|(i, (at, text, completed))| server_task(&format!("s{i}"), &text, completed, at))
                .collect(),
        );
        list
    })
}

// --- Helpers ---

fn server_task(id: &str, text: &str, completed: bool, at: DateTime<Utc>) -> Task {
    Task {
        id: TaskId::new(id),
        user_id: UserId::new("u1"),
        text: text.to_string(),
        completed,
        created_at: at,
        updated_at: Some(at),
    }
}

fn pick(list: &TaskList, n: usize, filter: impl Fn(&TaskId) -> bool) -> Option<TaskId> {
    let ids: Vec<_> = list.iter().map(|t| t.id.clone()).filter(|id| filter(id)).collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[n % ids.len()].clone())
    }
}

struct Runner {
    list: TaskList,
    next_id: u64,
    deleted: Vec<alldone::tasks::LocalTask>,
}

impl Runner {
    fn server_id(&mut self) -> String {
        self.next_id += 1;
        format!("srv-{}", self.next_id)
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::BeginFetch => self.list.begin_fetch(),
            Op::Merge(times) => {
                let tasks = times
                    .into_iter()
                    .map(|at| {
                        let id = self.server_id();
                        server_task(&id, "fetched", false, at)
                    })
                    .collect();
                self.list.merge_fetched(tasks);
            }
            Op::Insert(at) => {
                self.list.insert_placeholder("new", &UserId::new("u1"), at);
            }
            Op::ConfirmAdd { pick: n, at } => {
                if let Some(id) = pick(&self.list, n, TaskId::is_placeholder) {
                    let server_id = self.server_id();
                    let resolution = self
                        .list
                        .confirm_add(&id, server_task(&server_id, "new", false, at));
                    if let AddResolution::DeleteRequested(task) = resolution {
                        self.deleted.push(task);
                    }
                }
            }
            Op::AbandonAdd(n) => {
                if let Some(id) = pick(&self.list, n, TaskId::is_placeholder) {
                    self.list.abandon_add(&id);
                }
            }
            Op::Edit { pick: n, update } => {
                if let Some(id) = pick(&self.list, n, |_| true) {
                    let _ = self.list.begin_update(&id, update);
                }
            }
            Op::ConfirmUpdate(n) => {
                if let Some(id) = pick(&self.list, n, |id| !id.is_placeholder()) {
                    let current = self.list.get(&id).unwrap().clone();
                    self.list.confirm_update(server_task(
                        id.as_str(),
                        &current.text,
                        current.completed,
                        current.created_at,
                    ));
                }
            }
            Op::RollBack(n) => {
                if let Some(id) = pick(&self.list, n, |_| true) {
                    self.list.roll_back_update(&id);
                }
            }
            Op::Delete(n) => {
                if let Some(id) = pick(&self.list, n, |_| true) {
                    if let Ok(DeletePlan::Remote(task)) = self.list.begin_delete(&id) {
                        self.deleted.push(task);
                    }
                }
            }
            Op::RestoreLastDeleted => {
                if let Some(task) = self.deleted.pop() {
                    self.list.restore(task);
                }
            }
        }
    }
}

fn assert_invariants(list: &TaskList) -> Result<(), TestCaseError> {
    let tasks = list.as_slice();
    let sorted = tasks
        .windows(2)
        .all(|w| (w[0].created_at, &w[0].id) < (w[1].created_at, &w[1].id));
    prop_assert!(sorted, "not sorted: {:?}", tasks);
    let ids: HashSet<_> = tasks.iter().map(|t| t.id.clone()).collect();
    prop_assert_eq!(ids.len(), tasks.len(), "duplicate ids");
    for task in tasks {
        if !task.is_placeholder() {
            let settled = matches!(
                task.pending,
                PendingState::Confirmed | PendingState::PendingUpdate { .. }
            );
            prop_assert!(settled, "server task in placeholder state: {:?}", task);
        }
    }
    Ok(())
}

// --- Properties ---

proptest! {
    #[test]
    fn list_stays_sorted_and_unique(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut runner = Runner { list: TaskList::new(), next_id: 0, deleted: Vec::new() };
        for op in ops {
            runner.apply(op);
            assert_invariants(&runner.list)?;
        }
    }

    #[test]
    fn failed_update_restores_list(list in confirmed_list(), n in any::<usize>(), update in arb_update()) {
        let mut list = list;
        let before = list.clone();
        let id = pick(&list, n, |_| true).unwrap();

        match list.begin_update(&id, update).unwrap() {
            UpdatePlan::Remote(sent) => {
                prop_assert!(!sent.is_empty());
                prop_assert!(list.roll_back_update(&id));
            }
            UpdatePlan::Unchanged => {}
            UpdatePlan::Deferred => prop_assert!(false, "confirmed task deferred"),
        }
        prop_assert_eq!(list, before);
    }

    #[test]
    fn failed_delete_restores_list(list in confirmed_list(), n in any::<usize>()) {
        let mut list = list;
        let before = list.clone();
        let id = pick(&list, n, |_| true).unwrap();

        let DeletePlan::Remote(task) = list.begin_delete(&id).unwrap() else {
            return Err(TestCaseError::fail("confirmed task deferred"));
        };
        prop_assert!(list.get(&id).is_none());
        prop_assert!(list.restore(task));
        prop_assert_eq!(list, before);
    }

    #[test]
    fn deleted_placeholder_never_surfaces(list in confirmed_list(), at in arb_time(), server_at in arb_time()) {
        let mut list = list;
        let before = list.clone();
        let placeholder = list.insert_placeholder("X", &UserId::new("u1"), at);
        prop_assert_eq!(list.begin_delete(&placeholder).unwrap(), DeletePlan::Deferred);

        let resolution = list.confirm_add(&placeholder, server_task("created", "X", false, server_at));
        let is_delete_requested = matches!(resolution, AddResolution::DeleteRequested(_));
        prop_assert!(is_delete_requested);
        prop_assert!(list.get(&TaskId::new("created")).is_none());
        prop_assert_eq!(list, before);
    }
}
