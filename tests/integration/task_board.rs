//! Integration tests for the task board: store writes flowing through the
//! change stream into projected views.
//!
//! Every mutation here goes through `LocalMutationCoordinator` or the store,
//! and every assertion reads the board, never the coordinator.
//!
//! Verification command: `cargo test --test task_board`

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use planboard::board::{LoadState, TaskBoard, TaskScope};
use planboard::identity::UserId;
use planboard::projector::{FixedClock, Projector, TaskViews};
use planboard::store::memory::MemoryStore;
use planboard::store::{Collections, StoreError};
use planboard::subscriber::ChangeStreamSubscriber;
use planboard::tasks::{
    LocalMutationCoordinator, MutationError, NewTask, PendingCreates, ValidationError,
};
use planboard_model::day::DayKey;
use planboard_model::document::{DocumentId, FieldValue, Fields};
use planboard_model::project::ProjectId;
use planboard_model::task::{self, ClientKey, Task, TaskCategory, TaskStatus};

/// 2024-01-31T10:00:00Z.
const NOW: i64 = 1_706_695_200_000;
const DAY_MS: i64 = 86_400_000;

// =============================================================================
// Test helpers
// =============================================================================

struct Harness {
    store: Arc<MemoryStore>,
    subscriber: ChangeStreamSubscriber<MemoryStore>,
    projector: Arc<Projector<FixedClock, Utc>>,
    coordinator: LocalMutationCoordinator<MemoryStore, FixedClock>,
    user: UserId,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new("u1");
        Self {
            subscriber: ChangeStreamSubscriber::new(Arc::clone(&store)),
            projector: Arc::new(Projector::with_parts(FixedClock(NOW), Utc)),
            coordinator: LocalMutationCoordinator::with_clock(
                Arc::clone(&store),
                user.clone(),
                FixedClock(NOW),
            )
            .with_pending(Arc::new(PendingCreates::new())),
            store,
            user,
        }
    }

    fn open(&self, scope: TaskScope, pending: Option<Arc<PendingCreates>>) -> TaskBoard {
        TaskBoard::open(
            &self.subscriber,
            Arc::clone(&self.projector),
            &Collections::default(),
            Some(&self.user),
            scope,
            pending,
        )
    }

    fn seed(&self, id: &str, assignee: &str, project: Option<&str>, created_at: Option<i64>) {
        let task = Task {
            id: None,
            project_id: project.map(ProjectId::new),
            title: format!("task {id}"),
            description: None,
            assigned_to: assignee.into(),
            status: TaskStatus::Todo,
            category: TaskCategory::Work,
            created_at,
            scheduled_at: None,
            client_key: None,
        };
        self.store
            .insert("tasks", DocumentId::new(id), task.to_fields());
    }
}

/// Waits until the board publishes views satisfying `done`.
async fn views_where(board: &TaskBoard, done: impl Fn(&TaskViews) -> bool) -> TaskViews {
    let mut rx = board.watch();
    let state = tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|state| state.ready().is_some_and(&done)),
    )
    .await
    .expect("board never reached the expected views")
    .expect("board sender dropped")
    .clone();
    match state {
        LoadState::Ready(views) => views,
        other => panic!("expected ready views, got {other:?}"),
    }
}

fn day(s: &str) -> DayKey {
    s.parse().unwrap()
}

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.title.as_str()).collect()
}

// =============================================================================
// Opening
// =============================================================================

#[tokio::test]
async fn signed_out_board_is_ready_and_empty() {
    let h = Harness::new();
    h.seed("t1", "u1", None, Some(NOW));
    let board = TaskBoard::open(
        &h.subscriber,
        Arc::clone(&h.projector),
        &Collections::default(),
        None,
        TaskScope::Mine,
        None,
    );
    assert_eq!(board.wait_ready().await, LoadState::Ready(TaskViews::empty()));
    assert_eq!(h.store.listener_count(), 0);
}

#[tokio::test]
async fn mine_shows_only_tasks_assigned_to_the_user() {
    let h = Harness::new();
    h.seed("t1", "u1", None, Some(NOW));
    h.seed("t2", "u2", None, Some(NOW));
    h.seed("t3", "u1", None, Some(NOW - DAY_MS));

    let board = h.open(TaskScope::Mine, None);
    let views = views_where(&board, |_| true).await;
    assert_eq!(views.tasks.len(), 2);
    assert_eq!(titles(views.on_day(&day("2024-01-31"))), ["task t1"]);
    assert_eq!(titles(views.on_day(&day("2024-01-30"))), ["task t3"]);
    assert_eq!(views.counts.todo, 2);
}

#[tokio::test]
async fn missing_creation_time_groups_under_today() {
    let h = Harness::new();
    h.seed("t1", "u1", None, None);

    let board = h.open(TaskScope::Mine, None);
    let views = views_where(&board, |v| !v.tasks.is_empty()).await;
    assert_eq!(titles(views.on_day(&day("2024-01-31"))), ["task t1"]);
    assert!(h.projector.fallback_count() >= 1);
}

#[tokio::test]
async fn undecodable_documents_are_skipped() {
    let h = Harness::new();
    h.seed("good", "u1", None, Some(NOW));
    let mut bad = Fields::new();
    bad.insert(task::fields::TITLE.into(), "no status".into());
    bad.insert(task::fields::ASSIGNED_TO.into(), "u1".into());
    bad.insert(task::fields::STATUS.into(), FieldValue::from("archived"));
    h.store.insert("tasks", DocumentId::new("bad"), bad);

    let board = h.open(TaskScope::Mine, None);
    let views = views_where(&board, |_| true).await;
    assert_eq!(titles(&views.tasks), ["task good"]);
    assert!(h.projector.rejected_count() >= 1);
}

// =============================================================================
// Local mutations seen through the stream
// =============================================================================

#[tokio::test]
async fn blank_title_changes_nothing() {
    let h = Harness::new();
    let board = h.open(TaskScope::Mine, h.coordinator.pending());
    views_where(&board, |_| true).await;

    let err = h
        .coordinator
        .create_task(NewTask::new("   ", TaskCategory::Personal))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MutationError::Validation(ValidationError::EmptyTitle)
    ));
    assert!(h.store.ops().is_empty());
    assert_eq!(board.state(), LoadState::Ready(TaskViews::empty()));
}

#[tokio::test]
async fn created_task_appears_once_and_leaves_the_ledger() {
    let h = Harness::new();
    let pending = h.coordinator.pending().unwrap();
    let board = h.open(TaskScope::Mine, Some(Arc::clone(&pending)));
    views_where(&board, |_| true).await;

    let id = h
        .coordinator
        .create_task(NewTask::new("Write report", TaskCategory::Work))
        .await
        .unwrap();

    let views = views_where(&board, |v| v.tasks.iter().any(|t| t.id.is_some())).await;
    assert_eq!(views.tasks.len(), 1);
    assert_eq!(views.tasks[0].id.as_ref(), Some(&id));
    assert_eq!(titles(views.on_day(&day("2024-01-31"))), ["Write report"]);
    assert!(pending.is_empty());
}

#[tokio::test]
async fn many_creates_drain_the_ledger_once_confirmed() {
    let h = Harness::new();
    let pending = h.coordinator.pending().unwrap();
    let board = h.open(TaskScope::Mine, Some(Arc::clone(&pending)));
    views_where(&board, |_| true).await;

    for n in 0..50 {
        h.coordinator
            .create_task(NewTask::new(format!("task {n}"), TaskCategory::Work))
            .await
            .unwrap();
    }

    // Confirmed means every task in the view came from the store.
    views_where(&board, |v| {
        v.tasks.len() == 50 && v.tasks.iter().all(|t| t.id.is_some())
    })
    .await;
    assert_eq!(pending.len(), 0);
}

#[tokio::test]
async fn coordinator_without_a_ledger_records_nothing() {
    let h = Harness::new();
    let coordinator = LocalMutationCoordinator::with_clock(
        Arc::clone(&h.store),
        h.user.clone(),
        FixedClock(NOW),
    );
    let board = h.open(TaskScope::Mine, None);
    views_where(&board, |_| true).await;

    for n in 0..50 {
        coordinator
            .create_task(NewTask::new(format!("task {n}"), TaskCategory::Work))
            .await
            .unwrap();
    }

    views_where(&board, |v| v.tasks.len() == 50).await;
    assert!(coordinator.pending().is_none());
}

#[tokio::test]
async fn unconfirmed_create_is_overlaid_on_snapshots() {
    let h = Harness::new();
    let pending = Arc::new(PendingCreates::new());
    let board = h.open(TaskScope::Mine, Some(Arc::clone(&pending)));
    views_where(&board, |_| true).await;

    let key = ClientKey::new();
    pending.insert(
        key,
        Task {
            id: None,
            project_id: None,
            title: "optimistic".into(),
            description: None,
            assigned_to: "u1".into(),
            status: TaskStatus::Todo,
            category: TaskCategory::Study,
            created_at: Some(NOW),
            scheduled_at: None,
            client_key: Some(key),
        },
    );
    h.seed("t1", "u1", None, Some(NOW));

    let views = views_where(&board, |v| v.tasks.len() == 2).await;
    assert_eq!(titles(&views.tasks), ["task t1", "optimistic"]);
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn status_change_moves_counts() {
    let h = Harness::new();
    h.seed("t1", "u1", None, Some(NOW));
    h.seed("t2", "u1", None, Some(NOW));
    let board = h.open(TaskScope::Mine, None);
    views_where(&board, |v| v.tasks.len() == 2).await;

    h.coordinator
        .update_status(&task::TaskId::new("t1"), TaskStatus::Completed)
        .await
        .unwrap();

    let views = views_where(&board, |v| v.counts.completed == 1).await;
    assert_eq!(views.counts.todo, 1);
    assert_eq!(titles(&views.todo), ["task t2"]);
}

#[tokio::test]
async fn status_change_of_missing_task_is_a_transport_error() {
    let h = Harness::new();
    let err = h
        .coordinator
        .update_status(&task::TaskId::new("nope"), TaskStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MutationError::Transport(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn project_delete_empties_its_bucket() {
    let h = Harness::new();
    h.store
        .insert("projects", DocumentId::new("p1"), Fields::new());
    h.seed("t1", "u1", Some("p1"), Some(NOW));
    h.seed("t2", "u2", Some("p1"), Some(NOW));
    h.seed("t3", "u2", Some("p2"), Some(NOW));

    let board = h.open(TaskScope::All, None);
    let p1 = ProjectId::new("p1");
    views_where(&board, |v| v.in_project(&p1).len() == 2).await;

    h.coordinator.delete_project(&p1).await.unwrap();

    let views = views_where(&board, |v| v.in_project(&p1).is_empty()).await;
    assert_eq!(titles(views.in_project(&ProjectId::new("p2"))), ["task t3"]);
}

#[tokio::test]
async fn closing_the_board_keeps_the_last_view() {
    let h = Harness::new();
    h.seed("t1", "u1", None, Some(NOW));
    let mut board = h.open(TaskScope::Mine, None);
    let before = views_where(&board, |v| v.tasks.len() == 1).await;

    board.close();
    assert!(!board.is_subscribed());
    h.seed("t2", "u1", None, Some(NOW));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(board.state(), LoadState::Ready(before));
}
