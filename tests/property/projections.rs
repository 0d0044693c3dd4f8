//! Property-based tests for task projections.
//!
//! Uses proptest to verify:
//! 1. Day grouping partitions the input and keys each task by its local
//!    creation day (today when the creation time is missing).
//! 2. Project grouping holds exactly the tasks that name a project.
//! 3. Status counts and the todo list agree with the input.
//! 4. Projection is deterministic for a fixed clock.
//! 5. The week window is seven consecutive days centered on its argument.

use chrono::{FixedOffset, Utc};
use proptest::prelude::*;

use planboard::projector::calendar::week_window;
use planboard::projector::{FixedClock, Projector, filter_by_status};
use planboard_model::day::DayKey;
use planboard_model::project::ProjectId;
use planboard_model::task::{Task, TaskCategory, TaskId, TaskStatus};

/// 2024-01-31T10:00:00Z.
const NOW: i64 = 1_706_695_200_000;

/// Upper bound for generated creation times (2100-01-01).
const MAX_MILLIS: i64 = 4_102_444_800_000;

// --- Strategies ---

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn arb_category() -> impl Strategy<Value = TaskCategory> {
    prop::sample::select(TaskCategory::ALL.to_vec())
}

/// Tasks drawn from a small project pool so buckets collide.
fn arb_task() -> impl Strategy<Value = Task> {
    (
        0_u32..10_000,
        prop::option::of(prop::sample::select(vec!["p1", "p2", "p3"])),
        "[a-z]{1,12}",
        arb_status(),
        arb_category(),
        prop::option::weighted(0.9, 0..MAX_MILLIS),
    )
        .prop_map(|(n, project, title, status, category, created_at)| Task {
            id: Some(TaskId::new(format!("t{n}"))),
            project_id: project.map(ProjectId::new),
            title,
            description: None,
            assigned_to: "u1".into(),
            status,
            category,
            created_at,
            scheduled_at: None,
            client_key: None,
        })
}

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(arb_task(), 0..40)
}

fn arb_offset() -> impl Strategy<Value = FixedOffset> {
    (-12_i32..=14).prop_filter_map("valid offset", |h| FixedOffset::east_opt(h * 3600))
}

fn arb_day() -> impl Strategy<Value = DayKey> {
    (1900_i32..2100, 1_u32..=12, 1_u32..=28)
        .prop_filter_map("valid date", |(y, m, d)| DayKey::from_ymd(y, m, d))
}

// --- Properties ---

proptest! {
    #[test]
    fn day_grouping_partitions_by_local_creation_day(
        tasks in arb_tasks(),
        offset in arb_offset(),
    ) {
        let projector = Projector::with_parts(FixedClock(NOW), offset);
        let today = projector.today();
        let grouping = projector.project_by_day(&tasks);

        let grouped: usize = grouping.values().map(Vec::len).sum();
        prop_assert_eq!(grouped, tasks.len());
        prop_assert!(grouping.values().all(|bucket| !bucket.is_empty()));

        for (day, bucket) in &grouping {
            for task in bucket {
                let expected = task
                    .created_at
                    .and_then(|ms| DayKey::from_epoch_millis(ms, &offset))
                    .unwrap_or(today);
                prop_assert_eq!(*day, expected);
            }
        }
    }

    #[test]
    fn project_grouping_holds_exactly_the_assigned_tasks(tasks in arb_tasks()) {
        let projector = Projector::with_parts(FixedClock(NOW), Utc);
        let views = projector.project(tasks.clone());

        let assigned = tasks.iter().filter(|t| t.project_id.is_some()).count();
        let grouped: usize = views.by_project.values().map(Vec::len).sum();
        prop_assert_eq!(grouped, assigned);

        for (project, bucket) in &views.by_project {
            prop_assert!(bucket.iter().all(|t| t.project_id.as_ref() == Some(project)));
        }
    }

    #[test]
    fn counts_and_todo_agree_with_input(tasks in arb_tasks()) {
        let projector = Projector::with_parts(FixedClock(NOW), Utc);
        let views = projector.project(tasks.clone());

        prop_assert_eq!(views.counts.total(), tasks.len());
        for status in TaskStatus::ALL {
            prop_assert_eq!(
                views.counts.get(status),
                filter_by_status(&tasks, status).len()
            );
        }
        prop_assert_eq!(views.todo, filter_by_status(&tasks, TaskStatus::Todo));
    }

    #[test]
    fn projection_is_deterministic_for_a_fixed_clock(tasks in arb_tasks()) {
        let first = Projector::with_parts(FixedClock(NOW), Utc).project(tasks.clone());
        let second = Projector::with_parts(FixedClock(NOW), Utc).project(tasks);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn week_window_is_seven_consecutive_days(center in arb_day()) {
        let days = week_window(center);
        prop_assert_eq!(days.len(), 7);
        prop_assert_eq!(days[3], center);
        for pair in days.windows(2) {
            prop_assert_eq!(pair[0].offset_days(1), Some(pair[1]));
        }
    }
}
