//! Snapshot projections: tasks grouped by day, by project and by status.
//!
//! Every projection is a pure function of the batch it is given. Views are
//! rebuilt in full from each snapshot rather than patched, so a document
//! that disappears from the stream disappears from every view with it.
//!
//! The day grouping keys a task by the local calendar day of its creation
//! time. A task whose creation time is missing or unusable is grouped under
//! *today*; each such fallback is logged and counted
//! ([`Projector::fallback_count`]) so data-quality problems upstream stay
//! visible.

pub mod calendar;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Local, TimeZone};
use serde::Serialize;

use planboard_model::day::DayKey;
use planboard_model::project::{Project, ProjectId};
use planboard_model::task::{Task, TaskStatus};
use planboard_model::timestamp;

use crate::store::Snapshot;

/// Tasks grouped by calendar day, in chronological order.
pub type DayGrouping = BTreeMap<DayKey, Vec<Task>>;

/// Tasks grouped by owning project.
pub type ProjectGrouping = BTreeMap<ProjectId, Vec<Task>>;

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        timestamp::now_ms()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Tasks in [`TaskStatus::Todo`].
    pub todo: usize,
    /// Tasks in [`TaskStatus::InProgress`].
    pub in_progress: usize,
    /// Tasks in [`TaskStatus::Completed`].
    pub completed: usize,
}

impl StatusCounts {
    /// Count for one status.
    #[must_use]
    pub const fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Todo => self.todo,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Completed => self.completed,
        }
    }

    /// Total number of tasks counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.todo + self.in_progress + self.completed
    }
}

/// Every view derived from one task snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskViews {
    /// The decoded tasks, in snapshot order.
    pub tasks: Vec<Task>,
    /// Tasks by local creation day.
    pub by_day: DayGrouping,
    /// Tasks by owning project; unassigned tasks are absent.
    pub by_project: ProjectGrouping,
    /// Tasks still to do, in snapshot order.
    pub todo: Vec<Task>,
    /// Per-status counts.
    pub counts: StatusCounts,
}

impl TaskViews {
    /// Views of an empty task set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Tasks created on `day`; empty if none.
    #[must_use]
    pub fn on_day(&self, day: &DayKey) -> &[Task] {
        self.by_day.get(day).map_or(&[], Vec::as_slice)
    }

    /// Tasks belonging to `project`; empty if none.
    #[must_use]
    pub fn in_project(&self, project: &ProjectId) -> &[Task] {
        self.by_project.get(project).map_or(&[], Vec::as_slice)
    }
}

/// Folds snapshots into grouped views.
///
/// Generic over the clock (for the "now" fallback) and the time zone that
/// defines a calendar day.
#[derive(Debug)]
pub struct Projector<C = SystemClock, Tz: TimeZone = Local> {
    clock: C,
    tz: Tz,
    fallbacks: AtomicU64,
    rejected: AtomicU64,
}

impl Projector {
    /// Projector over wall-clock time in the local time zone.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(SystemClock, Local)
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock, Tz: TimeZone> Projector<C, Tz> {
    /// Projector with an explicit clock and time zone.
    pub const fn with_parts(clock: C, tz: Tz) -> Self {
        Self {
            clock,
            tz,
            fallbacks: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// The clock used for the "now" fallback.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// The day `now` falls on.
    pub fn today(&self) -> DayKey {
        DayKey::from_epoch_millis(self.clock.now_ms(), &self.tz)
            .unwrap_or_default()
    }

    /// Day key a task is grouped under.
    ///
    /// Uses the creation time, never the scheduled time. A missing or
    /// unrepresentable creation time falls back to today.
    pub fn day_key(&self, task: &Task) -> DayKey {
        if let Some(key) = task
            .created_at
            .and_then(|millis| DayKey::from_epoch_millis(millis, &self.tz))
        {
            return key;
        }
        let total = self.fallbacks.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            task = ?task.id,
            created_at = ?task.created_at,
            fallbacks = total,
            "task has no usable creation time, grouping under today"
        );
        self.today()
    }

    /// Group tasks by local creation day. Input order is kept within a day.
    pub fn project_by_day(&self, tasks: &[Task]) -> DayGrouping {
        let mut grouping = DayGrouping::new();
        for task in tasks {
            grouping
                .entry(self.day_key(task))
                .or_default()
                .push(task.clone());
        }
        grouping
    }

    /// Decode every task document in `snapshot`.
    ///
    /// Documents that are not valid tasks are skipped, counted and logged.
    pub fn decode_tasks(&self, snapshot: &Snapshot) -> Vec<Task> {
        snapshot
            .documents
            .iter()
            .filter_map(|doc| match Task::from_document(doc) {
                Ok(task) => Some(task),
                Err(e) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(id = %doc.id, error = %e, "skipping undecodable task");
                    None
                }
            })
            .collect()
    }

    /// Decode every project document in `snapshot`.
    pub fn decode_projects(&self, snapshot: &Snapshot) -> Vec<Project> {
        let now = self.clock.now_ms();
        snapshot
            .documents
            .iter()
            .map(|doc| Project::from_document(doc, now))
            .collect()
    }

    /// Build every task view from one batch.
    pub fn project(&self, tasks: Vec<Task>) -> TaskViews {
        TaskViews {
            by_day: self.project_by_day(&tasks),
            by_project: project_by_project(&tasks),
            todo: filter_by_status(&tasks, TaskStatus::Todo),
            counts: count_by_status(&tasks),
            tasks,
        }
    }

    /// How many times a task fell back to today for its day key.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// How many task documents were skipped as undecodable.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Group tasks by owning project. Tasks without a project are omitted.
#[must_use]
pub fn project_by_project(tasks: &[Task]) -> ProjectGrouping {
    let mut grouping = ProjectGrouping::new();
    for task in tasks {
        if let Some(project) = &task.project_id {
            grouping
                .entry(project.clone())
                .or_default()
                .push(task.clone());
        }
    }
    grouping
}

/// Tasks with the given status, in input order.
#[must_use]
pub fn filter_by_status(tasks: &[Task], status: TaskStatus) -> Vec<Task> {
    tasks.iter().filter(|t| t.status == status).cloned().collect()
}

/// Count tasks per status.
#[must_use]
pub fn count_by_status(tasks: &[Task]) -> StatusCounts {
    tasks
        .iter()
        .fold(StatusCounts::default(), |mut counts, task| {
            match task.status {
                TaskStatus::Todo => counts.todo += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
            }
            counts
        })
}
