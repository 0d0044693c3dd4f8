//! Issues creates, status updates and deletes against the store.
//!
//! The project delete cascades: every task whose `projectId` names the
//! project is deleted first, concurrently, and the project document is
//! deleted only after all of them have settled successfully. There is no
//! transaction around the two phases, so a failure part-way leaves a mixed
//! state. That state is reported, never retried or rolled back, and
//! [`LocalMutationCoordinator::repair_orphans`] can sweep up afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;

use planboard_model::document::{DocumentId, Fields};
use planboard_model::project::{Project, ProjectId};
use planboard_model::task::{self, ClientKey, Task, TaskCategory, TaskId, TaskStatus};

use super::pending::PendingCreates;
use super::{MutationError, ValidationError};
use crate::identity::UserId;
use crate::projector::{Clock, SystemClock};
use crate::store::{Collections, DocumentStore, Predicate, Query, StoreError, first_snapshot};

/// Input for [`LocalMutationCoordinator::create_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Title; surrounding whitespace is trimmed.
    pub title: String,
    /// Optional description; trimmed, and dropped when blank.
    pub description: Option<String>,
    /// Kind of work.
    pub category: TaskCategory,
    /// Owning project.
    pub project_id: Option<ProjectId>,
    /// Day the task is meant to happen, in epoch millis.
    pub scheduled_at: Option<i64>,
}

impl NewTask {
    /// A task with only a title and category.
    pub fn new(title: impl Into<String>, category: TaskCategory) -> Self {
        Self {
            title: title.into(),
            description: None,
            category,
            project_id: None,
            scheduled_at: None,
        }
    }
}

/// Input for [`LocalMutationCoordinator::create_project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    /// Title; trimmed, must not be empty.
    pub title: String,
    /// Description; trimmed, must not be empty.
    pub description: String,
}

/// Outcome of [`LocalMutationCoordinator::repair_orphans`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Task documents examined.
    pub scanned: usize,
    /// Orphaned tasks that were deleted.
    pub deleted: Vec<TaskId>,
    /// Orphaned tasks whose delete failed.
    pub failed: Vec<(TaskId, StoreError)>,
}

/// Performs writes on behalf of one signed-in user.
pub struct LocalMutationCoordinator<S, C = SystemClock> {
    store: Arc<S>,
    user: UserId,
    clock: C,
    collections: Collections,
    pending: Option<Arc<PendingCreates>>,
}

impl<S: DocumentStore> LocalMutationCoordinator<S> {
    /// Coordinator using wall-clock time and the default collections.
    #[must_use]
    pub fn new(store: Arc<S>, user: UserId) -> Self {
        Self::with_clock(store, user, SystemClock)
    }
}

impl<S: DocumentStore, C: Clock> LocalMutationCoordinator<S, C> {
    /// Coordinator with an explicit clock for creation timestamps.
    pub fn with_clock(store: Arc<S>, user: UserId, clock: C) -> Self {
        Self {
            store,
            user,
            clock,
            collections: Collections::default(),
            pending: None,
        }
    }

    /// Use `collections` instead of the default collection names.
    #[must_use]
    pub fn with_collections(mut self, collections: Collections) -> Self {
        self.collections = collections;
        self
    }

    /// The user writes are made for.
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// Record every create in `ledger` until the change stream confirms it.
    ///
    /// Only attach a ledger that a [`TaskBoard`](crate::board::TaskBoard)
    /// merges; entries are dropped by `merge_pending` alone.
    #[must_use]
    pub fn with_pending(mut self, ledger: Arc<PendingCreates>) -> Self {
        self.pending = Some(ledger);
        self
    }

    /// Ledger of creates not yet seen on the change stream, if one is
    /// attached.
    pub fn pending(&self) -> Option<Arc<PendingCreates>> {
        self.pending.clone()
    }

    /// Create a task assigned to the current user, with status `todo`.
    ///
    /// The creation time is the clock's "now" at call time. The task is
    /// tagged with a fresh [`ClientKey`] and, when a ledger is attached,
    /// recorded there until the change stream confirms it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTitle`] (without contacting the store)
    /// if the trimmed title is empty, or [`MutationError::Transport`] if the
    /// store rejects the create.
    pub async fn create_task(&self, input: NewTask) -> Result<TaskId, MutationError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }

        let key = ClientKey::new();
        let task = Task {
            id: None,
            project_id: input.project_id,
            title: title.to_string(),
            description: input
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            assigned_to: self.user.as_str().to_string(),
            status: TaskStatus::Todo,
            category: input.category,
            created_at: Some(self.clock.now_ms()),
            scheduled_at: input.scheduled_at,
            client_key: Some(key),
        };
        let fields = task.to_fields();
        if let Some(pending) = &self.pending {
            pending.insert(key, task);
        }

        match self.store.add_document(&self.collections.tasks, fields).await {
            Ok(id) => {
                tracing::info!(task = %id, client_key = %key, "task created");
                Ok(TaskId::from(id))
            }
            Err(e) => {
                if let Some(pending) = &self.pending {
                    pending.remove(&key);
                }
                tracing::warn!(client_key = %key, error = %e, "task create failed");
                Err(e.into())
            }
        }
    }

    /// Set a task's status. Any status may follow any other.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Transport`] if the store rejects the update.
    pub async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), MutationError> {
        let mut fields = Fields::new();
        fields.insert(task::fields::STATUS.to_string(), status.as_str().into());
        self.store
            .update_document(&self.collections.tasks, &id.to_document_id(), fields)
            .await
            .inspect_err(|e| tracing::warn!(task = %id, error = %e, "status update failed"))?;
        tracing::info!(task = %id, %status, "status updated");
        Ok(())
    }

    /// Create a project whose only member is the current user.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the trimmed title or description is
    /// empty, or [`MutationError::Transport`] if the store rejects the create.
    pub async fn create_project(&self, input: NewProject) -> Result<ProjectId, MutationError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyProjectTitle.into());
        }
        let description = input.description.trim();
        if description.is_empty() {
            return Err(ValidationError::EmptyProjectDescription.into());
        }

        let project = Project::new(
            title.to_string(),
            description.to_string(),
            self.user.as_str(),
            self.clock.now_ms(),
        );
        let id = self
            .store
            .add_document(&self.collections.projects, project.to_fields())
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "project create failed"))?;
        tracing::info!(project = %id, "project created");
        Ok(ProjectId::from(id))
    }

    /// Delete a project and every task that belongs to it.
    ///
    /// Task deletes are issued concurrently; the project delete is issued
    /// only once all of them have succeeded. Returns the number of tasks
    /// deleted.
    ///
    /// # Errors
    ///
    /// - [`MutationError::Transport`]: reading the project's tasks failed,
    ///   every task delete failed, or the project delete failed with no
    ///   task deleted. The store is unchanged.
    /// - [`MutationError::PartialCascadeFailure`]: some task deletes failed
    ///   after others succeeded. The project was not deleted.
    /// - [`MutationError::ProjectDeleteFailed`]: tasks were deleted but the
    ///   project delete failed.
    pub async fn delete_project(&self, id: &ProjectId) -> Result<usize, MutationError> {
        let query = Query::collection(self.collections.tasks.as_str())
            .filter(Predicate::eq(task::fields::PROJECT_ID, id.as_str()));
        let snapshot = first_snapshot(self.store.as_ref(), &query).await?;
        let task_ids: Vec<TaskId> = snapshot
            .documents
            .into_iter()
            .map(|doc| TaskId::from(doc.id))
            .collect();
        tracing::info!(project = %id, tasks = task_ids.len(), "deleting project tasks");

        let (deleted, failed) = self.delete_tasks(task_ids).await;
        if let Some((_, first)) = failed.first() {
            tracing::warn!(
                project = %id,
                deleted = deleted.len(),
                failed = failed.len(),
                "task deletes failed, project kept"
            );
            if deleted.is_empty() {
                return Err(MutationError::Transport(first.clone()));
            }
            return Err(MutationError::PartialCascadeFailure {
                project_id: id.clone(),
                deleted,
                failed,
            });
        }

        let tasks_deleted = deleted.len();
        match self
            .store
            .delete_document(&self.collections.projects, &id.to_document_id())
            .await
        {
            Ok(()) => {
                tracing::info!(project = %id, tasks_deleted, "project deleted");
                Ok(tasks_deleted)
            }
            Err(source) => {
                tracing::warn!(project = %id, tasks_deleted, error = %source, "project delete failed");
                if tasks_deleted == 0 {
                    Err(source.into())
                } else {
                    Err(MutationError::ProjectDeleteFailed {
                        project_id: id.clone(),
                        tasks_deleted,
                        source,
                    })
                }
            }
        }
    }

    /// Delete every task whose `projectId` names a project that no longer
    /// exists.
    ///
    /// Cleans up after a cascade that stopped between its two phases.
    /// Failed deletes are listed in the report rather than returned as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Transport`] if either collection cannot be
    /// read.
    pub async fn repair_orphans(&self) -> Result<RepairReport, MutationError> {
        let projects = first_snapshot(
            self.store.as_ref(),
            &Query::collection(self.collections.projects.as_str()),
        )
        .await?;
        let live: HashSet<DocumentId> = projects.documents.into_iter().map(|d| d.id).collect();

        let tasks = first_snapshot(
            self.store.as_ref(),
            &Query::collection(self.collections.tasks.as_str()),
        )
        .await?;
        let scanned = tasks.len();
        let orphans: Vec<TaskId> = tasks
            .documents
            .into_iter()
            .filter(|doc| {
                doc.get_str(task::fields::PROJECT_ID)
                    .ok()
                    .flatten()
                    .is_some_and(|p| !p.is_empty() && !live.contains(&DocumentId::new(p)))
            })
            .map(|doc| TaskId::from(doc.id))
            .collect();

        let (deleted, failed) = self.delete_tasks(orphans).await;
        tracing::info!(
            scanned,
            deleted = deleted.len(),
            failed = failed.len(),
            "orphan sweep finished"
        );
        Ok(RepairReport {
            scanned,
            deleted,
            failed,
        })
    }

    /// Delete tasks concurrently and split the outcomes.
    async fn delete_tasks(&self, ids: Vec<TaskId>) -> (Vec<TaskId>, Vec<(TaskId, StoreError)>) {
        let results = join_all(ids.iter().map(|id| {
            let doc_id = id.to_document_id();
            async move {
                self.store
                    .delete_document(&self.collections.tasks, &doc_id)
                    .await
            }
        }))
        .await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(()) => deleted.push(id),
                Err(e) => {
                    tracing::warn!(task = %id, error = %e, "task delete failed");
                    failed.push((id, e));
                }
            }
        }
        (deleted, failed)
    }
}
