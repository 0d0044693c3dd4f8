//! Local mutations: task and project creates, status changes and the
//! cascading project delete.
//!
//! Writes go straight to the store. Their effect reaches the views only
//! through the change stream; the coordinator never patches a view itself.

pub mod coordinator;
pub mod pending;

pub use coordinator::{LocalMutationCoordinator, NewProject, NewTask, RepairReport};
pub use pending::PendingCreates;

use thiserror::Error;

use planboard_model::project::ProjectId;
use planboard_model::task::TaskId;

use crate::store::StoreError;

/// Input rejected before any request is issued.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Task title is empty after trimming.
    #[error("task title cannot be empty")]
    EmptyTitle,
    /// Project title is empty after trimming.
    #[error("project title cannot be empty")]
    EmptyProjectTitle,
    /// Project description is empty after trimming.
    #[error("project description cannot be empty")]
    EmptyProjectDescription,
}

/// Errors returned by [`LocalMutationCoordinator`] operations.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The input was invalid; nothing was sent to the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A request failed and left the store unchanged.
    #[error("store request failed: {0}")]
    Transport(#[from] StoreError),

    /// Some task deletes of a project delete failed after others succeeded.
    ///
    /// The project document and the failed tasks are still present; the
    /// deleted tasks are gone. Nothing is rolled back.
    #[error(
        "project {project_id} partially deleted: {} task(s) deleted, {} failed",
        deleted.len(),
        failed.len()
    )]
    PartialCascadeFailure {
        /// Project being deleted.
        project_id: ProjectId,
        /// Tasks that were deleted.
        deleted: Vec<TaskId>,
        /// Tasks whose delete failed, with the reason.
        failed: Vec<(TaskId, StoreError)>,
    },

    /// Every task of the project was deleted but the project delete failed.
    #[error("deleted {tasks_deleted} task(s) of project {project_id} but not the project: {source}")]
    ProjectDeleteFailed {
        /// Project being deleted.
        project_id: ProjectId,
        /// Number of tasks removed before the failure.
        tasks_deleted: usize,
        /// Store error of the project delete.
        source: StoreError,
    },
}

impl MutationError {
    /// Whether the store was left holding part of a cascade.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        matches!(
            self,
            Self::PartialCascadeFailure { .. } | Self::ProjectDeleteFailed { .. }
        )
    }
}
