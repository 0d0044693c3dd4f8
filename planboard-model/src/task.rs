//! Task records and their document encoding.
//!
//! A [`Task`] is one unit of work. Its identifier is assigned by the store,
//! so a task built locally (before the create request resolves) has no
//! [`TaskId`]. Creates are tagged with a client-assigned [`ClientKey`] so an
//! optimistic local copy can be matched against the authoritative snapshot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DecodeError;
use crate::document::{Document, DocumentId, FieldValue, Fields};
use crate::project::ProjectId;
use crate::timestamp::epoch_millis;

/// Field names as stored in task documents.
pub mod fields {
    /// Task title.
    pub const TITLE: &str = "title";
    /// Optional description.
    pub const DESCRIPTION: &str = "description";
    /// Owning project.
    pub const PROJECT_ID: &str = "projectId";
    /// Assignee user id.
    pub const ASSIGNED_TO: &str = "assignedTo";
    /// Status token.
    pub const STATUS: &str = "status";
    /// Category token.
    pub const CATEGORY: &str = "category";
    /// Creation time.
    pub const CREATED_AT: &str = "createdAt";
    /// Day the task is intended to happen.
    pub const SCHEDULED_AT: &str = "scheduledAt";
    /// Client-assigned idempotency key.
    pub const CLIENT_KEY: &str = "clientKey";
}

/// Store-assigned identifier of a task document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap a raw store identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// View this id as a generic document id.
    #[must_use]
    pub fn to_document_id(&self) -> DocumentId {
        DocumentId::new(self.0.clone())
    }
}

impl From<DocumentId> for TaskId {
    fn from(id: DocumentId) -> Self {
        Self(id.as_str().to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-assigned idempotency key attached to every created task.
///
/// UUID v7, so keys generated by one client sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientKey(Uuid);

impl ClientKey {
    /// Generate a fresh key.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `ClientKey` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ClientKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Workflow status of a task.
///
/// Transitions are unconstrained: any status may be set from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// Every status, in display order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Completed];

    /// The token stored in documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownStatus(s.to_string()))
    }
}

/// What kind of work a task is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    /// Job-related work.
    Work,
    /// Learning.
    Study,
    /// Everything else.
    Personal,
}

impl TaskCategory {
    /// Every category, in display order.
    pub const ALL: [Self; 3] = [Self::Work, Self::Study, Self::Personal];

    /// The token written to documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Study => "study",
            Self::Personal => "personal",
        }
    }

    /// The Vietnamese label older clients stored instead of the token.
    #[must_use]
    pub const fn legacy_label(self) -> &'static str {
        match self {
            Self::Work => "Công việc",
            Self::Study => "Học tập",
            Self::Personal => "Cá nhân",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.legacy_label() == s)
            .ok_or_else(|| DecodeError::UnknownCategory(s.to_string()))
    }
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Store-assigned id; `None` until the create request resolves.
    pub id: Option<TaskId>,
    /// Owning project, if any.
    pub project_id: Option<ProjectId>,
    /// Non-empty title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Identity-provider id of the assignee. Empty if the document had none.
    pub assigned_to: String,
    /// Workflow status.
    pub status: TaskStatus,
    /// Kind of work.
    pub category: TaskCategory,
    /// Creation time in epoch millis.
    ///
    /// `None` when the stored value was missing or could not be interpreted;
    /// projections substitute the current time for it.
    pub created_at: Option<i64>,
    /// Day the task is meant to happen, in epoch millis.
    pub scheduled_at: Option<i64>,
    /// Idempotency key written by the creating client.
    pub client_key: Option<ClientKey>,
}

impl Task {
    /// Decode a task from a store document.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the title is missing or blank, or the
    /// status or category is missing or outside the closed set.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let title = doc.require_str(fields::TITLE)?;
        if title.trim().is_empty() {
            return Err(DecodeError::EmptyTitle);
        }
        let status = doc.require_str(fields::STATUS)?.parse()?;
        let category = doc.require_str(fields::CATEGORY)?.parse()?;

        Ok(Self {
            id: Some(TaskId::from(doc.id.clone())),
            project_id: doc
                .get_str(fields::PROJECT_ID)?
                .filter(|p| !p.is_empty())
                .map(ProjectId::new),
            title: title.to_string(),
            description: doc.get_str(fields::DESCRIPTION)?.map(str::to_string),
            assigned_to: doc
                .get_str(fields::ASSIGNED_TO)?
                .unwrap_or_default()
                .to_string(),
            status,
            category,
            created_at: doc.get(fields::CREATED_AT).and_then(epoch_millis),
            scheduled_at: doc.get(fields::SCHEDULED_AT).and_then(epoch_millis),
            client_key: doc
                .get_str(fields::CLIENT_KEY)?
                .and_then(|k| k.parse().ok()),
        })
    }

    /// Encode the task as a document field map. The id is not a field.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let mut out = Fields::new();
        out.insert(fields::TITLE.to_string(), self.title.as_str().into());
        out.insert(
            fields::STATUS.to_string(),
            self.status.as_str().into(),
        );
        out.insert(
            fields::CATEGORY.to_string(),
            self.category.as_str().into(),
        );
        out.insert(
            fields::ASSIGNED_TO.to_string(),
            self.assigned_to.as_str().into(),
        );
        if let Some(description) = &self.description {
            out.insert(fields::DESCRIPTION.to_string(), description.as_str().into());
        }
        if let Some(project_id) = &self.project_id {
            out.insert(fields::PROJECT_ID.to_string(), project_id.as_str().into());
        }
        if let Some(created_at) = self.created_at {
            out.insert(fields::CREATED_AT.to_string(), FieldValue::Integer(created_at));
        }
        if let Some(scheduled_at) = self.scheduled_at {
            out.insert(
                fields::SCHEDULED_AT.to_string(),
                FieldValue::Integer(scheduled_at),
            );
        }
        if let Some(key) = self.client_key {
            out.insert(fields::CLIENT_KEY.to_string(), key.to_string().into());
        }
        out
    }
}
