//! Project records: containers of tasks with a member list.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentId, FieldValue, Fields};
use crate::timestamp::normalize_epoch_millis;

/// Field names as stored in project documents.
pub mod fields {
    /// Project title.
    pub const TITLE: &str = "title";
    /// Project description.
    pub const DESCRIPTION: &str = "description";
    /// Creator user id.
    pub const CREATED_BY: &str = "createdBy";
    /// Member user ids.
    pub const MEMBERS: &str = "members";
    /// Creation time.
    pub const CREATED_AT: &str = "createdAt";
}

/// Store-assigned identifier of a project document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
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

impl From<DocumentId> for ProjectId {
    fn from(id: DocumentId) -> Self {
        Self(id.as_str().to_string())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A container of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    /// Store-assigned id; `None` until the create request resolves.
    pub id: Option<ProjectId>,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// User id of the creator.
    pub created_by: String,
    /// User ids with access. Order is irrelevant.
    pub members: BTreeSet<String>,
    /// Creation time in epoch millis.
    pub created_at: i64,
}

impl Project {
    /// Build a new, not yet persisted project. The creator is its only member.
    #[must_use]
    pub fn new(title: String, description: String, creator: &str, created_at: i64) -> Self {
        Self {
            id: None,
            title,
            description,
            created_by: creator.to_string(),
            members: BTreeSet::from([creator.to_string()]),
            created_at,
        }
    }

    /// Decode a project document.
    ///
    /// Decoding is lenient: missing or mistyped strings become empty, a
    /// missing member list becomes empty, and a missing or unusable
    /// `createdAt` becomes `now_ms`.
    #[must_use]
    pub fn from_document(doc: &Document, now_ms: i64) -> Self {
        let text = |name: &'static str| {
            doc.get_str(name)
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_string()
        };
        let members = match doc.get(fields::MEMBERS) {
            Some(FieldValue::StringArray(ids)) => ids.iter().cloned().collect(),
            _ => BTreeSet::new(),
        };
        Self {
            id: Some(ProjectId::from(doc.id.clone())),
            title: text(fields::TITLE),
            description: text(fields::DESCRIPTION),
            created_by: text(fields::CREATED_BY),
            members,
            created_at: normalize_epoch_millis(doc.get(fields::CREATED_AT), now_ms),
        }
    }

    /// Encode the project as a document field map.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let mut out = Fields::new();
        out.insert(fields::TITLE.to_string(), self.title.as_str().into());
        out.insert(
            fields::DESCRIPTION.to_string(),
            self.description.as_str().into(),
        );
        out.insert(
            fields::CREATED_BY.to_string(),
            self.created_by.as_str().into(),
        );
        out.insert(
            fields::MEMBERS.to_string(),
            FieldValue::StringArray(self.members.iter().cloned().collect()),
        );
        out.insert(
            fields::CREATED_AT.to_string(),
            FieldValue::Integer(self.created_at),
        );
        out
    }

    /// Number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether `user_id` is a member.
    #[must_use]
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }
}
