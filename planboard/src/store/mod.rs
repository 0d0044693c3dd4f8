//! Document store abstraction for `Planboard`.
//!
//! Defines the [`DocumentStore`] trait that the hosted document database is
//! reached through. The only implementation shipped here is
//! [`memory::MemoryStore`], an in-process store used by tests and the CLI.
//!
//! # Snapshot semantics
//!
//! A subscription is level-triggered: every item on a [`SnapshotStream`] is
//! the *entire* current result set of the query, never a diff. Deletions are
//! expressed only by absence from the next snapshot.

pub mod memory;

use std::fmt;

use tokio::sync::mpsc;

use planboard_model::document::{Document, DocumentId, FieldValue, Fields};

/// Errors reported by the store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The stream or connection to the store has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The store refused the operation for the current identity.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The target document does not exist.
    #[error("document {id} not found in {collection}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// Missing document id.
        id: DocumentId,
    },
}

/// Equality filter over a single document field.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field name to compare.
    pub field: String,
    /// Value the field must equal.
    pub value: FieldValue,
}

impl Predicate {
    /// Matches documents whose `field` equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether `doc` satisfies this filter. Absent fields never match.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        doc.fields.get(&self.field) == Some(&self.value)
    }
}

/// A collection plus an optional equality filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection name.
    pub collection: String,
    /// Filter; `None` selects every document.
    pub predicate: Option<Predicate>,
}

impl Query {
    /// Select every document in `collection`.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            predicate: None,
        }
    }

    /// Restrict the query with `predicate`.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Whether `doc` belongs to this query's result set.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.predicate.as_ref().is_none_or(|p| p.matches(doc))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Some(p) => write!(f, "{} where {} == {:?}", self.collection, p.field, p.value),
            None => f.write_str(&self.collection),
        }
    }
}

/// The full result set of a query at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Matching documents. Order carries no meaning.
    pub documents: Vec<Document>,
}

impl Snapshot {
    /// Wrap a list of documents.
    #[must_use]
    pub const fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the result set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Names of the collections tasks and projects live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    /// Task documents.
    pub tasks: String,
    /// Project documents.
    pub projects: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            tasks: "tasks".to_string(),
            projects: "projects".to_string(),
        }
    }
}

/// Item carried on a snapshot stream.
pub type StreamItem = Result<Snapshot, StoreError>;

/// Sending half of a snapshot stream, held by the store.
pub type SnapshotSender = mpsc::UnboundedSender<StreamItem>;

/// Live sequence of full snapshots for one query.
///
/// Dropping the stream ends the subscription on the store side.
#[derive(Debug)]
pub struct SnapshotStream {
    rx: mpsc::UnboundedReceiver<StreamItem>,
}

impl SnapshotStream {
    /// Create a connected sender/stream pair.
    #[must_use]
    pub fn channel() -> (SnapshotSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the store has dropped its side of the stream.
    pub async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }
}

/// Async interface to the hosted document store.
///
/// Mutations report success once the store acknowledges them; the effect
/// becomes visible to readers only through subsequent snapshots.
pub trait DocumentStore: Send + Sync {
    /// Open a live subscription to `query`.
    ///
    /// Registration does not block. The returned stream yields the current
    /// result set first and then a fresh full result set after every change
    /// to a matching document.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store refuses the subscription.
    fn subscribe(&self, query: &Query) -> Result<SnapshotStream, StoreError>;

    /// Create a document and return its store-assigned id.
    fn add_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> impl std::future::Future<Output = Result<DocumentId, StoreError>> + Send;

    /// Merge `fields` into an existing document.
    fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete a document.
    fn delete_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Read one snapshot of `query` and close the subscription.
///
/// # Errors
///
/// Returns the store's error if subscribing fails or the stream reports
/// one, and [`StoreError::ConnectionClosed`] if the stream ends before the
/// first snapshot.
pub async fn first_snapshot<S: DocumentStore + ?Sized>(
    store: &S,
    query: &Query,
) -> Result<Snapshot, StoreError> {
    let mut stream = store.subscribe(query)?;
    stream.next().await.unwrap_or(Err(StoreError::ConnectionClosed))
}
