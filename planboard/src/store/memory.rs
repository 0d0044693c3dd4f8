//! In-process document store.
//!
//! [`MemoryStore`] keeps every collection in memory and pushes a fresh full
//! snapshot to each affected listener after every mutation, which is the
//! delivery model of the hosted store. Every request is recorded in an
//! operation log, and failures can be injected per document, for adds, or
//! for every live stream at once. Tests and the CLI both run against it.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use uuid::Uuid;

use planboard_model::document::{Document, DocumentId, Fields};

use super::{DocumentStore, Query, Snapshot, SnapshotSender, SnapshotStream, StoreError};

/// One request received by a [`MemoryStore`], in issue order.
///
/// Requests are logged when issued, before they resolve, so a failed request
/// still appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `add_document` on a collection.
    Add {
        /// Target collection.
        collection: String,
    },
    /// `update_document` of one document.
    Update {
        /// Target collection.
        collection: String,
        /// Target document.
        id: DocumentId,
    },
    /// `delete_document` of one document.
    Delete {
        /// Target collection.
        collection: String,
        /// Target document.
        id: DocumentId,
    },
}

impl StoreOp {
    /// Collection the request targeted.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Add { collection }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }
}

struct Listener {
    query: Query,
    tx: SnapshotSender,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<DocumentId, Fields>>,
    listeners: Vec<Listener>,
    ops: Vec<StoreOp>,
    failing_deletes: HashMap<DocumentId, StoreError>,
    failing_adds: Option<StoreError>,
}

impl Inner {
    fn snapshot(&self, query: &Query) -> Snapshot {
        let documents = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .filter(|doc| query.matches(doc))
                    .collect()
            })
            .unwrap_or_default();
        Snapshot::new(documents)
    }

    /// Push a fresh snapshot to every listener whose result set could have
    /// changed, dropping listeners whose stream is gone.
    fn publish(&mut self, collection: &str, before: Option<&Document>, after: Option<&Document>) {
        let listeners = std::mem::take(&mut self.listeners);
        let mut kept = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let query = &listener.query;
            let affected = query.collection == collection
                && (before.is_some_and(|d| query.matches(d))
                    || after.is_some_and(|d| query.matches(d)));
            if affected && listener.tx.send(Ok(self.snapshot(query))).is_err() {
                tracing::debug!(query = %query, "dropping closed listener");
                continue;
            }
            kept.push(listener);
        }
        self.listeners = kept;
    }

    fn document(&self, collection: &str, id: &DocumentId) -> Option<Document> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id.clone(), fields.clone()))
    }
}

/// In-memory [`DocumentStore`] with an operation log and failure injection.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document with a known id without logging an operation.
    ///
    /// Live listeners are notified as for any other write.
    pub fn insert(&self, collection: &str, id: DocumentId, fields: Fields) {
        let mut inner = self.inner.lock();
        let before = inner.document(collection, &id);
        let after = Document::new(id.clone(), fields.clone());
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, fields);
        inner.publish(collection, before.as_ref(), Some(&after));
    }

    /// Every document currently in `collection`, ordered by id.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .lock()
            .snapshot(&Query::collection(collection))
            .documents
    }

    /// Names of every collection that has ever held a document.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Requests received so far, in issue order.
    #[must_use]
    pub fn ops(&self) -> Vec<StoreOp> {
        self.inner.lock().ops.clone()
    }

    /// Forget the operation log.
    pub fn clear_ops(&self) {
        self.inner.lock().ops.clear();
    }

    /// Make every future delete of `id` fail with `error`.
    pub fn fail_delete_of(&self, id: DocumentId, error: StoreError) {
        self.inner.lock().failing_deletes.insert(id, error);
    }

    /// Make every future `add_document` fail with `error`.
    pub fn fail_adds(&self, error: StoreError) {
        self.inner.lock().failing_adds = Some(error);
    }

    /// Remove every injected request failure.
    pub fn heal(&self) {
        let mut inner = self.inner.lock();
        inner.failing_deletes.clear();
        inner.failing_adds = None;
    }

    /// Fail every live stream with `error` and close it.
    ///
    /// Returns the number of streams that were still open.
    pub fn break_streams(&self, error: &StoreError) -> usize {
        let listeners = std::mem::take(&mut self.inner.lock().listeners);
        let broken = listeners
            .iter()
            .filter(|l| l.tx.send(Err(error.clone())).is_ok())
            .count();
        tracing::debug!(broken, %error, "broke live streams");
        broken
    }

    /// Deliver `snapshot` verbatim to every live listener on `collection`.
    ///
    /// Returns how many listeners accepted it.
    pub fn inject_snapshot(&self, collection: &str, snapshot: &Snapshot) -> usize {
        let mut inner = self.inner.lock();
        inner.listeners.retain(|l| !l.tx.is_closed());
        inner
            .listeners
            .iter()
            .filter(|l| l.query.collection == collection)
            .filter(|l| l.tx.send(Ok(snapshot.clone())).is_ok())
            .count()
    }

    /// Number of live listeners. Listeners whose stream was dropped are
    /// pruned first.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.listeners.retain(|l| !l.tx.is_closed());
        inner.listeners.len()
    }
}

impl DocumentStore for MemoryStore {
    fn subscribe(&self, query: &Query) -> Result<SnapshotStream, StoreError> {
        let (tx, stream) = SnapshotStream::channel();
        let mut inner = self.inner.lock();
        tx.send(Ok(inner.snapshot(query)))
            .map_err(|_| StoreError::ConnectionClosed)?;
        tracing::debug!(query = %query, "listener registered");
        inner.listeners.push(Listener {
            query: query.clone(),
            tx,
        });
        Ok(stream)
    }

    async fn add_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<DocumentId, StoreError> {
        let injected = {
            let mut inner = self.inner.lock();
            inner.ops.push(StoreOp::Add {
                collection: collection.to_string(),
            });
            inner.failing_adds.clone()
        };
        tokio::task::yield_now().await;
        if let Some(error) = injected {
            return Err(error);
        }

        let id = DocumentId::new(Uuid::now_v7().simple().to_string());
        let mut inner = self.inner.lock();
        let after = Document::new(id.clone(), fields.clone());
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        inner.publish(collection, None, Some(&after));
        Ok(id)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.inner.lock().ops.push(StoreOp::Update {
            collection: collection.to_string(),
            id: id.clone(),
        });
        tokio::task::yield_now().await;

        let mut inner = self.inner.lock();
        let Some(before) = inner.document(collection, id) else {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.clone(),
            });
        };
        let mut merged = before.fields.clone();
        merged.extend(fields);
        let after = Document::new(id.clone(), merged.clone());
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), merged);
        inner.publish(collection, Some(&before), Some(&after));
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        let injected = {
            let mut inner = self.inner.lock();
            inner.ops.push(StoreOp::Delete {
                collection: collection.to_string(),
                id: id.clone(),
            });
            inner.failing_deletes.get(id).cloned()
        };
        tokio::task::yield_now().await;
        if let Some(error) = injected {
            return Err(error);
        }

        let mut inner = self.inner.lock();
        let before = inner.document(collection, id);
        // Deleting a missing document succeeds, as in the hosted store.
        if let Some(before) = before {
            if let Some(docs) = inner.collections.get_mut(collection) {
                docs.remove(id);
            }
            inner.publish(collection, Some(&before), None);
        }
        Ok(())
    }
}
