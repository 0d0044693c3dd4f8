//! Live subscriptions with synchronous cancellation.
//!
//! [`ChangeStreamSubscriber::subscribe`] registers a query with the store on
//! the caller's thread and spawns one pump task that forwards stream items
//! to the caller's callbacks. Every callback runs while holding the
//! subscription's delivery gate, and [`CancelHandle::cancel`] closes that
//! gate under the same lock, so once `cancel()` returns no callback is
//! running and none will start.

use std::cell::Cell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tokio::task::JoinHandle;

use crate::store::{DocumentStore, Predicate, Query, Snapshot, SnapshotStream, StoreError};

/// Open/closed flag guarding callback delivery.
///
/// Reentrant so a callback may cancel its own subscription.
struct Gate {
    open: ReentrantMutex<Cell<bool>>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: ReentrantMutex::new(Cell::new(true)),
        }
    }

    /// Run `deliver` if the gate is open. Returns whether it is still open
    /// afterwards.
    fn deliver(&self, deliver: impl FnOnce()) -> bool {
        let open = self.open.lock();
        if !open.get() {
            return false;
        }
        deliver();
        open.get()
    }

    /// Close the gate and run `last` if it was open.
    fn close_with(&self, last: impl FnOnce()) {
        let open = self.open.lock();
        if open.replace(false) {
            last();
        }
    }

    /// Close the gate. Returns whether it was open.
    fn close(&self) -> bool {
        self.open.lock().replace(false)
    }

    fn is_open(&self) -> bool {
        self.open.lock().get()
    }
}

/// Handle to one live subscription.
///
/// Dropping the handle cancels the subscription.
pub struct CancelHandle {
    gate: Arc<Gate>,
    task: JoinHandle<()>,
    query: Query,
}

impl CancelHandle {
    /// Stop delivery. Idempotent.
    ///
    /// When this returns, no `on_snapshot`/`on_error` call is in progress
    /// and none will follow. The store listener is released once the pump
    /// task is torn down by the runtime.
    pub fn cancel(&self) {
        if self.gate.close() {
            tracing::debug!(query = %self.query, "subscription cancelled");
        }
        self.task.abort();
    }

    /// Whether callbacks may still be delivered: not cancelled, not failed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    /// The query this handle subscribes to.
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("query", &self.query)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Opens live subscriptions against a [`DocumentStore`].
pub struct ChangeStreamSubscriber<S> {
    store: Arc<S>,
}

impl<S> Clone for ChangeStreamSubscriber<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DocumentStore + 'static> ChangeStreamSubscriber<S> {
    /// Create a subscriber over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Subscribe to `collection`, optionally filtered by `predicate`.
    ///
    /// `on_snapshot` receives the entire current result set, first on
    /// registration and then after every change to a matching document.
    /// `on_error` fires at most once, on a stream error or when the store
    /// closes the stream, and no snapshot follows it. Nothing is retried.
    ///
    /// Registration happens before this returns; delivery runs on a spawned
    /// task, so this must be called from within a tokio runtime.
    pub fn subscribe<F, E>(
        &self,
        collection: &str,
        predicate: Option<Predicate>,
        on_snapshot: F,
        on_error: E,
    ) -> CancelHandle
    where
        F: FnMut(Snapshot) + Send + 'static,
        E: FnOnce(StoreError) + Send + 'static,
    {
        let query = Query {
            collection: collection.to_string(),
            predicate,
        };
        let stream = self.store.subscribe(&query);
        match &stream {
            Ok(_) => tracing::debug!(query = %query, "subscribed"),
            Err(e) => tracing::warn!(query = %query, error = %e, "subscribe refused"),
        }

        let gate = Arc::new(Gate::new());
        let task = tokio::spawn(pump(
            stream,
            Arc::clone(&gate),
            query.clone(),
            on_snapshot,
            on_error,
        ));
        CancelHandle { gate, task, query }
    }
}

async fn pump<F, E>(
    stream: Result<SnapshotStream, StoreError>,
    gate: Arc<Gate>,
    query: Query,
    mut on_snapshot: F,
    on_error: E,
) where
    F: FnMut(Snapshot) + Send,
    E: FnOnce(StoreError) + Send,
{
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(error) => {
            gate.close_with(|| on_error(error));
            return;
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(snapshot) => {
                tracing::trace!(query = %query, documents = snapshot.len(), "snapshot");
                if !gate.deliver(|| on_snapshot(snapshot)) {
                    return;
                }
            }
            Err(error) => {
                tracing::warn!(query = %query, error = %error, "subscription failed");
                gate.close_with(|| on_error(error));
                return;
            }
        }
    }

    tracing::warn!(query = %query, "stream closed by store");
    gate.close_with(|| on_error(StoreError::ConnectionClosed));
}
