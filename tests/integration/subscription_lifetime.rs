//! Integration tests for subscription lifetime.
//!
//! Covers snapshot delivery, synchronous cancellation, listener release,
//! single-shot error delivery, and cancellation from inside a callback.
//!
//! Verification command: `cargo test --test subscription_lifetime`

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use planboard::store::memory::MemoryStore;
use planboard::store::{
    DocumentStore, Predicate, Query, Snapshot, SnapshotStream, StoreError,
};
use planboard::subscriber::{CancelHandle, ChangeStreamSubscriber};
use planboard_model::document::{Document, DocumentId, Fields};

// =============================================================================
// Test helpers
// =============================================================================

/// What a subscription delivered, in order.
#[derive(Debug, PartialEq, Eq)]
enum Event {
    Snapshot(Vec<String>),
    Error(StoreError),
}

fn assigned(user: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("assignedTo".to_string(), user.into());
    fields
}

/// Subscribes to `tasks` and forwards every callback to a channel.
fn watch_tasks<S: DocumentStore + 'static>(
    subscriber: &ChangeStreamSubscriber<S>,
    predicate: Option<Predicate>,
) -> (CancelHandle, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let err_tx = tx.clone();
    let handle = subscriber.subscribe(
        "tasks",
        predicate,
        move |snapshot: Snapshot| {
            let ids = snapshot.documents.iter().map(|d| d.id.to_string()).collect();
            let _ = tx.send(Event::Snapshot(ids));
        },
        move |error| {
            let _ = err_tx.send(Event::Error(error));
        },
    );
    (handle, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("callbacks were dropped")
}

/// Asserts nothing is delivered within a short grace period.
async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<Event>) {
    let outcome = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(
        !matches!(outcome, Ok(Some(_))),
        "unexpected callback: {outcome:?}"
    );
}

fn setup() -> (Arc<MemoryStore>, ChangeStreamSubscriber<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let subscriber = ChangeStreamSubscriber::new(Arc::clone(&store));
    (store, subscriber)
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn first_snapshot_then_one_per_matching_change() {
    let (store, subscriber) = setup();
    store.insert("tasks", DocumentId::new("a"), assigned("u1"));
    let (_handle, mut rx) = watch_tasks(&subscriber, Some(Predicate::eq("assignedTo", "u1")));

    assert_eq!(next_event(&mut rx).await, Event::Snapshot(vec!["a".into()]));

    store.insert("tasks", DocumentId::new("b"), assigned("u1"));
    assert_eq!(
        next_event(&mut rx).await,
        Event::Snapshot(vec!["a".into(), "b".into()])
    );

    // A document outside the filter does not wake the subscription.
    store.insert("tasks", DocumentId::new("c"), assigned("u2"));
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn snapshot_is_the_entire_result_set_after_delete() {
    let (store, subscriber) = setup();
    store.insert("tasks", DocumentId::new("a"), assigned("u1"));
    store.insert("tasks", DocumentId::new("b"), assigned("u1"));
    let (_handle, mut rx) = watch_tasks(&subscriber, None);
    next_event(&mut rx).await;

    store
        .delete_document("tasks", &DocumentId::new("a"))
        .await
        .unwrap();
    assert_eq!(next_event(&mut rx).await, Event::Snapshot(vec!["b".into()]));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn no_callback_after_cancel_returns() {
    let (store, subscriber) = setup();
    let (handle, mut rx) = watch_tasks(&subscriber, None);
    next_event(&mut rx).await;

    handle.cancel();
    assert!(!handle.is_active());

    store.inject_snapshot("tasks", &Snapshot::new(Vec::new()));
    store.insert("tasks", DocumentId::new("late"), assigned("u1"));
    store.break_streams(&StoreError::Unavailable("gone".into()));
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let (_store, subscriber) = setup();
    let (handle, _rx) = watch_tasks(&subscriber, None);
    handle.cancel();
    handle.cancel();
    assert!(!handle.is_active());
    drop(handle);
}

#[tokio::test]
async fn dropping_the_handle_cancels() {
    let (store, subscriber) = setup();
    let (handle, mut rx) = watch_tasks(&subscriber, None);
    next_event(&mut rx).await;

    drop(handle);
    store.insert("tasks", DocumentId::new("late"), assigned("u1"));
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn cancel_releases_the_store_listener() {
    let (store, subscriber) = setup();
    let (handle, mut rx) = watch_tasks(&subscriber, None);
    next_event(&mut rx).await;
    assert_eq!(store.listener_count(), 1);

    handle.cancel();
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.listener_count() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("listener was never released");
}

#[tokio::test]
async fn callback_may_cancel_its_own_subscription() {
    let (store, subscriber) = setup();
    let slot: Arc<Mutex<Option<CancelHandle>>> = Arc::new(Mutex::new(None));
    let delivered = Arc::new(Mutex::new(0_usize));

    let handle = {
        let slot = Arc::clone(&slot);
        let delivered = Arc::clone(&delivered);
        subscriber.subscribe(
            "tasks",
            None,
            move |_snapshot: Snapshot| {
                *delivered.lock() += 1;
                if let Some(own) = slot.lock().take() {
                    own.cancel();
                }
            },
            |_error| {},
        )
    };
    *slot.lock() = Some(handle);

    tokio::time::timeout(Duration::from_secs(2), async {
        while *delivered.lock() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("first snapshot never arrived");

    store.insert("tasks", DocumentId::new("a"), assigned("u1"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*delivered.lock(), 1);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn stream_error_is_delivered_once_and_ends_delivery() {
    let (store, subscriber) = setup();
    let (handle, mut rx) = watch_tasks(&subscriber, None);
    next_event(&mut rx).await;

    let denied = StoreError::PermissionDenied("rules changed".into());
    assert_eq!(store.break_streams(&denied), 1);
    assert_eq!(next_event(&mut rx).await, Event::Error(denied));
    assert!(!handle.is_active());

    store.insert("tasks", DocumentId::new("late"), assigned("u1"));
    assert_silent(&mut rx).await;
}

/// Store whose streams close right after the first snapshot.
struct ClosingStore;

impl DocumentStore for ClosingStore {
    fn subscribe(&self, _query: &Query) -> Result<SnapshotStream, StoreError> {
        let (tx, stream) = SnapshotStream::channel();
        let doc = Document::new(DocumentId::new("only"), Fields::new());
        tx.send(Ok(Snapshot::new(vec![doc])))
            .map_err(|_| StoreError::ConnectionClosed)?;
        Ok(stream)
    }

    async fn add_document(&self, _: &str, _: Fields) -> Result<DocumentId, StoreError> {
        Err(StoreError::Unavailable("read only".into()))
    }

    async fn update_document(
        &self,
        _: &str,
        _: &DocumentId,
        _: Fields,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read only".into()))
    }

    async fn delete_document(&self, _: &str, _: &DocumentId) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read only".into()))
    }
}

#[tokio::test]
async fn closed_stream_reports_connection_closed() {
    let subscriber = ChangeStreamSubscriber::new(Arc::new(ClosingStore));
    let (handle, mut rx) = watch_tasks(&subscriber, None);

    assert_eq!(next_event(&mut rx).await, Event::Snapshot(vec!["only".into()]));
    assert_eq!(
        next_event(&mut rx).await,
        Event::Error(StoreError::ConnectionClosed)
    );
    assert!(!handle.is_active());
}
