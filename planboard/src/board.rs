//! Owning contexts: one live subscription each, published as view state.
//!
//! A board plays the part of a screen. It opens its subscription when
//! created, republishes a fully rebuilt view on every snapshot through a
//! [`tokio::sync::watch`] channel, and cancels the subscription when dropped.
//!
//! ```text
//! store ── snapshot ──> ChangeStreamSubscriber ──> Projector ──> watch ──> UI
//! ```
//!
//! A board never stays [`LoadState::Loading`] forever: with no signed-in
//! user it is `Ready` and empty without subscribing at all, and a failed
//! subscription ends in [`LoadState::Failed`].

use std::sync::Arc;

use chrono::TimeZone;
use tokio::sync::watch;

use planboard_model::project::Project;
use planboard_model::task;

use crate::identity::UserId;
use crate::projector::{Clock, Projector, TaskViews};
use crate::store::{Collections, DocumentStore, Predicate, Snapshot, StoreError};
use crate::subscriber::{CancelHandle, ChangeStreamSubscriber};
use crate::tasks::PendingCreates;

/// View state of a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    /// Waiting for the first snapshot.
    Loading,
    /// Latest view.
    Ready(T),
    /// The subscription failed; no further updates will arrive.
    Failed(String),
}

impl<T> LoadState<T> {
    /// Whether the first snapshot is still outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// The view, if ready.
    #[must_use]
    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(view) => Some(view),
            _ => None,
        }
    }
}

/// Which tasks a [`TaskBoard`] shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskScope {
    /// Tasks assigned to the signed-in user.
    #[default]
    Mine,
    /// Every task in the collection.
    All,
}

/// A live view of one query.
pub struct Board<T> {
    tx: Arc<watch::Sender<LoadState<T>>>,
    rx: watch::Receiver<LoadState<T>>,
    subscription: Option<CancelHandle>,
}

/// Task views of the signed-in user (calendar, home, project detail).
pub type TaskBoard = Board<TaskViews>;

/// Project list.
pub type ProjectBoard = Board<Vec<Project>>;

impl<T: Clone + Send + Sync + 'static> Board<T> {
    fn loading() -> Self {
        let (tx, rx) = watch::channel(LoadState::Loading);
        Self {
            tx: Arc::new(tx),
            rx,
            subscription: None,
        }
    }

    fn ready(view: T) -> Self {
        let board = Self::loading();
        board.tx.send_replace(LoadState::Ready(view));
        board
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoadState<T> {
        self.rx.borrow().clone()
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<LoadState<T>> {
        self.rx.clone()
    }

    /// Wait until the board has left [`LoadState::Loading`].
    pub async fn wait_ready(&self) -> LoadState<T> {
        let mut rx = self.rx.clone();
        // The board holds a sender, so the channel cannot close under us.
        rx.wait_for(|state| !state.is_loading())
            .await
            .map_or_else(|_| LoadState::Loading, |state| state.clone())
    }

    /// Whether a subscription was opened and is still delivering.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(CancelHandle::is_active)
    }

    /// Cancel the subscription now. The last published state is kept.
    pub fn close(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.cancel();
        }
    }

    fn on_error(&self) -> impl FnOnce(StoreError) + Send + 'static {
        let tx = Arc::clone(&self.tx);
        move |error| {
            tracing::warn!(%error, "board subscription failed");
            tx.send_replace(LoadState::Failed(error.to_string()));
        }
    }
}

impl TaskBoard {
    /// Open the task view.
    ///
    /// With `user == None` the board is immediately ready and empty, and no
    /// subscription is opened. Unconfirmed creates in `pending` are overlaid
    /// on every snapshot.
    pub fn open<S, C, Tz>(
        subscriber: &ChangeStreamSubscriber<S>,
        projector: Arc<Projector<C, Tz>>,
        collections: &Collections,
        user: Option<&UserId>,
        scope: TaskScope,
        pending: Option<Arc<PendingCreates>>,
    ) -> Self
    where
        S: DocumentStore + 'static,
        C: Clock + 'static,
        Tz: TimeZone + Send + Sync + 'static,
    {
        let Some(user) = user else {
            tracing::debug!("no signed-in user, task board is empty");
            return Self::ready(TaskViews::empty());
        };

        let mut board = Self::loading();
        let predicate = match scope {
            TaskScope::Mine => Some(Predicate::eq(task::fields::ASSIGNED_TO, user.as_str())),
            TaskScope::All => None,
        };
        let tx = Arc::clone(&board.tx);
        let on_snapshot = move |snapshot: Snapshot| {
            let mut tasks = projector.decode_tasks(&snapshot);
            if let Some(pending) = &pending {
                tasks = pending.merge_pending(tasks);
            }
            tx.send_replace(LoadState::Ready(projector.project(tasks)));
        };
        board.subscription = Some(subscriber.subscribe(
            &collections.tasks,
            predicate,
            on_snapshot,
            board.on_error(),
        ));
        board
    }
}

impl ProjectBoard {
    /// Open the project list.
    ///
    /// With `user == None` the board is immediately ready and empty, and no
    /// subscription is opened.
    pub fn open<S, C, Tz>(
        subscriber: &ChangeStreamSubscriber<S>,
        projector: Arc<Projector<C, Tz>>,
        collections: &Collections,
        user: Option<&UserId>,
    ) -> Self
    where
        S: DocumentStore + 'static,
        C: Clock + 'static,
        Tz: TimeZone + Send + Sync + 'static,
    {
        if user.is_none() {
            tracing::debug!("no signed-in user, project board is empty");
            return Self::ready(Vec::new());
        }

        let mut board = Self::loading();
        let tx = Arc::clone(&board.tx);
        let on_snapshot = move |snapshot: Snapshot| {
            tx.send_replace(LoadState::Ready(projector.decode_projects(&snapshot)));
        };
        board.subscription = Some(subscriber.subscribe(
            &collections.projects,
            None,
            on_snapshot,
            board.on_error(),
        ));
        board
    }
}
