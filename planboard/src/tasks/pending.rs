//! Ledger of task creates that the change stream has not confirmed yet.

use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;

use planboard_model::task::{ClientKey, Task};

/// Optimistic local copies of created tasks, keyed by client key.
///
/// An entry lives from just before the create request is issued until a
/// snapshot containing a task with the same client key is merged, or until
/// the create fails.
#[derive(Debug, Default)]
pub struct PendingCreates {
    entries: Mutex<BTreeMap<ClientKey, Task>>,
}

impl PendingCreates {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a create about to be issued.
    pub fn insert(&self, key: ClientKey, task: Task) {
        self.entries.lock().insert(key, task);
    }

    /// Forget a create, returning its local copy.
    pub fn remove(&self, key: &ClientKey) -> Option<Task> {
        self.entries.lock().remove(key)
    }

    /// Number of unconfirmed creates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether every create has been confirmed or abandoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Overlay unconfirmed creates on an authoritative task list.
    ///
    /// Entries whose client key appears in `authoritative` are confirmed and
    /// dropped from the ledger. The rest are appended after the
    /// authoritative tasks, oldest first. Matching is by client key only.
    pub fn merge_pending(&self, mut authoritative: Vec<Task>) -> Vec<Task> {
        let confirmed: HashSet<ClientKey> = authoritative
            .iter()
            .filter_map(|t| t.client_key)
            .collect();
        let mut entries = self.entries.lock();
        entries.retain(|key, _| !confirmed.contains(key));
        authoritative.extend(entries.values().cloned());
        authoritative
    }
}
