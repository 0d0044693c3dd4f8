//! The signed-in user, passed explicitly to every component that needs it.
//!
//! Identity is owned by an external provider. The core only reads the
//! current user's id, as a filter value and as the `assignedTo`/`createdBy`
//! field of documents it writes.

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Opaque user id issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wrap a provider-issued id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-issued id.
    pub id: UserId,
    /// Name to show in the UI.
    pub display_name: String,
    /// Avatar URL, if the provider has one.
    pub image_url: Option<String>,
}

/// Read access to the identity provider's session.
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` when signed out.
    fn current_user(&self) -> Option<Identity>;

    /// End the session. Later calls to `current_user` return `None`.
    fn sign_out(&self);
}

/// Identity provider holding a fixed session, used by the CLI and tests.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: RwLock<Option<Identity>>,
}

impl StaticIdentity {
    /// A session signed in as `user`.
    #[must_use]
    pub fn signed_in(user: Identity) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    /// A session with nobody signed in.
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.user.read().clone()
    }

    fn sign_out(&self) {
        if let Some(user) = self.user.write().take() {
            tracing::info!(user = %user.id, "signed out");
        }
    }
}
