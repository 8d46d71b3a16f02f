//! # Identity Session
//!
//! Process-wide holder of the signed-in principal.
//!
//! ```text
//! CredentialLinkEngine ──(replace / clear)──► IdentitySession ──► watch::Receiver
//!     (only writer)                           Option<Principal>    (any number of
//!                                                                    readers)
//! ```
//!
//! Every change swaps the whole principal atomically. Readers never observe a
//! half-updated identity.

use tokio::sync::watch;
use tracing::info;

use tether_core::Principal;

/// Holds the current principal, or none.
#[derive(Debug)]
pub struct IdentitySession {
    tx: watch::Sender<Option<Principal>>,
}

impl IdentitySession {
    /// Creates an empty session.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        IdentitySession { tx }
    }

    /// Returns a copy of the current principal.
    pub fn current(&self) -> Option<Principal> {
        self.tx.borrow().clone()
    }

    /// Returns true if anyone (anonymous or not) is signed in.
    pub fn is_signed_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Returns true if the current principal is anonymous.
    pub fn is_anonymous(&self) -> bool {
        self.tx
            .borrow()
            .as_ref()
            .map(|p| p.is_anonymous)
            .unwrap_or(false)
    }

    /// Observes session changes.
    pub fn watch(&self) -> watch::Receiver<Option<Principal>> {
        self.tx.subscribe()
    }

    pub(crate) fn replace(&self, principal: Principal) {
        info!(
            principal_id = %principal.id,
            anonymous = principal.is_anonymous,
            provider = %principal.provider,
            "Session principal replaced"
        );
        self.tx.send_replace(Some(principal));
    }

    pub(crate) fn clear(&self) -> Option<Principal> {
        let previous = self.tx.send_replace(None);
        if let Some(ref p) = previous {
            info!(principal_id = %p.id, "Session cleared");
        }
        previous
    }
}

impl Default for IdentitySession {
    fn default() -> Self {
        Self::new()
    }
}
