//! # Service Ports
//!
//! Traits for the remote services Tether talks to. The engine and the
//! manager only ever see `Arc<dyn ...>` of these, so a remote backend, the
//! local SQLite store or a test fake can sit behind them.
//!
//! ## Port Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Ports                                        │
//! │                                                                         │
//! │  CredentialLinkEngine ──► IdentityService                              │
//! │                           sign_in / link_credential / create_account   │
//! │                           sign_in_anonymously / sign_out               │
//! │                           delete_account / current_account             │
//! │                                                                         │
//! │  DocumentSyncManager ───► DocumentStore                                │
//! │                           get / set(merge) / delete / query / list     │
//! │                           subscribe_document / subscribe_collection    │
//! │                              │                                          │
//! │                              └──► RemoteFeed { events, registration }   │
//! │                                                                         │
//! │                     ────► FieldStore   patch_field / get_field         │
//! │                     ────► BlobStore    put_blob                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use crate::error::SyncResult;
use tether_core::{AccountRecord, Credential, DocumentSnapshot, FieldOp, Fields};

// =============================================================================
// Identity Service
// =============================================================================

/// The remote identity service.
///
/// The service tracks its own current account; `link_credential` and
/// `delete_account` act on it.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Signs in with a credential, replacing the service's current account.
    async fn sign_in(&self, credential: &Credential) -> SyncResult<AccountRecord>;

    /// Links a credential to the current account.
    ///
    /// ## Errors
    /// * `SyncError::CredentialAlreadyInUse` - The credential belongs to another account
    /// * `SyncError::NoCurrentUser` - Nobody is signed in
    async fn link_credential(&self, credential: &Credential) -> SyncResult<AccountRecord>;

    /// Creates an email/password account and signs in to it.
    async fn create_account(&self, email: &str, password: &str) -> SyncResult<AccountRecord>;

    /// Creates a fresh anonymous account and signs in to it.
    async fn sign_in_anonymously(&self) -> SyncResult<AccountRecord>;

    /// Signs out of the current account.
    async fn sign_out(&self) -> SyncResult<()>;

    /// Deletes the current account.
    async fn delete_account(&self) -> SyncResult<()>;

    /// Returns the account the service considers signed in, if any.
    async fn current_account(&self) -> SyncResult<Option<AccountRecord>>;
}

// =============================================================================
// Document Store
// =============================================================================

/// One raw notification for a document subscription.
///
/// `Ok(None)` means the store delivered no snapshot at all.
pub type DocumentEvent = SyncResult<Option<DocumentSnapshot>>;

/// One raw notification for a collection subscription, holding the full
/// current contents of the collection in arrival order.
pub type CollectionEvent = SyncResult<Option<Vec<DocumentSnapshot>>>;

/// The remote document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document. Absent documents yield a snapshot with no fields.
    async fn get_document(&self, collection: &str, id: &str) -> SyncResult<DocumentSnapshot>;

    /// Writes a document, replacing it or deep-merging into it.
    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> SyncResult<()>;

    /// Deletes a document. Deleting an absent document is not an error.
    async fn delete_document(&self, collection: &str, id: &str) -> SyncResult<()>;

    /// Returns the documents whose `field` equals `value`.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> SyncResult<Vec<DocumentSnapshot>>;

    /// Returns every document of a collection in arrival order.
    async fn list_documents(&self, collection: &str) -> SyncResult<Vec<DocumentSnapshot>>;

    /// Registers for changes of one document. Returns immediately.
    fn subscribe_document(&self, collection: &str, id: &str) -> RemoteFeed<DocumentEvent>;

    /// Registers for changes of a whole collection. Returns immediately.
    fn subscribe_collection(&self, collection: &str) -> RemoteFeed<CollectionEvent>;
}

/// Raw events of one push registration plus the handle that ends it.
#[derive(Debug)]
pub struct RemoteFeed<E> {
    pub events: mpsc::UnboundedReceiver<E>,
    pub registration: ListenerRegistration,
}

impl<E> RemoteFeed<E> {
    /// Creates a feed from its parts.
    pub fn new(events: mpsc::UnboundedReceiver<E>, registration: ListenerRegistration) -> Self {
        RemoteFeed {
            events,
            registration,
        }
    }
}

type RemoveFn = Box<dyn FnOnce() + Send>;

/// Handle of a push registration held by the remote store.
///
/// `remove` runs the store's cleanup once; later calls and the drop are no-ops.
pub struct ListenerRegistration {
    remove: Mutex<Option<RemoveFn>>,
}

impl ListenerRegistration {
    /// Creates a registration that runs `remove` when it ends.
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        ListenerRegistration {
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    /// A registration with nothing to clean up.
    pub fn noop() -> Self {
        ListenerRegistration {
            remove: Mutex::new(None),
        }
    }

    /// Ends the registration. Returns true if this call ran the cleanup.
    pub fn remove(&self) -> bool {
        let remove = match self.remove.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match remove {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.remove.lock().map(|g| g.is_some()).unwrap_or(false);
        f.debug_struct("ListenerRegistration")
            .field("active", &active)
            .finish()
    }
}

// =============================================================================
// Field & Blob Stores
// =============================================================================

/// Single-field operations on existing documents.
#[async_trait]
pub trait FieldStore: Send + Sync {
    /// Applies `op` to one field.
    ///
    /// ## Errors
    /// * `SyncError::DocumentNotFound` - The document does not exist
    async fn patch_field(&self, collection: &str, id: &str, field: &str, op: FieldOp)
        -> SyncResult<()>;

    /// Reads one field. `None` if the document or the field is missing.
    async fn get_field(&self, collection: &str, id: &str, field: &str)
        -> SyncResult<Option<Value>>;
}

/// Binary object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `path` and returns the download URL.
    async fn put_blob(&self, bytes: Vec<u8>, path: &str, content_type: &str) -> SyncResult<Url>;
}

/// Length of generated blob names, before the extension.
pub const BLOB_NAME_LEN: usize = 6;

/// Generates a short random lowercase hex file name, e.g. `3fa9c1.jpg`.
pub fn blob_file_name(extension: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{}.{}", &simple[..BLOB_NAME_LEN], extension.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_blob_file_name() {
        let name = blob_file_name("jpg");
        let (stem, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "jpg");
        assert_eq!(stem.len(), BLOB_NAME_LEN);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        assert!(blob_file_name(".png").ends_with(".png"));
        assert!(!blob_file_name(".png").contains(".."));
    }

    #[test]
    fn test_registration_removes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registration = ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(registration.remove());
        assert!(!registration.remove());
        drop(registration);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_drop_removes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        drop(ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!ListenerRegistration::noop().remove());
    }
}
