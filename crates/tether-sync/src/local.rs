//! # Local Document Store
//!
//! SQLite-backed implementation of [`DocumentStore`] and [`FieldStore`] with
//! in-process push notifications. It stands in for the remote store in tests,
//! the seed tool and embedded deployments.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      LocalDocumentStore                                 │
//! │                                                                         │
//! │  set / delete / patch_field                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────────── write lock (tokio Mutex) ─────────────────────┐  │
//! │  │  1. injected failure?  ──► Err(Transport)                         │  │
//! │  │  2. DocumentRepository (one SQLite transaction)                   │  │
//! │  │  3. re-read and push to matching watchers                         │  │
//! │  │       document watchers   ──► Ok(Some(snapshot))                  │  │
//! │  │       collection watchers ──► Ok(Some(all docs, insert order))    │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  subscribe_* registers the watcher at once; its initial snapshot is     │
//! │  sent from a task under the same lock. Watchers only receive change     │
//! │  notifications after their initial snapshot, so every watcher sees     │
//! │  states in commit order.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::ports::{
    CollectionEvent, DocumentEvent, DocumentStore, FieldStore, ListenerRegistration, RemoteFeed,
};
use tether_core::{DocumentSnapshot, FieldOp, Fields};
use tether_db::{Database, DbConfig, DocumentRepository};

// =============================================================================
// Watchers
// =============================================================================

struct DocumentWatcher {
    collection: String,
    id: String,
    primed: bool,
    tx: mpsc::UnboundedSender<DocumentEvent>,
}

struct CollectionWatcher {
    collection: String,
    primed: bool,
    tx: mpsc::UnboundedSender<CollectionEvent>,
}

#[derive(Default)]
struct Watchers {
    documents: HashMap<Uuid, DocumentWatcher>,
    collections: HashMap<Uuid, CollectionWatcher>,
}

struct Shared {
    write_lock: tokio::sync::Mutex<()>,
    watchers: Mutex<Watchers>,
    failures: AtomicUsize,
}

impl Shared {
    fn watchers(&self) -> MutexGuard<'_, Watchers> {
        self.watchers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// Store
// =============================================================================

/// Document store persisted in the local SQLite database.
#[derive(Clone)]
pub struct LocalDocumentStore {
    db: Database,
    shared: Arc<Shared>,
}

impl LocalDocumentStore {
    /// Wraps an open database.
    pub fn new(db: Database) -> Self {
        LocalDocumentStore {
            db,
            shared: Arc::new(Shared {
                write_lock: tokio::sync::Mutex::new(()),
                watchers: Mutex::new(Watchers::default()),
                failures: AtomicUsize::new(0),
            }),
        }
    }

    /// Opens a fresh in-memory store.
    pub async fn in_memory() -> SyncResult<Self> {
        let db = Database::new(DbConfig::in_memory()).await?;
        Ok(Self::new(db))
    }

    /// Opens the store described by the `[store]` config section.
    pub async fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn repo(&self) -> DocumentRepository {
        self.db.documents()
    }

    /// Makes the next `count` writes fail with `SyncError::Transport`
    /// without touching the database.
    pub fn fail_next_writes(&self, count: usize) {
        self.shared.failures.store(count, Ordering::SeqCst);
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        let watchers = self.shared.watchers();
        watchers.documents.len() + watchers.collections.len()
    }

    fn take_injected_failure(&self, collection: &str, id: &str) -> SyncResult<()> {
        let armed = self
            .shared
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            warn!(collection = %collection, id = %id, "Injected write failure");
            return Err(SyncError::Transport("injected write failure".to_string()));
        }
        Ok(())
    }

    /// Pushes the current state to every primed watcher of the key.
    ///
    /// Callers hold the write lock.
    async fn notify(&self, collection: &str, id: &str) {
        let (has_document, has_collection) = {
            let watchers = self.shared.watchers();
            (
                watchers
                    .documents
                    .values()
                    .any(|w| w.primed && w.collection == collection && w.id == id),
                watchers
                    .collections
                    .values()
                    .any(|w| w.primed && w.collection == collection),
            )
        };

        if has_document {
            let event: DocumentEvent = read_document(&self.repo(), collection, id).await.map(Some);
            self.shared.watchers().documents.retain(|watcher_id, w| {
                if !(w.primed && w.collection == collection && w.id == id) {
                    return true;
                }
                let alive = w.tx.send(event.clone()).is_ok();
                if !alive {
                    debug!(watcher_id = %watcher_id, "Pruning closed document watcher");
                }
                alive
            });
        }

        if has_collection {
            let event: CollectionEvent = read_collection(&self.repo(), collection).await.map(Some);
            self.shared.watchers().collections.retain(|watcher_id, w| {
                if !(w.primed && w.collection == collection) {
                    return true;
                }
                let alive = w.tx.send(event.clone()).is_ok();
                if !alive {
                    debug!(watcher_id = %watcher_id, "Pruning closed collection watcher");
                }
                alive
            });
        }
    }

    fn registration(&self, watcher_id: Uuid) -> ListenerRegistration {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        ListenerRegistration::new(move || {
            if let Some(shared) = shared.upgrade() {
                let mut watchers = shared.watchers();
                watchers.documents.remove(&watcher_id);
                watchers.collections.remove(&watcher_id);
                trace!(watcher_id = %watcher_id, "Watcher removed");
            }
        })
    }
}

impl std::fmt::Debug for LocalDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDocumentStore")
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

async fn read_document(
    repo: &DocumentRepository,
    collection: &str,
    id: &str,
) -> SyncResult<DocumentSnapshot> {
    Ok(match repo.get(collection, id).await? {
        Some(doc) => doc.into_snapshot(),
        None => DocumentSnapshot::missing(collection, id),
    })
}

async fn read_collection(
    repo: &DocumentRepository,
    collection: &str,
) -> SyncResult<Vec<DocumentSnapshot>> {
    Ok(repo
        .list(collection)
        .await?
        .into_iter()
        .map(|doc| doc.into_snapshot())
        .collect())
}

// =============================================================================
// DocumentStore
// =============================================================================

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> SyncResult<DocumentSnapshot> {
        read_document(&self.repo(), collection, id).await
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> SyncResult<()> {
        let _guard = self.shared.write_lock.lock().await;
        self.take_injected_failure(collection, id)?;

        self.repo().set(collection, id, fields, merge).await?;
        self.notify(collection, id).await;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> SyncResult<()> {
        let _guard = self.shared.write_lock.lock().await;
        self.take_injected_failure(collection, id)?;

        if self.repo().delete(collection, id).await? {
            self.notify(collection, id).await;
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> SyncResult<Vec<DocumentSnapshot>> {
        debug!(collection = %collection, field = %field, "Querying documents");
        Ok(self
            .repo()
            .find_by_field(collection, field, value)
            .await?
            .into_iter()
            .map(|doc| doc.into_snapshot())
            .collect())
    }

    async fn list_documents(&self, collection: &str) -> SyncResult<Vec<DocumentSnapshot>> {
        read_collection(&self.repo(), collection).await
    }

    fn subscribe_document(&self, collection: &str, id: &str) -> RemoteFeed<DocumentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher_id = Uuid::new_v4();

        self.shared.watchers().documents.insert(
            watcher_id,
            DocumentWatcher {
                collection: collection.to_string(),
                id: id.to_string(),
                primed: false,
                tx,
            },
        );
        debug!(watcher_id = %watcher_id, collection = %collection, id = %id, "Document watcher added");

        let shared = self.shared.clone();
        let repo = self.repo();
        let (collection, id) = (collection.to_string(), id.to_string());
        tokio::spawn(async move {
            let _guard = shared.write_lock.lock().await;
            let event = read_document(&repo, &collection, &id).await.map(Some);

            let mut watchers = shared.watchers();
            let delivered = match watchers.documents.get_mut(&watcher_id) {
                Some(w) => {
                    w.primed = w.tx.send(event).is_ok();
                    w.primed
                }
                None => return,
            };
            if !delivered {
                watchers.documents.remove(&watcher_id);
            }
        });

        RemoteFeed::new(rx, self.registration(watcher_id))
    }

    fn subscribe_collection(&self, collection: &str) -> RemoteFeed<CollectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher_id = Uuid::new_v4();

        self.shared.watchers().collections.insert(
            watcher_id,
            CollectionWatcher {
                collection: collection.to_string(),
                primed: false,
                tx,
            },
        );
        debug!(watcher_id = %watcher_id, collection = %collection, "Collection watcher added");

        let shared = self.shared.clone();
        let repo = self.repo();
        let collection = collection.to_string();
        tokio::spawn(async move {
            let _guard = shared.write_lock.lock().await;
            let event = read_collection(&repo, &collection).await.map(Some);

            let mut watchers = shared.watchers();
            let delivered = match watchers.collections.get_mut(&watcher_id) {
                Some(w) => {
                    w.primed = w.tx.send(event).is_ok();
                    w.primed
                }
                None => return,
            };
            if !delivered {
                watchers.collections.remove(&watcher_id);
            }
        });

        RemoteFeed::new(rx, self.registration(watcher_id))
    }
}

// =============================================================================
// FieldStore
// =============================================================================

#[async_trait]
impl FieldStore for LocalDocumentStore {
    async fn patch_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        op: FieldOp,
    ) -> SyncResult<()> {
        let _guard = self.shared.write_lock.lock().await;
        self.take_injected_failure(collection, id)?;

        self.repo().patch_field(collection, id, field, op).await?;
        self.notify(collection, id).await;
        Ok(())
    }

    async fn get_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
    ) -> SyncResult<Option<Value>> {
        Ok(self
            .repo()
            .get(collection, id)
            .await?
            .and_then(|doc| doc.fields.get(field).cloned()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn ids(snapshots: &[DocumentSnapshot]) -> Vec<&str> {
        snapshots.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_get_set_and_merge() {
        let store = LocalDocumentStore::in_memory().await.unwrap();

        let absent = store.get_document("profiles", "u1").await.unwrap();
        assert!(!absent.exists());

        store
            .set_document("profiles", "u1", fields(json!({"name": "Ada", "prefs": {"a": 1}})), false)
            .await
            .unwrap();
        store
            .set_document("profiles", "u1", fields(json!({"prefs": {"b": 2}})), true)
            .await
            .unwrap();

        let doc = store.get_document("profiles", "u1").await.unwrap();
        assert_eq!(doc.get("name"), Some(&json!("Ada")));
        assert_eq!(doc.get("prefs"), Some(&json!({"a": 1, "b": 2})));

        store
            .set_document("profiles", "u1", fields(json!({"name": "Grace"})), false)
            .await
            .unwrap();
        let doc = store.get_document("profiles", "u1").await.unwrap();
        assert_eq!(doc.fields().unwrap(), &fields(json!({"name": "Grace"})));
    }

    #[tokio::test]
    async fn test_list_keeps_first_insert_order() {
        let store = LocalDocumentStore::in_memory().await.unwrap();
        for id in ["c", "a", "b"] {
            store
                .set_document("stations", id, fields(json!({"open": true})), false)
                .await
                .unwrap();
        }
        store
            .set_document("stations", "c", fields(json!({"open": false})), true)
            .await
            .unwrap();

        let docs = store.list_documents("stations").await.unwrap();
        assert_eq!(ids(&docs), vec!["c", "a", "b"]);

        let closed = store
            .query("stations", "open", &json!(false))
            .await
            .unwrap();
        assert_eq!(ids(&closed), vec!["c"]);
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let store = LocalDocumentStore::in_memory().await.unwrap();
        store.delete_document("stations", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_document_watcher_sees_changes_in_order() {
        let store = LocalDocumentStore::in_memory().await.unwrap();
        let mut feed = store.subscribe_document("profiles", "u1");

        let initial = feed.events.recv().await.unwrap().unwrap().unwrap();
        assert!(!initial.exists());

        store
            .set_document("profiles", "u1", fields(json!({"name": "Ada"})), false)
            .await
            .unwrap();
        store
            .set_document("profiles", "other", fields(json!({"name": "Bob"})), false)
            .await
            .unwrap();
        store.delete_document("profiles", "u1").await.unwrap();

        let written = feed.events.recv().await.unwrap().unwrap().unwrap();
        assert_eq!(written.get("name"), Some(&json!("Ada")));
        let deleted = feed.events.recv().await.unwrap().unwrap().unwrap();
        assert!(!deleted.exists());
        assert!(feed.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_collection_watcher_gets_full_contents() {
        let store = LocalDocumentStore::in_memory().await.unwrap();
        let mut feed = store.subscribe_collection("stations");

        assert!(feed.events.recv().await.unwrap().unwrap().unwrap().is_empty());

        for id in ["a", "b"] {
            store
                .set_document("stations", id, fields(json!({"open": true})), false)
                .await
                .unwrap();
        }
        store.delete_document("stations", "b").await.unwrap();

        let first = feed.events.recv().await.unwrap().unwrap().unwrap();
        assert_eq!(ids(&first), vec!["a"]);
        let second = feed.events.recv().await.unwrap().unwrap().unwrap();
        assert_eq!(ids(&second), vec!["a", "b"]);
        let third = feed.events.recv().await.unwrap().unwrap().unwrap();
        assert_eq!(ids(&third), vec!["a"]);
    }

    #[tokio::test]
    async fn test_registration_removes_watcher() {
        let store = LocalDocumentStore::in_memory().await.unwrap();
        let doc_feed = store.subscribe_document("profiles", "u1");
        let col_feed = store.subscribe_collection("profiles");
        assert_eq!(store.watcher_count(), 2);

        assert!(doc_feed.registration.remove());
        assert_eq!(store.watcher_count(), 1);

        drop(col_feed);
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_skips_write_and_notifications() {
        let store = LocalDocumentStore::in_memory().await.unwrap();
        let mut feed = store.subscribe_collection("profiles");
        feed.events.recv().await.unwrap().unwrap();

        store.fail_next_writes(1);
        let err = store
            .set_document("profiles", "u1", fields(json!({"name": "Ada"})), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert!(err.is_retryable());
        assert!(!store.get_document("profiles", "u1").await.unwrap().exists());
        assert!(feed.events.try_recv().is_err());

        store
            .set_document("profiles", "u1", fields(json!({"name": "Ada"})), false)
            .await
            .unwrap();
        assert_eq!(feed.events.recv().await.unwrap().unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_field_store() {
        let store = LocalDocumentStore::in_memory().await.unwrap();

        let err = store
            .patch_field("stations", "grill", "chefs", FieldOp::ArrayUnion(json!("u1")))
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::not_found("stations", "grill"));

        store
            .set_document("stations", "grill", fields(json!({"name": "Grill"})), false)
            .await
            .unwrap();
        for op in [
            FieldOp::ArrayUnion(json!("u1")),
            FieldOp::ArrayUnion(json!("u2")),
            FieldOp::ArrayUnion(json!("u1")),
            FieldOp::ArrayRemove(json!("u2")),
        ] {
            store.patch_field("stations", "grill", "chefs", op).await.unwrap();
        }

        assert_eq!(
            store.get_field("stations", "grill", "chefs").await.unwrap(),
            Some(json!(["u1"]))
        );
        assert_eq!(store.get_field("stations", "grill", "missing").await.unwrap(), None);
        assert_eq!(store.get_field("stations", "none", "chefs").await.unwrap(), None);
    }
}
