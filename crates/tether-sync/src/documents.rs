//! # Document Sync Manager
//!
//! Typed fetch / write / listen over an abstract [`DocumentStore`].
//!
//! ## Read Outcomes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fetch::<T>(collection, id)                                             │
//! │       │                                                                 │
//! │       ├── invalid path           ──► Err(Validation)   (no store call)  │
//! │       ├── store failure          ──► Err(Transport / Database / ...)    │
//! │       ├── document absent        ──► Ok(None)                           │
//! │       ├── present, decodes       ──► Ok(Some(entity))                   │
//! │       └── present, malformed     ──► Err(InvalidSnapshot)               │
//! │                                                                         │
//! │  fetch_all::<T>(collection) and listen_collection::<T> drop malformed   │
//! │  documents instead and keep arrival order.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes never touch the identity session.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::config::BlobSettings;
use crate::error::{SyncError, SyncResult};
use crate::listener::{decode_lossy, ListenerReconciler, Subscription};
use crate::local::LocalDocumentStore;
use crate::ports::{blob_file_name, BlobStore, DocumentStore, FieldStore};
use tether_core::validation::{validate_collection, validate_document_key, validate_field_name};
use tether_core::{Entity, FieldOp, Fields, Listenable};

/// Field holding a document's role names.
pub const ROLES_FIELD: &str = "roles";

const IMAGE_EXTENSION: &str = "jpg";
const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Generic document orchestration over the store ports.
#[derive(Clone)]
pub struct DocumentSyncManager {
    store: Arc<dyn DocumentStore>,
    field_store: Option<Arc<dyn FieldStore>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    blobs: BlobSettings,
    reconciler: ListenerReconciler,
}

impl DocumentSyncManager {
    /// Creates a manager with only a document store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        DocumentSyncManager {
            reconciler: ListenerReconciler::new(store.clone()),
            store,
            field_store: None,
            blob_store: None,
            blobs: BlobSettings::default(),
        }
    }

    /// Creates a manager backed by a local store for documents and fields.
    pub fn local(store: Arc<LocalDocumentStore>) -> Self {
        Self::new(store.clone()).with_field_store(store)
    }

    pub fn with_field_store(mut self, field_store: Arc<dyn FieldStore>) -> Self {
        self.field_store = Some(field_store);
        self
    }

    pub fn with_blob_store(mut self, blob_store: Arc<dyn BlobStore>, settings: BlobSettings) -> Self {
        self.blob_store = Some(blob_store);
        self.blobs = settings;
        self
    }

    pub fn reconciler(&self) -> &ListenerReconciler {
        &self.reconciler
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetches and decodes one document.
    ///
    /// ## Returns
    /// * `Ok(None)` - The document does not exist
    /// * `Err(SyncError::InvalidSnapshot)` - The document exists but does not decode
    pub async fn fetch<T: Entity>(&self, collection: &str, id: &str) -> SyncResult<Option<T>> {
        validate_document_key(collection, id)?;
        debug!(collection = %collection, id = %id, "Fetching document");

        let snapshot = self.store.get_document(collection, id).await?;
        if !snapshot.exists() {
            return Ok(None);
        }

        match T::from_snapshot(&snapshot) {
            Some(entity) => Ok(Some(entity)),
            None => {
                warn!(collection = %collection, id = %id, "Document failed to decode");
                Err(SyncError::invalid_snapshot(collection, id))
            }
        }
    }

    /// Like [`fetch`](Self::fetch), but an absent document is an error.
    pub async fn fetch_required<T: Entity>(&self, collection: &str, id: &str) -> SyncResult<T> {
        self.fetch(collection, id)
            .await?
            .ok_or_else(|| SyncError::not_found(collection, id))
    }

    /// Re-reads an entity by its own key.
    pub async fn refresh<T: Entity>(&self, entity: &T) -> SyncResult<Option<T>> {
        self.fetch(entity.collection(), entity.document_id()).await
    }

    /// Fetches every decodable document of a collection in arrival order.
    pub async fn fetch_all<T: Entity>(&self, collection: &str) -> SyncResult<Vec<T>> {
        validate_collection(collection)?;
        let snapshots = self.store.list_documents(collection).await?;
        Ok(decode_lossy(collection, &snapshots))
    }

    pub async fn exists(&self, collection: &str, id: &str) -> SyncResult<bool> {
        validate_document_key(collection, id)?;
        Ok(self.store.get_document(collection, id).await?.exists())
    }

    /// Reads one field of a document. `None` if the document or field is missing.
    pub async fn field<V: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        field: &str,
    ) -> SyncResult<Option<V>> {
        validate_document_key(collection, id)?;
        validate_field_name(field)?;

        let snapshot = self.store.get_document(collection, id).await?;
        match snapshot.get(field) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Returns true if no document in `collection` has `field == value`.
    ///
    /// The check is a plain query. Another writer may claim the value between
    /// this call and a following write.
    pub async fn is_field_value_unique(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> SyncResult<bool> {
        validate_collection(collection)?;
        validate_field_name(field)?;

        let matches = self.store.query(collection, field, value).await?;
        debug!(collection = %collection, field = %field, matches = matches.len(), "Uniqueness check");
        Ok(matches.is_empty())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Writes an entity under its own key.
    ///
    /// `merge = true` keeps remote fields the entity does not carry and
    /// merges nested maps; `merge = false` replaces the document.
    pub async fn write<T: Entity>(&self, entity: &T, merge: bool) -> SyncResult<()> {
        self.write_fields(
            entity.collection(),
            entity.document_id(),
            entity.to_fields(),
            merge,
        )
        .await
    }

    /// Replaces the document with the entity's fields.
    pub async fn replace<T: Entity>(&self, entity: &T) -> SyncResult<()> {
        self.write(entity, false).await
    }

    pub async fn write_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> SyncResult<()> {
        validate_document_key(collection, id)?;
        debug!(collection = %collection, id = %id, merge, "Writing document");
        self.store.set_document(collection, id, fields, merge).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> SyncResult<()> {
        validate_document_key(collection, id)?;
        debug!(collection = %collection, id = %id, "Deleting document");
        self.store.delete_document(collection, id).await
    }

    // =========================================================================
    // Field & Blob Glue
    // =========================================================================

    fn field_store(&self) -> SyncResult<&Arc<dyn FieldStore>> {
        self.field_store
            .as_ref()
            .ok_or_else(|| SyncError::InvalidConfig("no field store configured".to_string()))
    }

    /// Applies a single-field operation through the field store.
    pub async fn patch_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        op: FieldOp,
    ) -> SyncResult<()> {
        validate_document_key(collection, id)?;
        validate_field_name(field)?;
        self.field_store()?.patch_field(collection, id, field, op).await
    }

    /// Returns true if the document's `roles` array contains `role`.
    ///
    /// ## Errors
    /// * `SyncError::DocumentNotFound` - The document or its `roles` field is missing
    pub async fn has_role(&self, collection: &str, id: &str, role: &str) -> SyncResult<bool> {
        validate_document_key(collection, id)?;

        let roles = self
            .field_store()?
            .get_field(collection, id, ROLES_FIELD)
            .await?
            .ok_or_else(|| SyncError::not_found(collection, id))?;

        let roles: Vec<String> =
            serde_json::from_value(roles).map_err(|_| SyncError::invalid_snapshot(collection, id))?;
        Ok(roles.iter().any(|r| r == role))
    }

    /// Uploads JPEG bytes under the configured image directory.
    pub async fn upload_image(&self, bytes: Vec<u8>) -> SyncResult<Url> {
        let blob_store = self
            .blob_store
            .as_ref()
            .ok_or_else(|| SyncError::InvalidConfig("no blob store configured".to_string()))?;

        let path = format!(
            "{}/{}",
            self.blobs.image_directory.trim_end_matches('/'),
            blob_file_name(IMAGE_EXTENSION)
        );
        debug!(path = %path, size = bytes.len(), "Uploading image");
        blob_store.put_blob(bytes, &path, IMAGE_CONTENT_TYPE).await
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Subscribes to the document behind `entity`. See [`ListenerReconciler`].
    pub fn listen_document<T>(&self, entity: T) -> SyncResult<Subscription<T>>
    where
        T: Listenable + Clone + Send + 'static,
    {
        validate_document_key(entity.collection(), entity.document_id())?;
        Ok(self.reconciler.listen_document(entity))
    }

    /// Subscribes to a whole collection. See [`ListenerReconciler`].
    pub fn listen_collection<T>(&self, collection: &str) -> SyncResult<Subscription<Vec<T>>>
    where
        T: Entity + Send + 'static,
    {
        validate_collection(collection)?;
        Ok(self.reconciler.listen_collection(collection))
    }
}

impl std::fmt::Debug for DocumentSyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSyncManager")
            .field("field_store", &self.field_store.is_some())
            .field("blob_store", &self.blob_store.is_some())
            .field("blobs", &self.blobs)
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
