//! # tether-sync: Identity Linking & Document Sync for Tether
//!
//! This crate drives the identity service and the document store: it decides
//! whether a credential links to the current anonymous account or signs in,
//! and it maps untyped documents to typed entities, including live updates.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tether Sync Architecture                         │
//! │                                                                         │
//! │  caller ──► CredentialLinkEngine ──► IdentityService (port)            │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │             IdentitySession (watch channel, single writer)              │
//! │                                                                         │
//! │  caller ──► DocumentSyncManager ──► DocumentStore / FieldStore /       │
//! │                   │                 BlobStore (ports)                   │
//! │                   ▼                       │                             │
//! │             ListenerReconciler ◄──────────┘ RemoteFeed (push events)    │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │             Subscription<T> ──► Stream / next() / deliver_on(context)   │
//! │                                                                         │
//! │  LOCAL IMPLEMENTATIONS:                                                │
//! │  • LocalDocumentStore   - SQLite via tether-db, in-process watchers    │
//! │  • LocalIdentityService - in-memory identity emulator                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`auth`] - `CredentialLinkEngine` (link / sign in / fall back)
//! - [`session`] - `IdentitySession`, the current principal
//! - [`documents`] - `DocumentSyncManager`, typed fetch / write / listen
//! - [`listener`] - `ListenerReconciler`, `Subscription`, `DeliveryContext`
//! - [`ports`] - Service traits the engine and manager talk to
//! - [`local`] - SQLite-backed `LocalDocumentStore`
//! - [`emulator`] - In-memory `LocalIdentityService`
//! - [`config`] - `SyncConfig` (TOML file + `TETHER_*` env overrides)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_sync::{
//!     CredentialLinkEngine, DocumentSyncManager, LocalDocumentStore, LocalIdentityService,
//!     SyncConfig,
//! };
//!
//! let config = SyncConfig::load_or_default(None);
//!
//! let engine = CredentialLinkEngine::new(Arc::new(LocalIdentityService::new()), config.session.clone());
//! let guest = engine.authenticate().await?;          // anonymous
//! let user = engine.process_google(id_token, access_token).await?;
//! assert_eq!(guest.id, user.id);                      // upgraded in place
//!
//! let store = Arc::new(LocalDocumentStore::from_config(&config).await?);
//! let documents = DocumentSyncManager::local(store);
//! let mut stations = documents.listen_collection::<Station>("stations")?;
//! while let Some(event) = stations.next().await {
//!     println!("{:?}", event?.len());
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod documents;
pub mod emulator;
pub mod error;
pub mod listener;
pub mod local;
pub mod ports;
pub mod session;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::CredentialLinkEngine;
pub use config::{BlobSettings, ListenerSettings, SessionSettings, StoreSettings, SyncConfig};
pub use documents::DocumentSyncManager;
pub use emulator::LocalIdentityService;
pub use error::{SyncError, SyncResult};
pub use listener::{
    DeliveryContext, ListenerReconciler, Subscription, SubscriptionHandle, SubscriptionState,
};
pub use local::LocalDocumentStore;
pub use ports::{
    BlobStore, CollectionEvent, DocumentEvent, DocumentStore, FieldStore, IdentityService,
    ListenerRegistration, RemoteFeed,
};
pub use session::IdentitySession;
