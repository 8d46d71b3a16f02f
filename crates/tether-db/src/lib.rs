//! # tether-db: Local Document Storage for Tether
//!
//! SQLite-backed document storage with sqlx async operations. This crate
//! backs `LocalDocumentStore` in tether-sync.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tether Data Flow                                 │
//! │                                                                         │
//! │  DocumentSyncManager ──► LocalDocumentStore (tether-sync)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tether-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌───────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations   │  │   │
//! │  │   │   (pool.rs)   │◄───│ DocumentRepo   │   │  (embedded)   │  │   │
//! │  │   │  SqlitePool   │    │                │   │ 001_documents │  │   │
//! │  │   └───────────────┘    └────────────────┘   └───────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (or :memory: in tests)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Document repository
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tether_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tether.db")).await?;
//! let doc = db.documents().get("users", "u-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, StoreLocation};
pub use repository::document::{DocumentRepository, StoredDocument};
