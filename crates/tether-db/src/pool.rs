//! # Database Handle
//!
//! Opens the SQLite pool behind the local document store.
//!
//! ## Opening
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Database::new(config)                           │
//! │                                                                         │
//! │  StoreLocation::File(path)             StoreLocation::Memory            │
//! │       │                                      │                          │
//! │       ▼                                      ▼                          │
//! │  create file if missing               sqlite::memory:                   │
//! │  WAL journal, NORMAL sync             exactly one connection, never     │
//! │  busy timeout                         idled out or recycled             │
//! │       │                                      │                          │
//! │       └──────────────────┬───────────────────┘                          │
//! │                          ▼                                              │
//! │              embedded migrations (unless disabled)                      │
//! │                          │                                              │
//! │                          ▼                                              │
//! │              db.documents() ──► DocumentRepository                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An in-memory database lives exactly as long as its single connection, so
//! the pool is pinned to it.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::document::DocumentRepository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A database file, created on first open.
    File(PathBuf),
    /// A private in-memory database.
    Memory,
}

impl StoreLocation {
    /// Maps the path `:memory:` to [`StoreLocation::Memory`].
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.as_os_str() == MEMORY_PATH {
            StoreLocation::Memory
        } else {
            StoreLocation::File(path.to_path_buf())
        }
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLocation::File(path) => write!(f, "{}", path.display()),
            StoreLocation::Memory => f.write_str(MEMORY_PATH),
        }
    }
}

/// Options for opening a [`Database`].
///
/// ```rust,ignore
/// let config = DbConfig::new("kitchen.db").max_connections(4);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: StoreLocation,
    /// Pool size for file databases. In-memory databases always use one.
    pub max_connections: u32,
    /// How long to wait for a free pooled connection.
    pub acquire_timeout: Duration,
    /// How long SQLite waits on a locked file before giving up.
    pub busy_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    /// Configuration for a database at `path` (`:memory:` selects memory).
    pub fn new(path: impl AsRef<Path>) -> Self {
        DbConfig {
            location: StoreLocation::from_path(path),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        DbConfig {
            location: StoreLocation::Memory,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.location == StoreLocation::Memory
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = match &self.location {
            StoreLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
            StoreLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
        };
        Ok(options.busy_timeout(self.busy_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new().acquire_timeout(self.acquire_timeout);
        if self.is_in_memory() {
            options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options.max_connections(self.max_connections.max(1))
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Pooled handle to the document database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the database and, unless disabled, applies pending migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(location = %config.location, "Opening document database");

        let connect_options = config.connect_options()?;
        let pool = config
            .pool_options()
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(
            in_memory = config.is_in_memory(),
            max_connections = config.max_connections,
            "Pool ready"
        );

        let db = Database { pool };
        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Repository over the `documents` table.
    pub fn documents(&self) -> DocumentRepository {
        DocumentRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        info!("Closing document database");
        self.pool.close().await;
    }

    /// Returns true if a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
        assert_eq!(db.documents().count("anything").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unmigrated_database_has_no_documents_table() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();
        assert!(db.documents().count("anything").await.is_err());
    }

    #[test]
    fn test_location_from_path() {
        assert!(DbConfig::new(":memory:").is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());

        let config = DbConfig::new("/tmp/tether.db").max_connections(8);
        assert_eq!(config.location, StoreLocation::File(PathBuf::from("/tmp/tether.db")));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.location.to_string(), "/tmp/tether.db");
    }
}
