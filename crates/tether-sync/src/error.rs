//! # Sync Error Types
//!
//! Error types for identity and document operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────┐  ┌─────────────────────┐ │
//! │  │  Identity           │  │   Documents     │  │  Transport          │ │
//! │  │                     │  │                 │  │                     │ │
//! │  │  NoCurrentUser      │  │  DocumentNot    │  │  Transport          │ │
//! │  │  CredentialAlready  │  │    Found        │  │  Unknown            │ │
//! │  │    InUse            │  │  InvalidSnapshot│  │  ChannelError       │ │
//! │  │  InvalidCredential  │  │  Validation     │  │                     │ │
//! │  │  AccountNotFound    │  │  Serialization  │  │                     │ │
//! │  └─────────────────────┘  └─────────────────┘  └─────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────────────────────────────┐  │
//! │  │  Configuration      │  │  Database                               │  │
//! │  │                     │  │                                         │  │
//! │  │  InvalidConfig      │  │  Database (local store, from DbError)   │  │
//! │  │  ConfigLoadFailed   │  │                                         │  │
//! │  │  ConfigSaveFailed   │  │                                         │  │
//! │  └─────────────────────┘  └─────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every fallible operation in this crate returns [`SyncResult`].

use thiserror::Error;

use tether_core::{CoreError, ValidationError};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering identity, document and configuration failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    // =========================================================================
    // Identity Errors
    // =========================================================================
    /// An operation needed a signed-in principal and there is none.
    #[error("No user is signed in")]
    NoCurrentUser,

    /// The credential already belongs to another account.
    ///
    /// ## When This Occurs
    /// - Linking a credential to an anonymous account when the credential
    ///   was used before. The engine falls back to signing in with it.
    #[error("Credential is already in use by another account")]
    CredentialAlreadyInUse,

    /// The identity service rejected the credential (wrong password, bad token).
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The identity service has no account for the credential.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    // =========================================================================
    // Document Errors
    // =========================================================================
    /// The document does not exist.
    #[error("Document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    /// The document exists but its fields do not decode.
    #[error("Invalid snapshot for {collection}/{id}")]
    InvalidSnapshot { collection: String, id: String },

    /// Input rejected before any remote call.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Fields could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The remote service could not be reached or failed mid-call.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service failed for an unclassified reason.
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// Local store failure.
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl SyncError {
    /// Creates a DocumentNotFound error for a document key.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::DocumentNotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidSnapshot error for a document key.
    pub fn invalid_snapshot(collection: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::InvalidSnapshot {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<tether_db::DbError> for SyncError {
    fn from(err: tether_db::DbError) -> Self {
        match err {
            tether_db::DbError::NotFound { collection, id } => {
                SyncError::DocumentNotFound { collection, id }
            }
            other => SyncError::Database(other.to_string()),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Decode { collection, id, .. } => {
                SyncError::InvalidSnapshot { collection, id }
            }
            CoreError::Validation(v) => SyncError::Validation(v),
            other => SyncError::Serialization(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Transport(format!("invalid URL: {err}"))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the failure is transport-class and the caller may retry.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Database(_) | SyncError::ChannelError(_)
        )
    }

    /// Returns true if this error came from the identity service.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::NoCurrentUser
                | SyncError::CredentialAlreadyInUse
                | SyncError::InvalidCredential(_)
                | SyncError::AccountNotFound(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
