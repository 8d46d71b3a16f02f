//! # Error Types
//!
//! Domain-specific error types for tether-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tether-core errors (this file)                                        │
//! │  ├── CoreError        - Document mapping / patch failures              │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tether-db errors (separate crate)                                     │
//! │  └── DbError          - Local storage failures                         │
//! │                                                                         │
//! │  tether-sync errors (separate crate)                                   │
//! │  └── SyncError        - What callers see (auth + sync taxonomy)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → Caller      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Document mapping and field manipulation errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A document exists but its fields cannot be mapped to the target type.
    ///
    /// ## When This Occurs
    /// - A required field is missing
    /// - A field holds a value of the wrong JSON type
    /// - The serde bridge rejected the mapping
    #[error("Cannot decode {collection}/{id}: {reason}")]
    Decode {
        collection: String,
        id: String,
        reason: String,
    },

    /// A value could not be turned into a field mapping.
    #[error("Cannot encode value: {0}")]
    Encode(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any remote call runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., malformed email, path separator in an id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
