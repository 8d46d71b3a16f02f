//! # tether-core: Pure Identity & Document Types for Tether
//!
//! This crate holds the domain model shared by every other Tether crate.
//! It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tether Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Application / UI                             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   tether-sync: CredentialLinkEngine, DocumentSyncManager,       │   │
//! │  │                ListenerReconciler                               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tether-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌─────────────┐  ┌─────────────┐              │   │
//! │  │   │   types   │  │  document   │  │ validation  │              │   │
//! │  │   │ Principal │  │  Entity     │  │  email      │              │   │
//! │  │   │ Credential│  │  Listenable │  │  paths      │              │   │
//! │  │   └───────────┘  └─────────────┘  └─────────────┘              │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Principal, AccountRecord, Credential, AuthProvider, UserIntent
//! - [`document`] - Fields, DocumentSnapshot, Entity / Listenable codecs
//! - [`error`] - Domain error types
//! - [`validation`] - Credential and document path validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tether_core::{AccountRecord, AuthProvider, Principal};
//!
//! let record = AccountRecord {
//!     uid: "u-1".to_string(),
//!     display_name: Some("Ada Lovelace".to_string()),
//!     provider_ids: vec!["google.com".to_string()],
//!     ..Default::default()
//! };
//!
//! let principal = Principal::from(&record);
//! assert_eq!(principal.first_name, "Ada");
//! assert_eq!(principal.provider, AuthProvider::Google);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod document;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use document::{DocumentSnapshot, Entity, FieldOp, Fields, Listenable};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Minimum password length accepted for new accounts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Maximum length of a collection name, document id or field name (bytes).
pub const MAX_PATH_SEGMENT_LEN: usize = 1500;
