//! # Validation Module
//!
//! Input validation run before any remote call.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller / UI                                                  │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Credential shape (email format, password length)                  │
//! │  └── Document paths (collection, id, field names)                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote service                                               │
//! │  └── Authoritative checks (wrong password, taken email, ...)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tether_core::validation::{validate_collection, validate_email};
//!
//! validate_email("chef@example.com").unwrap();
//! validate_collection("users").unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_PATH_SEGMENT_LEN, MIN_PASSWORD_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Credential Validators
// =============================================================================

/// Validates an email address.
///
/// ## Rules
/// - Must not be empty
/// - Exactly one `@` with a non-empty local part
/// - Domain contains a dot and no whitespace
///
/// ## Example
/// ```rust
/// use tether_core::validation::validate_email;
///
/// assert!(validate_email("x@y.com").is_ok());
/// assert!(validate_email("x@y").is_err());
/// assert!(validate_email("").is_err());
/// ```
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::Required {
            field: "email".to_string(),
        });
    }

    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: reason.to_string(),
    };

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| invalid("missing '@'"))?;

    if local.is_empty() || domain.contains('@') {
        return Err(invalid("must contain exactly one '@' after a local part"));
    }

    if email.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }

    match domain.split_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() && !domain.ends_with('.') => {
            Ok(())
        }
        _ => Err(invalid("domain must look like example.com")),
    }
}

/// Validates a password for account creation.
///
/// ## Rules
/// - At least MIN_PASSWORD_LEN (6) characters
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "password".to_string(),
        });
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: MIN_PASSWORD_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Document Path Validators
// =============================================================================

fn validate_segment(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_PATH_SEGMENT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_PATH_SEGMENT_LEN,
        });
    }

    if value.contains('/') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain '/'".to_string(),
        });
    }

    Ok(())
}

/// Validates a collection name.
pub fn validate_collection(collection: &str) -> ValidationResult<()> {
    validate_segment("collection", collection)
}

/// Validates a document id.
pub fn validate_document_id(id: &str) -> ValidationResult<()> {
    validate_segment("document id", id)
}

/// Validates a field name.
pub fn validate_field_name(field: &str) -> ValidationResult<()> {
    validate_segment("field", field)
}

/// Validates a full `(collection, id)` document key.
pub fn validate_document_key(collection: &str, id: &str) -> ValidationResult<()> {
    validate_collection(collection)?;
    validate_document_id(id)
}

// =============================================================================
// Unit Tests
// =============================================================================
