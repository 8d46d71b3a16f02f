//! # Identity Types
//!
//! Core identity types used throughout Tether.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Identity Types                                  │
//! │                                                                         │
//! │  ┌─────────────────┐   Principal::from   ┌─────────────────┐           │
//! │  │  AccountRecord  │ ──────────────────► │    Principal    │           │
//! │  │  ─────────────  │                     │  ─────────────  │           │
//! │  │  uid            │                     │  id             │           │
//! │  │  display_name   │   split on first    │  first_name     │           │
//! │  │                 │ ─── space ────────► │  last_name      │           │
//! │  │  provider_ids[] │   first record ───► │  provider       │           │
//! │  └─────────────────┘                     └─────────────────┘           │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Credential    │   │  AuthProvider   │   │   UserIntent    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  EmailPassword  │   │  Anonymous      │   │  NewUser        │       │
//! │  │  GoogleToken    │   │  Email          │   │  ReturningUser  │       │
//! │  │  AppleToken     │   │  Google / Apple │   └─────────────────┘       │
//! │  └─────────────────┘   │  Unknown        │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// =============================================================================
// Auth Provider
// =============================================================================

/// The identity provider an account was authenticated with.
///
/// Provider ids reported by the identity service are untyped strings; they
/// are mapped onto this closed set by [`AuthProvider::from_provider_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    /// Anonymous (guest) account.
    Anonymous,
    /// Email and password.
    Email,
    /// Google federated sign-in.
    Google,
    /// Sign in with Apple.
    Apple,
    /// Any provider id this crate does not recognize.
    #[default]
    Unknown,
}

impl AuthProvider {
    /// Maps a provider id string to a provider. Unmatched ids map to `Unknown`.
    pub fn from_provider_id(provider_id: &str) -> Self {
        match provider_id {
            "anonymous" => AuthProvider::Anonymous,
            "email" => AuthProvider::Email,
            "google.com" => AuthProvider::Google,
            "apple.com" => AuthProvider::Apple,
            _ => AuthProvider::Unknown,
        }
    }

    /// The provider id string the identity service uses for this provider.
    pub fn provider_id(&self) -> &'static str {
        match self {
            AuthProvider::Anonymous => "anonymous",
            AuthProvider::Email => "email",
            AuthProvider::Google => "google.com",
            AuthProvider::Apple => "apple.com",
            AuthProvider::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.provider_id())
    }
}

// =============================================================================
// Account Record
// =============================================================================

/// Raw account data as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Opaque account identifier.
    pub uid: String,

    /// Account email, if any.
    pub email: Option<String>,

    /// Full display name, if any.
    pub display_name: Option<String>,

    /// Avatar URL, if any.
    pub photo_url: Option<String>,

    /// Whether this is an anonymous (guest) account.
    pub is_anonymous: bool,

    /// Provider ids linked to the account, in service order.
    #[serde(default)]
    pub provider_ids: Vec<String>,
}

// =============================================================================
// Principal
// =============================================================================

/// The authenticated (or anonymous) identity produced by an auth operation.
///
/// A principal is never mutated. Every state change produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable account identifier.
    pub id: String,

    /// Account email, if any.
    pub email: Option<String>,

    /// Display name up to the first space (empty if unavailable).
    pub first_name: String,

    /// Display name after the first space (empty if unavailable).
    pub last_name: String,

    /// Avatar URL, if any.
    pub avatar_url: Option<String>,

    /// Whether the account is anonymous.
    pub is_anonymous: bool,

    /// Provider of the first provider record, `Unknown` if there is none.
    pub provider: AuthProvider,
}

impl Principal {
    /// Returns true if this principal is a guest that can be upgraded by linking.
    #[inline]
    pub fn can_link(&self) -> bool {
        self.is_anonymous
    }

    /// Returns "first last", trimmed.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl From<&AccountRecord> for Principal {
    fn from(record: &AccountRecord) -> Self {
        let (first_name, last_name) = record
            .display_name
            .as_deref()
            .map(split_display_name)
            .unwrap_or_default();

        // Only the first record counts, even when a later one would resolve.
        let provider = record
            .provider_ids
            .first()
            .map(|id| AuthProvider::from_provider_id(id))
            .unwrap_or_default();

        Principal {
            id: record.uid.clone(),
            email: record.email.clone(),
            first_name,
            last_name,
            avatar_url: record.photo_url.clone(),
            is_anonymous: record.is_anonymous,
            provider,
        }
    }
}

impl From<AccountRecord> for Principal {
    fn from(record: AccountRecord) -> Self {
        Principal::from(&record)
    }
}

/// Splits a display name on its first space.
///
/// ## Example
/// ```rust
/// use tether_core::types::split_display_name;
///
/// assert_eq!(split_display_name("Ada Lovelace"), ("Ada".to_string(), "Lovelace".to_string()));
/// assert_eq!(split_display_name("Cher"), ("Cher".to_string(), String::new()));
/// ```
pub fn split_display_name(display_name: &str) -> (String, String) {
    match display_name.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.to_string()),
        None => (display_name.to_string(), String::new()),
    }
}

// =============================================================================
// Credential
// =============================================================================

/// Proof of identity supplied for one auth attempt.
///
/// `Debug` output never includes passwords, tokens or nonces.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Email and password.
    EmailPassword { email: String, password: String },
    /// Google id token plus OAuth access token.
    GoogleToken {
        id_token: String,
        access_token: String,
    },
    /// Apple identity token plus the raw nonce used to request it.
    AppleToken { id_token: String, nonce: String },
}

impl Credential {
    /// Creates an email/password credential.
    pub fn email(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::EmailPassword {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Creates a Google credential.
    pub fn google(id_token: impl Into<String>, access_token: impl Into<String>) -> Self {
        Credential::GoogleToken {
            id_token: id_token.into(),
            access_token: access_token.into(),
        }
    }

    /// Creates an Apple credential.
    pub fn apple(id_token: impl Into<String>, nonce: impl Into<String>) -> Self {
        Credential::AppleToken {
            id_token: id_token.into(),
            nonce: nonce.into(),
        }
    }

    /// The provider this credential authenticates against.
    pub fn provider(&self) -> AuthProvider {
        match self {
            Credential::EmailPassword { .. } => AuthProvider::Email,
            Credential::GoogleToken { .. } => AuthProvider::Google,
            Credential::AppleToken { .. } => AuthProvider::Apple,
        }
    }

    /// Returns the email for email credentials.
    pub fn email_address(&self) -> Option<&str> {
        match self {
            Credential::EmailPassword { email, .. } => Some(email),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::EmailPassword { email, .. } => f
                .debug_struct("EmailPassword")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            Credential::GoogleToken { .. } => f
                .debug_struct("GoogleToken")
                .field("id_token", &"<redacted>")
                .field("access_token", &"<redacted>")
                .finish(),
            Credential::AppleToken { .. } => f
                .debug_struct("AppleToken")
                .field("id_token", &"<redacted>")
                .field("nonce", &"<redacted>")
                .finish(),
        }
    }
}

// =============================================================================
// User Intent
// =============================================================================

/// What the caller means by an email sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    /// Create a new account.
    NewUser,
    /// Sign in to an existing account.
    ReturningUser,
}

impl std::fmt::Display for UserIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserIntent::NewUser => write!(f, "New User"),
            UserIntent::ReturningUser => write!(f, "Returning User"),
        }
    }
}

impl std::str::FromStr for UserIntent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" | "new_user" | "new user" => Ok(UserIntent::NewUser),
            "returning" | "returning_user" | "returning user" => Ok(UserIntent::ReturningUser),
            _ => Err(ValidationError::NotAllowed {
                field: "intent".to_string(),
                allowed: vec!["new_user".to_string(), "returning_user".to_string()],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(display_name: Option<&str>, provider_ids: &[&str]) -> AccountRecord {
        AccountRecord {
            uid: "u-1".to_string(),
            email: Some("ada@example.com".to_string()),
            display_name: display_name.map(str::to_string),
            photo_url: None,
            is_anonymous: false,
            provider_ids: provider_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_provider_mapping() {
        assert_eq!(AuthProvider::from_provider_id("anonymous"), AuthProvider::Anonymous);
        assert_eq!(AuthProvider::from_provider_id("email"), AuthProvider::Email);
        assert_eq!(AuthProvider::from_provider_id("google.com"), AuthProvider::Google);
        assert_eq!(AuthProvider::from_provider_id("apple.com"), AuthProvider::Apple);
        assert_eq!(AuthProvider::from_provider_id("github.com"), AuthProvider::Unknown);
        assert_eq!(AuthProvider::from_provider_id(""), AuthProvider::Unknown);
    }

    #[test]
    fn test_provider_round_trips_through_id() {
        for provider in [
            AuthProvider::Anonymous,
            AuthProvider::Email,
            AuthProvider::Google,
            AuthProvider::Apple,
        ] {
            assert_eq!(AuthProvider::from_provider_id(provider.provider_id()), provider);
        }
    }

    #[test]
    fn test_principal_name_split() {
        let p = Principal::from(&record(Some("Ada King Lovelace"), &["email"]));
        assert_eq!(p.first_name, "Ada");
        assert_eq!(p.last_name, "King Lovelace");
        assert_eq!(p.display_name(), "Ada King Lovelace");

        let p = Principal::from(&record(None, &["email"]));
        assert_eq!(p.first_name, "");
        assert_eq!(p.last_name, "");
    }

    #[test]
    fn test_principal_provider_uses_first_record() {
        let p = Principal::from(&record(None, &["google.com", "email"]));
        assert_eq!(p.provider, AuthProvider::Google);

        // First record wins even when unknown
        let p = Principal::from(&record(None, &["github.com", "apple.com"]));
        assert_eq!(p.provider, AuthProvider::Unknown);

        let p = Principal::from(&record(None, &[]));
        assert_eq!(p.provider, AuthProvider::Unknown);
    }

    #[test]
    fn test_anonymous_account_without_records() {
        let rec = AccountRecord {
            uid: "a1".to_string(),
            is_anonymous: true,
            ..Default::default()
        };
        let p = Principal::from(rec);
        assert!(p.is_anonymous);
        assert!(p.can_link());
        assert_eq!(p.provider, AuthProvider::Unknown);
    }

    #[test]
    fn test_credential_debug_redacts_secrets() {
        let cred = Credential::email("x@y.com", "hunter2");
        let out = format!("{:?}", cred);
        assert!(out.contains("x@y.com"));
        assert!(!out.contains("hunter2"));

        let out = format!("{:?}", Credential::google("id-tok", "acc-tok"));
        assert!(!out.contains("id-tok"));
        assert!(!out.contains("acc-tok"));
    }

    #[test]
    fn test_credential_provider() {
        assert_eq!(Credential::email("a@b.co", "pw").provider(), AuthProvider::Email);
        assert_eq!(Credential::google("i", "a").provider(), AuthProvider::Google);
        assert_eq!(Credential::apple("i", "n").provider(), AuthProvider::Apple);
    }

    #[test]
    fn test_intent_parsing() {
        assert_eq!("new".parse::<UserIntent>().unwrap(), UserIntent::NewUser);
        assert_eq!("New User".parse::<UserIntent>().unwrap(), UserIntent::NewUser);
        assert_eq!(
            "returning_user".parse::<UserIntent>().unwrap(),
            UserIntent::ReturningUser
        );
        assert!("guest".parse::<UserIntent>().is_err());
    }
}
