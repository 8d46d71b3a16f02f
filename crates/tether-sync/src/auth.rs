//! # Credential Link Engine
//!
//! Decides, for every credential, whether to upgrade the anonymous account
//! by linking or to sign in directly, and keeps the [`IdentitySession`] in
//! step with the identity service.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    process(credential, intent)                          │
//! │                                                                         │
//! │  session principal anonymous?                                          │
//! │       │                                                                 │
//! │       ├── YES ──► link_credential(c)     (intent ignored)              │
//! │       │              │                                                  │
//! │       │              ├── Ok ───────────────► replace session            │
//! │       │              ├── CredentialAlreadyInUse                         │
//! │       │              │      └──► sign_in(c) ─► replace session          │
//! │       │              │           (anonymous account abandoned)          │
//! │       │              └── other error ──────► propagate unchanged        │
//! │       │                                                                 │
//! │       └── NO (empty or signed in)                                      │
//! │              ├── Email + NewUser ──────► create_account(email, pw)     │
//! │              ├── Email + ReturningUser ► sign_in(c)                    │
//! │              │      └── CredentialAlreadyInUse ► sign_in(c) once more   │
//! │              └── anything else ────────► sign_in(c)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identity errors are never retried except for the single fallback above.
//! The session is only written after the service call succeeds, so a failed
//! call leaves it untouched.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SessionSettings;
use crate::error::{SyncError, SyncResult};
use crate::ports::IdentityService;
use crate::session::IdentitySession;
use tether_core::validation::{validate_email, validate_password};
use tether_core::{AccountRecord, Credential, Principal, UserIntent};

/// Drives sign-in, linking and account lifecycle against an [`IdentityService`].
pub struct CredentialLinkEngine {
    service: Arc<dyn IdentityService>,
    session: Arc<IdentitySession>,
    settings: SessionSettings,
}

impl CredentialLinkEngine {
    /// Creates an engine with a fresh, empty session.
    pub fn new(service: Arc<dyn IdentityService>, settings: SessionSettings) -> Self {
        Self::with_session(service, Arc::new(IdentitySession::new()), settings)
    }

    /// Creates an engine over an existing session.
    pub fn with_session(
        service: Arc<dyn IdentityService>,
        session: Arc<IdentitySession>,
        settings: SessionSettings,
    ) -> Self {
        CredentialLinkEngine {
            service,
            session,
            settings,
        }
    }

    /// The session this engine writes.
    pub fn session(&self) -> &Arc<IdentitySession> {
        &self.session
    }

    /// The current principal, if any.
    pub fn current_principal(&self) -> Option<Principal> {
        self.session.current()
    }

    // =========================================================================
    // Decision Engine
    // =========================================================================

    /// Authenticates with `credential`, linking it to the anonymous account
    /// when there is one.
    ///
    /// `intent` only matters for email credentials without an anonymous session.
    pub async fn process(
        &self,
        credential: Credential,
        intent: Option<UserIntent>,
    ) -> SyncResult<Principal> {
        if self.session.is_anonymous() {
            if intent.is_some() {
                debug!(?intent, "Anonymous session, ignoring intent and linking");
            }
            return self.link_or_sign_in(&credential).await;
        }

        match (&credential, intent) {
            (Credential::EmailPassword { email, password }, Some(UserIntent::NewUser)) => {
                self.create_account(email, password).await
            }
            (Credential::EmailPassword { .. }, Some(UserIntent::ReturningUser)) => {
                match self.sign_in_with_credential(&credential).await {
                    Err(SyncError::CredentialAlreadyInUse) => {
                        warn!("Credential in use by another account, signing in directly");
                        self.sign_in_with_credential(&credential).await
                    }
                    result => result,
                }
            }
            _ => self.sign_in_with_credential(&credential).await,
        }
    }

    async fn link_or_sign_in(&self, credential: &Credential) -> SyncResult<Principal> {
        match self.link_credential(credential).await {
            Err(SyncError::CredentialAlreadyInUse) => {
                warn!(
                    provider = %credential.provider(),
                    "Credential already linked elsewhere, abandoning anonymous account"
                );
                self.sign_in_with_credential(credential).await
            }
            result => result,
        }
    }

    // =========================================================================
    // Primitive Operations
    // =========================================================================

    /// Links `credential` to the signed-in account.
    ///
    /// ## Errors
    /// * `SyncError::NoCurrentUser` - The session is empty
    /// * `SyncError::CredentialAlreadyInUse` - Returned as-is, no fallback here
    pub async fn link_credential(&self, credential: &Credential) -> SyncResult<Principal> {
        let current = self.session.current().ok_or(SyncError::NoCurrentUser)?;
        debug!(
            principal_id = %current.id,
            provider = %credential.provider(),
            "Linking credential"
        );

        let record = self.service.link_credential(credential).await?;
        Ok(self.adopt(record))
    }

    /// Signs in with `credential`, replacing whatever the session held.
    pub async fn sign_in_with_credential(&self, credential: &Credential) -> SyncResult<Principal> {
        debug!(provider = %credential.provider(), "Signing in");
        let record = self.service.sign_in(credential).await?;
        Ok(self.adopt(record))
    }

    /// Creates an email/password account and signs in to it.
    ///
    /// The email format and password length are checked before the service
    /// is called.
    pub async fn create_account(&self, email: &str, password: &str) -> SyncResult<Principal> {
        validate_email(email)?;
        validate_password(password)?;

        info!("Creating email account");
        let record = self.service.create_account(email.trim(), password).await?;
        Ok(self.adopt(record))
    }

    /// Signs in with a fresh anonymous account.
    pub async fn sign_in_anonymously(&self) -> SyncResult<Principal> {
        let record = self.service.sign_in_anonymously().await?;
        Ok(self.adopt(record))
    }

    /// Returns the session principal, restoring or creating one if needed.
    ///
    /// ## Order
    /// 1. The session principal
    /// 2. The service's current account
    /// 3. A new anonymous account, when `session.auto_anonymous` is set
    pub async fn authenticate(&self) -> SyncResult<Principal> {
        if let Some(principal) = self.session.current() {
            return Ok(principal);
        }

        if let Some(principal) = self.restore_session().await? {
            return Ok(principal);
        }

        if self.settings.auto_anonymous {
            return self.sign_in_anonymously().await;
        }

        Err(SyncError::NoCurrentUser)
    }

    /// Adopts the service's current account into the session.
    ///
    /// Returns `None` (and leaves the session alone) if the service has none.
    pub async fn restore_session(&self) -> SyncResult<Option<Principal>> {
        match self.service.current_account().await? {
            Some(record) => Ok(Some(self.adopt(record))),
            None => Ok(None),
        }
    }

    /// Signs out and clears the session.
    pub async fn sign_out(&self) -> SyncResult<()> {
        self.service.sign_out().await?;
        self.session.clear();
        Ok(())
    }

    /// Deletes the signed-in account and clears the session.
    pub async fn delete_account(&self) -> SyncResult<()> {
        let current = self.session.current().ok_or(SyncError::NoCurrentUser)?;
        info!(principal_id = %current.id, "Deleting account");

        self.service.delete_account().await?;
        self.session.clear();
        Ok(())
    }

    fn adopt(&self, record: AccountRecord) -> Principal {
        let principal = Principal::from(record);
        self.session.replace(principal.clone());
        principal
    }

    // =========================================================================
    // Per-Provider Conveniences
    // =========================================================================

    /// Links an email/password credential.
    pub async fn link_email(&self, email: &str, password: &str) -> SyncResult<Principal> {
        self.link_credential(&Credential::email(email, password))
            .await
    }

    /// Links a Google credential.
    pub async fn link_google(&self, id_token: &str, access_token: &str) -> SyncResult<Principal> {
        self.link_credential(&Credential::google(id_token, access_token))
            .await
    }

    /// Links an Apple credential.
    pub async fn link_apple(&self, id_token: &str, nonce: &str) -> SyncResult<Principal> {
        self.link_credential(&Credential::apple(id_token, nonce))
            .await
    }

    /// [`process`](Self::process) for an email credential.
    pub async fn process_email(
        &self,
        email: &str,
        password: &str,
        intent: UserIntent,
    ) -> SyncResult<Principal> {
        self.process(Credential::email(email, password), Some(intent))
            .await
    }

    /// [`process`](Self::process) for a Google credential.
    pub async fn process_google(&self, id_token: &str, access_token: &str) -> SyncResult<Principal> {
        self.process(Credential::google(id_token, access_token), None)
            .await
    }

    /// [`process`](Self::process) for an Apple credential.
    pub async fn process_apple(&self, id_token: &str, nonce: &str) -> SyncResult<Principal> {
        self.process(Credential::apple(id_token, nonce), None).await
    }
}

impl std::fmt::Debug for CredentialLinkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialLinkEngine")
            .field("session", &self.session)
            .field("settings", &self.settings)
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
