//! # Local Identity Service
//!
//! An in-memory [`IdentityService`] with the same observable rules as the
//! remote service: anonymous accounts, email/password accounts, federated
//! token accounts, and link conflicts.
//!
//! ## Account Index
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Emulator State                                     │
//! │                                                                         │
//! │   accounts: uid ──► { AccountRecord, password }                         │
//! │   emails:   "x@y.com" ──► uid          (email credentials)              │
//! │   tokens:   (Google, id_token) ──► uid (federated credentials)          │
//! │   current:  Option<uid>                                                 │
//! │                                                                         │
//! │   link_credential(c):                                                   │
//! │     c already indexed to another uid ──► CredentialAlreadyInUse         │
//! │     otherwise ──► index c to current uid, account is no longer anonymous│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Federated tokens stand in for a verified external identity: the same
//! `id_token` always resolves to the same account.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::ports::IdentityService;
use tether_core::{AccountRecord, AuthProvider, Credential};

#[derive(Debug, Clone)]
struct Account {
    record: AccountRecord,
    password: Option<String>,
}

/// Profile data attached to a federated token before it is first used.
#[derive(Debug, Clone, Default)]
struct FederatedProfile {
    display_name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Default)]
struct EmulatorState {
    accounts: HashMap<String, Account>,
    emails: HashMap<String, String>,
    tokens: HashMap<(AuthProvider, String), String>,
    profiles: HashMap<(AuthProvider, String), FederatedProfile>,
    current: Option<String>,
    pending_failure: Option<SyncError>,
}

impl EmulatorState {
    fn take_failure(&mut self) -> SyncResult<()> {
        match self.pending_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn owner_of(&self, credential: &Credential) -> Option<&String> {
        match credential {
            Credential::EmailPassword { email, .. } => self.emails.get(&normalize_email(email)),
            Credential::GoogleToken { id_token, .. } => {
                self.tokens.get(&(AuthProvider::Google, id_token.clone()))
            }
            Credential::AppleToken { id_token, .. } => {
                self.tokens.get(&(AuthProvider::Apple, id_token.clone()))
            }
        }
    }

    fn record(&self, uid: &str) -> SyncResult<AccountRecord> {
        self.accounts
            .get(uid)
            .map(|a| a.record.clone())
            .ok_or_else(|| SyncError::AccountNotFound(uid.to_string()))
    }

    fn insert_account(&mut self, record: AccountRecord, password: Option<String>) -> String {
        let uid = record.uid.clone();
        self.accounts.insert(uid.clone(), Account { record, password });
        uid
    }

    /// Indexes `credential` to `uid` and folds its provider into the record.
    fn attach(&mut self, uid: &str, credential: &Credential) -> SyncResult<AccountRecord> {
        let provider = credential.provider();
        let profile = match credential {
            Credential::GoogleToken { id_token, .. } | Credential::AppleToken { id_token, .. } => {
                self.tokens.insert((provider, id_token.clone()), uid.to_string());
                self.profiles
                    .get(&(provider, id_token.clone()))
                    .cloned()
                    .unwrap_or_default()
            }
            Credential::EmailPassword { email, .. } => {
                self.emails.insert(normalize_email(email), uid.to_string());
                FederatedProfile {
                    display_name: None,
                    email: Some(email.trim().to_string()),
                }
            }
        };

        let account = self
            .accounts
            .get_mut(uid)
            .ok_or_else(|| SyncError::AccountNotFound(uid.to_string()))?;

        if let Credential::EmailPassword { password, .. } = credential {
            account.password = Some(password.clone());
        }

        let record = &mut account.record;
        record.is_anonymous = false;
        let provider_id = provider.provider_id().to_string();
        if !record.provider_ids.contains(&provider_id) {
            record.provider_ids.push(provider_id);
        }
        if record.email.is_none() {
            record.email = profile.email;
        }
        if record.display_name.is_none() {
            record.display_name = profile.display_name;
        }

        Ok(record.clone())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_uid() -> String {
    Uuid::new_v4().simple().to_string()
}

fn check_token(credential: &Credential) -> SyncResult<()> {
    match credential {
        Credential::GoogleToken { id_token, .. } if id_token.is_empty() => {
            Err(SyncError::InvalidCredential("empty Google id token".into()))
        }
        Credential::AppleToken { id_token, nonce } if id_token.is_empty() || nonce.is_empty() => {
            Err(SyncError::InvalidCredential(
                "Apple credential needs an id token and a nonce".into(),
            ))
        }
        _ => Ok(()),
    }
}

/// In-memory identity service.
#[derive(Debug, Default)]
pub struct LocalIdentityService {
    state: RwLock<EmulatorState>,
}

impl LocalIdentityService {
    /// Creates an emulator with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an email/password account without signing in to it.
    pub async fn register_email_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> SyncResult<AccountRecord> {
        let credential = Credential::email(email, password);
        let mut state = self.state.write().await;
        if state.owner_of(&credential).is_some() {
            return Err(SyncError::CredentialAlreadyInUse);
        }
        let uid = state.insert_account(
            AccountRecord {
                uid: new_uid(),
                display_name: display_name.map(str::to_string),
                ..Default::default()
            },
            None,
        );
        state.attach(&uid, &credential)
    }

    /// Sets the profile a federated token resolves to when first used.
    pub async fn register_federated_profile(
        &self,
        provider: AuthProvider,
        id_token: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) {
        self.state.write().await.profiles.insert(
            (provider, id_token.to_string()),
            FederatedProfile {
                display_name: display_name.map(str::to_string),
                email: email.map(str::to_string),
            },
        );
    }

    /// Makes the next call fail with `err`.
    pub async fn fail_next_call(&self, err: SyncError) {
        self.state.write().await.pending_failure = Some(err);
    }

    /// Returns the number of accounts.
    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    /// Returns an account by uid.
    pub async fn account(&self, uid: &str) -> Option<AccountRecord> {
        self.state
            .read()
            .await
            .accounts
            .get(uid)
            .map(|a| a.record.clone())
    }
}

#[async_trait]
impl IdentityService for LocalIdentityService {
    async fn sign_in(&self, credential: &Credential) -> SyncResult<AccountRecord> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        check_token(credential)?;

        let uid = match credential {
            Credential::EmailPassword { email, password } => {
                let uid = state
                    .owner_of(credential)
                    .cloned()
                    .ok_or_else(|| SyncError::AccountNotFound(email.clone()))?;
                let matches = state
                    .accounts
                    .get(&uid)
                    .and_then(|a| a.password.as_deref())
                    .map(|stored| stored == password)
                    .unwrap_or(false);
                if !matches {
                    return Err(SyncError::InvalidCredential("wrong password".into()));
                }
                uid
            }
            _ => match state.owner_of(credential).cloned() {
                Some(uid) => uid,
                None => {
                    // First federated sign-in creates the account.
                    let uid = state.insert_account(
                        AccountRecord {
                            uid: new_uid(),
                            ..Default::default()
                        },
                        None,
                    );
                    state.attach(&uid, credential)?;
                    uid
                }
            },
        };

        debug!(uid = %uid, provider = %credential.provider(), "Emulator sign-in");
        state.current = Some(uid.clone());
        state.record(&uid)
    }

    async fn link_credential(&self, credential: &Credential) -> SyncResult<AccountRecord> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        check_token(credential)?;

        let current = state.current.clone().ok_or(SyncError::NoCurrentUser)?;

        if let Some(owner) = state.owner_of(credential) {
            if owner != &current {
                return Err(SyncError::CredentialAlreadyInUse);
            }
            return Err(SyncError::InvalidCredential(format!(
                "{} is already linked to this account",
                credential.provider()
            )));
        }

        debug!(uid = %current, provider = %credential.provider(), "Emulator link");
        state.attach(&current, credential)
    }

    async fn create_account(&self, email: &str, password: &str) -> SyncResult<AccountRecord> {
        let mut state = self.state.write().await;
        state.take_failure()?;

        let credential = Credential::email(email, password);
        if state.owner_of(&credential).is_some() {
            return Err(SyncError::CredentialAlreadyInUse);
        }

        let uid = state.insert_account(
            AccountRecord {
                uid: new_uid(),
                ..Default::default()
            },
            None,
        );
        let record = state.attach(&uid, &credential)?;
        state.current = Some(uid);
        Ok(record)
    }

    async fn sign_in_anonymously(&self) -> SyncResult<AccountRecord> {
        let mut state = self.state.write().await;
        state.take_failure()?;

        let record = AccountRecord {
            uid: new_uid(),
            is_anonymous: true,
            ..Default::default()
        };
        let uid = state.insert_account(record.clone(), None);
        state.current = Some(uid);
        Ok(record)
    }

    async fn sign_out(&self) -> SyncResult<()> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        state.current = None;
        Ok(())
    }

    async fn delete_account(&self) -> SyncResult<()> {
        let mut state = self.state.write().await;
        state.take_failure()?;

        let uid = state.current.take().ok_or(SyncError::NoCurrentUser)?;
        state.accounts.remove(&uid);
        state.emails.retain(|_, owner| owner != &uid);
        state.tokens.retain(|_, owner| owner != &uid);
        Ok(())
    }

    async fn current_account(&self) -> SyncResult<Option<AccountRecord>> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        match state.current.clone() {
            Some(uid) => state.record(&uid).map(Some),
            None => Ok(None),
        }
    }
}
