//! Mock account directory.

use crate::error::{AuthError, Result};
use crate::providers::AccountDirectory;
use crate::state::{Role, SubjectId};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A call the directory received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCall {
    /// `activate`
    Activated(SubjectId),
    /// `set_credential`; the secret is kept so tests can check it arrived.
    CredentialSet(SubjectId, String),
    /// `link_external_identity`
    IdentityLinked {
        /// Subject linked.
        subject: SubjectId,
        /// Provider name.
        provider: String,
        /// Provider's identifier for the user.
        provider_id: String,
    },
}

/// In-memory account directory.
///
/// Every subject is a [`Role::Farmer`] unless given another role with
/// [`MockAccountDirectory::with_role`].
#[derive(Debug, Clone, Default)]
pub struct MockAccountDirectory {
    calls: Arc<Mutex<Vec<AccountCall>>>,
    roles: Arc<Mutex<HashMap<SubjectId, Role>>>,
    failing: Arc<AtomicBool>,
}

impl MockAccountDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `role` to `subject`.
    #[must_use]
    pub fn with_role(self, subject: &SubjectId, role: Role) -> Self {
        if let Ok(mut roles) = self.roles.lock() {
            roles.insert(subject.clone(), role);
        }
        self
    }

    /// Make every write fail with `StorageError`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<AccountCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, call: AccountCall) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::StorageError("account store unavailable".into()));
        }
        self.calls
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?
            .push(call);
        Ok(())
    }
}

impl AccountDirectory for MockAccountDirectory {
    async fn activate(&self, subject: &SubjectId) -> Result<()> {
        self.record(AccountCall::Activated(subject.clone()))
    }

    async fn set_credential(&self, subject: &SubjectId, new_secret: &SecretString) -> Result<()> {
        self.record(AccountCall::CredentialSet(
            subject.clone(),
            new_secret.expose_secret().to_owned(),
        ))
    }

    async fn link_external_identity(
        &self,
        subject: &SubjectId,
        provider: &str,
        provider_id: &str,
    ) -> Result<()> {
        self.record(AccountCall::IdentityLinked {
            subject: subject.clone(),
            provider: provider.to_owned(),
            provider_id: provider_id.to_owned(),
        })
    }

    async fn role_of(&self, subject: &SubjectId) -> Result<Role> {
        let roles = self
            .roles
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;
        Ok(roles.get(subject).copied().unwrap_or_default())
    }
}
