//! Account directory trait.
//!
//! Accounts belong to the wider application. This crate only calls into
//! them when a verified flow completes.

use crate::error::Result;
use crate::state::{Role, SubjectId};
use secrecy::SecretString;

/// Account operations invoked when a flow completes.
pub trait AccountDirectory: Send + Sync {
    /// Mark the subject's account active after registration.
    ///
    /// # Errors
    ///
    /// Returns error if the account store fails.
    fn activate(&self, subject: &SubjectId) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Commit a new password. The directory is responsible for hashing it.
    ///
    /// # Errors
    ///
    /// Returns error if the account store fails.
    fn set_credential(
        &self,
        subject: &SubjectId,
        new_secret: &SecretString,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Link an external identity (`provider`, `provider_id`) to the subject.
    ///
    /// # Errors
    ///
    /// Returns error if the account store fails.
    fn link_external_identity(
        &self,
        subject: &SubjectId,
        provider: &str,
        provider_id: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Role to put into the subject's session.
    ///
    /// # Errors
    ///
    /// Returns error if the account store fails.
    fn role_of(&self, subject: &SubjectId) -> impl std::future::Future<Output = Result<Role>> + Send;
}
