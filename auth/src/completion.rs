//! What a verified flow does before its session is issued.
//!
//! Each [`Completion`] fixes the flow's purpose and carries the data its
//! account side effect needs. The flow reducer only calls
//! [`Completion::apply`]; adding a purpose means adding a variant here.

use crate::constants::providers::GOOGLE;
use crate::error::Result;
use crate::providers::AccountDirectory;
use crate::state::{Purpose, SubjectId};
use secrecy::SecretString;

/// Purpose-specific completion of a verified flow.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Session only.
    Login,
    /// Activate the new account.
    Registration,
    /// Commit a new password.
    PasswordReset {
        /// The password to set.
        new_secret: SecretString,
    },
    /// Link a Google identity.
    GoogleLink {
        /// Google's identifier for the user, obtained by the caller.
        provider_id: String,
    },
}

impl Completion {
    /// Purpose this completion belongs to.
    #[must_use]
    pub const fn purpose(&self) -> Purpose {
        match self {
            Self::Login => Purpose::Login,
            Self::Registration => Purpose::Registration,
            Self::PasswordReset { .. } => Purpose::PasswordReset,
            Self::GoogleLink { .. } => Purpose::GoogleLink,
        }
    }

    /// Run the account side effect for `subject`.
    ///
    /// # Errors
    ///
    /// Propagates the account directory's error.
    pub async fn apply<A: AccountDirectory>(&self, subject: &SubjectId, accounts: &A) -> Result<()> {
        match self {
            Self::Login => Ok(()),
            Self::Registration => accounts.activate(subject).await,
            Self::PasswordReset { new_secret } => accounts.set_credential(subject, new_secret).await,
            Self::GoogleLink { provider_id } => {
                accounts.link_external_identity(subject, GOOGLE, provider_id).await
            },
        }
    }
}
