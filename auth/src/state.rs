//! Domain and flow state types.
//!
//! All types are `Clone` so reducers can work on plain values.

use crate::code::CodeHash;
use crate::deadline::Deadline;
use crate::error::{AuthError, Result};
use crate::session::IssuedSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════
// Identity Types
// ═══════════════════════════════════════════════════════════════════════

/// Normalised identifier of the principal being verified.
///
/// Always a trimmed, lowercased email address. Construct with
/// [`SubjectId::parse`]; there is no way to build an unvalidated one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Normalise and validate a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSubject`] if the input is not an email
    /// address after trimming and lowercasing.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalised = raw.trim().to_ascii_lowercase();
        if crate::utils::is_valid_email(&normalised) {
            Ok(Self(normalised))
        } else {
            Err(AuthError::InvalidSubject)
        }
    }

    /// Borrow the normalised identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SubjectId> for String {
    fn from(subject: SubjectId) -> Self {
        subject.0
    }
}

/// Flow context a verification code is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Sign in to an existing account.
    Login,
    /// Confirm ownership of the address for a new account.
    Registration,
    /// Authorise setting a new password.
    PasswordReset,
    /// Link a Google identity as second factor.
    GoogleLink,
}

impl Purpose {
    /// All purposes, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Login,
        Self::Registration,
        Self::PasswordReset,
        Self::GoogleLink,
    ];

    /// Stable tag used in storage keys, logs and notifications.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Registration => "registration",
            Self::PasswordReset => "password_reset",
            Self::GoogleLink => "google_link",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|purpose| purpose.as_str() == s)
            .ok_or_else(|| AuthError::InternalError(format!("unknown purpose `{s}`")))
    }
}

/// Role carried in the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Manages their own farms.
    #[default]
    Farmer,
    /// Manages farms on behalf of others.
    Manager,
    /// Full administrative access.
    Admin,
}

// ═══════════════════════════════════════════════════════════════════════
// Verification Records
// ═══════════════════════════════════════════════════════════════════════

/// Composite key of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationKey {
    /// Who is being verified.
    pub subject: SubjectId,
    /// What the code authorises.
    pub purpose: Purpose,
}

impl VerificationKey {
    /// Build a key.
    #[must_use]
    pub const fn new(subject: SubjectId, purpose: Purpose) -> Self {
        Self { subject, purpose }
    }

    /// `purpose:subject`, used for lock maps and storage keys.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.purpose.as_str(), self.subject)
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.purpose, self.subject)
    }
}

/// Derived lifecycle status of a [`VerificationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Awaiting a correct submission.
    Pending,
    /// Past `expires_at`.
    Expired,
    /// Successfully verified once.
    Consumed,
    /// No attempts left.
    Exhausted,
}

/// One outstanding verification request.
///
/// Only the keyed hash of the code is kept. The raw code exists in memory
/// between generation and dispatch and is never part of this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Identifies this issuance; changes whenever the key is re-issued.
    pub request_id: Uuid,
    /// Subject and purpose.
    pub key: VerificationKey,
    /// Keyed hash of the code.
    pub code_hash: CodeHash,
    /// When the code was issued.
    pub created_at: DateTime<Utc>,
    /// `created_at + ttl`.
    pub expires_at: DateTime<Utc>,
    /// Wrong submissions still allowed.
    pub attempts_remaining: u32,
    /// Set by the one successful verification.
    pub consumed_at: Option<DateTime<Utc>>,
}

impl VerificationRequest {
    /// Status at `now`.
    ///
    /// Consumption wins over expiry, which wins over exhaustion.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> RequestStatus {
        if self.consumed_at.is_some() {
            RequestStatus::Consumed
        } else if now > self.expires_at {
            RequestStatus::Expired
        } else if self.attempts_remaining == 0 {
            RequestStatus::Exhausted
        } else {
            RequestStatus::Pending
        }
    }
}

/// An issued session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Who the session belongs to.
    pub subject: SubjectId,
    /// Role claim.
    pub role: Role,
    /// Issue time (whole seconds, as in the token).
    pub issued_at: DateTime<Utc>,
    /// Expiry (whole seconds, as in the token).
    pub expires_at: DateTime<Utc>,
    /// Unique token id, the revocation handle.
    pub token_id: Uuid,
}

// ═══════════════════════════════════════════════════════════════════════
// Flow State
// ═══════════════════════════════════════════════════════════════════════

/// Where a verification flow stands.
///
/// `Expired` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowStatus {
    /// Nothing issued yet.
    #[default]
    Initiated,
    /// A code is outstanding.
    CodeSent,
    /// The code was accepted and consumed.
    Verified,
    /// Completion side effect applied and session issued.
    Completed,
    /// The code expired before a correct submission.
    Expired,
    /// Attempts exhausted, or completion failed after the code was used.
    Failed,
}

impl FlowStatus {
    /// `true` for states no action leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Failed)
    }
}

/// State of one verification flow, driven by the flow reducer.
#[derive(Debug, Clone)]
pub struct FlowState {
    /// Subject and purpose this flow is about.
    pub key: VerificationKey,
    /// Current status.
    pub status: FlowStatus,
    /// Id of the outstanding request, once known.
    pub request_id: Option<Uuid>,
    /// Expiry of the outstanding code, once known.
    pub expires_at: Option<DateTime<Utc>>,
    /// The last dispatch of the outstanding code failed.
    pub dispatch_failed: bool,
    /// Wrong submissions still allowed, as last reported by the verifier.
    pub attempts_remaining: Option<u32>,
    /// Session issued at completion.
    pub session: Option<IssuedSession>,
    /// Caller's deadline for the steps before the store is written.
    pub deadline: Deadline,
}

impl FlowState {
    /// A fresh flow that has not issued a code.
    #[must_use]
    pub const fn initiated(key: VerificationKey) -> Self {
        Self {
            key,
            status: FlowStatus::Initiated,
            request_id: None,
            expires_at: None,
            dispatch_failed: false,
            attempts_remaining: None,
            session: None,
            deadline: Deadline::unbounded(),
        }
    }

    /// Bound the flow's pre-write steps by `deadline`.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// A flow resumed for a submission: a code was sent earlier, possibly
    /// by another process, so only the store knows its details.
    #[must_use]
    pub fn awaiting_code(key: VerificationKey) -> Self {
        let mut state = Self::initiated(key);
        state.status = FlowStatus::CodeSent;
        state
    }
}
