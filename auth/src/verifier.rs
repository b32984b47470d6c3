//! Credential verifier.
//!
//! Issues codes and checks submissions against the verification store.
//! Both run under the per-key lock, so for one (subject, purpose) pair an
//! issue and a verification never interleave and at most one concurrent
//! verification of the same code can succeed. Across processes the store's
//! compare-and-set on `request_id` gives the same guarantee.
//!
//! The `*_within` variants take a [`Deadline`]: waiting for the lock and
//! reading race it, and no store write is started after it has passed.

use crate::code::{CodeAlphabet, CodeGenerator, CodeHasher, VerificationCode};
use crate::deadline::Deadline;
use crate::error::{AuthError, Result};
use crate::locks::KeyedLocks;
use crate::providers::VerificationStore;
use crate::state::{RequestStatus, VerificationKey, VerificationRequest};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A freshly issued request and the raw code to deliver.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    /// Stored record (hash only).
    pub record: VerificationRequest,
    /// Raw code. Hand it to the dispatcher and drop it.
    pub code: VerificationCode,
}

/// A code that was accepted and consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCode {
    /// Subject and purpose.
    pub key: VerificationKey,
    /// The consumed request.
    pub request_id: Uuid,
    /// Consumption time.
    pub verified_at: DateTime<Utc>,
}

/// What the client is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Wrong, expired, unknown or already used.
    InvalidOrExpiredCode,
    /// No attempts left; a new code is needed.
    TooManyAttempts,
}

impl FailureReason {
    /// The matching public error.
    #[must_use]
    pub const fn into_error(self) -> AuthError {
        match self {
            Self::InvalidOrExpiredCode => AuthError::InvalidOrExpiredCode,
            Self::TooManyAttempts => AuthError::TooManyAttempts,
        }
    }
}

/// What actually happened. Logged, never returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// No request for the key.
    Unknown,
    /// The request was already used.
    AlreadyConsumed,
    /// Submitted after `expires_at`.
    Expired,
    /// Wrong code.
    Mismatch {
        /// Attempts left after this one.
        remaining: u32,
    },
    /// Attempts were already used up.
    Exhausted,
}

impl Diagnostic {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::AlreadyConsumed => "already_consumed",
            Self::Expired => "expired",
            Self::Mismatch { .. } => "mismatch",
            Self::Exhausted => "exhausted",
        }
    }

    const fn reason(self) -> FailureReason {
        match self {
            Self::Exhausted => FailureReason::TooManyAttempts,
            Self::Unknown | Self::AlreadyConsumed | Self::Expired | Self::Mismatch { .. } => {
                FailureReason::InvalidOrExpiredCode
            },
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch { remaining } => write!(f, "mismatch ({remaining} attempts left)"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A rejected submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationFailure {
    /// Public reason.
    pub reason: FailureReason,
    /// Internal detail.
    pub diagnostic: Diagnostic,
}

impl From<Diagnostic> for VerificationFailure {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            reason: diagnostic.reason(),
            diagnostic,
        }
    }
}

/// Result of checking a submission.
///
/// Rejections are ordinary outcomes; `Err` is reserved for infrastructure
/// failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Accepted and consumed.
    Verified(VerifiedCode),
    /// Rejected.
    Rejected(VerificationFailure),
}

/// Issues and verifies codes against a [`VerificationStore`].
///
/// Clones share the store, the hasher and the lock map.
#[derive(Debug, Clone)]
pub struct CredentialVerifier<S> {
    store: S,
    generator: CodeGenerator,
    hasher: Arc<CodeHasher>,
    locks: KeyedLocks,
}

impl<S> CredentialVerifier<S>
where
    S: VerificationStore,
{
    /// Create a verifier with its own lock map.
    #[must_use]
    pub fn new(store: S, generator: CodeGenerator, hasher: CodeHasher) -> Self {
        Self {
            store,
            generator,
            hasher: Arc::new(hasher),
            locks: KeyedLocks::new(),
        }
    }

    /// Share `locks` with other components.
    #[must_use]
    pub fn with_locks(mut self, locks: KeyedLocks) -> Self {
        self.locks = locks;
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The lock map.
    #[must_use]
    pub const fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Generate a code and store its hash for `key`, superseding any code
    /// issued before.
    ///
    /// # Errors
    ///
    /// - [`AuthError::EntropyUnavailable`] if no code could be generated
    /// - [`AuthError::StorageError`] if the store fails
    pub async fn issue(
        &self,
        key: &VerificationKey,
        now: DateTime<Utc>,
        ttl: Duration,
        max_attempts: u32,
    ) -> Result<IssuedCode> {
        self.issue_within(key, now, ttl, max_attempts, Deadline::unbounded())
            .await
    }

    /// [`CredentialVerifier::issue`], giving up before the write if
    /// `deadline` passes.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Timeout`] if the deadline passed; nothing was stored
    /// - [`AuthError::EntropyUnavailable`] if no code could be generated
    /// - [`AuthError::StorageError`] if the store fails
    pub async fn issue_within(
        &self,
        key: &VerificationKey,
        now: DateTime<Utc>,
        ttl: Duration,
        max_attempts: u32,
        deadline: Deadline,
    ) -> Result<IssuedCode> {
        let code = self.generator.generate()?;
        let code_hash = self.hasher.hash(key, code.expose());

        let _guard = deadline
            .race(async { Ok(self.locks.lock(&key.storage_key()).await) })
            .await?;
        deadline.check()?;
        let record = self
            .store
            .issue(key, code_hash, now, ttl, max_attempts)
            .await?;

        metrics::counter!("auth.codes.issued", "purpose" => key.purpose.as_str()).increment(1);
        tracing::info!(
            subject = %key.subject,
            purpose = %key.purpose,
            request_id = %record.request_id,
            expires_at = %record.expires_at,
            "Verification code issued"
        );

        Ok(IssuedCode { record, code })
    }

    /// Check `submitted` against the outstanding request for `key`.
    ///
    /// A wrong code uses up one attempt before the rejection is returned.
    /// A request with no attempts left rejects every submission, including
    /// the correct code, without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the store fails.
    pub async fn verify(
        &self,
        key: &VerificationKey,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome> {
        self.verify_within(key, submitted, now, Deadline::unbounded())
            .await
    }

    /// [`CredentialVerifier::verify`], giving up before any write if
    /// `deadline` passes.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Timeout`] if the deadline passed; the request is untouched
    /// - [`AuthError::StorageError`] if the store fails
    pub async fn verify_within(
        &self,
        key: &VerificationKey,
        submitted: &str,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<VerifyOutcome> {
        let submitted = self.normalise(submitted);
        let (_guard, found) = deadline
            .race(async {
                let guard = self.locks.lock(&key.storage_key()).await;
                let found = self.store.lookup(key).await?;
                Ok((guard, found))
            })
            .await?;

        let outcome = match found {
            None => Err(Diagnostic::Unknown),
            Some(request) => self.check(key, &request, &submitted, now, deadline).await?,
        };

        Ok(match outcome {
            Ok(verified) => {
                metrics::counter!("auth.codes.verified", "purpose" => key.purpose.as_str())
                    .increment(1);
                tracing::info!(
                    subject = %key.subject,
                    purpose = %key.purpose,
                    request_id = %verified.request_id,
                    "Verification code accepted"
                );
                VerifyOutcome::Verified(verified)
            },
            Err(diagnostic) => {
                metrics::counter!(
                    "auth.codes.rejected",
                    "purpose" => key.purpose.as_str(),
                    "diagnostic" => diagnostic.as_str()
                )
                .increment(1);
                tracing::warn!(
                    subject = %key.subject,
                    purpose = %key.purpose,
                    diagnostic = %diagnostic,
                    "Verification code rejected"
                );
                VerifyOutcome::Rejected(diagnostic.into())
            },
        })
    }

    /// Steps after lookup. Caller holds the key lock.
    async fn check(
        &self,
        key: &VerificationKey,
        request: &VerificationRequest,
        submitted: &str,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<std::result::Result<VerifiedCode, Diagnostic>> {
        match request.status(now) {
            RequestStatus::Consumed => return Ok(Err(Diagnostic::AlreadyConsumed)),
            RequestStatus::Expired => return Ok(Err(Diagnostic::Expired)),
            RequestStatus::Exhausted => return Ok(Err(Diagnostic::Exhausted)),
            RequestStatus::Pending => {},
        }

        deadline.check()?;

        if !self.hasher.hash(key, submitted).matches(&request.code_hash) {
            let remaining = match self.store.decrement_attempt(key, request.request_id).await {
                Ok(remaining) => remaining,
                // Purged or superseded between lookup and decrement.
                Err(AuthError::NotFound) => return Ok(Err(Diagnostic::Unknown)),
                Err(e) => return Err(e),
            };
            return Ok(Err(Diagnostic::Mismatch { remaining }));
        }

        // The store re-checks the status; another process may have got
        // there first.
        match self.store.consume(key, request.request_id, now).await {
            Ok(consumed) => Ok(Ok(VerifiedCode {
                key: key.clone(),
                request_id: consumed.request_id,
                verified_at: now,
            })),
            Err(AuthError::AlreadyConsumed) => Ok(Err(Diagnostic::AlreadyConsumed)),
            Err(AuthError::NotFound) => Ok(Err(Diagnostic::Unknown)),
            Err(AuthError::InvalidOrExpiredCode) => Ok(Err(Diagnostic::Expired)),
            Err(AuthError::TooManyAttempts) => Ok(Err(Diagnostic::Exhausted)),
            Err(e) => Err(e),
        }
    }

    fn normalise(&self, submitted: &str) -> String {
        let trimmed = submitted.trim();
        match self.generator.alphabet() {
            CodeAlphabet::Numeric => trimmed.to_owned(),
            CodeAlphabet::Alphanumeric => trimmed.to_ascii_uppercase(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::code::CodeHash;
    use crate::mocks::MockVerificationStore;
    use crate::state::{Purpose, SubjectId};
    use secrecy::SecretString;

    fn verifier() -> CredentialVerifier<MockVerificationStore> {
        CredentialVerifier::new(
            MockVerificationStore::new(),
            CodeGenerator::default(),
            CodeHasher::new(&SecretString::from("pepper")).unwrap(),
        )
    }

    fn key() -> VerificationKey {
        VerificationKey::new(SubjectId::parse("a@b.com").unwrap(), Purpose::Login)
    }

    fn wrong(code: &VerificationCode) -> String {
        if code.expose() == "000000" { "111111".into() } else { "000000".into() }
    }

    fn rejected(diagnostic: Diagnostic) -> VerifyOutcome {
        VerifyOutcome::Rejected(diagnostic.into())
    }

    #[tokio::test]
    async fn test_issue_stores_hash_only() {
        let verifier = verifier();
        let now = Utc::now();
        let issued = verifier.issue(&key(), now, Duration::minutes(10), 5).await.unwrap();

        assert_eq!(issued.code.expose().len(), 6);
        assert_ne!(issued.record.code_hash.as_hex(), issued.code.expose());
        assert_eq!(issued.record.expires_at, now + Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_correct_code_is_accepted_once() {
        let verifier = verifier();
        let now = Utc::now();
        let issued = verifier.issue(&key(), now, Duration::minutes(10), 5).await.unwrap();

        let outcome = verifier.verify(&key(), issued.code.expose(), now).await.unwrap();
        assert!(matches!(outcome, VerifyOutcome::Verified(ref v) if v.request_id == issued.record.request_id));

        let again = verifier.verify(&key(), issued.code.expose(), now).await.unwrap();
        assert_eq!(again, rejected(Diagnostic::AlreadyConsumed));
    }

    #[tokio::test]
    async fn test_whitespace_around_code_is_ignored() {
        let verifier = verifier();
        let now = Utc::now();
        let issued = verifier.issue(&key(), now, Duration::minutes(10), 5).await.unwrap();

        let padded = format!("  {} \n", issued.code.expose());
        assert!(matches!(
            verifier.verify(&key(), &padded, now).await.unwrap(),
            VerifyOutcome::Verified(_)
        ));
    }

    #[tokio::test]
    async fn test_mismatch_decrements_then_exhausts() {
        let verifier = verifier();
        let now = Utc::now();
        let issued = verifier.issue(&key(), now, Duration::minutes(10), 2).await.unwrap();
        let bad = wrong(&issued.code);

        assert_eq!(
            verifier.verify(&key(), &bad, now).await.unwrap(),
            rejected(Diagnostic::Mismatch { remaining: 1 })
        );
        assert_eq!(
            verifier.verify(&key(), &bad, now).await.unwrap(),
            rejected(Diagnostic::Mismatch { remaining: 0 })
        );
        let outcome = verifier.verify(&key(), issued.code.expose(), now).await.unwrap();
        assert_eq!(outcome, rejected(Diagnostic::Exhausted));
        let VerifyOutcome::Rejected(failure) = outcome else {
            unreachable!("asserted above");
        };
        assert_eq!(failure.reason, FailureReason::TooManyAttempts);
    }

    #[tokio::test]
    async fn test_expired_and_unknown() {
        let verifier = verifier();
        let now = Utc::now();

        assert_eq!(
            verifier.verify(&key(), "123456", now).await.unwrap(),
            rejected(Diagnostic::Unknown)
        );

        let issued = verifier.issue(&key(), now, Duration::minutes(10), 5).await.unwrap();
        let late = now + Duration::minutes(11);
        let outcome = verifier.verify(&key(), issued.code.expose(), late).await.unwrap();
        assert_eq!(outcome, rejected(Diagnostic::Expired));

        // Expiry does not burn attempts.
        let stored = verifier.store().lookup(&key()).await.unwrap().unwrap();
        assert_eq!(stored.attempts_remaining, 5);
    }

    #[tokio::test]
    async fn test_codes_are_scoped_to_purpose() {
        let verifier = verifier();
        let now = Utc::now();
        let issued = verifier.issue(&key(), now, Duration::minutes(10), 5).await.unwrap();

        let other = VerificationKey::new(key().subject, Purpose::PasswordReset);
        assert_eq!(
            verifier.verify(&other, issued.code.expose(), now).await.unwrap(),
            rejected(Diagnostic::Unknown)
        );

        // Same digits hash differently per purpose.
        assert!(
            !verifier
                .hasher
                .hash(&other, issued.code.expose())
                .matches(&issued.record.code_hash)
        );

        // The login request is untouched.
        assert!(matches!(
            verifier.verify(&key(), issued.code.expose(), now).await.unwrap(),
            VerifyOutcome::Verified(_)
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_is_an_error() {
        let verifier = verifier();
        verifier.store().set_unavailable(true);
        assert!(matches!(
            verifier.verify(&key(), "123456", Utc::now()).await,
            Err(AuthError::StorageError(_))
        ));
    }

    #[tokio::test]
    async fn test_code_superseded_after_lookup_is_rejected() {
        let verifier = verifier();
        let now = Utc::now();
        let old = verifier.issue(&key(), now, Duration::minutes(10), 5).await.unwrap();
        let seen = verifier.store().lookup(&key()).await.unwrap().unwrap();

        // Another instance re-issues without going through our lock.
        let fresh = verifier
            .store()
            .issue(&key(), CodeHash::from_hex("bb"), now, Duration::minutes(10), 5)
            .await
            .unwrap();

        let outcome = verifier
            .check(&key(), &seen, old.code.expose(), now, Deadline::unbounded())
            .await
            .unwrap();
        assert_eq!(outcome, Err(Diagnostic::Unknown));

        let stored = verifier.store().lookup(&key()).await.unwrap().unwrap();
        assert_eq!(stored.request_id, fresh.request_id);
        assert_eq!(stored.consumed_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_passed_while_waiting_leaves_store_untouched() {
        let verifier = verifier();
        let now = Utc::now();
        let issued = verifier.issue(&key(), now, Duration::minutes(10), 5).await.unwrap();
        let bad = wrong(&issued.code);

        let held = verifier.locks().lock(&key().storage_key()).await;
        let deadline = Deadline::after(std::time::Duration::from_millis(20));
        assert_eq!(
            verifier.verify_within(&key(), &bad, now, deadline).await,
            Err(AuthError::Timeout)
        );
        assert_eq!(
            verifier
                .issue_within(&key(), now, Duration::minutes(10), 5, deadline)
                .await
                .map(|issued| issued.record.request_id),
            Err(AuthError::Timeout)
        );
        drop(held);

        let stored = verifier.store().lookup(&key()).await.unwrap().unwrap();
        assert_eq!(stored.request_id, issued.record.request_id);
        assert_eq!(stored.attempts_remaining, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verification_succeeds_once() {
        let verifier = verifier();
        let now = Utc::now();
        let issued = verifier.issue(&key(), now, Duration::minutes(10), 5).await.unwrap();
        let code = issued.code.expose().to_owned();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let verifier = verifier.clone();
                let code = code.clone();
                tokio::spawn(async move { verifier.verify(&key(), &code, now).await })
            })
            .collect();

        let mut verified = 0;
        for handle in handles {
            if matches!(handle.await.unwrap().unwrap(), VerifyOutcome::Verified(_)) {
                verified += 1;
            }
        }
        assert_eq!(verified, 1);
        assert!(verifier.locks().is_empty());
    }
}
