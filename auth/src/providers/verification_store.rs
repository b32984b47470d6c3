//! Verification store trait.
//!
//! Durable record of outstanding verification requests, one slot per
//! (subject, purpose). Implementations must make each operation atomic on
//! its own: a caller that is cancelled between two calls leaves a
//! consistent record behind.

use crate::code::CodeHash;
use crate::error::Result;
use crate::state::{VerificationKey, VerificationRequest};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Storage for verification requests.
///
/// # Contract
///
/// - `issue` replaces whatever the slot held, so a new code supersedes the
///   previous one in a single write.
/// - `consume` and `decrement_attempt` name the `request_id` the caller
///   looked up and fail with `NotFound` if the slot now holds another
///   request. Checking the record and writing it is one atomic step.
/// - `consume` succeeds only for a pending request: not consumed, not
///   expired at `now`, attempts left.
/// - `decrement_attempt` never goes below zero.
///
/// Callers in this crate additionally serialise `issue` and verification
/// per key, see [`KeyedLocks`](crate::locks::KeyedLocks).
pub trait VerificationStore: Send + Sync {
    /// Create a request for `key`, superseding any existing one.
    ///
    /// Only `code_hash` is persisted. The returned record carries a fresh
    /// `request_id`, `expires_at = now + ttl` and `max_attempts`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`](crate::AuthError::StorageError)
    /// if the backend fails.
    fn issue(
        &self,
        key: &VerificationKey,
        code_hash: CodeHash,
        now: DateTime<Utc>,
        ttl: Duration,
        max_attempts: u32,
    ) -> impl std::future::Future<Output = Result<VerificationRequest>> + Send;

    /// Fetch the request for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`](crate::AuthError::StorageError)
    /// if the backend fails.
    fn lookup(
        &self,
        key: &VerificationKey,
    ) -> impl std::future::Future<Output = Result<Option<VerificationRequest>>> + Send;

    /// Mark request `request_id` consumed at `now`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`](crate::AuthError::NotFound) if no request exists or it was superseded
    /// - [`AuthError::AlreadyConsumed`](crate::AuthError::AlreadyConsumed) if it was consumed before
    /// - [`AuthError::InvalidOrExpiredCode`](crate::AuthError::InvalidOrExpiredCode) if it expired
    /// - [`AuthError::TooManyAttempts`](crate::AuthError::TooManyAttempts) if no attempts are left
    /// - [`AuthError::StorageError`](crate::AuthError::StorageError) if the backend fails
    fn consume(
        &self,
        key: &VerificationKey,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<VerificationRequest>> + Send;

    /// Use up one attempt of request `request_id` and return how many
    /// remain.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`](crate::AuthError::NotFound) if no request exists or it was superseded
    /// - [`AuthError::StorageError`](crate::AuthError::StorageError) if the backend fails
    fn decrement_attempt(
        &self,
        key: &VerificationKey,
        request_id: Uuid,
    ) -> impl std::future::Future<Output = Result<u32>> + Send;

    /// Delete requests whose `expires_at` is before `cutoff`.
    ///
    /// Housekeeping only; expiry is always checked at verification time.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`](crate::AuthError::StorageError)
    /// if the backend fails.
    fn purge_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}
