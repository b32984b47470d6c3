//! Rate limiter trait for code requests and verification attempts.
//!
//! # Algorithm
//!
//! Sliding window: each allowed event is recorded with its timestamp, and
//! an event is allowed while fewer than `max_attempts` recorded events fall
//! inside the trailing `window`. Check and record happen in one atomic step
//! so concurrent requests cannot both slip under the limit.

use crate::error::{AuthError, Result};
use crate::state::SubjectId;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// What is being rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    /// Asking for a (new) code.
    RequestCode,
    /// Submitting a code.
    VerifyCode,
}

impl RateLimitAction {
    /// Tag used in keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestCode => "request_code",
            Self::VerifyCode => "verify_code",
        }
    }
}

/// A limit: at most `max_attempts` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Events allowed per window.
    pub max_attempts: u32,
    /// Window length.
    pub window: Duration,
}

impl RateLimit {
    /// Create a limit.
    #[must_use]
    pub const fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

/// Key for a subject and action.
#[must_use]
pub fn rate_limit_key(subject: &SubjectId, action: RateLimitAction) -> String {
    format!("{}:{}", action.as_str(), subject)
}

/// Sliding-window rate limiter.
///
/// Limits are per subject, not per (subject, purpose), so cycling through
/// purposes does not multiply the budget.
pub trait RateLimiter: Send + Sync {
    /// Check the limit for `key` and record the event if it is allowed.
    ///
    /// # Errors
    ///
    /// - [`AuthError::RateLimited`] if the limit is reached; nothing is recorded
    /// - [`AuthError::StorageError`] if the backend fails
    fn check_and_record(
        &self,
        key: &str,
        limit: RateLimit,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Forget all recorded events for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the backend fails.
    fn reset(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Events recorded for `key` inside the window ending at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the backend fails.
    fn get_attempts(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u32>> + Send;

    /// Whether `subject` may perform `action` now; records it if so.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the backend fails.
    fn allow(
        &self,
        subject: &SubjectId,
        action: RateLimitAction,
        limit: RateLimit,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Admission>> + Send {
        let key = rate_limit_key(subject, action);
        async move {
            match self.check_and_record(&key, limit, now).await {
                Ok(()) => Ok(Admission::Allowed),
                Err(AuthError::RateLimited { retry_after }) => {
                    Ok(Admission::Throttled { retry_after })
                },
                Err(e) => Err(e),
            }
        }
    }
}

/// Answer of [`RateLimiter::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Go ahead; the event was recorded.
    Allowed,
    /// Over the limit; nothing was recorded.
    Throttled {
        /// Wait at least this long.
        retry_after: Duration,
    },
}

impl Admission {
    /// `true` for [`Admission::Allowed`].
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}
