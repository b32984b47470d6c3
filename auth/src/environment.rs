//! Verification flow environment.
//!
//! Everything the flow reducer's effects talk to, injected as generic
//! providers so tests run against the in-memory mocks and production runs
//! against `Redis` and SMTP with the same reducer.

use crate::config::{PurposeTtls, RateLimitConfig};
use crate::providers::{AccountDirectory, NotificationDispatcher, RateLimiter, VerificationStore};
use crate::session::SessionIssuer;
use crate::verifier::CredentialVerifier;
use agrogate_core::environment::Clock;
use agrogate_runtime::RetryPolicy;
use std::sync::Arc;

/// Dependencies of the flow reducer.
///
/// # Type Parameters
///
/// - `S`: Verification store
/// - `N`: Notification dispatcher
/// - `A`: Account directory
/// - `L`: Rate limiter
#[derive(Clone)]
pub struct AuthEnvironment<S, N, A, L>
where
    S: VerificationStore + Clone,
    N: NotificationDispatcher + Clone,
    A: AccountDirectory + Clone,
    L: RateLimiter + Clone,
{
    /// Time source for expiry and rate limit windows.
    pub clock: Arc<dyn Clock>,

    /// Issues and checks codes (owns the store and key locks).
    pub verifier: CredentialVerifier<S>,

    /// Delivers codes.
    pub notifier: N,

    /// Account side effects and roles.
    pub accounts: A,

    /// Per-subject throttling.
    pub rate_limiter: L,

    /// Session minting.
    pub sessions: Arc<SessionIssuer>,

    /// Code lifetime per purpose.
    pub ttls: PurposeTtls,

    /// Wrong submissions allowed per code.
    pub max_attempts: u32,

    /// Rate limits.
    pub rate_limits: RateLimitConfig,

    /// Backoff for transient failures of issue, dispatch and completion.
    pub retry: RetryPolicy,
}

impl<S, N, A, L> AuthEnvironment<S, N, A, L>
where
    S: VerificationStore + Clone,
    N: NotificationDispatcher + Clone,
    A: AccountDirectory + Clone,
    L: RateLimiter + Clone,
{
    /// Create an environment with default TTLs, attempts, rate limits and
    /// retry policy.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        verifier: CredentialVerifier<S>,
        notifier: N,
        accounts: A,
        rate_limiter: L,
        sessions: Arc<SessionIssuer>,
    ) -> Self {
        let defaults = crate::config::VerificationConfig::default();
        Self {
            clock,
            verifier,
            notifier,
            accounts,
            rate_limiter,
            sessions,
            ttls: defaults.ttls,
            max_attempts: defaults.max_attempts,
            rate_limits: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Set code lifetimes.
    #[must_use]
    pub const fn with_ttls(mut self, ttls: PurposeTtls) -> Self {
        self.ttls = ttls;
        self
    }

    /// Set attempts per code.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set rate limits.
    #[must_use]
    pub const fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Set retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}
