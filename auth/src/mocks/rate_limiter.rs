//! In-memory sliding-window rate limiter.

use crate::error::{AuthError, Result};
use crate::providers::{RateLimit, RateLimiter};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory rate limiter.
///
/// Keeps the timestamps of allowed events per key. Old timestamps are
/// dropped whenever the key is checked; [`MockRateLimiter::sweep`] clears
/// keys that went quiet.
#[derive(Debug, Clone, Default)]
pub struct MockRateLimiter {
    attempts: Arc<Mutex<HashMap<String, Vec<DateTime<Utc>>>>>,
}

impl MockRateLimiter {
    /// Create a new rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove keys with no event newer than `now - window`.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self, window: Duration, now: DateTime<Utc>) -> usize {
        let Ok(mut attempts) = self.attempts.lock() else {
            return 0;
        };
        let window_start = window_start(window, now);
        let before = attempts.len();
        attempts.retain(|_, timestamps| timestamps.iter().any(|ts| *ts > window_start));
        before - attempts.len()
    }
}

fn window_start(window: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    chrono::Duration::from_std(window).map_or(DateTime::<Utc>::MIN_UTC, |w| now - w)
}

impl RateLimiter for MockRateLimiter {
    async fn check_and_record(&self, key: &str, limit: RateLimit, now: DateTime<Utc>) -> Result<()> {
        let mut attempts = self
            .attempts
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;

        let window_start = window_start(limit.window, now);
        let timestamps = attempts.entry(key.to_string()).or_default();
        timestamps.retain(|ts| *ts > window_start);

        if timestamps.len() >= limit.max_attempts as usize {
            // The window frees a slot once its oldest event ages out.
            let retry_after = timestamps
                .iter()
                .min()
                .and_then(|oldest| (*oldest - window_start).to_std().ok())
                .unwrap_or(limit.window);

            tracing::warn!(
                rate_limit_exceeded = true,
                key = %key,
                attempts = timestamps.len(),
                max_attempts = limit.max_attempts,
                "Rate limit exceeded"
            );

            return Err(AuthError::RateLimited { retry_after });
        }

        timestamps.push(now);

        tracing::debug!(
            key = %key,
            attempts = timestamps.len(),
            max_attempts = limit.max_attempts,
            "Rate limit check passed"
        );

        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.attempts
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?
            .remove(key);
        Ok(())
    }

    async fn get_attempts(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<u32> {
        let attempts = self
            .attempts
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;

        let window_start = window_start(window, now);
        let count = attempts
            .get(key)
            .map_or(0, |timestamps| timestamps.iter().filter(|ts| **ts > window_start).count());

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
