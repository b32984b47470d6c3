//! `Redis` rate limiter.
//!
//! Sliding window over a sorted set per key: members are events, scores
//! their time in milliseconds.
//!
//! # Algorithm
//!
//! One Lua script per check, so concurrent requests cannot both pass:
//! 1. Drop events at or before `now - window` (ZREMRANGEBYSCORE)
//! 2. Count the rest (ZCARD)
//! 3. At the limit: report when the oldest event leaves the window
//! 4. Otherwise record this event (ZADD) and refresh the key's expiry
//!
//! Rejected events are not recorded, so a throttled client is let in again
//! as soon as the window slides.

use crate::constants::redis_keys::RATE_LIMIT_PREFIX;
use crate::error::{AuthError, Result};
use crate::providers::{RateLimit, RateLimiter};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use uuid::Uuid;

/// Returns `{1, count}` when recorded, `{0, retry_after_ms}` when limited.
const CHECK_AND_RECORD_SCRIPT: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local window_start = now - window
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', window_start)
local count = redis.call('ZCARD', KEYS[1])
if count >= tonumber(ARGV[3]) then
    local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
    if #oldest == 0 then
        return {0, window}
    end
    return {0, tonumber(oldest[2]) - window_start}
end
redis.call('ZADD', KEYS[1], now, ARGV[4])
redis.call('PEXPIRE', KEYS[1], window)
return {1, count + 1}
";

/// `Redis`-backed [`RateLimiter`].
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn_manager: ConnectionManager,
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimiter").finish_non_exhaustive()
    }
}

impl RedisRateLimiter {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the URL is malformed or the
    /// server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        Ok(Self { conn_manager })
    }

    fn rate_limit_key(key: &str) -> String {
        format!("{RATE_LIMIT_PREFIX}:{key}")
    }
}

fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

impl RateLimiter for RedisRateLimiter {
    async fn check_and_record(&self, key: &str, limit: RateLimit, now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let now_ms = now.timestamp_millis();
        // Unique member so two events in the same millisecond both count.
        let member = format!("{now_ms}:{}", Uuid::new_v4());

        let (recorded, value): (i64, i64) = Script::new(CHECK_AND_RECORD_SCRIPT)
            .key(Self::rate_limit_key(key))
            .arg(now_ms)
            .arg(window_ms(limit.window))
            .arg(limit.max_attempts)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %key, "Rate limit check failed");
                AuthError::from(e)
            })?;

        if recorded == 0 {
            let retry_after = Duration::from_millis(u64::try_from(value).unwrap_or(0));
            tracing::warn!(
                rate_limit_exceeded = true,
                key = %key,
                max_attempts = limit.max_attempts,
                retry_after_ms = value,
                "Rate limit exceeded"
            );
            return Err(AuthError::RateLimited { retry_after });
        }

        tracing::debug!(
            key = %key,
            attempts = value,
            max_attempts = limit.max_attempts,
            "Rate limit check passed"
        );
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(Self::rate_limit_key(key)).await?;
        tracing::info!(key = %key, "Reset rate limit");
        Ok(())
    }

    async fn get_attempts(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<u32> {
        let mut conn = self.conn_manager.clone();
        let window_start = now.timestamp_millis().saturating_sub(window_ms(window));
        let count: u64 = conn
            .zcount(Self::rate_limit_key(key), format!("({window_start}"), "+inf")
            .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
