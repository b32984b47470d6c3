//! `Redis` verification store.
//!
//! # Layout
//!
//! - `verification:{purpose}:{subject}`: HASH with `request_id`, `code_hash`,
//!   `created_at`, `expires_at`, `attempts_remaining` and, once used,
//!   `consumed_at` (timestamps in unix milliseconds)
//! - `verification:expiry`: ZSET of request keys scored by `expires_at`,
//!   read by [`VerificationStore::purge_expired`]
//!
//! # Atomicity
//!
//! - `issue` is one `MULTI` transaction: delete, write all fields, index
//! - `consume` and `decrement_attempt` are Lua scripts that compare the
//!   stored `request_id` (and, for `consume`, the request's status) and
//!   write in one step on the server. A request superseded by another
//!   process between lookup and write is reported as not found.
//!
//! The purge script touches keys it reads from the index, so it needs all
//! keys on one node (no `Redis` Cluster).

use crate::code::CodeHash;
use crate::constants::redis_keys::{VERIFICATION_EXPIRY_INDEX, VERIFICATION_PREFIX};
use crate::error::{AuthError, Result};
use crate::providers::VerificationStore;
use crate::state::{VerificationKey, VerificationRequest};
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// KEYS[1] record, ARGV[1] expected `request_id`, ARGV[2] now.
///
/// Returns -1 when absent or superseded, 0 when already consumed, -2 when
/// expired, -3 when out of attempts, otherwise the consumed record.
const CONSUME_SCRIPT: &str = r"
if redis.call('HGET', KEYS[1], 'request_id') ~= ARGV[1] then
    return -1
end
if redis.call('HEXISTS', KEYS[1], 'consumed_at') == 1 then
    return 0
end
if tonumber(redis.call('HGET', KEYS[1], 'expires_at')) < tonumber(ARGV[2]) then
    return -2
end
if tonumber(redis.call('HGET', KEYS[1], 'attempts_remaining')) <= 0 then
    return -3
end
redis.call('HSET', KEYS[1], 'consumed_at', ARGV[2])
return redis.call('HGETALL', KEYS[1])
";

/// KEYS[1] record, ARGV[1] expected `request_id`.
///
/// Returns -1 when absent or superseded, otherwise the attempts left.
const DECREMENT_SCRIPT: &str = r"
if redis.call('HGET', KEYS[1], 'request_id') ~= ARGV[1] then
    return -1
end
local left = tonumber(redis.call('HGET', KEYS[1], 'attempts_remaining'))
if left > 0 then
    left = left - 1
    redis.call('HSET', KEYS[1], 'attempts_remaining', left)
end
return left
";

/// Deletes indexed keys expiring before ARGV[1]; returns how many.
const PURGE_SCRIPT: &str = r"
local expired = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1])
for _, key in ipairs(expired) do
    redis.call('DEL', key)
    redis.call('ZREM', KEYS[1], key)
end
return #expired
";

/// `Redis`-backed [`VerificationStore`].
///
/// Clones share the connection manager.
#[derive(Clone)]
pub struct RedisVerificationStore {
    conn_manager: ConnectionManager,
}

impl std::fmt::Debug for RedisVerificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisVerificationStore").finish_non_exhaustive()
    }
}

impl RedisVerificationStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the URL is malformed or the
    /// server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;

        tracing::info!("RedisVerificationStore initialized");

        Ok(Self { conn_manager })
    }

    fn request_key(key: &VerificationKey) -> String {
        format!("{VERIFICATION_PREFIX}:{}", key.storage_key())
    }
}

fn corrupt(field: &str) -> AuthError {
    AuthError::StorageError(format!("corrupt verification record: bad `{field}`"))
}

fn millis(fields: &HashMap<String, String>, field: &str) -> Result<DateTime<Utc>> {
    fields
        .get(field)
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| corrupt(field))
}

fn decode(key: &VerificationKey, fields: &HashMap<String, String>) -> Result<VerificationRequest> {
    let request_id = fields
        .get("request_id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| corrupt("request_id"))?;
    let code_hash = fields
        .get("code_hash")
        .map(CodeHash::from_hex)
        .ok_or_else(|| corrupt("code_hash"))?;
    let attempts_remaining = fields
        .get("attempts_remaining")
        .and_then(|raw| raw.parse::<u32>().ok())
        .ok_or_else(|| corrupt("attempts_remaining"))?;
    let consumed_at = if fields.contains_key("consumed_at") {
        Some(millis(fields, "consumed_at")?)
    } else {
        None
    };

    Ok(VerificationRequest {
        request_id,
        key: key.clone(),
        code_hash,
        created_at: millis(fields, "created_at")?,
        expires_at: millis(fields, "expires_at")?,
        attempts_remaining,
        consumed_at,
    })
}

impl VerificationStore for RedisVerificationStore {
    async fn issue(
        &self,
        key: &VerificationKey,
        code_hash: CodeHash,
        now: DateTime<Utc>,
        ttl: Duration,
        max_attempts: u32,
    ) -> Result<VerificationRequest> {
        let mut conn = self.conn_manager.clone();
        let request_key = Self::request_key(key);
        let request = VerificationRequest {
            request_id: Uuid::new_v4(),
            key: key.clone(),
            code_hash,
            created_at: now,
            expires_at: now + ttl,
            attempts_remaining: max_attempts,
            consumed_at: None,
        };

        let fields = [
            ("request_id", request.request_id.to_string()),
            ("code_hash", request.code_hash.as_hex().to_owned()),
            ("created_at", request.created_at.timestamp_millis().to_string()),
            ("expires_at", request.expires_at.timestamp_millis().to_string()),
            ("attempts_remaining", max_attempts.to_string()),
        ];

        // DEL first so a superseded request's `consumed_at` does not survive.
        let _: () = redis::pipe()
            .atomic()
            .del(&request_key)
            .ignore()
            .hset_multiple(&request_key, &fields)
            .ignore()
            .zadd(
                VERIFICATION_EXPIRY_INDEX,
                &request_key,
                request.expires_at.timestamp_millis(),
            )
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(
            key = %key,
            request_id = %request.request_id,
            expires_at = %request.expires_at,
            "Stored verification request in Redis"
        );

        Ok(request)
    }

    async fn lookup(&self, key: &VerificationKey) -> Result<Option<VerificationRequest>> {
        let mut conn = self.conn_manager.clone();
        let fields: HashMap<String, String> = conn.hgetall(Self::request_key(key)).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        decode(key, &fields).map(Some)
    }

    async fn consume(
        &self,
        key: &VerificationKey,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<VerificationRequest> {
        let mut conn = self.conn_manager.clone();
        let reply: Value = Script::new(CONSUME_SCRIPT)
            .key(Self::request_key(key))
            .arg(request_id.to_string())
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        match reply {
            Value::Int(-1) => Err(AuthError::NotFound),
            Value::Int(0) => Err(AuthError::AlreadyConsumed),
            Value::Int(-2) => Err(AuthError::InvalidOrExpiredCode),
            Value::Int(-3) => Err(AuthError::TooManyAttempts),
            other => {
                let fields: HashMap<String, String> = redis::from_redis_value(&other)?;
                let request = decode(key, &fields)?;
                tracing::debug!(key = %key, request_id = %request.request_id, "Consumed verification request");
                Ok(request)
            },
        }
    }

    async fn decrement_attempt(&self, key: &VerificationKey, request_id: Uuid) -> Result<u32> {
        let mut conn = self.conn_manager.clone();
        let left: i64 = Script::new(DECREMENT_SCRIPT)
            .key(Self::request_key(key))
            .arg(request_id.to_string())
            .invoke_async(&mut conn)
            .await?;

        if left < 0 {
            return Err(AuthError::NotFound);
        }
        u32::try_from(left).map_err(|_| corrupt("attempts_remaining"))
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn_manager.clone();
        let purged: usize = Script::new(PURGE_SCRIPT)
            .key(VERIFICATION_EXPIRY_INDEX)
            .arg(cutoff.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        if purged > 0 {
            tracing::debug!(purged, cutoff = %cutoff, "Purged expired verification requests");
        }
        Ok(purged)
    }
}
