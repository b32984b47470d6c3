//! `Redis` implementations of the storage providers.
//!
//! - **Verification Store**: one hash per (subject, purpose), Lua scripts for
//!   compare-and-set consumption
//! - **Rate Limiter**: sliding window over sorted sets
//!
//! In-memory counterparts live in [`crate::mocks`].

pub mod rate_limiter_redis;
pub mod verification_redis;

pub use rate_limiter_redis::RedisRateLimiter;
pub use verification_redis::RedisVerificationStore;
