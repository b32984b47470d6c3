//! Authentication constants.
//!
//! Defaults used when configuration leaves a value unset.

/// Verification code defaults.
pub mod codes {
    /// Number of characters in a generated code.
    pub const DEFAULT_LENGTH: usize = 6;

    /// Shortest code length accepted by configuration.
    pub const MIN_LENGTH: usize = 4;

    /// Longest code length accepted by configuration.
    pub const MAX_LENGTH: usize = 32;

    /// Minutes a code stays valid.
    pub const DEFAULT_TTL_MINUTES: i64 = 10;

    /// Longest code TTL accepted by configuration, in minutes.
    pub const MAX_TTL_MINUTES: i64 = 24 * 60;

    /// Wrong submissions allowed per code.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Minutes a record is kept after expiry before housekeeping deletes it.
    pub const DEFAULT_PURGE_GRACE_MINUTES: i64 = 60;

    /// Longest purge grace accepted by configuration, in minutes.
    pub const MAX_PURGE_GRACE_MINUTES: i64 = 30 * 24 * 60;
}

/// Session token defaults.
pub mod sessions {
    /// Hours a session token stays valid.
    pub const DEFAULT_TTL_HOURS: i64 = 24;

    /// Longest session TTL accepted by configuration, in hours.
    pub const MAX_TTL_HOURS: i64 = 365 * 24;

    /// `iss` claim written into and required from session tokens.
    pub const DEFAULT_ISSUER: &str = "agrogate";

    /// HS256 keys shorter than this are rejected.
    pub const MIN_SIGNING_KEY_BYTES: usize = 32;
}

/// Rate limit defaults.
pub mod rate_limits {
    /// Code requests allowed per subject per window.
    pub const DEFAULT_CODE_REQUESTS: u32 = 5;

    /// Verification submissions allowed per subject per window.
    pub const DEFAULT_VERIFY_ATTEMPTS: u32 = 20;

    /// Window length in seconds.
    pub const DEFAULT_WINDOW_SECS: u64 = 15 * 60;
}

/// External identity providers.
pub mod providers {
    /// Provider name passed to the account directory for Google links.
    pub const GOOGLE: &str = "google";
}

/// `Redis` key prefixes.
pub mod redis_keys {
    /// Prefix for verification request hashes.
    pub const VERIFICATION_PREFIX: &str = "verification";

    /// Sorted set indexing verification keys by expiry, used by purging.
    pub const VERIFICATION_EXPIRY_INDEX: &str = "verification:expiry";

    /// Prefix for rate limit sorted sets.
    pub const RATE_LIMIT_PREFIX: &str = "rate_limit";
}
