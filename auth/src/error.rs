//! Error types for verification and session operations.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Error taxonomy for the verification and session subsystem.
///
/// The first group is what a client can cause. The second group covers
/// fatal startup conditions, and the last group is infrastructure. Use
/// [`AuthError::client_message`] for anything shown to a user; the
/// `Display` text is meant for logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Verification Errors
    // ═══════════════════════════════════════════════════════════
    /// Wrong code, expired code or no outstanding request.
    #[error("Invalid or expired verification code")]
    InvalidOrExpiredCode,

    /// The request used up its attempts; a new code is required.
    #[error("Too many verification attempts")]
    TooManyAttempts,

    /// The request was already consumed by a successful verification.
    #[error("Verification code already consumed")]
    AlreadyConsumed,

    /// No verification request exists for the key.
    #[error("Verification request not found")]
    NotFound,

    /// The subject identifier is not a usable email address.
    #[error("Invalid subject identifier")]
    InvalidSubject,

    // ═══════════════════════════════════════════════════════════
    // Rate Limiting
    // ═══════════════════════════════════════════════════════════
    /// Rate limit exceeded for this subject and action.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    // ═══════════════════════════════════════════════════════════
    // Delivery
    // ═══════════════════════════════════════════════════════════
    /// The notification channel did not accept the code.
    #[error("Failed to dispatch verification code")]
    DispatchFailed,

    // ═══════════════════════════════════════════════════════════
    // Fatal Startup Errors
    // ═══════════════════════════════════════════════════════════
    /// The operating system's secure random source could not be read.
    #[error("Secure random source unavailable")]
    EntropyUnavailable,

    /// The session signing key is missing or unusable.
    #[error("Session signing key unavailable")]
    SigningUnavailable,

    /// Configuration value is missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════
    // Session Errors
    // ═══════════════════════════════════════════════════════════
    /// Presented session token failed signature, issuer or expiry checks.
    #[error("Invalid session token")]
    InvalidToken,

    /// Presented session token was revoked.
    #[error("Session token revoked")]
    TokenRevoked,

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════
    /// Verification store or rate limiter backend failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The caller's deadline expired before the flow finished.
    #[error("Operation timed out")]
    Timeout,

    /// Internal error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Returns `true` for errors that must abort startup.
    ///
    /// # Examples
    ///
    /// ```
    /// # use agrogate_auth::AuthError;
    /// assert!(AuthError::EntropyUnavailable.is_fatal());
    /// assert!(!AuthError::DispatchFailed.is_fatal());
    /// ```
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EntropyUnavailable | Self::SigningUnavailable | Self::ConfigError(_)
        )
    }

    /// Returns `true` for failures worth retrying with backoff.
    ///
    /// # Examples
    ///
    /// ```
    /// # use agrogate_auth::AuthError;
    /// assert!(AuthError::DispatchFailed.is_transient());
    /// assert!(!AuthError::InvalidOrExpiredCode.is_transient());
    /// ```
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::DispatchFailed | Self::StorageError(_))
    }

    /// Message safe to show a client.
    ///
    /// Every verification failure that could reveal whether a request
    /// exists, was used, or expired collapses into the same text.
    #[must_use]
    pub const fn client_message(&self) -> &'static str {
        match self {
            Self::InvalidOrExpiredCode | Self::AlreadyConsumed | Self::NotFound => {
                "The code is invalid or has expired."
            },
            Self::TooManyAttempts => "Too many attempts. Please request a new code.",
            Self::RateLimited { .. } => "Too many requests. Please try again later.",
            Self::DispatchFailed => "We could not send your code. Please request a new one.",
            Self::InvalidSubject => "Please enter a valid email address.",
            Self::InvalidToken | Self::TokenRevoked => "Your session is no longer valid.",
            Self::Timeout => "The request took too long. Please try again.",
            Self::EntropyUnavailable
            | Self::SigningUnavailable
            | Self::ConfigError(_)
            | Self::StorageError(_)
            | Self::InternalError(_) => "Something went wrong. Please try again later.",
        }
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(error: redis::RedisError) -> Self {
        Self::StorageError(error.to_string())
    }
}
