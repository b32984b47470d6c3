//! Authentication configuration.
//!
//! Values come from the application, usually through
//! [`AuthConfig::from_env`]. Every setting has a default except the session
//! signing key, whose absence is reported when the
//! [`SessionIssuer`](crate::session::SessionIssuer) is built.
//!
//! # Environment variables
//!
//! | Variable | Default |
//! |---|---|
//! | `AGROGATE_CODE_LENGTH` | `6` |
//! | `AGROGATE_CODE_ALPHABET` | `numeric` (or `alphanumeric`) |
//! | `AGROGATE_CODE_TTL_MINUTES` | `10` |
//! | `AGROGATE_CODE_TTL_<PURPOSE>_MINUTES` | the general TTL (`LOGIN`, `REGISTRATION`, `PASSWORD_RESET`, `GOOGLE_LINK`) |
//! | `AGROGATE_CODE_MAX_ATTEMPTS` | `5` |
//! | `AGROGATE_CODE_PURGE_GRACE_MINUTES` | `60` |
//! | `AGROGATE_CODE_PEPPER` | empty |
//! | `AGROGATE_RATE_CODE_REQUESTS` | `5` |
//! | `AGROGATE_RATE_VERIFY_ATTEMPTS` | `20` |
//! | `AGROGATE_RATE_WINDOW_SECS` | `900` |
//! | `AGROGATE_SESSION_SIGNING_KEY` | none |
//! | `AGROGATE_SESSION_ISSUER` | `agrogate` |
//! | `AGROGATE_SESSION_TTL_HOURS` | `24` |
//! | `AGROGATE_NOTIFY` | `console` (or `smtp`) |
//! | `AGROGATE_SMTP_SERVER`, `_PORT`, `_USERNAME`, `_PASSWORD`, `_FROM_EMAIL`, `_FROM_NAME` | required for `smtp` (port `587`) |
//! | `AGROGATE_REDIS_URL` | none (in-memory stores) |
//! | `AGROGATE_REQUEST_DEADLINE_SECS` | `10` |

use crate::code::CodeAlphabet;
use crate::constants::{codes, rate_limits, sessions};
use crate::error::{AuthError, Result};
use crate::providers::{RateLimit, RateLimitAction};
use crate::state::Purpose;
use chrono::Duration;
use secrecy::SecretString;
use std::str::FromStr;

/// Per-purpose code lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurposeTtls {
    login: Duration,
    registration: Duration,
    password_reset: Duration,
    google_link: Duration,
}

impl PurposeTtls {
    /// Same TTL for every purpose.
    #[must_use]
    pub const fn uniform(ttl: Duration) -> Self {
        Self {
            login: ttl,
            registration: ttl,
            password_reset: ttl,
            google_link: ttl,
        }
    }

    /// TTL for `purpose`.
    #[must_use]
    pub const fn get(&self, purpose: Purpose) -> Duration {
        match purpose {
            Purpose::Login => self.login,
            Purpose::Registration => self.registration,
            Purpose::PasswordReset => self.password_reset,
            Purpose::GoogleLink => self.google_link,
        }
    }

    /// Override the TTL for `purpose`.
    #[must_use]
    pub const fn with(mut self, purpose: Purpose, ttl: Duration) -> Self {
        match purpose {
            Purpose::Login => self.login = ttl,
            Purpose::Registration => self.registration = ttl,
            Purpose::PasswordReset => self.password_reset = ttl,
            Purpose::GoogleLink => self.google_link = ttl,
        }
        self
    }
}

/// Verification code configuration.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Characters per code.
    ///
    /// Default: 6
    pub code_length: usize,

    /// Symbols codes are drawn from.
    ///
    /// Default: numeric
    pub alphabet: CodeAlphabet,

    /// Code lifetime per purpose.
    ///
    /// Default: 10 minutes for every purpose
    pub ttls: PurposeTtls,

    /// Wrong submissions allowed per code.
    ///
    /// Default: 5
    pub max_attempts: u32,

    /// How long expired records are kept before purging.
    ///
    /// Default: 60 minutes
    pub purge_grace: Duration,

    /// HMAC key for code hashes. Must be identical on every instance that
    /// shares a store.
    pub pepper: SecretString,
}

impl VerificationConfig {
    /// Set code length.
    #[must_use]
    pub const fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    /// Set code alphabet.
    #[must_use]
    pub const fn with_alphabet(mut self, alphabet: CodeAlphabet) -> Self {
        self.alphabet = alphabet;
        self
    }

    /// Set the TTL for one purpose.
    #[must_use]
    pub const fn with_ttl(mut self, purpose: Purpose, ttl: Duration) -> Self {
        self.ttls = self.ttls.with(purpose, ttl);
        self
    }

    /// Set the TTL for every purpose.
    #[must_use]
    pub const fn with_uniform_ttl(mut self, ttl: Duration) -> Self {
        self.ttls = PurposeTtls::uniform(ttl);
        self
    }

    /// Set attempts per code.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set purge grace window.
    #[must_use]
    pub const fn with_purge_grace(mut self, grace: Duration) -> Self {
        self.purge_grace = grace;
        self
    }

    /// Set the hashing pepper.
    #[must_use]
    pub fn with_pepper(mut self, pepper: SecretString) -> Self {
        self.pepper = pepper;
        self
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_length: codes::DEFAULT_LENGTH,
            alphabet: CodeAlphabet::Numeric,
            ttls: PurposeTtls::uniform(Duration::minutes(codes::DEFAULT_TTL_MINUTES)),
            max_attempts: codes::DEFAULT_MAX_ATTEMPTS,
            purge_grace: Duration::minutes(codes::DEFAULT_PURGE_GRACE_MINUTES),
            pepper: SecretString::from(""),
        }
    }
}

/// Rate limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Limit on code requests per subject.
    ///
    /// Default: 5 per 15 minutes
    pub code_requests: RateLimit,

    /// Limit on code submissions per subject.
    ///
    /// Default: 20 per 15 minutes
    pub verify_attempts: RateLimit,
}

impl RateLimitConfig {
    /// Limit applying to `action`.
    #[must_use]
    pub const fn limit_for(&self, action: RateLimitAction) -> RateLimit {
        match action {
            RateLimitAction::RequestCode => self.code_requests,
            RateLimitAction::VerifyCode => self.verify_attempts,
        }
    }

    /// Set code request limit.
    #[must_use]
    pub const fn with_code_requests(mut self, limit: RateLimit) -> Self {
        self.code_requests = limit;
        self
    }

    /// Set verification limit.
    #[must_use]
    pub const fn with_verify_attempts(mut self, limit: RateLimit) -> Self {
        self.verify_attempts = limit;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let window = std::time::Duration::from_secs(rate_limits::DEFAULT_WINDOW_SECS);
        Self {
            code_requests: RateLimit::new(rate_limits::DEFAULT_CODE_REQUESTS, window),
            verify_attempts: RateLimit::new(rate_limits::DEFAULT_VERIFY_ATTEMPTS, window),
        }
    }
}

/// Session token configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HS256 signing key, at least 32 bytes.
    pub signing_key: Option<SecretString>,

    /// `iss` claim.
    ///
    /// Default: `agrogate`
    pub issuer: String,

    /// Session lifetime.
    ///
    /// Default: 24 hours
    pub ttl: Duration,
}

impl SessionConfig {
    /// Configuration with a signing key and defaults otherwise.
    #[must_use]
    pub fn new(signing_key: SecretString) -> Self {
        Self {
            signing_key: Some(signing_key),
            ..Self::default()
        }
    }

    /// Set the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set session lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            issuer: sessions::DEFAULT_ISSUER.to_string(),
            ttl: Duration::hours(sessions::DEFAULT_TTL_HOURS),
        }
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay host.
    pub server: String,
    /// Relay port (587 for STARTTLS).
    pub port: u16,
    /// Relay username.
    pub username: String,
    /// Relay password.
    pub password: SecretString,
    /// Sender address.
    pub from_email: String,
    /// Sender display name.
    pub from_name: String,
}

/// How codes reach subjects.
#[derive(Debug, Clone, Default)]
pub enum NotificationConfig {
    /// Print to stdout (development).
    #[default]
    Console,
    /// Send email over SMTP.
    Smtp(SmtpConfig),
}

/// All configuration for the auth service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Code settings.
    pub verification: VerificationConfig,
    /// Rate limits.
    pub rate_limits: RateLimitConfig,
    /// Session tokens.
    pub session: SessionConfig,
    /// Notification channel.
    pub notification: NotificationConfig,
    /// `Redis` URL; in-memory stores are used when unset.
    pub redis_url: Option<String>,
    /// Deadline applied to each `request_code`/`submit_code` call.
    ///
    /// Default: 10 seconds
    pub request_deadline: std::time::Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            verification: VerificationConfig::default(),
            rate_limits: RateLimitConfig::default(),
            session: SessionConfig::default(),
            notification: NotificationConfig::default(),
            redis_url: None,
            request_deadline: std::time::Duration::from_secs(10),
        }
    }
}

impl AuthConfig {
    /// Set verification settings.
    #[must_use]
    pub fn with_verification(mut self, verification: VerificationConfig) -> Self {
        self.verification = verification;
        self
    }

    /// Set rate limits.
    #[must_use]
    pub const fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Set session settings.
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Set notification channel.
    #[must_use]
    pub fn with_notification(mut self, notification: NotificationConfig) -> Self {
        self.notification = notification;
        self
    }

    /// Set per-call deadline.
    #[must_use]
    pub const fn with_request_deadline(mut self, deadline: std::time::Duration) -> Self {
        self.request_deadline = deadline;
        self
    }

    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory (or a parent) is read first
    /// if present; variables already set take precedence.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if a variable is set but malformed
    /// or SMTP is selected without its required settings.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {},
            Err(e) => return Err(AuthError::ConfigError(format!("unreadable .env file: {e}"))),
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Same as [`AuthConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let default_ttl = vars
            .minutes("AGROGATE_CODE_TTL_MINUTES")?
            .unwrap_or(Duration::minutes(codes::DEFAULT_TTL_MINUTES));
        let mut ttls = PurposeTtls::uniform(default_ttl);
        for purpose in Purpose::ALL {
            let name = format!(
                "AGROGATE_CODE_TTL_{}_MINUTES",
                purpose.as_str().to_ascii_uppercase()
            );
            if let Some(ttl) = vars.minutes(&name)? {
                ttls = ttls.with(purpose, ttl);
            }
        }

        let alphabet = match vars.get("AGROGATE_CODE_ALPHABET").as_deref() {
            None | Some("numeric") => CodeAlphabet::Numeric,
            Some("alphanumeric") => CodeAlphabet::Alphanumeric,
            Some(other) => {
                return Err(AuthError::ConfigError(format!(
                    "AGROGATE_CODE_ALPHABET must be `numeric` or `alphanumeric`, got `{other}`"
                )));
            },
        };

        let verification = VerificationConfig {
            code_length: vars
                .parse("AGROGATE_CODE_LENGTH")?
                .unwrap_or(codes::DEFAULT_LENGTH),
            alphabet,
            ttls,
            max_attempts: vars
                .parse("AGROGATE_CODE_MAX_ATTEMPTS")?
                .unwrap_or(codes::DEFAULT_MAX_ATTEMPTS),
            purge_grace: vars
                .minutes("AGROGATE_CODE_PURGE_GRACE_MINUTES")?
                .unwrap_or(Duration::minutes(codes::DEFAULT_PURGE_GRACE_MINUTES)),
            pepper: SecretString::from(vars.get("AGROGATE_CODE_PEPPER").unwrap_or_default()),
        };

        let window = std::time::Duration::from_secs(
            vars.parse("AGROGATE_RATE_WINDOW_SECS")?
                .unwrap_or(rate_limits::DEFAULT_WINDOW_SECS),
        );
        let rate_limits = RateLimitConfig {
            code_requests: RateLimit::new(
                vars.parse("AGROGATE_RATE_CODE_REQUESTS")?
                    .unwrap_or(rate_limits::DEFAULT_CODE_REQUESTS),
                window,
            ),
            verify_attempts: RateLimit::new(
                vars.parse("AGROGATE_RATE_VERIFY_ATTEMPTS")?
                    .unwrap_or(rate_limits::DEFAULT_VERIFY_ATTEMPTS),
                window,
            ),
        };

        let session = SessionConfig {
            signing_key: vars.get("AGROGATE_SESSION_SIGNING_KEY").map(SecretString::from),
            issuer: vars
                .get("AGROGATE_SESSION_ISSUER")
                .unwrap_or_else(|| sessions::DEFAULT_ISSUER.to_string()),
            ttl: vars
                .hours("AGROGATE_SESSION_TTL_HOURS")?
                .unwrap_or(Duration::hours(sessions::DEFAULT_TTL_HOURS)),
        };

        let notification = match vars.get("AGROGATE_NOTIFY").as_deref() {
            None | Some("console") => NotificationConfig::Console,
            Some("smtp") => NotificationConfig::Smtp(SmtpConfig {
                server: vars.require("AGROGATE_SMTP_SERVER")?,
                port: vars.parse("AGROGATE_SMTP_PORT")?.unwrap_or(587),
                username: vars.require("AGROGATE_SMTP_USERNAME")?,
                password: SecretString::from(vars.require("AGROGATE_SMTP_PASSWORD")?),
                from_email: vars.require("AGROGATE_SMTP_FROM_EMAIL")?,
                from_name: vars
                    .get("AGROGATE_SMTP_FROM_NAME")
                    .unwrap_or_else(|| "Agrogate".to_string()),
            }),
            Some(other) => {
                return Err(AuthError::ConfigError(format!(
                    "AGROGATE_NOTIFY must be `console` or `smtp`, got `{other}`"
                )));
            },
        };

        let request_deadline = std::time::Duration::from_secs(
            vars.parse("AGROGATE_REQUEST_DEADLINE_SECS")?.unwrap_or(10),
        );

        let config = Self {
            verification,
            rate_limits,
            session,
            notification,
            redis_url: vars.get("AGROGATE_REDIS_URL"),
            request_deadline,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every code or session unusable.
    ///
    /// Called by [`AuthConfig::from_lookup`] and
    /// [`AuthService::from_config`](crate::AuthService::from_config).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        let verification = &self.verification;
        let max_ttl = Duration::minutes(codes::MAX_TTL_MINUTES);
        for purpose in Purpose::ALL {
            let ttl = verification.ttls.get(purpose);
            if ttl <= Duration::zero() || ttl > max_ttl {
                return Err(AuthError::ConfigError(format!(
                    "code TTL for {purpose} must be between 1 and {} minutes",
                    codes::MAX_TTL_MINUTES
                )));
            }
        }
        ensure(
            verification.max_attempts > 0,
            "AGROGATE_CODE_MAX_ATTEMPTS must be at least 1",
        )?;
        ensure(
            verification.purge_grace >= Duration::zero()
                && verification.purge_grace <= Duration::minutes(codes::MAX_PURGE_GRACE_MINUTES),
            "AGROGATE_CODE_PURGE_GRACE_MINUTES is out of range",
        )?;

        for limit in [self.rate_limits.code_requests, self.rate_limits.verify_attempts] {
            ensure(limit.max_attempts > 0, "rate limits must allow at least one event")?;
            ensure(!limit.window.is_zero(), "AGROGATE_RATE_WINDOW_SECS must be positive")?;
        }

        ensure(
            self.session.ttl > Duration::zero()
                && self.session.ttl <= Duration::hours(sessions::MAX_TTL_HOURS),
            "AGROGATE_SESSION_TTL_HOURS is out of range",
        )?;
        ensure(
            !self.request_deadline.is_zero(),
            "AGROGATE_REQUEST_DEADLINE_SECS must be positive",
        )
    }
}

fn ensure(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(AuthError::ConfigError(message.to_string()))
    }
}

/// Typed access to variables, treating empty values as unset.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.trim().is_empty())
    }

    fn require(&self, name: &str) -> Result<String> {
        self.get(name)
            .ok_or_else(|| AuthError::ConfigError(format!("{name} must be set")))
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| AuthError::ConfigError(format!("{name}=`{raw}`: {e}")))
            })
            .transpose()
    }

    fn minutes(&self, name: &str) -> Result<Option<Duration>> {
        self.parse::<i64>(name)?
            .map(|minutes| Duration::try_minutes(minutes).ok_or_else(|| out_of_range(name)))
            .transpose()
    }

    fn hours(&self, name: &str) -> Result<Option<Duration>> {
        self.parse::<i64>(name)?
            .map(|hours| Duration::try_hours(hours).ok_or_else(|| out_of_range(name)))
            .transpose()
    }
}

fn out_of_range(name: &str) -> AuthError {
    AuthError::ConfigError(format!("{name} is out of range"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AuthConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.verification.code_length, 6);
        assert_eq!(config.verification.max_attempts, 5);
        assert_eq!(config.verification.ttls.get(Purpose::Login), Duration::minutes(10));
        assert!(config.session.signing_key.is_none());
        assert_eq!(config.session.issuer, "agrogate");
        assert!(matches!(config.notification, NotificationConfig::Console));
        assert_eq!(config.rate_limits.code_requests.max_attempts, 5);
    }

    #[test]
    fn test_per_purpose_ttl_override() {
        let config = AuthConfig::from_lookup(lookup(&[
            ("AGROGATE_CODE_TTL_MINUTES", "15"),
            ("AGROGATE_CODE_TTL_PASSWORD_RESET_MINUTES", "30"),
        ]))
        .unwrap();

        assert_eq!(config.verification.ttls.get(Purpose::Login), Duration::minutes(15));
        assert_eq!(
            config.verification.ttls.get(Purpose::PasswordReset),
            Duration::minutes(30)
        );
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let result = AuthConfig::from_lookup(lookup(&[("AGROGATE_CODE_LENGTH", "six")]));
        assert!(matches!(result, Err(AuthError::ConfigError(msg)) if msg.contains("AGROGATE_CODE_LENGTH")));
    }

    #[test]
    fn test_huge_ttl_is_an_error_not_a_panic() {
        for name in [
            "AGROGATE_CODE_TTL_MINUTES",
            "AGROGATE_CODE_TTL_LOGIN_MINUTES",
            "AGROGATE_CODE_PURGE_GRACE_MINUTES",
            "AGROGATE_SESSION_TTL_HOURS",
        ] {
            let result = AuthConfig::from_lookup(lookup(&[(name, "9223372036854775807")]));
            assert!(
                matches!(result, Err(AuthError::ConfigError(ref msg)) if msg.contains(name)),
                "{name}: {result:?}"
            );
        }

        // Representable but longer than a day.
        let result = AuthConfig::from_lookup(lookup(&[("AGROGATE_CODE_TTL_MINUTES", "100000")]));
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_settings_that_disable_codes_are_rejected() {
        for pairs in [
            [("AGROGATE_CODE_TTL_MINUTES", "-5")],
            [("AGROGATE_CODE_TTL_MINUTES", "0")],
            [("AGROGATE_CODE_TTL_REGISTRATION_MINUTES", "-1")],
            [("AGROGATE_CODE_MAX_ATTEMPTS", "0")],
            [("AGROGATE_CODE_PURGE_GRACE_MINUTES", "-1")],
            [("AGROGATE_RATE_WINDOW_SECS", "0")],
            [("AGROGATE_RATE_CODE_REQUESTS", "0")],
            [("AGROGATE_RATE_VERIFY_ATTEMPTS", "0")],
            [("AGROGATE_SESSION_TTL_HOURS", "0")],
            [("AGROGATE_REQUEST_DEADLINE_SECS", "0")],
        ] {
            let result = AuthConfig::from_lookup(lookup(&pairs));
            assert!(matches!(result, Err(AuthError::ConfigError(_))), "{pairs:?}: {result:?}");
        }
    }

    #[test]
    fn test_validate_catches_builder_values() {
        let config = AuthConfig::default()
            .with_verification(VerificationConfig::default().with_max_attempts(0));
        assert!(matches!(config.validate(), Err(AuthError::ConfigError(_))));

        let config = AuthConfig::default().with_request_deadline(std::time::Duration::ZERO);
        assert!(matches!(config.validate(), Err(AuthError::ConfigError(_))));

        assert!(AuthConfig::default().validate().is_ok());
    }

    #[test]
    fn test_smtp_requires_settings() {
        let missing = AuthConfig::from_lookup(lookup(&[("AGROGATE_NOTIFY", "smtp")]));
        assert!(matches!(missing, Err(AuthError::ConfigError(_))));

        let config = AuthConfig::from_lookup(lookup(&[
            ("AGROGATE_NOTIFY", "smtp"),
            ("AGROGATE_SMTP_SERVER", "smtp.example.com"),
            ("AGROGATE_SMTP_USERNAME", "relay"),
            ("AGROGATE_SMTP_PASSWORD", "hunter2"),
            ("AGROGATE_SMTP_FROM_EMAIL", "noreply@example.com"),
        ]))
        .unwrap();
        let NotificationConfig::Smtp(smtp) = config.notification else {
            unreachable!("smtp was selected");
        };
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_builders() {
        let verification = VerificationConfig::default()
            .with_code_length(8)
            .with_alphabet(CodeAlphabet::Alphanumeric)
            .with_uniform_ttl(Duration::minutes(5))
            .with_ttl(Purpose::Registration, Duration::hours(1))
            .with_max_attempts(3);

        assert_eq!(verification.code_length, 8);
        assert_eq!(verification.ttls.get(Purpose::Login), Duration::minutes(5));
        assert_eq!(verification.ttls.get(Purpose::Registration), Duration::hours(1));
        assert_eq!(verification.max_attempts, 3);

        let session = SessionConfig::new(SecretString::from("k".repeat(32)))
            .with_issuer("farm-tests")
            .with_ttl(Duration::hours(1));
        assert_eq!(session.issuer, "farm-tests");
        assert_eq!(session.ttl, Duration::hours(1));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = AuthConfig::default()
            .with_session(SessionConfig::new(SecretString::from("super-secret-signing-key-material!!")));
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
