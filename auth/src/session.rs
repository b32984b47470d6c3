//! Session issuance and verification.
//!
//! Sessions are stateless HS256 tokens. The signing key is loaded once into
//! a [`SessionIssuer`] and handed to whatever needs it; nothing reads it
//! from global state.
//!
//! Verification is a pure function of the token, the key and the time
//! passed in. Revocation is optional and layered on top through
//! [`RevocationList`].

use crate::config::SessionConfig;
use crate::constants::sessions::MIN_SIGNING_KEY_BYTES;
use crate::error::{AuthError, Result};
use crate::state::{Role, Session, SubjectId};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Claims carried in a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject identifier.
    pub sub: String,
    /// Role at issue time.
    pub role: Role,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expires at (unix seconds).
    pub exp: i64,
    /// Token id.
    pub jti: Uuid,
    /// Issuer.
    pub iss: String,
}

impl SessionClaims {
    /// The session these claims describe.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] if a claim does not decode into a
    /// valid session.
    pub fn to_session(&self) -> Result<Session> {
        let subject = SubjectId::parse(&self.sub).map_err(|_| AuthError::InvalidToken)?;
        let issued_at = DateTime::from_timestamp(self.iat, 0).ok_or(AuthError::InvalidToken)?;
        let expires_at = DateTime::from_timestamp(self.exp, 0).ok_or(AuthError::InvalidToken)?;
        Ok(Session {
            subject,
            role: self.role,
            issued_at,
            expires_at,
            token_id: self.jti,
        })
    }
}

/// A signed session token. `Debug` does not print it.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken(String);

impl SignedToken {
    /// The compact JWS form, for handing to the client.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignedToken(<redacted>)")
    }
}

/// A session together with its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    /// Token for the client.
    pub token: SignedToken,
    /// Decoded session.
    pub session: Session,
}

/// Mints and verifies session tokens.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    /// Build an issuer from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningUnavailable`] if no signing key is
    /// configured or it is shorter than 32 bytes.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let Some(key) = config.signing_key.as_ref() else {
            tracing::error!("Session signing key is not configured");
            return Err(AuthError::SigningUnavailable);
        };
        let secret = key.expose_secret().as_bytes();
        if secret.len() < MIN_SIGNING_KEY_BYTES {
            tracing::error!(
                key_bytes = secret.len(),
                min_bytes = MIN_SIGNING_KEY_BYTES,
                "Session signing key is too short"
            );
            return Err(AuthError::SigningUnavailable);
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            ttl: config.ttl,
        })
    }

    /// Session lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a session for `subject`.
    ///
    /// Times are truncated to whole seconds so the returned [`Session`]
    /// matches what [`SessionIssuer::verify`] later decodes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningUnavailable`] if signing fails.
    pub fn issue(&self, subject: &SubjectId, role: Role, now: DateTime<Utc>) -> Result<IssuedSession> {
        let iat = now.timestamp();
        let exp = iat + self.ttl.num_seconds();
        let claims = SessionClaims {
            sub: subject.as_str().to_owned(),
            role,
            iat,
            exp,
            jti: Uuid::new_v4(),
            iss: self.issuer.clone(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to sign session token");
                AuthError::SigningUnavailable
            })?;
        let session = claims.to_session().map_err(|_| {
            AuthError::InternalError("issued claims do not form a session".into())
        })?;

        metrics::counter!("auth.sessions.issued").increment(1);
        tracing::info!(
            subject = %subject,
            role = ?role,
            token_id = %session.token_id,
            expires_at = %session.expires_at,
            "Session issued"
        );

        Ok(IssuedSession {
            token: SignedToken(token),
            session,
        })
    }

    /// Check signature, issuer and expiry of `token` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for any token that fails a check.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against `now` below, not the wall clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                AuthError::InvalidToken
            })?;

        if now.timestamp() >= data.claims.exp {
            tracing::debug!(token_id = %data.claims.jti, "Session token expired");
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }

    /// [`SessionIssuer::verify`], then reject tokens on `revocations`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] if the token fails verification
    /// - [`AuthError::TokenRevoked`] if it was revoked
    /// - Any error from the revocation list
    pub async fn verify_with_revocation<L: RevocationList>(
        &self,
        token: &str,
        now: DateTime<Utc>,
        revocations: &L,
    ) -> Result<SessionClaims> {
        let claims = self.verify(token, now)?;
        if revocations.is_revoked(claims.jti, now).await? {
            tracing::debug!(token_id = %claims.jti, "Session token revoked");
            return Err(AuthError::TokenRevoked);
        }
        Ok(claims)
    }
}

/// Denylist of revoked token ids.
///
/// Entries only need to outlive the token they revoke; `until` is the
/// token's own expiry.
pub trait RevocationList: Send + Sync {
    /// Revoke `token_id` until `until`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the backend fails.
    fn revoke(
        &self,
        token_id: Uuid,
        until: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// `true` if `token_id` is revoked at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the backend fails.
    fn is_revoked(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Drop entries whose token has expired by `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the backend fails.
    fn purge(&self, now: DateTime<Utc>) -> impl std::future::Future<Output = Result<usize>> + Send;
}

/// In-memory revocation list.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRevocationList {
    revoked: Arc<Mutex<HashMap<Uuid, DateTime<Utc>>>>,
}

impl InMemoryRevocationList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RevocationList for InMemoryRevocationList {
    async fn revoke(&self, token_id: Uuid, until: DateTime<Utc>) -> Result<()> {
        self.revoked
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?
            .insert(token_id, until);
        Ok(())
    }

    async fn is_revoked(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let revoked = self
            .revoked
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;
        Ok(revoked.get(&token_id).is_some_and(|until| now < *until))
    }

    async fn purge(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut revoked = self
            .revoked
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;
        let before = revoked.len();
        revoked.retain(|_, until| now < *until);
        Ok(before - revoked.len())
    }
}
