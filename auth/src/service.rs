//! Public entry points.
//!
//! [`AuthService`] runs one flow per call: it builds a runtime
//! [`Store`] around a fresh [`FlowState`], sends the command and waits for
//! the terminal action.
//!
//! Each call has a deadline, the configured one or the caller's own
//! (`*_within`). It covers everything up to the first write to the
//! verification store. A call that runs out of time before then returns
//! [`AuthError::Timeout`] and has changed nothing, so it is safe to retry.
//! Once a code has been issued or consumed the call finishes regardless,
//! so the caller learns what happened to it.

use crate::actions::FlowAction;
use crate::code::{CodeGenerator, CodeHasher, VerificationCode};
use crate::completion::Completion;
use crate::config::AuthConfig;
use crate::deadline::Deadline;
use crate::environment::AuthEnvironment;
use crate::error::{AuthError, Result};
use crate::providers::{AccountDirectory, NotificationDispatcher, RateLimiter, VerificationStore};
use crate::reducers::FlowReducer;
use crate::session::{IssuedSession, RevocationList, SessionIssuer};
use crate::state::{FlowState, Purpose, Session, SubjectId, VerificationKey};
use crate::verifier::{CredentialVerifier, FailureReason};
use agrogate_core::environment::Clock;
use agrogate_runtime::Store;
use agrogate_runtime::error::StoreError;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;

/// Answer to a code request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeRequestOutcome {
    /// A code was issued and delivered.
    Accepted {
        /// When the code stops working.
        expires_at: DateTime<Utc>,
    },
    /// Too many requests; nothing was issued.
    RateLimited {
        /// Wait at least this long.
        retry_after: Duration,
    },
}

/// Answer to a code submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Verified and completed.
    Authenticated(IssuedSession),
    /// Wrong, expired, unknown or already used.
    InvalidOrExpiredCode,
    /// No attempts left; request a new code.
    TooManyAttempts,
    /// Too many submissions; nothing was checked.
    RateLimited {
        /// Wait at least this long.
        retry_after: Duration,
    },
}

/// Credential verification and session issuance.
pub struct AuthService<S, N, A, L, V>
where
    S: VerificationStore + Clone,
    N: NotificationDispatcher + Clone,
    A: AccountDirectory + Clone,
    L: RateLimiter + Clone,
    V: RevocationList,
{
    env: AuthEnvironment<S, N, A, L>,
    revocations: V,
    deadline: Duration,
    purge_grace: chrono::Duration,
}

impl<S, N, A, L, V> AuthService<S, N, A, L, V>
where
    S: VerificationStore + Clone + 'static,
    N: NotificationDispatcher + Clone + 'static,
    A: AccountDirectory + Clone + 'static,
    L: RateLimiter + Clone + 'static,
    V: RevocationList + 'static,
{
    /// Create a service around an assembled environment.
    #[must_use]
    pub fn new(env: AuthEnvironment<S, N, A, L>, revocations: V) -> Self {
        let defaults = AuthConfig::default();
        Self {
            env,
            revocations,
            deadline: defaults.request_deadline,
            purge_grace: defaults.verification.purge_grace,
        }
    }

    /// Build everything from configuration.
    ///
    /// Startup checks happen here: the random source is probed and the
    /// signing key is loaded, so a broken deployment fails before serving
    /// any request.
    ///
    /// # Errors
    ///
    /// - [`AuthError::EntropyUnavailable`] if the OS random source fails
    /// - [`AuthError::SigningUnavailable`] if the signing key is missing or too short
    /// - [`AuthError::ConfigError`] for invalid settings, see [`AuthConfig::validate`]
    pub fn from_config(
        config: &AuthConfig,
        clock: Arc<dyn Clock>,
        store: S,
        notifier: N,
        accounts: A,
        rate_limiter: L,
        revocations: V,
    ) -> Result<Self> {
        config.validate()?;
        let verification = &config.verification;

        CodeGenerator::probe()?;
        let generator = CodeGenerator::new(verification.code_length, verification.alphabet)?;
        if verification.pepper.expose_secret().is_empty() {
            tracing::warn!("No code pepper configured; code hashes are keyed with an empty key");
        }
        let hasher = CodeHasher::new(&verification.pepper)?;
        let sessions = SessionIssuer::new(&config.session)?;

        let env = AuthEnvironment::new(
            clock,
            CredentialVerifier::new(store, generator, hasher),
            notifier,
            accounts,
            rate_limiter,
            Arc::new(sessions),
        )
        .with_ttls(verification.ttls)
        .with_max_attempts(verification.max_attempts)
        .with_rate_limits(config.rate_limits);

        tracing::info!(
            code_length = verification.code_length,
            alphabet = ?verification.alphabet,
            max_attempts = verification.max_attempts,
            deadline_ms = config.request_deadline.as_millis(),
            "Auth service configured"
        );

        Ok(Self::new(env, revocations)
            .with_deadline(config.request_deadline)
            .with_purge_grace(verification.purge_grace))
    }

    /// Set the default per-call deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Set how long expired records are kept.
    #[must_use]
    pub const fn with_purge_grace(mut self, grace: chrono::Duration) -> Self {
        self.purge_grace = grace;
        self
    }

    /// The flow environment.
    #[must_use]
    pub const fn environment(&self) -> &AuthEnvironment<S, N, A, L> {
        &self.env
    }

    async fn run(&self, state: FlowState, command: FlowAction) -> Result<FlowAction> {
        let store = Store::new(state, FlowReducer::new(), self.env.clone());
        store
            .send_and_wait(command, FlowAction::is_terminal)
            .await
            .map_err(|e| match e {
                StoreError::Timeout => AuthError::Timeout,
                StoreError::NoTerminalAction => {
                    AuthError::InternalError("flow ended without a result".into())
                },
            })
    }

    /// Issue a code for `subject` and send it.
    ///
    /// Any code issued earlier for the same subject and purpose stops
    /// working.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidSubject`] if `subject` is not an email address
    /// - [`AuthError::DispatchFailed`] if the code was issued but could not
    ///   be delivered; asking again issues a new one
    /// - [`AuthError::Timeout`] if the deadline passed before a code was
    ///   issued; any earlier code still works
    /// - Storage and entropy errors
    pub async fn request_code(&self, subject: &str, purpose: Purpose) -> Result<CodeRequestOutcome> {
        self.request_code_within(subject, purpose, self.deadline).await
    }

    /// [`AuthService::request_code`] with the caller's own deadline.
    ///
    /// # Errors
    ///
    /// As [`AuthService::request_code`].
    #[tracing::instrument(skip(self), name = "request_code")]
    pub async fn request_code_within(
        &self,
        subject: &str,
        purpose: Purpose,
        deadline: Duration,
    ) -> Result<CodeRequestOutcome> {
        let deadline = Deadline::after(deadline);
        let key = VerificationKey::new(SubjectId::parse(subject)?, purpose);
        let state = FlowState::initiated(key).with_deadline(deadline);

        match self.run(state, FlowAction::RequestCode).await? {
            FlowAction::CodeDispatched { expires_at, .. } => {
                Ok(CodeRequestOutcome::Accepted { expires_at })
            },
            FlowAction::CodeDispatchFailed { .. } => Err(AuthError::DispatchFailed),
            FlowAction::CodeRequestRateLimited { retry_after } => {
                Ok(CodeRequestOutcome::RateLimited { retry_after })
            },
            FlowAction::FlowErrored { error } => Err(error),
            other => Err(AuthError::InternalError(format!(
                "unexpected result of a code request: {other:?}"
            ))),
        }
    }

    /// Check `code` for `subject` and, if it is accepted, apply
    /// `completion` and issue a session. The purpose is the completion's.
    ///
    /// Wrong, expired, unknown and reused codes all yield
    /// [`SubmitOutcome::InvalidOrExpiredCode`].
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidSubject`] if `subject` is not an email address
    /// - [`AuthError::Timeout`] if the deadline passed before the code was
    ///   checked; the code and its attempts are untouched
    /// - Storage, account and signing errors. If the completion fails the
    ///   code has been used and a new one is needed.
    pub async fn submit_code(
        &self,
        subject: &str,
        code: &str,
        completion: Completion,
    ) -> Result<SubmitOutcome> {
        self.submit_code_within(subject, code, completion, self.deadline)
            .await
    }

    /// [`AuthService::submit_code`] with the caller's own deadline.
    ///
    /// # Errors
    ///
    /// As [`AuthService::submit_code`].
    #[tracing::instrument(skip(self, code, completion), fields(purpose = %completion.purpose()), name = "submit_code")]
    pub async fn submit_code_within(
        &self,
        subject: &str,
        code: &str,
        completion: Completion,
        deadline: Duration,
    ) -> Result<SubmitOutcome> {
        let deadline = Deadline::after(deadline);
        let key = VerificationKey::new(SubjectId::parse(subject)?, completion.purpose());
        let state = FlowState::awaiting_code(key).with_deadline(deadline);
        let command = FlowAction::SubmitCode {
            code: VerificationCode::submitted(code),
            completion,
        };

        match self.run(state, command).await? {
            FlowAction::SessionIssued { session } => Ok(SubmitOutcome::Authenticated(session)),
            FlowAction::CodeRejected { failure } => Ok(match failure.reason {
                FailureReason::InvalidOrExpiredCode => SubmitOutcome::InvalidOrExpiredCode,
                FailureReason::TooManyAttempts => SubmitOutcome::TooManyAttempts,
            }),
            FlowAction::SubmissionRateLimited { retry_after } => {
                Ok(SubmitOutcome::RateLimited { retry_after })
            },
            FlowAction::FlowErrored { error } => Err(error),
            other => Err(AuthError::InternalError(format!(
                "unexpected result of a code submission: {other:?}"
            ))),
        }
    }

    /// Verify a presented session token, including revocation.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] if the token is forged, malformed or expired
    /// - [`AuthError::TokenRevoked`] if it was revoked
    pub async fn verify_session(&self, token: &str) -> Result<Session> {
        let now = self.env.clock.now();
        self.env
            .sessions
            .verify_with_revocation(token, now, &self.revocations)
            .await?
            .to_session()
    }

    /// Revoke `session` until it would have expired anyway.
    ///
    /// # Errors
    ///
    /// Returns the revocation list's error.
    pub async fn revoke_session(&self, session: &Session) -> Result<()> {
        self.revocations
            .revoke(session.token_id, session.expires_at)
            .await?;
        tracing::info!(subject = %session.subject, token_id = %session.token_id, "Session revoked");
        Ok(())
    }

    /// Delete verification records expired for longer than the purge grace
    /// and revocations of expired tokens.
    ///
    /// Returns the number of verification records removed.
    ///
    /// # Errors
    ///
    /// Returns the store's or revocation list's error.
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = self.env.clock.now();
        let purged = self
            .env
            .verifier
            .store()
            .purge_expired(now - self.purge_grace)
            .await?;
        let revocations = self.revocations.purge(now).await?;
        let locks = self.env.verifier.locks().prune();

        tracing::debug!(purged, revocations, locks, "Expired records purged");
        Ok(purged)
    }

    /// Call [`AuthService::purge_expired`] every `period` on a background
    /// task. Abort the returned handle to stop it.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = service.purge_expired().await {
                    tracing::warn!(error = %e, "Sweep failed");
                }
            }
        })
    }
}
