//! Verification flow reducer.
//!
//! Drives one (subject, purpose) flow through
//! `Initiated → CodeSent → Verified → Completed`, with `Expired` and
//! `Failed` as absorbing states.
//!
//! # Flow
//!
//! 1. `RequestCode`: rate limit, issue (superseding any older code), dispatch
//! 2. `CodeDispatched` / `CodeDispatchFailed`: the code is outstanding either way
//! 3. `SubmitCode`: rate limit, verify under the key lock
//! 4. `CodeVerified`: run the completion side effect, then mint the session
//! 5. `SessionIssued`: done
//!
//! Expiry is noticed when a submission arrives, never by a timer.
//!
//! All I/O happens inside `Effect::Future`s. The state's [`Deadline`]
//! bounds the rate limit check and the verifier's lock wait and lookup. No
//! store write starts once it has passed, and after a write has committed
//! the flow runs to its end: an issued code is dispatched, a consumed code
//! is completed.

use crate::actions::FlowAction;
use crate::code::VerificationCode;
use crate::completion::Completion;
use crate::deadline::Deadline;
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::providers::{
    AccountDirectory, Admission, NotificationDispatcher, RateLimitAction, RateLimiter,
    VerificationStore,
};
use crate::state::{FlowState, FlowStatus, VerificationKey};
use crate::verifier::{Diagnostic, VerifiedCode, VerifyOutcome};
use agrogate_core::effect::Effect;
use agrogate_core::environment::Clock;
use agrogate_core::reducer::Reducer;
use agrogate_core::{SmallVec, smallvec};
use agrogate_runtime::retry_transient;
use std::marker::PhantomData;

/// Reducer for verification flows.
#[derive(Debug, Clone, Copy)]
pub struct FlowReducer<S, N, A, L> {
    _phantom: PhantomData<fn() -> (S, N, A, L)>,
}

impl<S, N, A, L> FlowReducer<S, N, A, L> {
    /// Create a new flow reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<S, N, A, L> Default for FlowReducer<S, N, A, L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed `action` straight back into the reducer.
fn emit(action: FlowAction) -> Effect<FlowAction> {
    Effect::future(async move { Some(action) })
}

impl<S, N, A, L> FlowReducer<S, N, A, L>
where
    S: VerificationStore + Clone + 'static,
    N: NotificationDispatcher + Clone + 'static,
    A: AccountDirectory + Clone + 'static,
    L: RateLimiter + Clone + 'static,
{
    fn issue_and_dispatch(
        key: VerificationKey,
        deadline: Deadline,
        env: &AuthEnvironment<S, N, A, L>,
    ) -> Effect<FlowAction> {
        let now = env.clock.now();
        let verifier = env.verifier.clone();
        let notifier = env.notifier.clone();
        let limiter = env.rate_limiter.clone();
        let limit = env.rate_limits.limit_for(RateLimitAction::RequestCode);
        let ttl = env.ttls.get(key.purpose);
        let max_attempts = env.max_attempts;
        let policy = env.retry.clone();

        Effect::future(async move {
            let admission = deadline
                .race(limiter.allow(&key.subject, RateLimitAction::RequestCode, limit, now))
                .await;
            match admission {
                Ok(Admission::Allowed) => {},
                Ok(Admission::Throttled { retry_after }) => {
                    return Some(FlowAction::CodeRequestRateLimited { retry_after });
                },
                Err(error) => return Some(FlowAction::FlowErrored { error }),
            }

            let issued = match retry_transient(
                &policy,
                "issue_code",
                || verifier.issue_within(&key, now, ttl, max_attempts, deadline),
                AuthError::is_transient,
            )
            .await
            {
                Ok(issued) => issued,
                Err(error) => return Some(FlowAction::FlowErrored { error }),
            };
            let request_id = issued.record.request_id;
            let issued_at = issued.record.created_at;
            let expires_at = issued.record.expires_at;

            // Committed: the new code has superseded the old one, so it is
            // delivered whatever the deadline says.
            let sent = retry_transient(
                &policy,
                "dispatch_code",
                || notifier.send(&key.subject, &issued.code, key.purpose, issued_at, expires_at),
                AuthError::is_transient,
            )
            .await;

            match sent {
                Ok(()) => Some(FlowAction::CodeDispatched { request_id, expires_at }),
                Err(AuthError::DispatchFailed) => {
                    tracing::warn!(
                        subject = %key.subject,
                        purpose = %key.purpose,
                        %request_id,
                        "Code issued but could not be delivered"
                    );
                    Some(FlowAction::CodeDispatchFailed { request_id, expires_at })
                },
                Err(error) => Some(FlowAction::FlowErrored { error }),
            }
        })
    }

    fn verify(
        key: VerificationKey,
        code: VerificationCode,
        completion: Completion,
        deadline: Deadline,
        env: &AuthEnvironment<S, N, A, L>,
    ) -> Effect<FlowAction> {
        let now = env.clock.now();
        let verifier = env.verifier.clone();
        let limiter = env.rate_limiter.clone();
        let limit = env.rate_limits.limit_for(RateLimitAction::VerifyCode);

        Effect::future(async move {
            let admission = deadline
                .race(limiter.allow(&key.subject, RateLimitAction::VerifyCode, limit, now))
                .await;
            match admission {
                Ok(Admission::Allowed) => {},
                Ok(Admission::Throttled { retry_after }) => {
                    return Some(FlowAction::SubmissionRateLimited { retry_after });
                },
                Err(error) => return Some(FlowAction::FlowErrored { error }),
            }

            Some(match verifier.verify_within(&key, code.expose(), now, deadline).await {
                Ok(VerifyOutcome::Verified(verified)) => {
                    FlowAction::CodeVerified { verified, completion }
                },
                Ok(VerifyOutcome::Rejected(failure)) => FlowAction::CodeRejected { failure },
                Err(error) => FlowAction::FlowErrored { error },
            })
        })
    }

    fn complete(
        verified: VerifiedCode,
        completion: Completion,
        env: &AuthEnvironment<S, N, A, L>,
    ) -> Effect<FlowAction> {
        let now = env.clock.now();
        let accounts = env.accounts.clone();
        let sessions = env.sessions.clone();
        let policy = env.retry.clone();

        Effect::future(async move {
            let subject = &verified.key.subject;

            // Side effect first: a session is only minted for a flow whose
            // account change has been committed.
            let applied = retry_transient(
                &policy,
                "complete_flow",
                || completion.apply(subject, &accounts),
                AuthError::is_transient,
            )
            .await;
            if let Err(error) = applied {
                tracing::error!(
                    subject = %subject,
                    purpose = %verified.key.purpose,
                    request_id = %verified.request_id,
                    error = %error,
                    "Completion failed after code was consumed"
                );
                return Some(FlowAction::FlowErrored { error });
            }

            let role = match accounts.role_of(subject).await {
                Ok(role) => role,
                Err(error) => return Some(FlowAction::FlowErrored { error }),
            };

            Some(match sessions.issue(subject, role, now) {
                Ok(session) => FlowAction::SessionIssued { session },
                Err(error) => FlowAction::FlowErrored { error },
            })
        })
    }
}

impl<S, N, A, L> Reducer for FlowReducer<S, N, A, L>
where
    S: VerificationStore + Clone + 'static,
    N: NotificationDispatcher + Clone + 'static,
    A: AccountDirectory + Clone + 'static,
    L: RateLimiter + Clone + 'static,
{
    type State = FlowState;
    type Action = FlowAction;
    type Environment = AuthEnvironment<S, N, A, L>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if state.status.is_terminal() {
            tracing::warn!(
                key = %state.key,
                status = ?state.status,
                ?action,
                "Action ignored, flow already finished"
            );
            return smallvec![Effect::None];
        }

        match action {
            // ═══════════════════════════════════════════════════════════════
            // RequestCode: issue (or re-issue) and send
            // ═══════════════════════════════════════════════════════════════
            FlowAction::RequestCode => {
                if state.status == FlowStatus::Verified {
                    tracing::warn!(key = %state.key, "Code requested for a verified flow");
                    return smallvec![Effect::None];
                }
                smallvec![Self::issue_and_dispatch(state.key.clone(), state.deadline, env)]
            },

            FlowAction::CodeDispatched { request_id, expires_at } => {
                state.status = FlowStatus::CodeSent;
                state.request_id = Some(request_id);
                state.expires_at = Some(expires_at);
                state.attempts_remaining = Some(env.max_attempts);
                state.dispatch_failed = false;
                smallvec![Effect::None]
            },

            FlowAction::CodeDispatchFailed { request_id, expires_at } => {
                // The stored code is valid; the user may ask for a resend.
                state.status = FlowStatus::CodeSent;
                state.request_id = Some(request_id);
                state.expires_at = Some(expires_at);
                state.attempts_remaining = Some(env.max_attempts);
                state.dispatch_failed = true;
                smallvec![Effect::None]
            },

            FlowAction::CodeRequestRateLimited { retry_after } => {
                tracing::warn!(
                    key = %state.key,
                    retry_after_secs = retry_after.as_secs(),
                    "Code request rate limited"
                );
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // SubmitCode: verify under the key lock
            // ═══════════════════════════════════════════════════════════════
            FlowAction::SubmitCode { code, completion } => {
                if completion.purpose() != state.key.purpose {
                    let error = AuthError::InternalError(format!(
                        "{} completion submitted to a {} flow",
                        completion.purpose(),
                        state.key.purpose
                    ));
                    return smallvec![emit(FlowAction::FlowErrored { error })];
                }
                if state.status != FlowStatus::CodeSent {
                    return smallvec![emit(FlowAction::CodeRejected {
                        failure: Diagnostic::Unknown.into(),
                    })];
                }
                smallvec![Self::verify(state.key.clone(), code, completion, state.deadline, env)]
            },

            FlowAction::SubmissionRateLimited { retry_after } => {
                tracing::warn!(
                    key = %state.key,
                    retry_after_secs = retry_after.as_secs(),
                    "Code submission rate limited"
                );
                smallvec![Effect::None]
            },

            FlowAction::CodeRejected { failure } => {
                match failure.diagnostic {
                    Diagnostic::Expired => state.status = FlowStatus::Expired,
                    Diagnostic::Exhausted => {
                        state.status = FlowStatus::Failed;
                        state.attempts_remaining = Some(0);
                    },
                    Diagnostic::Mismatch { remaining } => {
                        state.attempts_remaining = Some(remaining);
                    },
                    Diagnostic::Unknown | Diagnostic::AlreadyConsumed => {},
                }
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // CodeVerified: completion side effect, then session
            // ═══════════════════════════════════════════════════════════════
            FlowAction::CodeVerified { verified, completion } => {
                state.status = FlowStatus::Verified;
                state.request_id = Some(verified.request_id);
                smallvec![Self::complete(verified, completion, env)]
            },

            FlowAction::SessionIssued { session } => {
                state.status = FlowStatus::Completed;
                state.session = Some(session);
                smallvec![Effect::None]
            },

            FlowAction::FlowErrored { error } => {
                tracing::warn!(key = %state.key, status = ?state.status, error = %error, "Flow step failed");
                // The code is already consumed; the flow cannot finish.
                if state.status == FlowStatus::Verified {
                    state.status = FlowStatus::Failed;
                }
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::code::{CodeGenerator, CodeHasher};
    use crate::config::SessionConfig;
    use crate::mocks::{MockAccountDirectory, MockDispatcher, MockRateLimiter, MockVerificationStore};
    use crate::session::SessionIssuer;
    use crate::state::{Purpose, SubjectId};
    use crate::verifier::{CredentialVerifier, VerificationFailure};
    use chrono::Utc;
    use agrogate_testing::{ReducerTest, assertions, test_clock};
    use secrecy::SecretString;
    use std::sync::Arc;
    use uuid::Uuid;

    type TestEnv =
        AuthEnvironment<MockVerificationStore, MockDispatcher, MockAccountDirectory, MockRateLimiter>;
    type TestReducer =
        FlowReducer<MockVerificationStore, MockDispatcher, MockAccountDirectory, MockRateLimiter>;

    fn env() -> TestEnv {
        let verifier = CredentialVerifier::new(
            MockVerificationStore::new(),
            CodeGenerator::default(),
            CodeHasher::new(&SecretString::from("pepper")).unwrap(),
        );
        let sessions = SessionIssuer::new(&SessionConfig::new(SecretString::from(
            "0123456789abcdef0123456789abcdef",
        )))
        .unwrap();
        AuthEnvironment::new(
            Arc::new(test_clock()),
            verifier,
            MockDispatcher::new(),
            MockAccountDirectory::new(),
            MockRateLimiter::new(),
            Arc::new(sessions),
        )
    }

    fn key(purpose: Purpose) -> VerificationKey {
        VerificationKey::new(SubjectId::parse("a@b.com").unwrap(), purpose)
    }

    fn verified(purpose: Purpose) -> VerifiedCode {
        VerifiedCode {
            key: key(purpose),
            request_id: Uuid::new_v4(),
            verified_at: Utc::now(),
        }
    }

    #[test]
    fn test_request_code_produces_effect() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::initiated(key(Purpose::Login)))
            .when_action(FlowAction::RequestCode)
            .then_state(|state| assert_eq!(state.status, FlowStatus::Initiated))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn test_dispatch_failure_still_moves_to_code_sent() {
        let request_id = Uuid::new_v4();
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::initiated(key(Purpose::Login)))
            .when_action(FlowAction::CodeDispatchFailed { request_id, expires_at: Utc::now() })
            .then_state(move |state| {
                assert_eq!(state.status, FlowStatus::CodeSent);
                assert!(state.dispatch_failed);
                assert_eq!(state.request_id, Some(request_id));
                assert_eq!(state.attempts_remaining, Some(5));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_resend_clears_dispatch_failure() {
        let expires_at = Utc::now();
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::initiated(key(Purpose::Login)))
            .when_action(FlowAction::CodeDispatchFailed { request_id: Uuid::new_v4(), expires_at })
            .when_action(FlowAction::RequestCode)
            .when_action(FlowAction::CodeDispatched { request_id: Uuid::new_v4(), expires_at })
            .then_state(|state| {
                assert_eq!(state.status, FlowStatus::CodeSent);
                assert!(!state.dispatch_failed);
            })
            .run();
    }

    #[test]
    fn test_rejections_move_to_absorbing_states() {
        let expired: VerificationFailure = Diagnostic::Expired.into();
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::awaiting_code(key(Purpose::Registration)))
            .when_action(FlowAction::CodeRejected { failure: expired })
            .then_state(|state| assert_eq!(state.status, FlowStatus::Expired))
            .run();

        let exhausted: VerificationFailure = Diagnostic::Exhausted.into();
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::awaiting_code(key(Purpose::Login)))
            .when_action(FlowAction::CodeRejected { failure: exhausted })
            // Absorbing: a later verification does not revive the flow.
            .when_action(FlowAction::CodeVerified {
                verified: verified(Purpose::Login),
                completion: Completion::Login,
            })
            .then_state(|state| assert_eq!(state.status, FlowStatus::Failed))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_mismatch_keeps_code_sent() {
        let mismatch: VerificationFailure = Diagnostic::Mismatch { remaining: 3 }.into();
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::awaiting_code(key(Purpose::Login)))
            .when_action(FlowAction::CodeRejected { failure: mismatch })
            .then_state(|state| {
                assert_eq!(state.status, FlowStatus::CodeSent);
                assert_eq!(state.attempts_remaining, Some(3));
            })
            .run();
    }

    #[test]
    fn test_submit_verifies_when_code_sent() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::awaiting_code(key(Purpose::Login)))
            .when_action(FlowAction::SubmitCode {
                code: VerificationCode::submitted("123456"),
                completion: Completion::Login,
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn test_verified_then_session() {
        let issuer = SessionIssuer::new(&SessionConfig::new(SecretString::from(
            "0123456789abcdef0123456789abcdef",
        )))
        .unwrap();
        let session = issuer
            .issue(&key(Purpose::Registration).subject, crate::state::Role::Farmer, Utc::now())
            .unwrap();

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::awaiting_code(key(Purpose::Registration)))
            .when_action(FlowAction::CodeVerified {
                verified: verified(Purpose::Registration),
                completion: Completion::Registration,
            })
            .when_action(FlowAction::SessionIssued { session })
            .then_state(|state| {
                assert_eq!(state.status, FlowStatus::Completed);
                assert!(state.session.is_some());
            })
            .run();
    }

    #[test]
    fn test_completion_failure_fails_verified_flow() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::awaiting_code(key(Purpose::PasswordReset)))
            .when_action(FlowAction::CodeVerified {
                verified: verified(Purpose::PasswordReset),
                completion: Completion::PasswordReset { new_secret: SecretString::from("x") },
            })
            .when_action(FlowAction::FlowErrored {
                error: AuthError::StorageError("accounts down".into()),
            })
            .then_state(|state| assert_eq!(state.status, FlowStatus::Failed))
            .run();
    }

    #[test]
    fn test_error_before_verification_keeps_status() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::awaiting_code(key(Purpose::Login)))
            .when_action(FlowAction::FlowErrored {
                error: AuthError::StorageError("store down".into()),
            })
            .then_state(|state| assert_eq!(state.status, FlowStatus::CodeSent))
            .run();
    }

    #[tokio::test]
    async fn test_mismatched_completion_is_an_error() {
        let reducer = TestReducer::new();
        let mut state = FlowState::awaiting_code(key(Purpose::Login));
        let effects = reducer.reduce(
            &mut state,
            FlowAction::SubmitCode {
                code: VerificationCode::submitted("123456"),
                completion: Completion::Registration,
            },
            &env(),
        );

        let Some(Effect::Future(fut)) = effects.into_iter().next() else {
            unreachable!("reducer emits one future");
        };
        assert!(matches!(
            fut.await,
            Some(FlowAction::FlowErrored { error: AuthError::InternalError(_) })
        ));
    }
}
