//! End-to-end tests of the verification flow through `AuthService`.
//!
//! Everything runs against the in-memory mocks with a manual clock, so
//! expiry and rate-limit windows are crossed by advancing time instead of
//! sleeping.

#![allow(clippy::unwrap_used)]

mod common;

use agrogate_auth::{
    AuthConfig, AuthError, AuthService, CodeAlphabet, CodeGenerator, CodeRequestOutcome,
    Completion, InMemoryRevocationList, Purpose, SubjectId, SubmitOutcome, VerificationKey,
    config::SessionConfig,
    mocks::{
        AccountCall, MockAccountDirectory, MockDispatcher, MockRateLimiter, MockVerificationStore,
    },
    providers::VerificationStore,
};
use agrogate_core::environment::Clock;
use agrogate_runtime::RetryPolicy;
use chrono::Duration;
use common::{Harness, wrong_code};
use secrecy::SecretString;
use std::sync::Arc;

const SUBJECT: &str = "a@b.com";

fn subject() -> SubjectId {
    SubjectId::parse(SUBJECT).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
// End-to-end scenarios
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_login_code_within_ttl_issues_session() {
    let harness = Harness::new();
    let service = harness.service();
    let requested_at = harness.clock.now();

    let outcome = service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    assert_eq!(
        outcome,
        CodeRequestOutcome::Accepted {
            expires_at: requested_at + Duration::minutes(10)
        }
    );

    harness.clock.advance(Duration::minutes(9));
    let code = harness.inbox(SUBJECT, Purpose::Login);

    let SubmitOutcome::Authenticated(issued) =
        service.submit_code(SUBJECT, &code, Completion::Login).await.unwrap()
    else {
        panic!("expected a session");
    };
    assert_eq!(issued.session.subject.as_str(), SUBJECT);

    let verified = service.verify_session(issued.token.expose()).await.unwrap();
    assert_eq!(verified, issued.session);
    assert!(harness.accounts.calls().is_empty(), "login has no side effect");
}

#[tokio::test]
async fn test_registration_code_past_ttl_is_rejected() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Registration).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Registration);

    harness.clock.advance(Duration::minutes(11));

    let outcome = service
        .submit_code(SUBJECT, &code, Completion::Registration)
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::InvalidOrExpiredCode);
    assert!(harness.accounts.calls().is_empty(), "expired code must not activate");
}

#[tokio::test]
async fn test_password_reset_locks_after_five_wrong_codes() {
    let harness = Harness::new();
    let service = harness.service();
    let reset = || Completion::PasswordReset {
        new_secret: SecretString::from("new-password"),
    };

    service.request_code(SUBJECT, Purpose::PasswordReset).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::PasswordReset);
    let wrong = wrong_code(&code);

    for _ in 0..5 {
        let outcome = service.submit_code(SUBJECT, &wrong, reset()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::InvalidOrExpiredCode);
    }

    // Correct, but too late.
    let outcome = service.submit_code(SUBJECT, &code, reset()).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::TooManyAttempts);

    let outcome = service.submit_code(SUBJECT, &code, reset()).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::TooManyAttempts);

    assert!(harness.accounts.calls().is_empty(), "password must not change");
}

// ═══════════════════════════════════════════════════════════════════════
// Request lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_new_code_supersedes_previous() {
    let harness = Harness::new();
    // Long codes so the two issuances cannot collide.
    let generator = CodeGenerator::new(12, CodeAlphabet::Alphanumeric).unwrap();
    let service = AuthService::new(harness.env(generator), harness.revocations.clone());

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let first = harness.inbox(SUBJECT, Purpose::Login);
    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let second = harness.inbox(SUBJECT, Purpose::Login);

    let outcome = service.submit_code(SUBJECT, &first, Completion::Login).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::InvalidOrExpiredCode);

    let outcome = service.submit_code(SUBJECT, &second, Completion::Login).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
    assert_eq!(harness.store.len(), 1, "one slot per subject and purpose");
}

#[tokio::test]
async fn test_code_is_accepted_once() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Login);

    let first = service.submit_code(SUBJECT, &code, Completion::Login).await.unwrap();
    assert!(matches!(first, SubmitOutcome::Authenticated(_)));

    let replay = service.submit_code(SUBJECT, &code, Completion::Login).await.unwrap();
    assert_eq!(replay, SubmitOutcome::InvalidOrExpiredCode);
}

#[tokio::test]
async fn test_code_without_request_is_rejected() {
    let harness = Harness::new();
    let service = harness.service();

    let outcome = service
        .submit_code(SUBJECT, "123456", Completion::Login)
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::InvalidOrExpiredCode);
}

#[tokio::test]
async fn test_code_only_works_for_its_purpose() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Login);

    let outcome = service
        .submit_code(SUBJECT, &code, Completion::Registration)
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::InvalidOrExpiredCode);

    let outcome = service.submit_code(SUBJECT, &code, Completion::Login).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
}

#[tokio::test]
async fn test_subject_is_normalised() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code("  A@B.com ", Purpose::Login).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Login);

    let outcome = service
        .submit_code(SUBJECT, &format!(" {code} "), Completion::Login)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
}

#[tokio::test]
async fn test_invalid_subject_is_refused() {
    let harness = Harness::new();
    let service = harness.service();

    let result = service.request_code("not-an-email", Purpose::Login).await;
    assert_eq!(result, Err(AuthError::InvalidSubject));
    assert!(harness.dispatcher.sent().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
// Completions
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_registration_activates_account() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Registration).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Registration);

    let outcome = service
        .submit_code(SUBJECT, &code, Completion::Registration)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
    assert_eq!(harness.accounts.calls(), vec![AccountCall::Activated(subject())]);
}

#[tokio::test]
async fn test_password_reset_commits_new_secret() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::PasswordReset).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::PasswordReset);

    let completion = Completion::PasswordReset {
        new_secret: SecretString::from("harvest-2025"),
    };
    let outcome = service.submit_code(SUBJECT, &code, completion).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
    assert_eq!(
        harness.accounts.calls(),
        vec![AccountCall::CredentialSet(subject(), "harvest-2025".to_string())]
    );
}

#[tokio::test]
async fn test_google_link_records_identity() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::GoogleLink).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::GoogleLink);

    let completion = Completion::GoogleLink {
        provider_id: "google-uid-42".to_string(),
    };
    let outcome = service.submit_code(SUBJECT, &code, completion).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
    assert_eq!(
        harness.accounts.calls(),
        vec![AccountCall::IdentityLinked {
            subject: subject(),
            provider: "google".to_string(),
            provider_id: "google-uid-42".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_failed_completion_issues_no_session() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Registration).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Registration);

    harness.accounts.set_failing(true);
    let result = service
        .submit_code(SUBJECT, &code, Completion::Registration)
        .await;
    assert!(matches!(result, Err(AuthError::StorageError(_))));

    // The code was consumed before completion ran.
    harness.accounts.set_failing(false);
    let outcome = service
        .submit_code(SUBJECT, &code, Completion::Registration)
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::InvalidOrExpiredCode);
}

// ═══════════════════════════════════════════════════════════════════════
// Dispatch
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_dispatch_failure_is_reported_and_resend_works() {
    let harness = Harness::new();
    let service = harness.service();

    harness.dispatcher.fail_next(1);
    let result = service.request_code(SUBJECT, Purpose::Login).await;
    assert_eq!(result, Err(AuthError::DispatchFailed));

    let outcome = service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    assert!(matches!(outcome, CodeRequestOutcome::Accepted { .. }));

    let code = harness.inbox(SUBJECT, Purpose::Login);
    let outcome = service.submit_code(SUBJECT, &code, Completion::Login).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
}

#[tokio::test]
async fn test_transient_dispatch_failures_are_retried() {
    let harness = Harness::new();
    let retry = RetryPolicy::builder()
        .max_retries(2)
        .initial_delay(std::time::Duration::from_millis(1))
        .build();
    let service = AuthService::new(
        harness.env(CodeGenerator::default()).with_retry(retry),
        harness.revocations.clone(),
    );

    harness.dispatcher.fail_next(2);
    let outcome = service.request_code(SUBJECT, Purpose::Login).await.unwrap();

    assert!(matches!(outcome, CodeRequestOutcome::Accepted { .. }));
    assert_eq!(harness.dispatcher.attempts(), 3);
    assert_eq!(harness.dispatcher.sent().len(), 1);
}

#[tokio::test]
async fn test_deadline_before_issue_keeps_delivered_code() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let delivered = harness.inbox(SUBJECT, Purpose::Login);

    // Another call for the same key holds the lock past our deadline.
    let key = VerificationKey::new(subject(), Purpose::Login);
    let held = service.environment().verifier.locks().lock(&key.storage_key()).await;
    let result = service
        .request_code_within(SUBJECT, Purpose::Login, std::time::Duration::from_millis(20))
        .await;
    drop(held);

    assert_eq!(result, Err(AuthError::Timeout));
    assert_eq!(harness.dispatcher.sent().len(), 1);

    let outcome = service.submit_code(SUBJECT, &delivered, Completion::Login).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
}

#[tokio::test]
async fn test_slow_dispatch_after_issue_still_delivers() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let first = harness.inbox(SUBJECT, Purpose::Login);

    harness.dispatcher.set_delay(std::time::Duration::from_millis(200));
    let outcome = service
        .request_code_within(SUBJECT, Purpose::Login, std::time::Duration::from_millis(20))
        .await
        .unwrap();
    assert!(matches!(outcome, CodeRequestOutcome::Accepted { .. }));

    // The code that superseded the first one reached the inbox.
    let second = harness.inbox(SUBJECT, Purpose::Login);
    assert_eq!(harness.dispatcher.sent().len(), 2);
    if second != first {
        let outcome = service.submit_code(SUBJECT, &first, Completion::Login).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::InvalidOrExpiredCode);
    }
    let outcome = service.submit_code(SUBJECT, &second, Completion::Login).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
}

#[tokio::test]
async fn test_deadline_before_check_keeps_attempts() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Login);

    let key = VerificationKey::new(subject(), Purpose::Login);
    let held = service.environment().verifier.locks().lock(&key.storage_key()).await;
    let result = service
        .submit_code_within(
            SUBJECT,
            &wrong_code(&code),
            Completion::Login,
            std::time::Duration::from_millis(20),
        )
        .await;
    drop(held);

    assert_eq!(result, Err(AuthError::Timeout));
    let record = harness.store.lookup(&key).await.unwrap().unwrap();
    assert_eq!(record.attempts_remaining, 5);
    assert_eq!(record.consumed_at, None);
}

#[tokio::test]
async fn test_completion_retries_outlive_deadline() {
    let harness = Harness::new();
    let retry = RetryPolicy::builder()
        .max_retries(3)
        .initial_delay(std::time::Duration::from_millis(50))
        .build();
    let service = AuthService::new(
        harness.env(CodeGenerator::default()).with_retry(retry),
        harness.revocations.clone(),
    );

    service.request_code(SUBJECT, Purpose::PasswordReset).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::PasswordReset);

    // The account store recovers after the deadline but within the retries.
    harness.accounts.set_failing(true);
    let accounts = harness.accounts.clone();
    let recovery = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        accounts.set_failing(false);
    });

    let completion = Completion::PasswordReset {
        new_secret: SecretString::from("n3w-s3cret"),
    };
    let outcome = service
        .submit_code_within(SUBJECT, &code, completion, std::time::Duration::from_millis(10))
        .await
        .unwrap();
    recovery.await.unwrap();

    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
    assert_eq!(
        harness.accounts.calls(),
        vec![AccountCall::CredentialSet(subject(), "n3w-s3cret".to_string())]
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Rate limiting
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_code_requests_are_rate_limited() {
    let harness = Harness::new();
    let service = harness.service();

    for _ in 0..5 {
        let outcome = service.request_code(SUBJECT, Purpose::Login).await.unwrap();
        assert!(matches!(outcome, CodeRequestOutcome::Accepted { .. }));
    }

    let outcome = service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let CodeRequestOutcome::RateLimited { retry_after } = outcome else {
        panic!("expected rate limiting, got {outcome:?}");
    };
    assert!(retry_after > std::time::Duration::ZERO);
    assert!(retry_after <= std::time::Duration::from_secs(15 * 60));
    assert_eq!(harness.dispatcher.sent().len(), 5, "throttled request sends nothing");

    harness.clock.advance(Duration::minutes(16));
    let outcome = service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    assert!(matches!(outcome, CodeRequestOutcome::Accepted { .. }));
}

#[tokio::test]
async fn test_submissions_are_rate_limited() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Login);
    let wrong = wrong_code(&code);

    for _ in 0..20 {
        let outcome = service.submit_code(SUBJECT, &wrong, Completion::Login).await.unwrap();
        assert!(!matches!(outcome, SubmitOutcome::RateLimited { .. }));
    }

    let outcome = service.submit_code(SUBJECT, &code, Completion::Login).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::RateLimited { .. }));
}

#[tokio::test]
async fn test_rate_limits_are_per_subject() {
    let harness = Harness::new();
    let service = harness.service();

    for _ in 0..5 {
        service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    }

    let outcome = service
        .request_code("other@b.com", Purpose::Login)
        .await
        .unwrap();
    assert!(matches!(outcome, CodeRequestOutcome::Accepted { .. }));
}

// ═══════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════

async fn log_in(harness: &Harness, service: &common::TestService) -> agrogate_auth::IssuedSession {
    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Login);
    match service.submit_code(SUBJECT, &code, Completion::Login).await.unwrap() {
        SubmitOutcome::Authenticated(issued) => issued,
        other => panic!("expected a session, got {other:?}"),
    }
}

#[tokio::test]
async fn test_revoked_session_is_refused() {
    let harness = Harness::new();
    let service = harness.service();
    let issued = log_in(&harness, &service).await;

    service.revoke_session(&issued.session).await.unwrap();

    let result = service.verify_session(issued.token.expose()).await;
    assert_eq!(result, Err(AuthError::TokenRevoked));
}

#[tokio::test]
async fn test_session_expires_after_ttl() {
    let harness = Harness::new();
    let service = harness.service();
    let issued = log_in(&harness, &service).await;

    harness.clock.advance(Duration::hours(23));
    assert!(service.verify_session(issued.token.expose()).await.is_ok());

    harness.clock.advance(Duration::hours(1));
    let result = service.verify_session(issued.token.expose()).await;
    assert_eq!(result, Err(AuthError::InvalidToken));
}

#[tokio::test]
async fn test_tampered_token_is_refused() {
    let harness = Harness::new();
    let service = harness.service();
    let issued = log_in(&harness, &service).await;

    let mut token = issued.token.expose().to_string();
    let last = token.pop().unwrap();
    token.push(if last == 'A' { 'B' } else { 'A' });

    let result = service.verify_session(&token).await;
    assert_eq!(result, Err(AuthError::InvalidToken));
}

// ═══════════════════════════════════════════════════════════════════════
// Maintenance and configuration
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_purge_removes_records_past_grace() {
    let harness = Harness::new();
    let service = harness.service();

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();

    harness.clock.advance(Duration::minutes(30));
    assert_eq!(service.purge_expired().await.unwrap(), 0, "still within grace");

    harness.clock.advance(Duration::minutes(41));
    assert_eq!(service.purge_expired().await.unwrap(), 1);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_from_config_builds_working_service() {
    let harness = Harness::new();
    let config = AuthConfig::default()
        .with_session(SessionConfig::new(SecretString::from(common::SIGNING_KEY)));

    let service = AuthService::from_config(
        &config,
        Arc::new(harness.clock.clone()),
        MockVerificationStore::new(),
        harness.dispatcher.clone(),
        MockAccountDirectory::new(),
        MockRateLimiter::new(),
        InMemoryRevocationList::new(),
    )
    .unwrap();

    service.request_code(SUBJECT, Purpose::Login).await.unwrap();
    let code = harness.inbox(SUBJECT, Purpose::Login);
    assert_eq!(code.len(), 6);

    let outcome = service.submit_code(SUBJECT, &code, Completion::Login).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Authenticated(_)));
}

#[test]
fn test_from_config_without_signing_key_fails() {
    let result = AuthService::from_config(
        &AuthConfig::default(),
        Arc::new(agrogate_testing::test_clock()),
        MockVerificationStore::new(),
        MockDispatcher::new(),
        MockAccountDirectory::new(),
        MockRateLimiter::new(),
        InMemoryRevocationList::new(),
    );
    assert!(matches!(result, Err(AuthError::SigningUnavailable)));
}

#[test]
fn test_from_config_rejects_unusable_settings() {
    let config = AuthConfig::default()
        .with_session(SessionConfig::new(SecretString::from(common::SIGNING_KEY)))
        .with_verification(
            agrogate_auth::config::VerificationConfig::default()
                .with_uniform_ttl(Duration::minutes(-5)),
        );

    let result = AuthService::from_config(
        &config,
        Arc::new(agrogate_testing::test_clock()),
        MockVerificationStore::new(),
        MockDispatcher::new(),
        MockAccountDirectory::new(),
        MockRateLimiter::new(),
        InMemoryRevocationList::new(),
    );
    assert!(matches!(result, Err(AuthError::ConfigError(_))));
}
