//! Shared setup for the integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use agrogate_auth::{
    AuthEnvironment, AuthService, CodeGenerator, CodeHasher, CredentialVerifier,
    InMemoryRevocationList, Purpose, SessionIssuer, SubjectId,
    config::SessionConfig,
    mocks::{MockAccountDirectory, MockDispatcher, MockRateLimiter, MockVerificationStore},
};
use agrogate_core::environment::Clock;
use agrogate_runtime::RetryPolicy;
use agrogate_testing::{ManualClock, init_test_tracing, test_clock};
use secrecy::SecretString;
use std::sync::Arc;

pub const SIGNING_KEY: &str = "integration-test-signing-key-0123456789";

pub type TestEnv =
    AuthEnvironment<MockVerificationStore, MockDispatcher, MockAccountDirectory, MockRateLimiter>;

pub type TestService = AuthService<
    MockVerificationStore,
    MockDispatcher,
    MockAccountDirectory,
    MockRateLimiter,
    InMemoryRevocationList,
>;

/// Mocks kept alongside the service so tests can inspect and steer them.
pub struct Harness {
    pub clock: ManualClock,
    pub store: MockVerificationStore,
    pub dispatcher: MockDispatcher,
    pub accounts: MockAccountDirectory,
    pub limiter: MockRateLimiter,
    pub revocations: InMemoryRevocationList,
}

impl Harness {
    pub fn new() -> Self {
        init_test_tracing();
        Self {
            clock: ManualClock::starting_at(test_clock().now()),
            store: MockVerificationStore::new(),
            dispatcher: MockDispatcher::new(),
            accounts: MockAccountDirectory::new(),
            limiter: MockRateLimiter::new(),
            revocations: InMemoryRevocationList::new(),
        }
    }

    /// Environment over the shared mocks, retries disabled.
    pub fn env(&self, generator: CodeGenerator) -> TestEnv {
        let verifier = CredentialVerifier::new(
            self.store.clone(),
            generator,
            CodeHasher::new(&SecretString::from("integration-pepper")).unwrap(),
        );
        let sessions =
            SessionIssuer::new(&SessionConfig::new(SecretString::from(SIGNING_KEY))).unwrap();

        AuthEnvironment::new(
            Arc::new(self.clock.clone()),
            verifier,
            self.dispatcher.clone(),
            self.accounts.clone(),
            self.limiter.clone(),
            Arc::new(sessions),
        )
        .with_retry(RetryPolicy::none())
    }

    pub fn service(&self) -> TestService {
        AuthService::new(self.env(CodeGenerator::default()), self.revocations.clone())
    }

    /// The code the user would read from their inbox.
    pub fn inbox(&self, subject: &str, purpose: Purpose) -> String {
        let subject = SubjectId::parse(subject).unwrap();
        self.dispatcher.last_code(&subject, purpose).unwrap()
    }
}

/// A six-digit code guaranteed to differ from `code`.
pub fn wrong_code(code: &str) -> String {
    if code == "000000" { "111111" } else { "000000" }.to_string()
}
