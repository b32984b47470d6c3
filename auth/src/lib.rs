//! # Agrogate Authentication
//!
//! One-time verification codes and signed sessions for the Agrogate
//! platform.
//!
//! A user asks for a code, receives it by email, and submits it back. If
//! the code matches the subject's latest request for that purpose, it is
//! consumed (never accepted again), the purpose-specific completion runs
//! (activate an account, commit a new password, link a Google identity)
//! and a signed session is issued.
//!
//! ## Architecture
//!
//! Each call drives a small state machine through the runtime store:
//!
//! ```text
//! RequestCode → issue + dispatch → CodeDispatched
//! SubmitCode  → verify → CodeVerified → complete + sign → SessionIssued
//! ```
//!
//! - [`verifier::CredentialVerifier`]: issue and verify codes against a
//!   [`providers::VerificationStore`], serialized per subject and purpose
//! - [`session::SessionIssuer`]: HS256 session tokens
//! - [`reducers::FlowReducer`]: the flow state machine
//! - [`service::AuthService`]: the public entry points
//!
//! ## Example
//!
//! ```rust,ignore
//! use agrogate_auth::{AuthConfig, AuthService, Completion, Purpose, SubmitOutcome};
//!
//! let service = AuthService::from_config(&config, clock, store, notifier, accounts, limiter, revocations)?;
//!
//! service.request_code("grower@example.com", Purpose::Login).await?;
//! // ... the user reads the code from their inbox ...
//! match service.submit_code("grower@example.com", &code, Completion::Login).await? {
//!     SubmitOutcome::Authenticated(issued) => println!("token: {}", issued.token.expose()),
//!     other => println!("rejected: {other:?}"),
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod actions;
pub mod code;
pub mod completion;
pub mod config;
pub mod constants;
pub mod deadline;
pub mod environment;
pub mod error;
pub mod locks;
pub mod providers;
pub mod reducers;
pub mod service;
pub mod session;
pub mod state;
pub mod stores;
pub mod utils;
pub mod verifier;

// Mock implementations for testing and local development
#[cfg(feature = "test-utils")]
pub mod mocks;

// Re-export main types for convenience
pub use actions::FlowAction;
pub use code::{CodeAlphabet, CodeGenerator, CodeHasher, VerificationCode};
pub use completion::Completion;
pub use config::AuthConfig;
pub use deadline::Deadline;
pub use environment::AuthEnvironment;
pub use error::{AuthError, Result};
pub use service::{AuthService, CodeRequestOutcome, SubmitOutcome};
pub use session::{InMemoryRevocationList, IssuedSession, RevocationList, SessionIssuer};
pub use state::{FlowState, FlowStatus, Purpose, Role, Session, SubjectId, VerificationKey};
pub use verifier::{CredentialVerifier, Diagnostic, FailureReason, VerifyOutcome};
