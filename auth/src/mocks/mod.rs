//! Mock provider implementations for testing and local development.
//!
//! In-memory implementations of every provider trait. They are real
//! implementations (atomic, clone-shared state) with a few knobs for
//! injecting failures.

pub mod account;
pub mod notification;
pub mod rate_limiter;
pub mod verification_store;

pub use account::{AccountCall, MockAccountDirectory};
pub use notification::{MockDispatcher, SentCode};
pub use rate_limiter::MockRateLimiter;
pub use verification_store::MockVerificationStore;
