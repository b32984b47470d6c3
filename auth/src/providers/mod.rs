//! Provider traits for everything outside the verification core.
//!
//! The reducer and service depend on these traits only. Concrete
//! implementations live in [`crate::stores`] (`Redis`), in this module
//! (console and SMTP dispatchers) and in [`crate::mocks`] (in-memory).
//!
//! All traits use `impl Future + Send` returns so implementations can be
//! plain `async fn`s and effects stay `Send`.

pub mod account;
pub mod console_notification;
pub mod notification;
pub mod rate_limiter;
pub mod smtp_notification;
pub mod verification_store;

pub use account::AccountDirectory;
pub use console_notification::ConsoleDispatcher;
pub use notification::NotificationDispatcher;
pub use rate_limiter::{Admission, RateLimit, RateLimitAction, RateLimiter, rate_limit_key};
pub use smtp_notification::SmtpDispatcher;
pub use verification_store::VerificationStore;
