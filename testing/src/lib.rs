//! # Agrogate Testing
//!
//! Test support for Agrogate reducers and services:
//!
//! - [`FixedClock`] and [`ManualClock`] for deterministic time
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - [`init_test_tracing`] to see `tracing` output in failing tests
//!
//! ## Example
//!
//! ```ignore
//! use agrogate_testing::{ManualClock, test_clock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_at(test_clock().now());
//! let env = test_environment(clock.clone());
//! // ... issue a code ...
//! clock.advance(Duration::minutes(11));
//! // ... the code is now expired ...
//! ```

use chrono::{DateTime, Utc};


pub use reducer_test::{ReducerTest, assertions};

/// Clocks for deterministic tests.
pub mod mocks {
    use super::{DateTime, Utc};
    use agrogate_core::environment::Clock;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use agrogate_testing::mocks::FixedClock;
    /// use agrogate_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A clock the test moves forward by hand.
    ///
    /// Clones share the same instant, so a test can hand one clone to the
    /// environment and keep another to advance time past an expiry.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock reading `time` until advanced.
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward, for a negative duration).
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// Honours `RUST_LOG`, defaulting to `debug` for Agrogate crates.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agrogate_auth=debug,agrogate_runtime=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub use mocks::{FixedClock, ManualClock, test_clock};
