//! Caller deadlines.
//!
//! A [`Deadline`] bounds the part of a flow that runs before the
//! verification store is written. Lock waits and reads race it; a write is
//! only started while time remains. Once a write has started it runs to
//! completion, and so does everything the flow does after it: dispatching
//! an issued code, or completing a consumed one.

use crate::error::{AuthError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Point in time after which no new write may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `budget` from now.
    ///
    /// A budget too large to represent is treated as no deadline.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    /// No deadline.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { at: None }
    }

    /// `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Gate in front of a write.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Timeout`] if the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            tracing::warn!("Deadline passed before write");
            return Err(AuthError::Timeout);
        }
        Ok(())
    }

    /// Run `fut` until it finishes or the deadline passes, whichever is
    /// first. Only for work that writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Timeout`] if the deadline passed first, or the
    /// future's own error.
    pub async fn race<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.at {
            None => fut.await,
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| AuthError::Timeout)?,
        }
    }
}
