//! Mock notification dispatcher.

use crate::code::VerificationCode;
use crate::error::{AuthError, Result};
use crate::providers::NotificationDispatcher;
use crate::state::{Purpose, SubjectId};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};

/// A message the mock accepted.
#[derive(Debug, Clone)]
pub struct SentCode {
    /// Recipient.
    pub subject: SubjectId,
    /// The code as delivered.
    pub code: VerificationCode,
    /// Purpose tag.
    pub purpose: Purpose,
    /// Expiry passed by the caller.
    pub expires_at: DateTime<Utc>,
}

/// Mock dispatcher that records every code it is asked to send.
///
/// Tests read the delivered code back with [`MockDispatcher::last_code`],
/// the way a user would read it from their inbox.
#[derive(Debug, Clone, Default)]
pub struct MockDispatcher {
    sent: Arc<Mutex<Vec<SentCode>>>,
    failures_left: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
    delay_ms: Arc<AtomicU64>,
}

impl MockDispatcher {
    /// Create a dispatcher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends with `DispatchFailed`.
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Wait `delay` before every send, like a slow mail relay.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Every accepted message, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Most recent code delivered to `subject` for `purpose`.
    #[must_use]
    pub fn last_code(&self, subject: &SubjectId, purpose: Purpose) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|sent| &sent.subject == subject && sent.purpose == purpose)
            .map(|sent| sent.code.expose().to_owned())
    }

    /// Number of send calls, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl NotificationDispatcher for MockDispatcher {
    async fn send(
        &self,
        subject: &SubjectId,
        code: &VerificationCode,
        purpose: Purpose,
        _issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(AuthError::DispatchFailed);
        }

        self.sent
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?
            .push(SentCode {
                subject: subject.clone(),
                code: code.clone(),
                purpose,
                expires_at,
            });

        Ok(())
    }
}
