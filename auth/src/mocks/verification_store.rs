//! In-memory verification store.

use crate::code::CodeHash;
use crate::error::{AuthError, Result};
use crate::providers::VerificationStore;
use crate::state::{RequestStatus, VerificationKey, VerificationRequest};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// In-memory verification store.
///
/// One mutex guards the whole map, so every operation is atomic. Clones
/// share the same map.
#[derive(Debug, Clone, Default)]
pub struct MockVerificationStore {
    requests: Arc<Mutex<HashMap<VerificationKey, VerificationRequest>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockVerificationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StorageError` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.lock().map_or(0, |requests| requests.len())
    }

    /// `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn requests(&self) -> Result<MutexGuard<'_, HashMap<VerificationKey, VerificationRequest>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::StorageError("verification store unavailable".into()));
        }
        self.requests
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))
    }
}

impl VerificationStore for MockVerificationStore {
    async fn issue(
        &self,
        key: &VerificationKey,
        code_hash: CodeHash,
        now: DateTime<Utc>,
        ttl: Duration,
        max_attempts: u32,
    ) -> Result<VerificationRequest> {
        let request = VerificationRequest {
            request_id: Uuid::new_v4(),
            key: key.clone(),
            code_hash,
            created_at: now,
            expires_at: now + ttl,
            attempts_remaining: max_attempts,
            consumed_at: None,
        };

        let superseded = self.requests()?.insert(key.clone(), request.clone());

        tracing::debug!(
            key = %key,
            request_id = %request.request_id,
            superseded = ?superseded.map(|old| old.request_id),
            "Mock stored verification request"
        );

        Ok(request)
    }

    async fn lookup(&self, key: &VerificationKey) -> Result<Option<VerificationRequest>> {
        Ok(self.requests()?.get(key).cloned())
    }

    async fn consume(
        &self,
        key: &VerificationKey,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<VerificationRequest> {
        let mut requests = self.requests()?;
        let request = requests
            .get_mut(key)
            .filter(|request| request.request_id == request_id)
            .ok_or(AuthError::NotFound)?;

        match request.status(now) {
            RequestStatus::Consumed => return Err(AuthError::AlreadyConsumed),
            RequestStatus::Expired => return Err(AuthError::InvalidOrExpiredCode),
            RequestStatus::Exhausted => return Err(AuthError::TooManyAttempts),
            RequestStatus::Pending => {},
        }

        request.consumed_at = Some(now);
        Ok(request.clone())
    }

    async fn decrement_attempt(&self, key: &VerificationKey, request_id: Uuid) -> Result<u32> {
        let mut requests = self.requests()?;
        let request = requests
            .get_mut(key)
            .filter(|request| request.request_id == request_id)
            .ok_or(AuthError::NotFound)?;

        request.attempts_remaining = request.attempts_remaining.saturating_sub(1);
        Ok(request.attempts_remaining)
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut requests = self.requests()?;
        let before = requests.len();
        requests.retain(|_, request| request.expires_at >= cutoff);
        Ok(before - requests.len())
    }
}
