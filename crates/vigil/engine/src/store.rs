//! Security event persistence.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;
use vigil_types::{CircleId, EvidenceEntry, SecurityEvent, SecurityEventId, SensorEvent};

use crate::error::{StoreError, StoreResult};

/// Durable home for security events, their evidence and the signal audit log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Create or replace a security event
    async fn upsert_event(&self, event: SecurityEvent) -> StoreResult<()>;

    /// Get a security event by ID
    async fn get_event(&self, id: &SecurityEventId) -> StoreResult<Option<SecurityEvent>>;

    /// List security events for a circle, oldest first
    async fn list_events(&self, circle_id: &CircleId) -> StoreResult<Vec<SecurityEvent>>;

    /// Append ledger entries to an event's evidence trail
    async fn append_evidence(
        &self,
        id: &SecurityEventId,
        entries: Vec<EvidenceEntry>,
    ) -> StoreResult<()>;

    /// Full evidence trail of an event
    async fn evidence_for(&self, id: &SecurityEventId) -> StoreResult<Vec<EvidenceEntry>>;

    /// Record an inbound signal for audit
    async fn append_signal(&self, signal: SensorEvent) -> StoreResult<()>;
}

/// In-memory store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<HashMap<SecurityEventId, SecurityEvent>>>,
    evidence: Arc<RwLock<HashMap<SecurityEventId, Vec<EvidenceEntry>>>>,
    signals: Arc<RwLock<Vec<SensorEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn signal_count(&self) -> usize {
        self.signals.read().await.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn upsert_event(&self, event: SecurityEvent) -> StoreResult<()> {
        let mut events = self.events.write().await;
        events.insert(event.id, event);
        Ok(())
    }

    async fn get_event(&self, id: &SecurityEventId) -> StoreResult<Option<SecurityEvent>> {
        let events = self.events.read().await;
        Ok(events.get(id).cloned())
    }

    async fn list_events(&self, circle_id: &CircleId) -> StoreResult<Vec<SecurityEvent>> {
        let events = self.events.read().await;
        let mut found: Vec<_> = events
            .values()
            .filter(|e| &e.circle_id == circle_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn append_evidence(
        &self,
        id: &SecurityEventId,
        entries: Vec<EvidenceEntry>,
    ) -> StoreResult<()> {
        if !self.events.read().await.contains_key(id) {
            return Err(StoreError::NotFound(*id));
        }
        let mut evidence = self.evidence.write().await;
        evidence.entry(*id).or_default().extend(entries);
        Ok(())
    }

    async fn evidence_for(&self, id: &SecurityEventId) -> StoreResult<Vec<EvidenceEntry>> {
        let evidence = self.evidence.read().await;
        Ok(evidence.get(id).cloned().unwrap_or_default())
    }

    async fn append_signal(&self, signal: SensorEvent) -> StoreResult<()> {
        self.signals.write().await.push(signal);
        Ok(())
    }
}

/// Retry wrapper for store calls with linear backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Run `op`, retrying retryable failures up to `retries` more times.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(op = op_name, attempt, error = %err, "Store call failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result = policy
            .run("probe", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(StoreError::Unavailable("down".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result: StoreResult<()> = policy
            .run("probe", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::Unavailable("down".into())) }
            })
            .await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let id = SecurityEventId::generate();
        let result: StoreResult<()> = policy
            .run("probe", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(StoreError::NotFound(id)) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
