//! In-memory relay store
//!
//! Backs tests and the no-database dev mode. Atomicity of
//! `try_begin_relay` holds within one process (a single async mutex
//! guards the map); cross-process failover needs the Postgres store.

use std::collections::HashMap;

use async_trait::async_trait;
use alloy::primitives::B256;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::RelayError;
use crate::types::{EventKey, EventKind, RelayEvent, RelayRecord, RelayStatus};

use super::{Admission, RelayStore};

#[derive(Default)]
struct Inner {
    records: HashMap<EventKey, RelayRecord>,
    cursors: HashMap<(u64, EventKind), u64>,
}

/// Process-local `RelayStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelayStore for MemoryStore {
    async fn try_begin_relay(&self, event: &RelayEvent) -> Result<Admission, RelayError> {
        let mut inner = self.inner.lock().await;
        let key = event.key();
        if inner.records.contains_key(&key) {
            return Ok(Admission::AlreadyHandled);
        }

        let now = Utc::now();
        inner.records.insert(
            key,
            RelayRecord {
                key,
                kind: event.kind,
                block_number: event.block_number,
                token: event.token,
                recipient: event.recipient,
                amount: event.amount,
                status: RelayStatus::Pending,
                outbound_tx_hash: None,
                attempts: 0,
                last_error: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(Admission::Admitted)
    }

    async fn record_attempt(&self, key: &EventKey, error: &RelayError) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| RelayError::Store(format!("no record for {}", key)))?;
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn record_submitted(
        &self,
        key: &EventKey,
        outbound_tx_hash: B256,
    ) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| RelayError::Store(format!("no record for {}", key)))?;
        record.status = RelayStatus::Submitted;
        record.outbound_tx_hash = Some(outbound_tx_hash);
        record.attempts += 1;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn record_confirmed(&self, key: &EventKey) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| RelayError::Store(format!("no record for {}", key)))?;
        record.status = RelayStatus::Confirmed;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn record_failed(&self, key: &EventKey, error: &str) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| RelayError::Store(format!("no record for {}", key)))?;
        record.status = RelayStatus::Failed;
        record.last_error = Some(error.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn get_record(&self, key: &EventKey) -> Result<Option<RelayRecord>, RelayError> {
        let inner = self.inner.lock().await;
        Ok(inner.records.get(key).cloned())
    }

    async fn records_with_status(
        &self,
        chain_id: u64,
        status: RelayStatus,
    ) -> Result<Vec<RelayRecord>, RelayError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<RelayRecord> = inner
            .records
            .values()
            .filter(|r| r.key.chain_id == chain_id && r.status == status)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn get_cursor(&self, chain_id: u64, kind: EventKind) -> Result<Option<u64>, RelayError> {
        let inner = self.inner.lock().await;
        Ok(inner.cursors.get(&(chain_id, kind)).copied())
    }

    async fn set_cursor(
        &self,
        chain_id: u64,
        kind: EventKind,
        block: u64,
    ) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;
        inner.cursors.insert((chain_id, kind), block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use std::sync::Arc;

    fn sample_event(log_index: u64) -> RelayEvent {
        RelayEvent {
            chain_id: 1,
            kind: EventKind::Deposit,
            block_number: 100,
            tx_hash: B256::repeat_byte(0x11),
            log_index,
            token: Address::repeat_byte(0xaa),
            recipient: Address::repeat_byte(0xbb),
            amount: U256::from(1000u64),
        }
    }

    #[tokio::test]
    async fn test_admits_first_caller_only() {
        let store = MemoryStore::new();
        let event = sample_event(0);

        assert_eq!(
            store.try_begin_relay(&event).await.unwrap(),
            Admission::Admitted
        );
        assert_eq!(
            store.try_begin_relay(&event).await.unwrap(),
            Admission::AlreadyHandled
        );

        let record = store.get_record(&event.key()).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Pending);
    }

    #[tokio::test]
    async fn test_concurrent_begin_admits_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let event = sample_event(0);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let event = event.clone();
            handles.push(tokio::spawn(
                async move { store.try_begin_relay(&event).await },
            ));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == Admission::Admitted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_and_attempt_counting() {
        let store = MemoryStore::new();
        let event = sample_event(0);
        let key = event.key();
        store.try_begin_relay(&event).await.unwrap();

        let err = RelayError::Connectivity("rpc down".into());
        store.record_attempt(&key, &err).await.unwrap();
        store.record_attempt(&key, &err).await.unwrap();

        store
            .record_submitted(&key, B256::repeat_byte(0x22))
            .await
            .unwrap();
        let record = store.get_record(&key).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Submitted);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.outbound_tx_hash, Some(B256::repeat_byte(0x22)));

        store.record_confirmed(&key).await.unwrap();
        let record = store.get_record(&key).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_records_with_status_filters_by_chain() {
        let store = MemoryStore::new();
        let event_a = sample_event(0);
        let mut event_b = sample_event(1);
        event_b.chain_id = 56;

        store.try_begin_relay(&event_a).await.unwrap();
        store.try_begin_relay(&event_b).await.unwrap();

        let pending = store
            .records_with_status(1, RelayStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, event_a.key());
        assert_eq!(pending[0].event(), event_a);
    }

    #[tokio::test]
    async fn test_cursor_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_cursor(1, EventKind::Deposit).await.unwrap(), None);

        store.set_cursor(1, EventKind::Deposit, 120).await.unwrap();
        assert_eq!(
            store.get_cursor(1, EventKind::Deposit).await.unwrap(),
            Some(120)
        );
        // Per-kind cursors are independent.
        assert_eq!(store.get_cursor(1, EventKind::Unwrap).await.unwrap(), None);
    }
}
