//! Notification ledger: which proposals each channel has already heard about.
//!
//! Data model, one record per `(channel, chain_id, proposal_id)`:
//!   created_at    → set on insert
//!   submit_time   → first observed submit time, written once
//!   notified      → monotonic; only ever flipped false → true
//!
//! The store is plain read-then-write with no cross-key transactions. A
//! single scheduler instance is assumed, so last writer wins.

pub mod redis;

pub use self::redis::RedisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[from] ::redis::RedisError),
    #[error("corrupt ledger record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no ledger record for {0}")]
    Missing(ProposalKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalKey {
    pub channel: String,
    pub chain_id: String,
    pub proposal_id: String,
}

impl ProposalKey {
    pub fn new(channel: &str, chain_id: &str, proposal_id: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chain_id: chain_id.to_string(),
            proposal_id: proposal_id.to_string(),
        }
    }
}

impl fmt::Display for ProposalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.channel, self.chain_id, self.proposal_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub key: ProposalKey,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub submit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notified: bool,
}

impl NotificationRecord {
    pub fn new(key: ProposalKey) -> Self {
        Self {
            key,
            created_at: Utc::now(),
            submit_time: None,
            notified: false,
        }
    }
}

/// Field-level update applied to an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordUpdate {
    SubmitTime(DateTime<Utc>),
    Notified,
}

impl RecordUpdate {
    pub fn apply(self, record: &mut NotificationRecord) {
        match self {
            RecordUpdate::SubmitTime(t) => record.submit_time = Some(t),
            RecordUpdate::Notified => record.notified = true,
        }
    }
}

/// Abstract document store behind the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find(&self, key: &ProposalKey) -> Result<Option<NotificationRecord>, StoreError>;
    /// Insert only if absent. Returns whether the record was created.
    async fn insert(&self, record: NotificationRecord) -> Result<bool, StoreError>;
    async fn update(&self, key: &ProposalKey, update: RecordUpdate) -> Result<(), StoreError>;
}

/// Process-local store. Forgets everything on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<ProposalKey, NotificationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find(&self, key: &ProposalKey) -> Result<Option<NotificationRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }

    async fn insert(&self, record: NotificationRecord) -> Result<bool, StoreError> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(true)
            }
        }
    }

    async fn update(&self, key: &ProposalKey, update: RecordUpdate) -> Result<(), StoreError> {
        match self.records.get_mut(key) {
            Some(mut record) => {
                update.apply(&mut record);
                Ok(())
            }
            None => Err(StoreError::Missing(key.clone())),
        }
    }
}

/// Novelty decisions on top of a `LedgerStore`.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub async fn is_notified(&self, key: &ProposalKey) -> Result<bool, StoreError> {
        Ok(self
            .store
            .find(key)
            .await?
            .map(|r| r.notified)
            .unwrap_or(false))
    }

    /// Commit point after a successful delivery. Idempotent.
    pub async fn mark_notified(&self, key: &ProposalKey) -> Result<(), StoreError> {
        match self.store.find(key).await? {
            Some(record) if record.notified => Ok(()),
            Some(_) => self.store.update(key, RecordUpdate::Notified).await,
            None => {
                let mut record = NotificationRecord::new(key.clone());
                record.notified = true;
                if self.store.insert(record).await? {
                    Ok(())
                } else {
                    // Someone created the record after our read.
                    self.store.update(key, RecordUpdate::Notified).await
                }
            }
        }?;
        debug!(key = %key, "proposal marked notified");
        Ok(())
    }

    /// First write wins: store `observed` only if nothing was stored yet,
    /// then return whatever the ledger holds.
    pub async fn get_or_set_first_seen_submit_time(
        &self,
        key: &ProposalKey,
        observed: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        match self.store.find(key).await? {
            Some(NotificationRecord {
                submit_time: Some(stored),
                ..
            }) => Ok(stored),
            Some(_) => {
                self.store
                    .update(key, RecordUpdate::SubmitTime(observed))
                    .await?;
                Ok(observed)
            }
            None => {
                let mut record = NotificationRecord::new(key.clone());
                record.submit_time = Some(observed);
                if self.store.insert(record).await? {
                    return Ok(observed);
                }
                match self.store.find(key).await? {
                    Some(NotificationRecord {
                        submit_time: Some(stored),
                        ..
                    }) => Ok(stored),
                    _ => {
                        self.store
                            .update(key, RecordUpdate::SubmitTime(observed))
                            .await?;
                        Ok(observed)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(id: &str) -> ProposalKey {
        ProposalKey::new("C123", "osmosis-1", id)
    }

    #[tokio::test]
    async fn test_mark_notified_is_idempotent_and_sticky() {
        let ledger = Ledger::in_memory();
        let k = key("1");

        assert!(!ledger.is_notified(&k).await.unwrap());
        ledger.mark_notified(&k).await.unwrap();
        assert!(ledger.is_notified(&k).await.unwrap());
        ledger.mark_notified(&k).await.unwrap();
        assert!(ledger.is_notified(&k).await.unwrap());
        assert!(ledger.is_notified(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_seen_submit_time_wins() {
        let ledger = Ledger::in_memory();
        let k = key("2");
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        assert_eq!(ledger.get_or_set_first_seen_submit_time(&k, first).await.unwrap(), first);
        assert_eq!(ledger.get_or_set_first_seen_submit_time(&k, later).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_submit_time_set_after_notified_record() {
        let ledger = Ledger::in_memory();
        let k = key("3");
        let t = Utc.with_ymd_and_hms(2024, 5, 5, 5, 5, 5).unwrap();

        ledger.mark_notified(&k).await.unwrap();
        assert_eq!(ledger.get_or_set_first_seen_submit_time(&k, t).await.unwrap(), t);
        // Setting the submit time must not clear the notified flag
        assert!(ledger.is_notified(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_channel_scoped() {
        let ledger = Ledger::in_memory();
        let a = ProposalKey::new("A", "juno-1", "9");
        let b = ProposalKey::new("B", "juno-1", "9");

        ledger.mark_notified(&a).await.unwrap();
        assert!(ledger.is_notified(&a).await.unwrap());
        assert!(!ledger.is_notified(&b).await.unwrap());
    }

    /// Hides existing records from the first `find`, as if another writer
    /// created them between our read and our insert.
    struct LateWriterStore {
        inner: MemoryStore,
        hidden: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl LedgerStore for LateWriterStore {
        async fn find(&self, key: &ProposalKey) -> Result<Option<NotificationRecord>, StoreError> {
            if self.hidden.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find(key).await
        }

        async fn insert(&self, record: NotificationRecord) -> Result<bool, StoreError> {
            self.inner.insert(record).await
        }

        async fn update(&self, key: &ProposalKey, update: RecordUpdate) -> Result<(), StoreError> {
            self.inner.update(key, update).await
        }
    }

    fn late_writer(existing: NotificationRecord) -> (MemoryStore, Ledger) {
        let inner = MemoryStore::new();
        inner.records.insert(existing.key.clone(), existing);
        let store = LateWriterStore {
            inner: inner.clone(),
            hidden: std::sync::atomic::AtomicBool::new(true),
        };
        (inner, Ledger::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_mark_notified_commits_when_record_appears_concurrently() {
        let k = key("5");
        let (inner, ledger) = late_writer(NotificationRecord::new(k.clone()));

        ledger.mark_notified(&k).await.unwrap();
        assert!(inner.find(&k).await.unwrap().unwrap().notified);
    }

    #[tokio::test]
    async fn test_first_seen_defers_to_concurrent_writer() {
        let k = key("6");
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let observed = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut existing = NotificationRecord::new(k.clone());
        existing.submit_time = Some(earlier);
        let (_, ledger) = late_writer(existing);

        assert_eq!(
            ledger.get_or_set_first_seen_submit_time(&k, observed).await.unwrap(),
            earlier
        );
    }

    #[tokio::test]
    async fn test_insert_reports_creation() {
        let store = MemoryStore::new();
        assert!(store.insert(NotificationRecord::new(key("7"))).await.unwrap());
        assert!(!store.insert(NotificationRecord::new(key("7"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_record_errors() {
        let store = MemoryStore::new();
        let err = store.update(&key("404"), RecordUpdate::Notified).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing(_)));
        assert!(store.is_empty());
    }
}
