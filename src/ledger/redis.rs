//! Valkey (Redis-compatible) ledger store.
//!
//! Data model:
//!   {prefix}:ledger:{channel}:{chain_id}:{proposal_id}  → JSON NotificationRecord
//!
//! All keys are namespaced under a configurable prefix so several
//! deployments (e.g. staging vs prod channels) can share one Valkey.

use super::{LedgerStore, NotificationRecord, ProposalKey, RecordUpdate, StoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisStore {
    /// Connect to Valkey/Redis.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(prefix = prefix, "connected to Valkey ledger");
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    /// Build a namespaced key: "{prefix}:ledger:{channel}:{chain}:{proposal}"
    pub fn record_key(&self, key: &ProposalKey) -> String {
        format!(
            "{}:ledger:{}:{}:{}",
            self.prefix, key.channel, key.chain_id, key.proposal_id
        )
    }

    /// Test connectivity.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(response = %pong, "Valkey ping");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RedisStore {
    async fn find(&self, key: &ProposalKey) -> Result<Option<NotificationRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.record_key(key)).await?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, record: NotificationRecord) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&record)?;
        // Never clobber an existing record
        let created: bool = conn.set_nx(self.record_key(&record.key), json).await?;
        debug!(key = %record.key, created = created, "ledger record insert");
        Ok(created)
    }

    async fn update(&self, key: &ProposalKey, update: RecordUpdate) -> Result<(), StoreError> {
        let mut record = self
            .find(key)
            .await?
            .ok_or_else(|| StoreError::Missing(key.clone()))?;
        update.apply(&mut record);

        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&record)?;
        conn.set::<_, _, ()>(self.record_key(key), json).await?;
        Ok(())
    }
}
