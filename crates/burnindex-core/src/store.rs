//! Storage abstraction shared by the chain indexers and the health monitor.
//!
//! One store instance (one connection pool) is shared by every chain; rows are
//! partitioned by `chain_id`. Implementations live in `burnindex-storage`.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{
    BatchCounts, ChainDescriptor, ChainHealthSnapshot, ChainStatus, EventRecord,
    IndexingBatchRecord,
};

/// Everything one successful batch writes, applied in a single transaction.
#[derive(Debug, Clone)]
pub struct BatchCommit {
    pub chain_id: u64,
    pub records: Vec<EventRecord>,
    pub batch: IndexingBatchRecord,
    /// New watermark, written in the same transaction as the records.
    pub watermark: u64,
}

/// What a batch commit actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Records newly inserted, by variant.
    pub inserted: BatchCounts,
    /// Records ignored because their `(variant, chain, tx_hash)` already existed.
    pub duplicates: u32,
}

/// Persistence operations used by the engine.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert the chain's descriptor row if missing, refresh it otherwise.
    async fn ensure_chain(&self, chain: &ChainDescriptor) -> Result<(), IndexerError>;

    /// Load the persisted watermark for a chain.
    async fn load_watermark(&self, chain_id: u64) -> Result<Option<u64>, IndexerError>;

    /// Persist the watermark (used for batches that produced no records).
    async fn save_watermark(&self, chain_id: u64, block: u64) -> Result<(), IndexerError>;

    /// Atomically persist records, aggregate deltas, the batch history row and
    /// the watermark. Duplicate records are skipped, not reported as errors.
    /// On error nothing is written.
    async fn commit_batch(&self, commit: BatchCommit) -> Result<CommitOutcome, IndexerError>;

    /// Overwrite the chain's health snapshot.
    async fn upsert_health(&self, snapshot: &ChainHealthSnapshot) -> Result<(), IndexerError>;

    /// Status row for the external reporting layer.
    async fn chain_status(&self, chain_id: u64) -> Result<Option<ChainStatus>, IndexerError>;

    /// Release the underlying connections. Called once on shutdown.
    async fn close(&self) {}
}
