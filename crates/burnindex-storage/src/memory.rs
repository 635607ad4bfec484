//! In-memory storage backend.
//!
//! Mirrors the PostgreSQL schema in RAM: per-variant unique keys, derived
//! totals, batch history, watermarks and health rows. Used by the engine
//! tests and for dry runs without a database. All data is lost when the
//! process exits.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use burnindex_core::aggregates::{AggregateDelta, ChainTotals, UserTotals};
use burnindex_core::error::IndexerError;
use burnindex_core::store::{BatchCommit, CommitOutcome, IndexStore};
use burnindex_core::types::{
    ChainDescriptor, ChainHealthSnapshot, ChainStatus, EventKind, EventRecord,
    IndexingBatchRecord,
};

#[derive(Default)]
struct ChainState {
    descriptor: Option<ChainDescriptor>,
    watermark: Option<u64>,
    last_indexed_at: Option<DateTime<Utc>>,
    records: Vec<EventRecord>,
    keys: HashSet<(EventKind, String)>,
    batches: Vec<IndexingBatchRecord>,
    totals: ChainTotals,
    users: BTreeMap<String, UserTotals>,
    health: Option<ChainHealthSnapshot>,
}

/// In-memory [`IndexStore`].
#[derive(Default)]
pub struct InMemoryStorage {
    chains: Mutex<HashMap<u64, ChainState>>,
    failing_commits: AtomicU32,
    closed: Mutex<bool>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn chains(&self) -> MutexGuard<'_, HashMap<u64, ChainState>> {
        self.chains.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn read<T>(&self, chain_id: u64, f: impl FnOnce(&ChainState) -> T) -> Option<T> {
        self.chains().get(&chain_id).map(f)
    }

    /// Make the next `n` calls to `commit_batch` fail without writing anything.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Current watermark, without going through the async trait.
    pub fn watermark(&self, chain_id: u64) -> Option<u64> {
        self.read(chain_id, |c| c.watermark).flatten()
    }

    /// All records persisted for a chain, in insertion order.
    pub fn records(&self, chain_id: u64) -> Vec<EventRecord> {
        self.read(chain_id, |c| c.records.clone()).unwrap_or_default()
    }

    /// Records of a single variant.
    pub fn records_of(&self, chain_id: u64, kind: EventKind) -> Vec<EventRecord> {
        self.records(chain_id)
            .into_iter()
            .filter(|r| r.kind() == kind)
            .collect()
    }

    pub fn batches(&self, chain_id: u64) -> Vec<IndexingBatchRecord> {
        self.read(chain_id, |c| c.batches.clone()).unwrap_or_default()
    }

    pub fn chain_totals(&self, chain_id: u64) -> ChainTotals {
        self.read(chain_id, |c| c.totals.clone()).unwrap_or_default()
    }

    /// Per-user totals; `address` is matched case-insensitively.
    pub fn user_totals(&self, chain_id: u64, address: &str) -> Option<UserTotals> {
        let key = address.to_ascii_lowercase();
        self.read(chain_id, |c| c.users.get(&key).cloned()).flatten()
    }

    pub fn health(&self, chain_id: u64) -> Option<ChainHealthSnapshot> {
        self.read(chain_id, |c| c.health.clone()).flatten()
    }

    pub fn descriptor(&self, chain_id: u64) -> Option<ChainDescriptor> {
        self.read(chain_id, |c| c.descriptor.clone()).flatten()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl IndexStore for InMemoryStorage {
    async fn ensure_chain(&self, chain: &ChainDescriptor) -> Result<(), IndexerError> {
        self.chains().entry(chain.chain_id).or_default().descriptor = Some(chain.clone());
        Ok(())
    }

    async fn load_watermark(&self, chain_id: u64) -> Result<Option<u64>, IndexerError> {
        Ok(self.watermark(chain_id))
    }

    async fn save_watermark(&self, chain_id: u64, block: u64) -> Result<(), IndexerError> {
        let mut chains = self.chains();
        let state = chains.entry(chain_id).or_default();
        state.watermark = Some(state.watermark.map_or(block, |w| w.max(block)));
        state.last_indexed_at = Some(Utc::now());
        Ok(())
    }

    async fn commit_batch(&self, commit: BatchCommit) -> Result<CommitOutcome, IndexerError> {
        if self.take_injected_failure() {
            return Err(IndexerError::Storage(
                "connection reset by peer (injected)".into(),
            ));
        }

        let mut chains = self.chains();
        let state = chains.entry(commit.chain_id).or_default();

        let mut outcome = CommitOutcome::default();
        let mut delta = AggregateDelta::default();
        for record in commit.records {
            let key = (record.kind(), record.meta().tx_hash.clone());
            if !state.keys.insert(key) {
                outcome.duplicates += 1;
                continue;
            }
            outcome.inserted.add(record.kind());
            delta.add(&record);
            state.records.push(record);
        }

        state.totals.merge(&delta.chain);
        for (address, user) in delta.users {
            state.users.entry(address).or_default().merge(&user);
        }
        state.batches.push(commit.batch);
        state.watermark = Some(
            state
                .watermark
                .map_or(commit.watermark, |w| w.max(commit.watermark)),
        );
        state.last_indexed_at = Some(Utc::now());
        Ok(outcome)
    }

    async fn upsert_health(&self, snapshot: &ChainHealthSnapshot) -> Result<(), IndexerError> {
        self.chains().entry(snapshot.chain_id).or_default().health = Some(snapshot.clone());
        Ok(())
    }

    async fn chain_status(&self, chain_id: u64) -> Result<Option<ChainStatus>, IndexerError> {
        let chains = self.chains();
        let Some(state) = chains.get(&chain_id) else {
            return Ok(None);
        };
        let name = state
            .descriptor
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_default();
        let health = state.health.as_ref();
        Ok(Some(ChainStatus {
            chain_id,
            name,
            healthy: health.map(|h| h.healthy).unwrap_or(false),
            blocks_behind: health.and_then(|h| h.blocks_behind),
            last_error: health.and_then(|h| h.error.clone()),
            rpc_latency_ms: health.and_then(|h| h.rpc_latency_ms),
            active_endpoint: health.map(|h| h.active_endpoint.clone()),
            watermark: state.watermark,
            last_indexed_at: state.last_indexed_at,
        }))
    }

    async fn close(&self) {
        *self.closed.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }
}
