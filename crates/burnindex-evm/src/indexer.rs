//! Per-chain indexing state machine.
//!
//! ```text
//! Stopped ──start()──▶ Starting ──validated──▶ Running ⇄ BackoffWait
//!    ▲                    │                        │
//!    └──── config fault ──┘        stop() ─────────┘
//! ```
//!
//! One loop task per chain. Each iteration reads the chain height, plans the
//! next batch from the cursor, fetches the three log sets concurrently,
//! decodes them, and persists records, batch history and watermark in one
//! store call. Failures leave the cursor where it was, so the same batch is
//! retried until it succeeds.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::try_join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use burnindex_core::backoff::Backoff;
use burnindex_core::config::{validate_descriptor, EngineConfig};
use burnindex_core::cursor::Cursor;
use burnindex_core::error::IndexerError;
use burnindex_core::store::{BatchCommit, IndexStore};
use burnindex_core::types::{
    BatchCounts, BlockRange, ChainDescriptor, EventMeta, EventRecord, IndexingBatchRecord,
};
use burnindex_rpc::stop_requested;

use crate::events::{decode_log, log_filters, EventClassifier};
use crate::fetcher::{EvmRpcClient, LogFilter, RawLog};
use crate::timestamps::TimestampCache;

/// Lifecycle state of a [`ChainIndexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexerState {
    #[default]
    Stopped,
    Starting,
    Running,
    BackoffWait,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::BackoffWait => write!(f, "backoff"),
        }
    }
}

#[derive(Clone, Default)]
struct SharedState(Arc<Mutex<IndexerState>>);

impl SharedState {
    fn get(&self) -> IndexerState {
        *self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set(&self, state: IndexerState) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }
}

// ─── ChainIndexer ─────────────────────────────────────────────────────────────

/// Stops a [`ChainIndexer`] from another task.
///
/// Also interrupts a [`ChainIndexer::start`] that is still retrying its
/// start-up calls; that `start` then returns an error.
#[derive(Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// Indexes one chain into the shared store.
pub struct ChainIndexer {
    chain: Arc<ChainDescriptor>,
    config: EngineConfig,
    client: Arc<dyn EvmRpcClient>,
    store: Arc<dyn IndexStore>,
    state: SharedState,
    stop_tx: Arc<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl ChainIndexer {
    pub fn new(
        chain: ChainDescriptor,
        config: EngineConfig,
        client: Arc<dyn EvmRpcClient>,
        store: Arc<dyn IndexStore>,
    ) -> Self {
        Self {
            chain: Arc::new(chain),
            config,
            client,
            store,
            state: SharedState::default(),
            stop_tx: Arc::new(watch::channel(false).0),
            handle: None,
        }
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    pub fn state(&self) -> IndexerState {
        self.state.get()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop_tx))
    }

    /// `true` while the loop task is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Validate the chain, position the cursor and spawn the loop.
    ///
    /// A no-op if already running. On failure the indexer stays `Stopped`.
    pub async fn start(&mut self) -> Result<(), IndexerError> {
        if self.is_running() {
            return Ok(());
        }
        self.state.set(IndexerState::Starting);
        self.stop_tx.send_replace(false);
        let mut stop_rx = self.stop_tx.subscribe();

        let cursor = match self.prepare(&mut stop_rx).await {
            Ok(cursor) => cursor,
            Err(e) => {
                self.state.set(IndexerState::Stopped);
                tracing::error!(chain = %self.chain.label(), error = %e, "indexer failed to start");
                return Err(e);
            }
        };

        let worker = Worker {
            classifier: EventClassifier::new(&self.chain.contracts),
            filters: log_filters(&self.chain.contracts),
            timestamps: TimestampCache::new(self.config.timestamp_cache_size),
            backoff: Backoff::new(self.config.backoff()),
            chain: Arc::clone(&self.chain),
            config: self.config.clone(),
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            state: self.state.clone(),
            stop: stop_rx,
            cursor,
        };

        self.state.set(IndexerState::Running);
        self.handle = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    async fn prepare(&self, stop: &mut watch::Receiver<bool>) -> Result<Cursor, IndexerError> {
        let chain = &self.chain;
        validate_descriptor(chain)?;

        let (reported, height) = self.identify(stop).await?;
        if reported != chain.chain_id {
            return Err(IndexerError::Config(format!(
                "chain {}: endpoint {} reports chain id {reported}",
                chain.label(),
                self.client.active_endpoint()
            )));
        }

        if chain.start_block > height {
            return Err(IndexerError::Config(format!(
                "chain {}: start block {} is beyond chain height {height}",
                chain.label(),
                chain.start_block
            )));
        }

        let watermark = self.store.load_watermark(chain.chain_id).await?;
        let cursor = Cursor::resume(watermark, chain.start_block, self.config.reorg_depth);
        tracing::info!(
            chain = %chain.label(),
            watermark = ?watermark,
            first_block = cursor.next_block(),
            height,
            "indexer starting"
        );
        Ok(cursor)
    }

    /// Read chain id and height, retrying transient failures with backoff
    /// until `stop` fires.
    async fn identify(&self, stop: &mut watch::Receiver<bool>) -> Result<(u64, u64), IndexerError> {
        let backoff = Backoff::new(self.config.backoff());
        let mut attempt = 0u32;
        loop {
            let result = async {
                let id = self.client.chain_id().await?;
                let height = self.client.block_number().await?;
                Ok::<_, IndexerError>((id, height))
            }
            .await;

            match result {
                Err(e) if e.is_transient() => match backoff.next_delay(attempt) {
                    Some(delay) => {
                        attempt += 1;
                        tracing::warn!(
                            chain = %self.chain.label(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "start-up RPC call failed, retrying"
                        );
                        tokio::select! {
                            _ = stop_requested(stop) => {
                                return Err(IndexerError::Other(format!(
                                    "chain {}: stopped during start-up",
                                    self.chain.label()
                                )));
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => return Err(e),
                },
                other => return other,
            }
        }
    }

    /// Signal the loop to stop and wait until it has exited.
    pub async fn stop(&mut self) {
        self.stop_tx.send_replace(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(chain = %self.chain.label(), error = %e, "indexer task panicked");
            }
        }
        self.state.set(IndexerState::Stopped);
    }
}

// ─── Loop ─────────────────────────────────────────────────────────────────────

enum Step {
    Advanced,
    CaughtUp,
}

struct Worker {
    chain: Arc<ChainDescriptor>,
    config: EngineConfig,
    client: Arc<dyn EvmRpcClient>,
    store: Arc<dyn IndexStore>,
    state: SharedState,
    stop: watch::Receiver<bool>,
    cursor: Cursor,
    classifier: EventClassifier,
    filters: [LogFilter; 3],
    timestamps: TimestampCache,
    backoff: Backoff,
}

impl Worker {
    async fn run(mut self) {
        let label = self.chain.label();
        let poll = self.config.poll_interval();
        let mut attempt = 0u32;

        loop {
            if *self.stop.borrow() {
                break;
            }

            match self.step().await {
                Ok(Step::Advanced) => attempt = 0,
                Ok(Step::CaughtUp) => {
                    attempt = 0;
                    if !self.pause(poll).await {
                        break;
                    }
                }
                Err(e) => {
                    let delay = if e.is_transient() {
                        match self.backoff.next_delay(attempt) {
                            Some(delay) => {
                                attempt += 1;
                                tracing::warn!(
                                    chain = %label,
                                    attempt,
                                    delay_ms = delay.as_millis() as u64,
                                    next_block = self.cursor.next_block(),
                                    error = %e,
                                    "transient failure, retrying batch"
                                );
                                delay
                            }
                            None => {
                                tracing::error!(
                                    chain = %label,
                                    attempt,
                                    next_block = self.cursor.next_block(),
                                    error = %e,
                                    "max retries exceeded, pausing one poll interval"
                                );
                                attempt = 0;
                                poll
                            }
                        }
                    } else {
                        tracing::error!(
                            chain = %label,
                            kind = ?e.kind(),
                            next_block = self.cursor.next_block(),
                            error = %e,
                            "batch failed, pausing one poll interval"
                        );
                        attempt = 0;
                        poll
                    };

                    self.state.set(IndexerState::BackoffWait);
                    let resumed = self.pause(delay).await;
                    self.state.set(IndexerState::Running);
                    if !resumed {
                        break;
                    }
                }
            }
        }

        self.state.set(IndexerState::Stopped);
        tracing::info!(chain = %label, watermark = ?self.cursor.watermark(), "indexer stopped");
    }

    /// Sleep for `delay`; returns `false` if stop was requested meanwhile.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = stop_requested(&mut self.stop) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn step(&mut self) -> Result<Step, IndexerError> {
        let height = self.client.block_number().await?;
        let batch_size = self.chain.effective_batch_size(self.config.batch_size);
        let Some(range) = self.cursor.plan(height, batch_size) else {
            tracing::debug!(chain = %self.chain.label(), height, "caught up");
            return Ok(Step::CaughtUp);
        };

        let started = Instant::now();
        let [token, burn, position] = &self.filters;
        let (token_logs, burn_logs, position_logs) = tokio::try_join!(
            self.client.get_logs(range, token),
            self.client.get_logs(range, burn),
            self.client.get_logs(range, position),
        )?;

        let logs: Vec<RawLog> = token_logs
            .into_iter()
            .chain(burn_logs)
            .chain(position_logs)
            .filter(|log| !log.is_removed())
            .collect();
        let records = self.decode(&logs).await?;

        self.persist(range, records, started).await?;
        self.cursor.advance(range);
        Ok(Step::Advanced)
    }

    async fn decode(&mut self, logs: &[RawLog]) -> Result<Vec<EventRecord>, IndexerError> {
        let mut classified = Vec::with_capacity(logs.len());
        for log in logs {
            let Some(kind) = self.classifier.classify_log(log) else {
                tracing::trace!(chain = self.chain.chain_id, tx = %log.tx_hash, "unclassified log dropped");
                continue;
            };
            classified.push((kind, log, log.block_number_u64()?, log.log_index_u32()?));
        }

        let blocks: BTreeSet<u64> = classified.iter().map(|(_, _, block, _)| *block).collect();
        let timestamps = self.resolve_timestamps(blocks).await?;

        let mut records = Vec::with_capacity(classified.len());
        for (kind, log, block_number, log_index) in classified {
            let Some(&block_timestamp) = timestamps.get(&block_number) else {
                return Err(IndexerError::Other(format!(
                    "chain {}: no timestamp resolved for block {block_number}",
                    self.chain.label()
                )));
            };
            let meta = EventMeta {
                chain_id: self.chain.chain_id,
                tx_hash: log.tx_hash.to_ascii_lowercase(),
                log_index,
                block_number,
                block_timestamp,
            };
            match decode_log(kind, log, meta) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(chain = %self.chain.label(), error = %e, "skipping undecodable log"),
            }
        }

        records.sort_by_key(|r| (r.meta().block_number, r.meta().log_index));
        Ok(records)
    }

    /// Timestamps of every block in `blocks`.
    ///
    /// The cache only saves round trips; the returned map holds the whole
    /// batch even when the batch spans more blocks than the cache keeps.
    async fn resolve_timestamps(
        &mut self,
        blocks: BTreeSet<u64>,
    ) -> Result<HashMap<u64, i64>, IndexerError> {
        let mut resolved = HashMap::with_capacity(blocks.len());
        let mut missing = Vec::new();
        for block in blocks {
            match self.timestamps.get(block) {
                Some(ts) => {
                    resolved.insert(block, ts);
                }
                None => missing.push(block),
            }
        }
        if missing.is_empty() {
            return Ok(resolved);
        }

        let client = &self.client;
        let fetched = try_join_all(missing.iter().map(|&block| async move {
            client.block_timestamp(block).await.map(|ts| (block, ts))
        }))
        .await?;
        for (block, ts) in fetched {
            self.timestamps.insert(block, ts);
            resolved.insert(block, ts);
        }
        Ok(resolved)
    }

    async fn persist(
        &self,
        range: BlockRange,
        records: Vec<EventRecord>,
        started: Instant,
    ) -> Result<(), IndexerError> {
        let chain_id = self.chain.chain_id;

        if records.is_empty() {
            self.store.save_watermark(chain_id, range.to).await?;
            tracing::debug!(chain = %self.chain.label(), from = range.from, to = range.to, "empty batch");
            return Ok(());
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let batch = IndexingBatchRecord {
            chain_id,
            range,
            counts: BatchCounts::tally(&records),
            duration_ms,
            recorded_at: Utc::now(),
        };
        let outcome = self
            .store
            .commit_batch(BatchCommit {
                chain_id,
                records,
                batch,
                watermark: range.to,
            })
            .await?;

        tracing::info!(
            chain = %self.chain.label(),
            from = range.from,
            to = range.to,
            burns = outcome.inserted.burns,
            swap_burns = outcome.inserted.swap_burns,
            liquidity_adds = outcome.inserted.liquidity_adds,
            positions_created = outcome.inserted.positions_created,
            positions_claimed = outcome.inserted.positions_claimed,
            duplicates = outcome.duplicates,
            duration_ms,
            "batch indexed"
        );
        Ok(())
    }
}
