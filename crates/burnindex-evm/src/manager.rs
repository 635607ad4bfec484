//! Top-level orchestration: one endpoint pool and one indexer per enabled
//! chain, a shared store, per-pool probers and the health monitor.
//!
//! Start-up failures are isolated per chain: a chain whose pool cannot be
//! built, whose row cannot be written or whose indexer refuses to start is
//! reported in the [`StartReport`] and skipped; the remaining chains run.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use burnindex_core::config::EngineConfig;
use burnindex_core::error::IndexerError;
use burnindex_core::store::IndexStore;
use burnindex_core::types::{ChainDescriptor, ChainStatus};
use burnindex_rpc::{EndpointPool, PoolConfig, TransportError};

use crate::fetcher::EvmRpcClient;
use crate::health::{HealthMonitor, MonitoredChain};
use crate::indexer::{ChainIndexer, IndexerState};

/// Builds the endpoint pool of a chain.
pub type PoolFactory =
    Arc<dyn Fn(&ChainDescriptor, PoolConfig) -> Result<EndpointPool, TransportError> + Send + Sync>;

/// Default factory: one HTTP client per configured URL.
pub fn http_pool_factory() -> PoolFactory {
    Arc::new(|chain: &ChainDescriptor, config: PoolConfig| {
        EndpointPool::from_urls(chain.chain_id, &chain.endpoints, config)
    })
}

/// Result of [`IndexerManager::start`].
#[derive(Debug, Default)]
pub struct StartReport {
    /// Chains whose indexer is running.
    pub started: Vec<u64>,
    /// Chains that failed to initialise, with the reason.
    pub failed: Vec<(u64, IndexerError)>,
    /// Configured chains not in the allowlist.
    pub skipped: Vec<u64>,
}

impl StartReport {
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

struct ManagedChain {
    pool: Arc<EndpointPool>,
    indexer: ChainIndexer,
}

pub struct IndexerManager {
    engine: EngineConfig,
    chains: Vec<ChainDescriptor>,
    store: Arc<dyn IndexStore>,
    factory: PoolFactory,
    managed: Vec<ManagedChain>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    monitor: Option<Arc<HealthMonitor>>,
    closed: bool,
}

impl IndexerManager {
    pub fn new(engine: EngineConfig, chains: Vec<ChainDescriptor>, store: Arc<dyn IndexStore>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine,
            chains,
            store,
            factory: http_pool_factory(),
            managed: Vec::new(),
            shutdown_tx,
            tasks: Vec::new(),
            monitor: None,
            closed: false,
        }
    }

    /// Replace how endpoint pools are built.
    pub fn with_pool_factory(mut self, factory: PoolFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Chain ids with a running indexer.
    pub fn chain_ids(&self) -> Vec<u64> {
        self.managed.iter().map(|m| m.indexer.chain().chain_id).collect()
    }

    pub fn indexer_state(&self, chain_id: u64) -> Option<IndexerState> {
        self.managed
            .iter()
            .find(|m| m.indexer.chain().chain_id == chain_id)
            .map(|m| m.indexer.state())
    }

    pub fn pool(&self, chain_id: u64) -> Option<Arc<EndpointPool>> {
        self.managed
            .iter()
            .find(|m| m.indexer.chain().chain_id == chain_id)
            .map(|m| Arc::clone(&m.pool))
    }

    pub fn monitor(&self) -> Option<Arc<HealthMonitor>> {
        self.monitor.clone()
    }

    /// Probers plus the health monitor, while not shut down.
    pub fn background_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Start every enabled chain, the pool probers and the health monitor.
    pub async fn start(&mut self) -> StartReport {
        let mut report = StartReport::default();
        let first_new = self.managed.len();
        let pool_config = PoolConfig::from_engine(&self.engine);

        for chain in self.chains.clone() {
            if !self.engine.is_enabled(&chain) {
                tracing::info!(chain = %chain.label(), "chain not enabled, skipping");
                report.skipped.push(chain.chain_id);
                continue;
            }
            if self.managed.iter().any(|m| m.indexer.chain().chain_id == chain.chain_id) {
                continue;
            }

            match self.start_chain(chain.clone(), pool_config.clone()).await {
                Ok(managed) => {
                    report.started.push(chain.chain_id);
                    self.managed.push(managed);
                }
                Err(e) => {
                    tracing::error!(chain = %chain.label(), error = %e, "chain failed to initialise");
                    report.failed.push((chain.chain_id, e));
                }
            }
        }

        for managed in &self.managed[first_new..] {
            let handle = Arc::clone(&managed.pool).spawn_prober(self.shutdown_tx.subscribe());
            self.tasks.push(handle);
        }

        if !self.managed.is_empty() && self.monitor.is_none() {
            let chains = self
                .managed
                .iter()
                .map(|m| MonitoredChain {
                    chain_id: m.indexer.chain().chain_id,
                    name: m.indexer.chain().name.clone(),
                    client: Arc::clone(&m.pool) as Arc<dyn EvmRpcClient>,
                })
                .collect();
            let monitor = Arc::new(HealthMonitor::new(
                chains,
                Arc::clone(&self.store),
                self.engine.health_interval(),
            ));
            self.tasks
                .push(Arc::clone(&monitor).spawn(self.shutdown_tx.subscribe()));
            self.monitor = Some(monitor);
        }

        tracing::info!(
            started = report.started.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "indexer manager started"
        );
        report
    }

    async fn start_chain(
        &self,
        chain: ChainDescriptor,
        pool_config: PoolConfig,
    ) -> Result<ManagedChain, IndexerError> {
        let pool = Arc::new((self.factory)(&chain, pool_config)?);
        self.store.ensure_chain(&chain).await?;

        let mut indexer = ChainIndexer::new(
            chain,
            self.engine.clone(),
            Arc::clone(&pool) as Arc<dyn EvmRpcClient>,
            Arc::clone(&self.store),
        );
        indexer.start().await?;
        Ok(ManagedChain { pool, indexer })
    }

    /// Status of every managed chain, for the reporting surface.
    pub async fn status(&self) -> Vec<ChainStatus> {
        let mut statuses = Vec::with_capacity(self.managed.len());
        for managed in &self.managed {
            let chain = managed.indexer.chain();
            let status = match self.store.chain_status(chain.chain_id).await {
                Ok(Some(status)) => status,
                Ok(None) => Self::placeholder(chain, None),
                Err(e) => {
                    tracing::warn!(chain = %chain.label(), error = %e, "status read failed");
                    Self::placeholder(chain, Some(e.to_string()))
                }
            };
            statuses.push(status);
        }
        statuses
    }

    fn placeholder(chain: &ChainDescriptor, error: Option<String>) -> ChainStatus {
        ChainStatus {
            chain_id: chain.chain_id,
            name: chain.name.clone(),
            healthy: false,
            blocks_behind: None,
            last_error: error,
            rpc_latency_ms: None,
            active_endpoint: None,
            watermark: None,
            last_indexed_at: None,
        }
    }

    /// Drain every indexer, stop the background tasks, then close the store.
    ///
    /// Safe to call more than once; only the first call does anything.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::info!(chains = self.managed.len(), "shutting down indexers");

        join_all(self.managed.iter_mut().map(|m| m.indexer.stop())).await;

        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "background task panicked");
            }
        }

        self.store.close().await;
        tracing::info!("shutdown complete");
    }
}
