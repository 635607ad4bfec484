//! Periodic per-chain health checks.
//!
//! Every `health_interval` the monitor asks each chain's active endpoint for
//! its height, compares it with the stored watermark and upserts one
//! [`ChainHealthSnapshot`] per chain. Chains are checked concurrently and a
//! failure on one never affects the others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use burnindex_core::store::IndexStore;
use burnindex_core::types::ChainHealthSnapshot;
use burnindex_rpc::stop_requested;

use crate::fetcher::EvmRpcClient;

/// A chain under observation.
#[derive(Clone)]
pub struct MonitoredChain {
    pub chain_id: u64,
    pub name: String,
    pub client: Arc<dyn EvmRpcClient>,
}

pub struct HealthMonitor {
    chains: Vec<MonitoredChain>,
    store: Arc<dyn IndexStore>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(chains: Vec<MonitoredChain>, store: Arc<dyn IndexStore>, interval: Duration) -> Self {
        Self {
            chains,
            store,
            interval,
        }
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Check every chain once and persist the snapshots.
    pub async fn check_once(&self) -> Vec<ChainHealthSnapshot> {
        join_all(self.chains.iter().map(|chain| self.check_chain(chain))).await
    }

    async fn check_chain(&self, chain: &MonitoredChain) -> ChainHealthSnapshot {
        let url = chain.client.active_endpoint();
        let started = Instant::now();

        let snapshot = match chain.client.block_number().await {
            Ok(height) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                match self.store.load_watermark(chain.chain_id).await {
                    Ok(watermark) => ChainHealthSnapshot {
                        chain_id: chain.chain_id,
                        healthy: true,
                        error: None,
                        blocks_behind: watermark.map(|w| height.saturating_sub(w)),
                        rpc_latency_ms: Some(latency_ms),
                        active_endpoint: url,
                        checked_at: Utc::now(),
                    },
                    Err(e) => Self::unhealthy(chain.chain_id, url, e.to_string()),
                }
            }
            Err(e) => {
                let reason = e.to_string();
                chain.client.report_failure(&url, &reason);
                Self::unhealthy(chain.chain_id, url, reason)
            }
        };

        if snapshot.healthy {
            tracing::debug!(
                chain = chain.chain_id,
                name = %chain.name,
                blocks_behind = ?snapshot.blocks_behind,
                latency_ms = ?snapshot.rpc_latency_ms,
                "health check ok"
            );
        } else {
            tracing::warn!(
                chain = chain.chain_id,
                name = %chain.name,
                url = %snapshot.active_endpoint,
                error = ?snapshot.error,
                "health check failed"
            );
        }

        if let Err(e) = self.store.upsert_health(&snapshot).await {
            tracing::warn!(chain = chain.chain_id, error = %e, "failed to persist health snapshot");
        }
        snapshot
    }

    fn unhealthy(chain_id: u64, url: String, error: String) -> ChainHealthSnapshot {
        ChainHealthSnapshot {
            chain_id,
            healthy: false,
            error: Some(error),
            blocks_behind: None,
            rpc_latency_ms: None,
            active_endpoint: url,
            checked_at: Utc::now(),
        }
    }

    /// Run `check_once` every interval until `shutdown` turns `true`.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop_requested(&mut shutdown) => break,
                    _ = ticker.tick() => {
                        self.check_once().await;
                    }
                }
            }
            tracing::debug!("health monitor stopped");
        })
    }
}
