//! Per-chain endpoint pool with health probing and debounced failover.
//!
//! Exactly one endpoint is active at a time. Reading it is a lock-free atomic
//! load; switching happens only through [`EndpointPool::evaluate_switch`],
//! which requires a transient error (or too many consecutive failures), a
//! healthy alternative and a quiet period since the previous switch.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use burnindex_core::error::is_transient_message;
use burnindex_core::EngineConfig;

use crate::error::TransportError;
use crate::http::HttpRpcClient;
use crate::request::quantity_from_value;
use crate::shutdown::stop_requested;
use crate::transport::RpcTransport;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Tuning knobs for one pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How often `spawn_prober` probes every endpoint.
    pub probe_interval: Duration,
    /// Minimum quiet period between two switches.
    pub min_switch_interval: Duration,
    /// Consecutive failures after which any error justifies a switch.
    pub failure_ceiling: u32,
    /// Timeout applied to every probe and request.
    pub request_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(15),
            min_switch_interval: Duration::from_secs(5),
            failure_ceiling: 3,
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl PoolConfig {
    pub fn from_engine(engine: &EngineConfig) -> Self {
        Self {
            probe_interval: engine.probe_interval(),
            min_switch_interval: engine.min_switch_interval(),
            failure_ceiling: engine.endpoint_failure_ceiling,
            request_timeout: engine.request_timeout(),
        }
    }
}

// ─── EndpointHealth ───────────────────────────────────────────────────────────

/// Process-local health record of one endpoint. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHealth {
    pub url: String,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_latency: Option<Duration>,
    pub last_height: Option<u64>,
    pub last_error: Option<String>,
}

impl EndpointHealth {
    fn seeded(url: &str) -> Self {
        Self {
            url: url.to_string(),
            healthy: true,
            consecutive_failures: 0,
            last_success: Some(Utc::now()),
            last_failure: None,
            last_latency: None,
            last_height: None,
            last_error: None,
        }
    }
}

struct Endpoint {
    transport: Arc<dyn RpcTransport>,
    health: Mutex<EndpointHealth>,
}

impl Endpoint {
    fn url(&self) -> &str {
        self.transport.url()
    }

    fn health(&self) -> MutexGuard<'_, EndpointHealth> {
        lock(&self.health)
    }

    fn record_success(&self, latency: Duration, height: Option<u64>) {
        let mut h = self.health();
        h.healthy = true;
        h.consecutive_failures = 0;
        h.last_success = Some(Utc::now());
        h.last_latency = Some(latency);
        if height.is_some() {
            h.last_height = height;
        }
    }

    /// Probe failures mark the endpoint unhealthy; request failures only count.
    fn record_failure(&self, error: &str, mark_unhealthy: bool) {
        let mut h = self.health();
        if mark_unhealthy {
            h.healthy = false;
        }
        h.consecutive_failures = h.consecutive_failures.saturating_add(1);
        h.last_failure = Some(Utc::now());
        h.last_error = Some(error.to_string());
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── EndpointPool ─────────────────────────────────────────────────────────────

/// Ordered endpoints of one chain with one active member.
pub struct EndpointPool {
    chain_id: u64,
    endpoints: Vec<Endpoint>,
    active: AtomicUsize,
    last_switch: Mutex<Option<Instant>>,
    next_id: AtomicU64,
    config: PoolConfig,
}

impl EndpointPool {
    /// Build a pool from transports; the first one starts active.
    pub fn new(
        chain_id: u64,
        transports: Vec<Arc<dyn RpcTransport>>,
        config: PoolConfig,
    ) -> Result<Self, TransportError> {
        if transports.is_empty() {
            return Err(TransportError::NoEndpoints { chain_id });
        }
        let endpoints = transports
            .into_iter()
            .map(|transport| Endpoint {
                health: Mutex::new(EndpointHealth::seeded(transport.url())),
                transport,
            })
            .collect();
        Ok(Self {
            chain_id,
            endpoints,
            active: AtomicUsize::new(0),
            last_switch: Mutex::new(None),
            next_id: AtomicU64::new(1),
            config,
        })
    }

    /// Build a pool of HTTP clients, one per URL.
    pub fn from_urls(
        chain_id: u64,
        urls: &[String],
        config: PoolConfig,
    ) -> Result<Self, TransportError> {
        let transports = urls
            .iter()
            .map(|url| {
                HttpRpcClient::new(url.clone(), config.request_timeout)
                    .map(|c| Arc::new(c) as Arc<dyn RpcTransport>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(chain_id, transports, config)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The currently active transport. No I/O.
    pub fn active(&self) -> Arc<dyn RpcTransport> {
        Arc::clone(&self.endpoints[self.active_index()].transport)
    }

    pub fn active_url(&self) -> String {
        self.endpoints[self.active_index()].url().to_string()
    }

    fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Snapshot of every endpoint's health, in configuration order.
    pub fn health_summary(&self) -> Vec<EndpointHealth> {
        self.endpoints.iter().map(|ep| ep.health().clone()).collect()
    }

    /// Send `method` through the active endpoint.
    ///
    /// A failure is counted against that endpoint and offered to
    /// [`evaluate_switch`](Self::evaluate_switch) before being returned; the
    /// caller decides whether to retry.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let idx = self.active_index();
        let endpoint = &self.endpoints[idx];
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let result = self
            .with_timeout(endpoint.transport.call(id, method, params))
            .await;

        match result {
            Ok(value) => {
                endpoint.record_success(started.elapsed(), None);
                Ok(value)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(
                    chain = self.chain_id,
                    url = %endpoint.url(),
                    method,
                    error = %reason,
                    "RPC request failed"
                );
                endpoint.record_failure(&reason, false);
                self.evaluate_switch(endpoint.url(), &reason);
                Err(e)
            }
        }
    }

    /// Probe every endpoint concurrently with `eth_blockNumber` and refresh
    /// their health. Returns the number of healthy endpoints.
    pub async fn probe_all(&self) -> usize {
        let probes = self.endpoints.iter().map(|ep| self.probe(ep));
        let results = join_all(probes).await;

        let active_idx = self.active_index();
        let mut healthy = 0;
        let mut active_failure = None;

        for (idx, result) in results.into_iter().enumerate() {
            let endpoint = &self.endpoints[idx];
            match result {
                Ok((height, latency)) => {
                    endpoint.record_success(latency, Some(height));
                    healthy += 1;
                    tracing::trace!(
                        chain = self.chain_id,
                        url = %endpoint.url(),
                        height,
                        latency_ms = latency.as_millis() as u64,
                        "endpoint probe ok"
                    );
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!(
                        chain = self.chain_id,
                        url = %endpoint.url(),
                        error = %reason,
                        "endpoint probe failed"
                    );
                    endpoint.record_failure(&reason, true);
                    if idx == active_idx {
                        active_failure = Some(reason);
                    }
                }
            }
        }

        if let Some(reason) = active_failure {
            self.evaluate_switch(self.endpoints[active_idx].url(), &reason);
        }
        healthy
    }

    async fn probe(&self, endpoint: &Endpoint) -> Result<(u64, Duration), TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let value = self
            .with_timeout(endpoint.transport.call(id, "eth_blockNumber", vec![]))
            .await?;
        let latency = started.elapsed();
        Ok((quantity_from_value(&value)?, latency))
    }

    async fn with_timeout<F>(&self, fut: F) -> Result<Value, TransportError>
    where
        F: std::future::Future<Output = Result<Value, TransportError>>,
    {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout {
                ms: timeout.as_millis() as u64,
            })?
    }

    /// Decide whether a failure on `failing_url` moves the pool to another
    /// endpoint. Returns `true` if a switch happened.
    pub fn evaluate_switch(&self, failing_url: &str, error: &str) -> bool {
        let mut last_switch = lock(&self.last_switch);

        let active_idx = self.active_index();
        let active = &self.endpoints[active_idx];
        if active.url() != failing_url {
            tracing::debug!(
                chain = self.chain_id,
                url = %failing_url,
                active = %active.url(),
                "failure on inactive endpoint ignored"
            );
            return false;
        }

        let failures = active.health().consecutive_failures;
        if !is_transient_message(error) && failures < self.config.failure_ceiling {
            return false;
        }

        if let Some(at) = *last_switch {
            let since = at.elapsed();
            if since < self.config.min_switch_interval {
                tracing::debug!(
                    chain = self.chain_id,
                    url = %failing_url,
                    since_ms = since.as_millis() as u64,
                    "endpoint switch debounced"
                );
                return false;
            }
        }

        let candidate = self
            .endpoints
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != active_idx)
            .filter_map(|(idx, ep)| {
                let h = ep.health();
                h.healthy
                    .then(|| (idx, h.last_latency.unwrap_or(Duration::MAX)))
            })
            .min_by_key(|(_, latency)| *latency)
            .map(|(idx, _)| idx);

        match candidate {
            Some(next) => {
                self.active.store(next, Ordering::Release);
                *last_switch = Some(Instant::now());
                tracing::warn!(
                    chain = self.chain_id,
                    from = %failing_url,
                    to = %self.endpoints[next].url(),
                    error,
                    "switched active RPC endpoint"
                );
                true
            }
            None => {
                tracing::warn!(
                    chain = self.chain_id,
                    url = %failing_url,
                    error,
                    "no healthy alternative endpoint, keeping current"
                );
                false
            }
        }
    }

    /// Probe on `probe_interval` until `shutdown` turns `true`.
    pub fn spawn_prober(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.probe_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop_requested(&mut shutdown) => break,
                    _ = ticker.tick() => {
                        self.probe_all().await;
                    }
                }
            }
            tracing::debug!(chain = self.chain_id, "endpoint prober stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{to_quantity, JsonRpcRequest, JsonRpcResponse};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct MockTransport {
        url: String,
        outcome: Mutex<Result<u64, String>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RpcTransport for MockTransport {
        async fn send(&self, _req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*lock(&self.outcome) {
                Ok(height) => Ok(JsonRpcResponse::ok(1, Value::String(to_quantity(*height)))),
                Err(msg) => Err(TransportError::Http(msg.clone())),
            }
        }
        fn url(&self) -> &str {
            &self.url
        }
    }

    fn mock(url: &str, outcome: Result<u64, &str>) -> Arc<MockTransport> {
        Arc::new(MockTransport {
            url: url.to_string(),
            outcome: Mutex::new(outcome.map_err(str::to_string)),
            calls: AtomicU32::new(0),
        })
    }

    fn pool_of(mocks: &[Arc<MockTransport>], config: PoolConfig) -> EndpointPool {
        let transports = mocks
            .iter()
            .map(|m| Arc::clone(m) as Arc<dyn RpcTransport>)
            .collect();
        EndpointPool::new(56, transports, config).unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = EndpointPool::new(56, vec![], PoolConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::NoEndpoints { chain_id: 56 }));
    }

    #[test]
    fn first_endpoint_active_and_all_seeded_healthy() {
        let pool = pool_of(
            &[mock("https://a", Ok(1)), mock("https://b", Ok(1))],
            PoolConfig::default(),
        );
        assert_eq!(pool.active_url(), "https://a");
        assert_eq!(pool.active().url(), "https://a");
        assert!(pool.health_summary().iter().all(|h| h.healthy && h.last_success.is_some()));
    }

    #[tokio::test]
    async fn no_switch_when_only_alternative_is_unhealthy() {
        let pool = pool_of(
            &[mock("https://a", Ok(100)), mock("https://b", Err("connection refused"))],
            PoolConfig::default(),
        );
        assert_eq!(pool.probe_all().await, 1);

        let summary = pool.health_summary();
        assert!(summary[0].healthy);
        assert_eq!(summary[0].last_height, Some(100));
        assert!(!summary[1].healthy);
        assert_eq!(summary[1].consecutive_failures, 1);

        assert!(!pool.evaluate_switch("https://a", "429 Too Many Requests"));
        assert_eq!(pool.active_url(), "https://a");
    }

    #[test]
    fn switches_to_lowest_latency_healthy_endpoint() {
        let pool = pool_of(
            &[mock("https://a", Ok(1)), mock("https://b", Ok(1)), mock("https://c", Ok(1))],
            PoolConfig::default(),
        );
        pool.endpoints[1].record_success(Duration::from_millis(200), Some(1));
        pool.endpoints[2].record_success(Duration::from_millis(40), Some(1));

        assert!(pool.evaluate_switch("https://a", "rate limit exceeded"));
        assert_eq!(pool.active_url(), "https://c");
    }

    #[test]
    fn switches_are_debounced() {
        let pool = pool_of(
            &[mock("https://a", Ok(1)), mock("https://b", Ok(1))],
            PoolConfig {
                min_switch_interval: Duration::from_secs(60),
                ..PoolConfig::default()
            },
        );
        assert!(pool.evaluate_switch("https://a", "request timed out"));
        assert_eq!(pool.active_url(), "https://b");
        assert!(!pool.evaluate_switch("https://b", "request timed out"));
        assert_eq!(pool.active_url(), "https://b");
    }

    #[test]
    fn zero_interval_allows_back_to_back_switches() {
        let pool = pool_of(
            &[mock("https://a", Ok(1)), mock("https://b", Ok(1))],
            PoolConfig {
                min_switch_interval: Duration::ZERO,
                ..PoolConfig::default()
            },
        );
        assert!(pool.evaluate_switch("https://a", "timeout"));
        assert!(pool.evaluate_switch("https://b", "timeout"));
        assert_eq!(pool.active_url(), "https://a");
    }

    #[test]
    fn failure_on_inactive_endpoint_is_ignored() {
        let pool = pool_of(
            &[mock("https://a", Ok(1)), mock("https://b", Ok(1))],
            PoolConfig::default(),
        );
        assert!(!pool.evaluate_switch("https://b", "timeout"));
        assert_eq!(pool.active_url(), "https://a");
    }

    #[test]
    fn non_transient_error_switches_only_past_ceiling() {
        let pool = pool_of(
            &[mock("https://a", Ok(1)), mock("https://b", Ok(1))],
            PoolConfig::default(),
        );
        assert!(!pool.evaluate_switch("https://a", "execution reverted"));

        for _ in 0..3 {
            pool.endpoints[0].record_failure("execution reverted", false);
        }
        assert!(pool.evaluate_switch("https://a", "execution reverted"));
        assert_eq!(pool.active_url(), "https://b");
    }

    #[tokio::test]
    async fn failed_probe_of_active_endpoint_triggers_switch() {
        let pool = pool_of(
            &[mock("https://a", Err("error sending request")), mock("https://b", Ok(7))],
            PoolConfig::default(),
        );
        pool.probe_all().await;
        assert_eq!(pool.active_url(), "https://b");
    }

    #[tokio::test]
    async fn failed_request_switches_and_is_returned() {
        let a = mock("https://a", Err("HTTP 429: Too Many Requests"));
        let b = mock("https://b", Ok(42));
        let pool = pool_of(&[a.clone(), b.clone()], PoolConfig::default());

        let err = pool.request("eth_blockNumber", vec![]).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(pool.active_url(), "https://b");
        assert_eq!(pool.health_summary()[0].consecutive_failures, 1);

        let value = pool.request("eth_blockNumber", vec![]).await.unwrap();
        assert_eq!(quantity_from_value(&value).unwrap(), 42);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prober_runs_until_shutdown() {
        let a = mock("https://a", Err("connection refused"));
        let b = mock("https://b", Ok(5));
        let pool = Arc::new(pool_of(
            &[a.clone(), b],
            PoolConfig {
                probe_interval: Duration::from_millis(10),
                ..PoolConfig::default()
            },
        ));
        let (tx, rx) = watch::channel(false);
        let handle = Arc::clone(&pool).spawn_prober(rx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.active_url(), "https://b");
        assert!(a.calls.load(Ordering::SeqCst) >= 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
