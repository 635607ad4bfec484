#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use burnindex_core::error::IndexerError;
use burnindex_core::types::{BlockRange, ChainDescriptor, ContractSet};
use burnindex_core::EngineConfig;
use burnindex_evm::events::{topic0, ZERO_TOPIC};
use burnindex_evm::{EvmRpcClient, LogFilter, RawLog};
use burnindex_core::types::EventKind;
use burnindex_rpc::request::{to_quantity, JsonRpcRequest, JsonRpcResponse};
use burnindex_rpc::{RpcTransport, TransportError};

pub const TOKEN: &str = "0x1111111111111111111111111111111111111111";
pub const BURN: &str = "0x2222222222222222222222222222222222222222";
pub const POSITION: &str = "0x3333333333333333333333333333333333333333";
pub const ALICE: &str = "0xa11ce00000000000000000000000000000000001";

pub fn descriptor(chain_id: u64, name: &str, start_block: u64) -> ChainDescriptor {
    ChainDescriptor {
        chain_id,
        name: name.into(),
        endpoints: vec![format!("https://{name}-a.example"), format!("https://{name}-b.example")],
        contracts: ContractSet {
            token: TOKEN.into(),
            burn_contract: BURN.into(),
            position_contract: POSITION.into(),
        },
        start_block,
        batch_size: Some(100),
        gas_price_hint: None,
    }
}

pub fn fast_engine() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 20,
        retry_delay_ms: 5,
        max_backoff_ms: 40,
        min_switch_interval_ms: 0,
        health_interval_secs: 3_600,
        probe_interval_secs: 3_600,
        ..EngineConfig::default()
    }
}

pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn address_topic(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x"))
}

fn word(n: u64) -> String {
    format!("{n:064x}")
}

fn raw_log(address: &str, topics: Vec<String>, data: String, tx: &str, block: u64, index: u32) -> RawLog {
    RawLog {
        address: address.into(),
        topics,
        data,
        block_number: to_quantity(block),
        block_hash: None,
        tx_hash: tx.into(),
        log_index: to_quantity(index as u64),
        removed: None,
    }
}

pub fn burn_log(tx: &str, block: u64, from: &str, amount: u64) -> RawLog {
    raw_log(
        TOKEN,
        vec![topic0(EventKind::Burn).into(), address_topic(from), ZERO_TOPIC.into()],
        format!("0x{}", word(amount)),
        tx,
        block,
        0,
    )
}

pub fn swap_burn_log(tx: &str, block: u64, user: &str, eth: u64, tokens: u64) -> RawLog {
    raw_log(
        BURN,
        vec![topic0(EventKind::SwapAndBurn).into(), address_topic(user)],
        format!("0x{}{}", word(eth), word(tokens)),
        tx,
        block,
        1,
    )
}

pub fn position_created_log(tx: &str, block: u64, token_id: u64, owner: &str, amount: u64) -> RawLog {
    raw_log(
        POSITION,
        vec![
            topic0(EventKind::PositionCreated).into(),
            format!("0x{}", word(token_id)),
            address_topic(owner),
        ],
        format!("0x{}{}", word(amount), word(30 * 86_400)),
        tx,
        block,
        2,
    )
}

// ─── MockChain: scripted EvmRpcClient ─────────────────────────────────────────

pub struct MockChain {
    pub chain_id: u64,
    pub height: AtomicU64,
    logs: Mutex<Vec<RawLog>>,
    log_failures: Mutex<VecDeque<String>>,
    height_failure: Mutex<Option<String>>,
    requested: Mutex<Vec<BlockRange>>,
    reported: Mutex<Vec<(String, String)>>,
    pub timestamp_calls: AtomicU32,
    pub height_calls: AtomicU32,
}

impl MockChain {
    pub fn new(chain_id: u64, height: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            height: AtomicU64::new(height),
            logs: Mutex::new(Vec::new()),
            log_failures: Mutex::new(VecDeque::new()),
            height_failure: Mutex::new(None),
            requested: Mutex::new(Vec::new()),
            reported: Mutex::new(Vec::new()),
            timestamp_calls: AtomicU32::new(0),
            height_calls: AtomicU32::new(0),
        })
    }

    pub fn with_logs(self: Arc<Self>, logs: Vec<RawLog>) -> Arc<Self> {
        self.logs.lock().unwrap().extend(logs);
        self
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn fail_logs(&self, times: usize, message: &str) {
        let mut failures = self.log_failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(message.to_string());
        }
    }

    pub fn fail_height(&self, message: Option<&str>) {
        *self.height_failure.lock().unwrap() = message.map(str::to_string);
    }

    /// Ranges passed to `get_logs`, with consecutive repeats collapsed.
    pub fn requested_ranges(&self) -> Vec<BlockRange> {
        let mut ranges = self.requested.lock().unwrap().clone();
        ranges.dedup();
        ranges
    }

    pub fn get_logs_calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn pending_log_failures(&self) -> usize {
        self.log_failures.lock().unwrap().len()
    }

    pub fn reported_failures(&self) -> Vec<(String, String)> {
        self.reported.lock().unwrap().clone()
    }

    pub fn url(&self) -> String {
        format!("mock://{}", self.chain_id)
    }
}

#[async_trait]
impl EvmRpcClient for MockChain {
    async fn block_number(&self) -> Result<u64, IndexerError> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.height_failure.lock().unwrap().clone() {
            return Err(IndexerError::Rpc(msg));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn chain_id(&self) -> Result<u64, IndexerError> {
        Ok(self.chain_id)
    }

    async fn block_timestamp(&self, number: u64) -> Result<i64, IndexerError> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        Ok(1_700_000_000 + number as i64)
    }

    async fn get_logs(
        &self,
        range: BlockRange,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, IndexerError> {
        self.requested.lock().unwrap().push(range);
        if let Some(msg) = self.log_failures.lock().unwrap().pop_front() {
            return Err(IndexerError::Rpc(msg));
        }
        let accepted = filter.topics.first().cloned().unwrap_or_default();
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.address.eq_ignore_ascii_case(&filter.address))
            .filter(|log| {
                let block = log.block_number_u64().unwrap();
                block >= range.from && block <= range.to
            })
            .filter(|log| accepted.is_empty() || accepted.contains(&log.topics[0]))
            .cloned()
            .collect())
    }

    fn active_endpoint(&self) -> String {
        self.url()
    }

    fn report_failure(&self, url: &str, error: &str) {
        self.reported
            .lock()
            .unwrap()
            .push((url.to_string(), error.to_string()));
    }
}

// ─── MockNode: JSON-RPC level transport ───────────────────────────────────────

/// Answers the handful of methods the engine uses, or fails every call.
pub struct MockNode {
    url: String,
    chain_id: u64,
    height: u64,
    failure: Option<String>,
    pub calls: AtomicU32,
}

impl MockNode {
    pub fn healthy(url: &str, chain_id: u64, height: u64) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            chain_id,
            height,
            failure: None,
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing(url: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            chain_id: 0,
            height: 0,
            failure: Some(message.into()),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl RpcTransport for MockNode {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.failure {
            return Err(TransportError::Http(msg.clone()));
        }
        let result: Value = match req.method.as_str() {
            "eth_chainId" => json!(to_quantity(self.chain_id)),
            "eth_blockNumber" => json!(to_quantity(self.height)),
            "eth_getLogs" => json!([]),
            "eth_getBlockByNumber" => json!({ "timestamp": to_quantity(1_700_000_000) }),
            other => return Err(TransportError::Other(format!("unexpected method {other}"))),
        };
        Ok(JsonRpcResponse::ok(1, result))
    }

    fn url(&self) -> &str {
        &self.url
    }
}
