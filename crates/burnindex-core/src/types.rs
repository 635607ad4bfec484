//! Shared types for the indexing pipeline.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── ChainDescriptor ──────────────────────────────────────────────────────────

/// The three contracts watched on every chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSet {
    /// Fungible token; burns are `Transfer(from, 0x0, amount)` logs.
    pub token: String,
    /// Burn/mint contract emitting `SwapAndBurn` and `LiquidityAdded`.
    pub burn_contract: String,
    /// Position NFT contract emitting `PositionCreated` and `PositionClaimed`.
    pub position_contract: String,
}

impl ContractSet {
    /// Iterate over `(role, address)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("token", self.token.as_str()),
            ("burn_contract", self.burn_contract.as_str()),
            ("position_contract", self.position_contract.as_str()),
        ]
        .into_iter()
    }
}

/// Static, immutable description of one indexed chain.
///
/// Built once from configuration and handed to every component explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    /// EVM chain id (e.g. `56` for BNB Smart Chain).
    pub chain_id: u64,
    /// Display name, also used for env overrides (`RPC_URL_<NAME>`).
    pub name: String,
    /// Candidate JSON-RPC endpoints, in preference order.
    pub endpoints: Vec<String>,
    pub contracts: ContractSet,
    /// First block that can contain events of interest.
    pub start_block: u64,
    /// Per-chain override of the global batch size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u64>,
    /// Gas price hint in gwei, surfaced for downstream consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price_hint: Option<u64>,
}

impl ChainDescriptor {
    /// Batch size for this chain, falling back to `default`.
    pub fn effective_batch_size(&self, default: u64) -> u64 {
        self.batch_size.unwrap_or(default).max(1)
    }

    /// Short label used in log fields.
    pub fn label(&self) -> String {
        format!("{}({})", self.name, self.chain_id)
    }
}

/// Returns `true` if `address` is a `0x`-prefixed 20-byte hex string.
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive block range processed as one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks in the range.
    pub fn len(&self) -> u64 {
        self.to.saturating_sub(self.from) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

// ─── Event records ────────────────────────────────────────────────────────────

/// The closed set of event kinds the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Burn,
    SwapAndBurn,
    LiquidityAdded,
    PositionCreated,
    PositionClaimed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Burn,
        EventKind::SwapAndBurn,
        EventKind::LiquidityAdded,
        EventKind::PositionCreated,
        EventKind::PositionClaimed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Burn => "Burn",
            Self::SwapAndBurn => "SwapAndBurn",
            Self::LiquidityAdded => "LiquidityAdded",
            Self::PositionCreated => "PositionCreated",
            Self::PositionClaimed => "PositionClaimed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub chain_id: u64,
    /// Transaction hash (`0x…`), the natural key within a variant's table.
    pub tx_hash: String,
    pub log_index: u32,
    pub block_number: u64,
    /// Block timestamp, seconds since the Unix epoch.
    pub block_timestamp: i64,
}

/// A decoded on-chain event. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventRecord {
    Burn {
        meta: EventMeta,
        from: String,
        amount: U256,
    },
    SwapAndBurn {
        meta: EventMeta,
        user: String,
        eth_amount: U256,
        tokens_burned: U256,
    },
    LiquidityAdded {
        meta: EventMeta,
        provider: String,
        token_amount: U256,
        eth_amount: U256,
        liquidity: U256,
    },
    PositionCreated {
        meta: EventMeta,
        token_id: U256,
        owner: String,
        amount: U256,
        /// Lock duration in seconds.
        lock_duration: u64,
    },
    PositionClaimed {
        meta: EventMeta,
        token_id: U256,
        owner: String,
        amount: U256,
    },
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Burn { .. } => EventKind::Burn,
            Self::SwapAndBurn { .. } => EventKind::SwapAndBurn,
            Self::LiquidityAdded { .. } => EventKind::LiquidityAdded,
            Self::PositionCreated { .. } => EventKind::PositionCreated,
            Self::PositionClaimed { .. } => EventKind::PositionClaimed,
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::Burn { meta, .. }
            | Self::SwapAndBurn { meta, .. }
            | Self::LiquidityAdded { meta, .. }
            | Self::PositionCreated { meta, .. }
            | Self::PositionClaimed { meta, .. } => meta,
        }
    }

    /// The address the record is attributed to in per-user totals.
    pub fn participant(&self) -> &str {
        match self {
            Self::Burn { from, .. } => from,
            Self::SwapAndBurn { user, .. } => user,
            Self::LiquidityAdded { provider, .. } => provider,
            Self::PositionCreated { owner, .. } | Self::PositionClaimed { owner, .. } => owner,
        }
    }

    /// Unique key of the record inside its variant's table.
    pub fn key(&self) -> (EventKind, u64, &str) {
        let meta = self.meta();
        (self.kind(), meta.chain_id, meta.tx_hash.as_str())
    }
}

// ─── Batch history ────────────────────────────────────────────────────────────

/// Per-variant record counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub burns: u32,
    pub swap_burns: u32,
    pub liquidity_adds: u32,
    pub positions_created: u32,
    pub positions_claimed: u32,
}

impl BatchCounts {
    /// Count the records of a slice by variant.
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.kind());
        }
        counts
    }

    pub fn add(&mut self, kind: EventKind) {
        match kind {
            EventKind::Burn => self.burns += 1,
            EventKind::SwapAndBurn => self.swap_burns += 1,
            EventKind::LiquidityAdded => self.liquidity_adds += 1,
            EventKind::PositionCreated => self.positions_created += 1,
            EventKind::PositionClaimed => self.positions_claimed += 1,
        }
    }

    pub fn get(&self, kind: EventKind) -> u32 {
        match kind {
            EventKind::Burn => self.burns,
            EventKind::SwapAndBurn => self.swap_burns,
            EventKind::LiquidityAdded => self.liquidity_adds,
            EventKind::PositionCreated => self.positions_created,
            EventKind::PositionClaimed => self.positions_claimed,
        }
    }

    pub fn total(&self) -> u32 {
        self.burns
            + self.swap_burns
            + self.liquidity_adds
            + self.positions_created
            + self.positions_claimed
    }
}

/// Append-only history row, written once per persisted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingBatchRecord {
    pub chain_id: u64,
    pub range: BlockRange,
    /// Records produced by decoding (before duplicate suppression).
    pub counts: BatchCounts,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

// ─── Health & status ──────────────────────────────────────────────────────────

/// Latest health observation for a chain; one row per chain, overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHealthSnapshot {
    pub chain_id: u64,
    pub healthy: bool,
    pub error: Option<String>,
    pub blocks_behind: Option<u64>,
    pub rpc_latency_ms: Option<u64>,
    pub active_endpoint: String,
    pub checked_at: DateTime<Utc>,
}

/// Everything the external status surface reports for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub chain_id: u64,
    pub name: String,
    pub healthy: bool,
    pub blocks_behind: Option<u64>,
    pub last_error: Option<String>,
    pub rpc_latency_ms: Option<u64>,
    pub active_endpoint: Option<String>,
    pub watermark: Option<u64>,
    pub last_indexed_at: Option<DateTime<Utc>>,
}
