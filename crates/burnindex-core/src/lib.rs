//! burnindex-core: foundation for the multi-chain burn/position indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexerManager
//!   ├── EndpointPool     (per chain: failover across RPC endpoints)
//!   ├── ChainIndexer     (per chain: batch windowing, backoff, start-up rewind)
//!   ├── HealthMonitor    (all chains: height, lag, latency snapshots)
//!   └── IndexStore       (shared: PostgreSQL or in-memory)
//! ```
//!
//! This crate holds what every other crate agrees on: descriptors, event
//! records, errors, configuration, the cursor/backoff arithmetic and the
//! storage trait.

pub mod aggregates;
pub mod backoff;
pub mod config;
pub mod cursor;
pub mod error;
pub mod store;
pub mod types;

pub use aggregates::{AggregateDelta, ChainTotals, UserTotals};
pub use backoff::{Backoff, BackoffConfig};
pub use config::{ConfigFile, EngineConfig};
pub use cursor::Cursor;
pub use error::{is_transient_message, FaultKind, IndexerError};
pub use store::{BatchCommit, CommitOutcome, IndexStore};
pub use types::{
    BatchCounts, BlockRange, ChainDescriptor, ChainHealthSnapshot, ChainStatus, ContractSet,
    EventKind, EventMeta, EventRecord, IndexingBatchRecord,
};

pub use alloy_primitives::U256;
