//! burnindex-evm: EVM-specific indexing engine.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use burnindex_core::ConfigFile;
//! use burnindex_evm::IndexerManager;
//! use burnindex_storage::InMemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigFile::load("chains.yaml")?;
//! let store = Arc::new(InMemoryStorage::new());
//! let mut manager = IndexerManager::new(config.engine.clone(), config.chains.clone(), store);
//!
//! let report = manager.start().await;
//! println!("started {:?}, failed {}", report.started, report.failed.len());
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod fetcher;
pub mod health;
pub mod indexer;
pub mod manager;
pub mod timestamps;

pub use events::EventClassifier;
pub use fetcher::{EvmRpcClient, LogFilter, RawLog};
pub use health::{HealthMonitor, MonitoredChain};
pub use indexer::{ChainIndexer, IndexerState, StopHandle};
pub use manager::{http_pool_factory, IndexerManager, PoolFactory, StartReport};
pub use timestamps::TimestampCache;
