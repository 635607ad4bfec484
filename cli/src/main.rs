//! BurnIndex CLI: runs the multi-chain burn/position indexer.
//!
//! # Commands
//! ```text
//! burnindex run     --config chains.yaml     (default command)
//! burnindex status  [--json]
//! burnindex chains  --config chains.yaml [--json]
//! burnindex info
//! ```

use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use burnindex_core::config::validate_descriptor;
use burnindex_core::{ChainStatus, ConfigFile, IndexStore};
use burnindex_evm::IndexerManager;
use burnindex_storage::{InMemoryStorage, PostgresOptions, PostgresStorage};

mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "burnindex",
    about = "Multi-chain burn and position event indexer",
    long_about = "
BurnIndex: follows token burns, swap-and-burns, liquidity adds and locked
positions on several EVM chains and writes them to PostgreSQL.

ENVIRONMENT VARIABLES:
  DATABASE_URL              PostgreSQL connection string (in-memory store if unset)
  DATABASE_MAX_CONNECTIONS  Pool size (default 10)
  ENABLED_CHAINS            Comma list of chain ids or names to index
  RPC_URL_<NAME>            Single RPC endpoint for chain <NAME>
  RPC_URLS_<NAME>           Comma list of RPC endpoints for chain <NAME>
  POLL_INTERVAL_MS, BATCH_SIZE, MAX_RETRIES, RETRY_DELAY_MS, MAX_BACKOFF_MS,
  REORG_DEPTH, HEALTH_INTERVAL_SECS, PROBE_INTERVAL_SECS
  LOG_LEVEL                 e.g. info,burnindex_rpc=debug
  LOG_JSON                  true for JSON log lines
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every enabled chain until SIGINT/SIGTERM
    Run {
        /// Chain configuration file
        #[arg(short, long, default_value = "chains.yaml")]
        config: String,
    },

    /// Print the status of every chain known to the database
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the chains that would be indexed, after env overrides
    Chains {
        #[arg(short, long, default_value = "chains.yaml")]
        config: String,
        #[arg(long)]
        json: bool,
    },

    /// Show build information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(env_var);
    init_tracing(&log_config);

    match cli.command.unwrap_or(Commands::Run {
        config: "chains.yaml".into(),
    }) {
        Commands::Run { config } => cmd_run(&config).await,
        Commands::Status { json } => cmd_status(json).await,
        Commands::Chains { config, json } => cmd_chains(&config, json),
        Commands::Info => cmd_info(),
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn load_config(path: &str) -> Result<ConfigFile> {
    let mut config = ConfigFile::load(path).with_context(|| format!("loading {path}"))?;
    config.apply_env(env_var);
    Ok(config)
}

fn postgres_options() -> Result<PostgresOptions> {
    let mut opts = PostgresOptions::default();
    if let Some(max) = env_var("DATABASE_MAX_CONNECTIONS") {
        opts.max_connections = max
            .trim()
            .parse()
            .with_context(|| format!("DATABASE_MAX_CONNECTIONS={max}"))?;
    }
    Ok(opts)
}

async fn open_store() -> Result<Arc<dyn IndexStore>> {
    match env_var("DATABASE_URL") {
        Some(url) => {
            let store = PostgresStorage::connect_with_options(&url, postgres_options()?)
                .await
                .context("connecting to PostgreSQL")?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, indexing into memory (nothing is persisted)");
            Ok(Arc::new(InMemoryStorage::new()))
        }
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    if config.chains.is_empty() {
        bail!("no chains configured in {config_path}");
    }
    let store = open_store().await?;

    let manager = IndexerManager::new(config.engine.clone(), config.chains.clone(), store);
    run_until(manager, shutdown_signal()).await
}

/// Start every chain, then index until `signal` resolves.
///
/// `signal` is polled from the beginning, so a signal that arrives while
/// start-up is still retrying RPC calls abandons the start and shuts down.
async fn run_until(mut manager: IndexerManager, signal: impl Future<Output = ()>) -> Result<()> {
    tokio::pin!(signal);

    let started = tokio::select! {
        report = manager.start() => Some(report),
        _ = &mut signal => None,
    };
    let Some(report) = started else {
        tracing::info!("shutdown signal received during start-up");
        manager.shutdown().await;
        return Ok(());
    };
    for (chain_id, error) in &report.failed {
        tracing::error!(chain = chain_id, error = %error, "chain not started");
    }
    if report.started.is_empty() {
        manager.shutdown().await;
        bail!("no chain could be started");
    }
    tracing::info!(chains = ?report.started, "indexing; press Ctrl-C to stop");

    signal.await;
    tracing::info!("shutdown signal received");
    manager.shutdown().await;
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn cmd_status(as_json: bool) -> Result<()> {
    let Some(url) = env_var("DATABASE_URL") else {
        bail!("status needs DATABASE_URL");
    };
    let store = PostgresStorage::connect_with_options(&url, postgres_options()?)
        .await
        .context("connecting to PostgreSQL")?;

    let mut statuses = Vec::new();
    for chain_id in store.chain_ids().await? {
        if let Some(status) = store.chain_status(chain_id).await? {
            statuses.push(status);
        }
    }
    store.close().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }
    if statuses.is_empty() {
        println!("No chains indexed yet.");
        return Ok(());
    }
    println!(
        "{:<8} {:<14} {:<9} {:>12} {:>10} {:>9}  {}",
        "CHAIN", "NAME", "HEALTH", "WATERMARK", "BEHIND", "LATENCY", "ENDPOINT"
    );
    for status in &statuses {
        print_status(status);
    }
    Ok(())
}

fn print_status(s: &ChainStatus) {
    let dash = || "-".to_string();
    println!(
        "{:<8} {:<14} {:<9} {:>12} {:>10} {:>9}  {}",
        s.chain_id,
        s.name,
        if s.healthy { "ok" } else { "DOWN" },
        s.watermark.map(|w| w.to_string()).unwrap_or_else(dash),
        s.blocks_behind.map(|b| b.to_string()).unwrap_or_else(dash),
        s.rpc_latency_ms.map(|ms| format!("{ms}ms")).unwrap_or_else(dash),
        s.active_endpoint.clone().unwrap_or_else(dash),
    );
    if let Some(error) = &s.last_error {
        println!("         last error: {error}");
    }
}

fn cmd_chains(config_path: &str, as_json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let chains = config.enabled_chains();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&chains)?);
        return Ok(());
    }

    println!(
        "{} of {} configured chains enabled",
        chains.len(),
        config.chains.len()
    );
    for chain in &chains {
        let verdict = match validate_descriptor(chain) {
            Ok(()) => "valid".to_string(),
            Err(e) => format!("INVALID: {e}"),
        };
        println!();
        println!("{} [{verdict}]", chain.label());
        println!("  start block:  {}", chain.start_block);
        println!(
            "  batch size:   {}",
            chain.effective_batch_size(config.engine.batch_size)
        );
        println!("  token:        {}", chain.contracts.token);
        println!("  burn:         {}", chain.contracts.burn_contract);
        println!("  position:     {}", chain.contracts.position_contract);
        for (i, endpoint) in chain.endpoints.iter().enumerate() {
            println!("  endpoint {i}:   {endpoint}");
        }
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    println!("BurnIndex v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Indexed events:");
    println!("  Transfer(from, 0x0, amount)       token burns");
    println!("  SwapAndBurn                       burn contract");
    println!("  LiquidityAdded                    burn contract");
    println!("  PositionCreated / PositionClaimed position NFT contract");
    println!();
    println!("Engine:");
    println!("  RPC failover        lowest-latency healthy endpoint, debounced");
    println!("  Retry               exponential backoff, same batch until it lands");
    println!("  Reorg safety        start-up rewind of the last N blocks");
    println!("  Storage             PostgreSQL (sqlx) or in-memory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use burnindex_core::types::{ChainDescriptor, ContractSet};
    use burnindex_core::EngineConfig;

    fn unreachable_chain() -> ChainDescriptor {
        ChainDescriptor {
            chain_id: 56,
            name: "bsc".into(),
            endpoints: vec!["http://127.0.0.1:1".into()],
            contracts: ContractSet {
                token: "0x1111111111111111111111111111111111111111".into(),
                burn_contract: "0x2222222222222222222222222222222222222222".into(),
                position_contract: "0x3333333333333333333333333333333333333333".into(),
            },
            start_block: 1,
            batch_size: None,
            gas_price_hint: None,
        }
    }

    #[tokio::test]
    async fn signal_during_start_up_shuts_down() {
        let engine = EngineConfig {
            retry_delay_ms: 600_000,
            max_backoff_ms: 600_000,
            request_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let store = Arc::new(InMemoryStorage::new());
        let manager = IndexerManager::new(engine, vec![unreachable_chain()], store.clone());

        tokio::time::timeout(
            Duration::from_secs(5),
            run_until(manager, std::future::ready(())),
        )
        .await
        .expect("start-up should be abandoned")
        .unwrap();
        assert!(store.is_closed());
    }
}
