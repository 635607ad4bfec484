//! PostgreSQL storage backend.
//!
//! One `PgPool` is shared by every chain; rows are partitioned by `chain_id`.
//! Each batch commit and each health upsert runs in its own transaction.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! burnindex-storage = { version = "0.2", features = ["postgres"] }
//! ```
//!
//! # Schema
//! Created on connect (`CREATE TABLE IF NOT EXISTS`):
//! - `chains`: descriptor rows
//! - `indexer_state`: watermark + last successful index time per chain
//! - `burns`, `swap_burns`, `liquidity_adds`, `positions_created`,
//!   `positions_claimed`: one table per event variant, `UNIQUE (chain_id, tx_hash)`
//! - `indexing_batches`: append-only batch history
//! - `chain_totals`, `user_totals`: derived aggregates
//! - `chain_health`: one health snapshot per chain
//!
//! Token amounts are `NUMERIC(78, 0)` and are bound as decimal strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info};

use burnindex_core::aggregates::AggregateDelta;
use burnindex_core::error::IndexerError;
use burnindex_core::store::{BatchCommit, CommitOutcome, IndexStore};
use burnindex_core::types::{
    ChainDescriptor, ChainHealthSnapshot, ChainStatus, EventRecord, IndexingBatchRecord,
};

// ─── Connection options ────────────────────────────────────────────────────────

/// Connection options for the Postgres storage backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS chains (
        chain_id          BIGINT      PRIMARY KEY,
        name              TEXT        NOT NULL,
        token_address     TEXT        NOT NULL,
        burn_contract     TEXT        NOT NULL,
        position_contract TEXT        NOT NULL,
        start_block       BIGINT      NOT NULL,
        gas_price_hint    BIGINT,
        created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS indexer_state (
        chain_id           BIGINT      PRIMARY KEY,
        last_indexed_block BIGINT      NOT NULL,
        last_indexed_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS burns (
        id              BIGSERIAL   PRIMARY KEY,
        chain_id        BIGINT      NOT NULL,
        tx_hash         TEXT        NOT NULL,
        log_index       INTEGER     NOT NULL,
        block_number    BIGINT      NOT NULL,
        block_timestamp TIMESTAMPTZ,
        from_address    TEXT        NOT NULL,
        amount          NUMERIC(78, 0) NOT NULL,
        UNIQUE (chain_id, tx_hash)
    )",
    "CREATE TABLE IF NOT EXISTS swap_burns (
        id              BIGSERIAL   PRIMARY KEY,
        chain_id        BIGINT      NOT NULL,
        tx_hash         TEXT        NOT NULL,
        log_index       INTEGER     NOT NULL,
        block_number    BIGINT      NOT NULL,
        block_timestamp TIMESTAMPTZ,
        user_address    TEXT        NOT NULL,
        eth_amount      NUMERIC(78, 0) NOT NULL,
        tokens_burned   NUMERIC(78, 0) NOT NULL,
        UNIQUE (chain_id, tx_hash)
    )",
    "CREATE TABLE IF NOT EXISTS liquidity_adds (
        id               BIGSERIAL   PRIMARY KEY,
        chain_id         BIGINT      NOT NULL,
        tx_hash          TEXT        NOT NULL,
        log_index        INTEGER     NOT NULL,
        block_number     BIGINT      NOT NULL,
        block_timestamp  TIMESTAMPTZ,
        provider_address TEXT        NOT NULL,
        token_amount     NUMERIC(78, 0) NOT NULL,
        eth_amount       NUMERIC(78, 0) NOT NULL,
        liquidity        NUMERIC(78, 0) NOT NULL,
        UNIQUE (chain_id, tx_hash)
    )",
    "CREATE TABLE IF NOT EXISTS positions_created (
        id              BIGSERIAL   PRIMARY KEY,
        chain_id        BIGINT      NOT NULL,
        tx_hash         TEXT        NOT NULL,
        log_index       INTEGER     NOT NULL,
        block_number    BIGINT      NOT NULL,
        block_timestamp TIMESTAMPTZ,
        token_id        NUMERIC(78, 0) NOT NULL,
        owner_address   TEXT        NOT NULL,
        amount          NUMERIC(78, 0) NOT NULL,
        lock_duration   BIGINT      NOT NULL,
        UNIQUE (chain_id, tx_hash)
    )",
    "CREATE TABLE IF NOT EXISTS positions_claimed (
        id              BIGSERIAL   PRIMARY KEY,
        chain_id        BIGINT      NOT NULL,
        tx_hash         TEXT        NOT NULL,
        log_index       INTEGER     NOT NULL,
        block_number    BIGINT      NOT NULL,
        block_timestamp TIMESTAMPTZ,
        token_id        NUMERIC(78, 0) NOT NULL,
        owner_address   TEXT        NOT NULL,
        amount          NUMERIC(78, 0) NOT NULL,
        UNIQUE (chain_id, tx_hash)
    )",
    "CREATE TABLE IF NOT EXISTS indexing_batches (
        id                BIGSERIAL   PRIMARY KEY,
        chain_id          BIGINT      NOT NULL,
        start_block       BIGINT      NOT NULL,
        end_block         BIGINT      NOT NULL,
        burns             INTEGER     NOT NULL,
        swap_burns        INTEGER     NOT NULL,
        liquidity_adds    INTEGER     NOT NULL,
        positions_created INTEGER     NOT NULL,
        positions_claimed INTEGER     NOT NULL,
        duration_ms       BIGINT      NOT NULL,
        recorded_at       TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chain_totals (
        chain_id               BIGINT         PRIMARY KEY,
        total_burned           NUMERIC(78, 0) NOT NULL DEFAULT 0,
        total_swap_burned      NUMERIC(78, 0) NOT NULL DEFAULT 0,
        total_eth_swapped      NUMERIC(78, 0) NOT NULL DEFAULT 0,
        total_liquidity_tokens NUMERIC(78, 0) NOT NULL DEFAULT 0,
        total_liquidity_eth    NUMERIC(78, 0) NOT NULL DEFAULT 0,
        total_locked           NUMERIC(78, 0) NOT NULL DEFAULT 0,
        total_claimed          NUMERIC(78, 0) NOT NULL DEFAULT 0,
        positions_created      BIGINT         NOT NULL DEFAULT 0,
        positions_claimed      BIGINT         NOT NULL DEFAULT 0,
        updated_at             TIMESTAMPTZ    NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS user_totals (
        chain_id    BIGINT         NOT NULL,
        address     TEXT           NOT NULL,
        burned      NUMERIC(78, 0) NOT NULL DEFAULT 0,
        locked      NUMERIC(78, 0) NOT NULL DEFAULT 0,
        claimed     NUMERIC(78, 0) NOT NULL DEFAULT 0,
        event_count BIGINT         NOT NULL DEFAULT 0,
        updated_at  TIMESTAMPTZ    NOT NULL DEFAULT NOW(),
        PRIMARY KEY (chain_id, address)
    )",
    "CREATE TABLE IF NOT EXISTS chain_health (
        chain_id        BIGINT      PRIMARY KEY,
        healthy         BOOLEAN     NOT NULL,
        error           TEXT,
        blocks_behind   BIGINT,
        rpc_latency_ms  BIGINT,
        active_endpoint TEXT        NOT NULL,
        checked_at      TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_burns_chain_block
        ON burns(chain_id, block_number DESC)",
    "CREATE INDEX IF NOT EXISTS idx_swap_burns_chain_block
        ON swap_burns(chain_id, block_number DESC)",
    "CREATE INDEX IF NOT EXISTS idx_positions_created_owner
        ON positions_created(chain_id, owner_address)",
    "CREATE INDEX IF NOT EXISTS idx_indexing_batches_chain
        ON indexing_batches(chain_id, recorded_at DESC)",
];

// ─── PostgresStorage ─────────────────────────────────────────────────────────

/// PostgreSQL-backed [`IndexStore`].
///
/// Cheaply cloneable; wraps a connection pool internally.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect with default options and initialize the schema.
    ///
    /// The URL format follows libpq convention:
    /// `postgresql://[user[:password]@][host][:port][/dbname]`
    pub async fn connect(database_url: &str) -> Result<Self, IndexerError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    /// Connect with custom pool options.
    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, IndexerError> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(opts.connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| IndexerError::Storage(format!("postgres connect: {e}")))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        info!(max_connections = opts.max_connections, "PostgresStorage connected and schema initialized");
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| IndexerError::Storage(format!("schema init failed: {e}")))?;
        }
        debug!("PostgresStorage schema initialized");
        Ok(())
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Every chain that has a descriptor row, for the status command.
    pub async fn chain_ids(&self) -> Result<Vec<u64>, IndexerError> {
        let rows = sqlx::query("SELECT chain_id FROM chains ORDER BY chain_id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows
            .iter()
            .map(|r| r.get::<i64, _>("chain_id") as u64)
            .collect())
    }

    /// Insert one record; returns `true` if it was new.
    async fn insert_record(
        conn: &mut PgConnection,
        record: &EventRecord,
    ) -> Result<bool, IndexerError> {
        let meta = record.meta();
        let chain_id = meta.chain_id as i64;
        let log_index = meta.log_index as i32;
        let block = meta.block_number as i64;
        let ts = timestamp(meta.block_timestamp);

        let result = match record {
            EventRecord::Burn { from, amount, .. } => {
                sqlx::query(
                    "INSERT INTO burns
                        (chain_id, tx_hash, log_index, block_number, block_timestamp, from_address, amount)
                     VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC)
                     ON CONFLICT (chain_id, tx_hash) DO NOTHING",
                )
                .bind(chain_id)
                .bind(&meta.tx_hash)
                .bind(log_index)
                .bind(block)
                .bind(ts)
                .bind(from)
                .bind(amount.to_string())
                .execute(&mut *conn)
                .await
            }
            EventRecord::SwapAndBurn {
                user,
                eth_amount,
                tokens_burned,
                ..
            } => {
                sqlx::query(
                    "INSERT INTO swap_burns
                        (chain_id, tx_hash, log_index, block_number, block_timestamp,
                         user_address, eth_amount, tokens_burned)
                     VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8::NUMERIC)
                     ON CONFLICT (chain_id, tx_hash) DO NOTHING",
                )
                .bind(chain_id)
                .bind(&meta.tx_hash)
                .bind(log_index)
                .bind(block)
                .bind(ts)
                .bind(user)
                .bind(eth_amount.to_string())
                .bind(tokens_burned.to_string())
                .execute(&mut *conn)
                .await
            }
            EventRecord::LiquidityAdded {
                provider,
                token_amount,
                eth_amount,
                liquidity,
                ..
            } => {
                sqlx::query(
                    "INSERT INTO liquidity_adds
                        (chain_id, tx_hash, log_index, block_number, block_timestamp,
                         provider_address, token_amount, eth_amount, liquidity)
                     VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8::NUMERIC, $9::NUMERIC)
                     ON CONFLICT (chain_id, tx_hash) DO NOTHING",
                )
                .bind(chain_id)
                .bind(&meta.tx_hash)
                .bind(log_index)
                .bind(block)
                .bind(ts)
                .bind(provider)
                .bind(token_amount.to_string())
                .bind(eth_amount.to_string())
                .bind(liquidity.to_string())
                .execute(&mut *conn)
                .await
            }
            EventRecord::PositionCreated {
                token_id,
                owner,
                amount,
                lock_duration,
                ..
            } => {
                sqlx::query(
                    "INSERT INTO positions_created
                        (chain_id, tx_hash, log_index, block_number, block_timestamp,
                         token_id, owner_address, amount, lock_duration)
                     VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, $7, $8::NUMERIC, $9)
                     ON CONFLICT (chain_id, tx_hash) DO NOTHING",
                )
                .bind(chain_id)
                .bind(&meta.tx_hash)
                .bind(log_index)
                .bind(block)
                .bind(ts)
                .bind(token_id.to_string())
                .bind(owner)
                .bind(amount.to_string())
                .bind(i64::try_from(*lock_duration).unwrap_or(i64::MAX))
                .execute(&mut *conn)
                .await
            }
            EventRecord::PositionClaimed {
                token_id,
                owner,
                amount,
                ..
            } => {
                sqlx::query(
                    "INSERT INTO positions_claimed
                        (chain_id, tx_hash, log_index, block_number, block_timestamp,
                         token_id, owner_address, amount)
                     VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, $7, $8::NUMERIC)
                     ON CONFLICT (chain_id, tx_hash) DO NOTHING",
                )
                .bind(chain_id)
                .bind(&meta.tx_hash)
                .bind(log_index)
                .bind(block)
                .bind(ts)
                .bind(token_id.to_string())
                .bind(owner)
                .bind(amount.to_string())
                .execute(&mut *conn)
                .await
            }
        };

        Ok(result.map_err(storage_err)?.rows_affected() == 1)
    }

    async fn apply_delta(
        conn: &mut PgConnection,
        chain_id: u64,
        delta: &AggregateDelta,
    ) -> Result<(), IndexerError> {
        let c = &delta.chain;
        sqlx::query(
            "INSERT INTO chain_totals
                (chain_id, total_burned, total_swap_burned, total_eth_swapped,
                 total_liquidity_tokens, total_liquidity_eth, total_locked, total_claimed,
                 positions_created, positions_claimed, updated_at)
             VALUES ($1, $2::NUMERIC, $3::NUMERIC, $4::NUMERIC, $5::NUMERIC, $6::NUMERIC,
                     $7::NUMERIC, $8::NUMERIC, $9, $10, NOW())
             ON CONFLICT (chain_id) DO UPDATE SET
                total_burned           = chain_totals.total_burned           + EXCLUDED.total_burned,
                total_swap_burned      = chain_totals.total_swap_burned      + EXCLUDED.total_swap_burned,
                total_eth_swapped      = chain_totals.total_eth_swapped      + EXCLUDED.total_eth_swapped,
                total_liquidity_tokens = chain_totals.total_liquidity_tokens + EXCLUDED.total_liquidity_tokens,
                total_liquidity_eth    = chain_totals.total_liquidity_eth    + EXCLUDED.total_liquidity_eth,
                total_locked           = chain_totals.total_locked           + EXCLUDED.total_locked,
                total_claimed          = chain_totals.total_claimed          + EXCLUDED.total_claimed,
                positions_created      = chain_totals.positions_created      + EXCLUDED.positions_created,
                positions_claimed      = chain_totals.positions_claimed      + EXCLUDED.positions_claimed,
                updated_at             = NOW()",
        )
        .bind(chain_id as i64)
        .bind(c.total_burned.to_string())
        .bind(c.total_swap_burned.to_string())
        .bind(c.total_eth_swapped.to_string())
        .bind(c.total_liquidity_tokens.to_string())
        .bind(c.total_liquidity_eth.to_string())
        .bind(c.total_locked.to_string())
        .bind(c.total_claimed.to_string())
        .bind(c.positions_created as i64)
        .bind(c.positions_claimed as i64)
        .execute(&mut *conn)
        .await
        .map_err(storage_err)?;

        for (address, user) in &delta.users {
            sqlx::query(
                "INSERT INTO user_totals
                    (chain_id, address, burned, locked, claimed, event_count, updated_at)
                 VALUES ($1, $2, $3::NUMERIC, $4::NUMERIC, $5::NUMERIC, $6, NOW())
                 ON CONFLICT (chain_id, address) DO UPDATE SET
                    burned      = user_totals.burned      + EXCLUDED.burned,
                    locked      = user_totals.locked      + EXCLUDED.locked,
                    claimed     = user_totals.claimed     + EXCLUDED.claimed,
                    event_count = user_totals.event_count + EXCLUDED.event_count,
                    updated_at  = NOW()",
            )
            .bind(chain_id as i64)
            .bind(address)
            .bind(user.burned.to_string())
            .bind(user.locked.to_string())
            .bind(user.claimed.to_string())
            .bind(user.event_count as i64)
            .execute(&mut *conn)
            .await
            .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn insert_batch(
        conn: &mut PgConnection,
        batch: &IndexingBatchRecord,
    ) -> Result<(), IndexerError> {
        let counts = &batch.counts;
        sqlx::query(
            "INSERT INTO indexing_batches
                (chain_id, start_block, end_block, burns, swap_burns, liquidity_adds,
                 positions_created, positions_claimed, duration_ms, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(batch.chain_id as i64)
        .bind(batch.range.from as i64)
        .bind(batch.range.to as i64)
        .bind(counts.burns as i32)
        .bind(counts.swap_burns as i32)
        .bind(counts.liquidity_adds as i32)
        .bind(counts.positions_created as i32)
        .bind(counts.positions_claimed as i32)
        .bind(batch.duration_ms as i64)
        .bind(batch.recorded_at)
        .execute(&mut *conn)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn write_watermark(
        conn: &mut PgConnection,
        chain_id: u64,
        block: u64,
    ) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO indexer_state (chain_id, last_indexed_block, last_indexed_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (chain_id) DO UPDATE SET
                last_indexed_block = GREATEST(indexer_state.last_indexed_block, EXCLUDED.last_indexed_block),
                last_indexed_at    = NOW()",
        )
        .bind(chain_id as i64)
        .bind(block as i64)
        .execute(&mut *conn)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

// ─── IndexStore impl ──────────────────────────────────────────────────────────

#[async_trait]
impl IndexStore for PostgresStorage {
    async fn ensure_chain(&self, chain: &ChainDescriptor) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO chains
                (chain_id, name, token_address, burn_contract, position_contract,
                 start_block, gas_price_hint)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (chain_id) DO UPDATE SET
                name              = EXCLUDED.name,
                token_address     = EXCLUDED.token_address,
                burn_contract     = EXCLUDED.burn_contract,
                position_contract = EXCLUDED.position_contract,
                start_block       = EXCLUDED.start_block,
                gas_price_hint    = EXCLUDED.gas_price_hint,
                updated_at        = NOW()",
        )
        .bind(chain.chain_id as i64)
        .bind(&chain.name)
        .bind(&chain.contracts.token)
        .bind(&chain.contracts.burn_contract)
        .bind(&chain.contracts.position_contract)
        .bind(chain.start_block as i64)
        .bind(chain.gas_price_hint.map(|g| g as i64))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(chain = %chain.label(), "chain row ensured");
        Ok(())
    }

    async fn load_watermark(&self, chain_id: u64) -> Result<Option<u64>, IndexerError> {
        let row = sqlx::query(
            "SELECT last_indexed_block FROM indexer_state WHERE chain_id = $1",
        )
        .bind(chain_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| r.get::<i64, _>("last_indexed_block") as u64))
    }

    async fn save_watermark(&self, chain_id: u64, block: u64) -> Result<(), IndexerError> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        Self::write_watermark(&mut *conn, chain_id, block).await
    }

    async fn commit_batch(&self, commit: BatchCommit) -> Result<CommitOutcome, IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let mut outcome = CommitOutcome::default();
        let mut delta = AggregateDelta::default();
        for record in &commit.records {
            if Self::insert_record(&mut *tx, record).await? {
                outcome.inserted.add(record.kind());
                delta.add(record);
            } else {
                outcome.duplicates += 1;
            }
        }

        if !delta.is_empty() {
            Self::apply_delta(&mut *tx, commit.chain_id, &delta).await?;
        }
        Self::insert_batch(&mut *tx, &commit.batch).await?;
        Self::write_watermark(&mut *tx, commit.chain_id, commit.watermark).await?;

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(format!("commit batch: {e}")))?;

        debug!(
            chain = commit.chain_id,
            inserted = outcome.inserted.total(),
            duplicates = outcome.duplicates,
            watermark = commit.watermark,
            "batch committed"
        );
        Ok(outcome)
    }

    async fn upsert_health(&self, snapshot: &ChainHealthSnapshot) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO chain_health
                (chain_id, healthy, error, blocks_behind, rpc_latency_ms, active_endpoint, checked_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (chain_id) DO UPDATE SET
                healthy         = EXCLUDED.healthy,
                error           = EXCLUDED.error,
                blocks_behind   = EXCLUDED.blocks_behind,
                rpc_latency_ms  = EXCLUDED.rpc_latency_ms,
                active_endpoint = EXCLUDED.active_endpoint,
                checked_at      = EXCLUDED.checked_at",
        )
        .bind(snapshot.chain_id as i64)
        .bind(snapshot.healthy)
        .bind(&snapshot.error)
        .bind(snapshot.blocks_behind.map(|b| b as i64))
        .bind(snapshot.rpc_latency_ms.map(|l| l as i64))
        .bind(&snapshot.active_endpoint)
        .bind(snapshot.checked_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn chain_status(&self, chain_id: u64) -> Result<Option<ChainStatus>, IndexerError> {
        let row = sqlx::query(
            "SELECT c.name,
                    h.healthy, h.error, h.blocks_behind, h.rpc_latency_ms, h.active_endpoint,
                    s.last_indexed_block, s.last_indexed_at
             FROM chains c
             LEFT JOIN chain_health  h ON h.chain_id = c.chain_id
             LEFT JOIN indexer_state s ON s.chain_id = c.chain_id
             WHERE c.chain_id = $1",
        )
        .bind(chain_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(r) = row else {
            return Ok(None);
        };
        Ok(Some(ChainStatus {
            chain_id,
            name: r.get::<String, _>("name"),
            healthy: r.get::<Option<bool>, _>("healthy").unwrap_or(false),
            blocks_behind: r.get::<Option<i64>, _>("blocks_behind").map(|b| b as u64),
            last_error: r.get::<Option<String>, _>("error"),
            rpc_latency_ms: r.get::<Option<i64>, _>("rpc_latency_ms").map(|l| l as u64),
            active_endpoint: r.get::<Option<String>, _>("active_endpoint"),
            watermark: r.get::<Option<i64>, _>("last_indexed_block").map(|w| w as u64),
            last_indexed_at: r.get::<Option<DateTime<Utc>>, _>("last_indexed_at"),
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgresStorage connection pool closed");
    }
}

#[cfg(test)]
mod tests {
    // Integration tests require a running PostgreSQL instance.
    // Set DATABASE_URL environment variable to enable.
    // Example: DATABASE_URL=postgresql://localhost/burnindex_test cargo test --features postgres

    use super::*;
    use burnindex_core::types::{BatchCounts, BlockRange, ContractSet, EventMeta};
    use burnindex_core::U256;

    const CHAIN: u64 = 990_001;

    async fn store() -> PostgresStorage {
        let url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for integration tests");
        let store = PostgresStorage::connect(&url).await.unwrap();
        for table in [
            "burns",
            "swap_burns",
            "indexing_batches",
            "chain_totals",
            "user_totals",
            "indexer_state",
            "chain_health",
            "chains",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE chain_id = $1"))
                .bind(CHAIN as i64)
                .execute(store.pool())
                .await
                .unwrap();
        }
        store
    }

    fn descriptor() -> ChainDescriptor {
        ChainDescriptor {
            chain_id: CHAIN,
            name: "testnet".into(),
            endpoints: vec!["http://localhost:8545".into()],
            contracts: ContractSet {
                token: format!("0x{}", "11".repeat(20)),
                burn_contract: format!("0x{}", "22".repeat(20)),
                position_contract: format!("0x{}", "33".repeat(20)),
            },
            start_block: 1,
            batch_size: None,
            gas_price_hint: Some(3),
        }
    }

    fn commit(records: Vec<EventRecord>, to: u64) -> BatchCommit {
        BatchCommit {
            chain_id: CHAIN,
            batch: IndexingBatchRecord {
                chain_id: CHAIN,
                range: BlockRange::new(1, to),
                counts: BatchCounts::tally(&records),
                duration_ms: 5,
                recorded_at: Utc::now(),
            },
            records,
            watermark: to,
        }
    }

    fn meta(tx: &str) -> EventMeta {
        EventMeta {
            chain_id: CHAIN,
            tx_hash: tx.into(),
            log_index: 0,
            block_number: 5,
            block_timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn test_postgres_commit_is_idempotent() {
        let store = store().await;
        store.ensure_chain(&descriptor()).await.unwrap();

        let records = vec![
            EventRecord::Burn {
                meta: meta("0xdup"),
                from: "0xabc".into(),
                amount: U256::from(10u64).pow(U256::from(30u64)),
            },
            EventRecord::SwapAndBurn {
                meta: meta("0xdup"),
                user: "0xabc".into(),
                eth_amount: U256::from(1u64),
                tokens_burned: U256::from(5u64),
            },
        ];

        let first = store.commit_batch(commit(records.clone(), 10)).await.unwrap();
        assert_eq!(first.inserted.total(), 2);
        let second = store.commit_batch(commit(records, 10)).await.unwrap();
        assert_eq!(second.inserted.total(), 0);
        assert_eq!(second.duplicates, 2);

        let total: String = sqlx::query_scalar(
            "SELECT total_burned::TEXT FROM chain_totals WHERE chain_id = $1",
        )
        .bind(CHAIN as i64)
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(total, format!("1{}", "0".repeat(30)));
        assert_eq!(store.load_watermark(CHAIN).await.unwrap(), Some(10));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn test_postgres_health_and_status() {
        let store = store().await;
        store.ensure_chain(&descriptor()).await.unwrap();
        store.save_watermark(CHAIN, 1_000).await.unwrap();
        store.save_watermark(CHAIN, 990).await.unwrap();

        store
            .upsert_health(&ChainHealthSnapshot {
                chain_id: CHAIN,
                healthy: false,
                error: Some("request timed out".into()),
                blocks_behind: None,
                rpc_latency_ms: None,
                active_endpoint: "http://localhost:8545".into(),
                checked_at: Utc::now(),
            })
            .await
            .unwrap();

        let status = store.chain_status(CHAIN).await.unwrap().unwrap();
        assert_eq!(status.name, "testnet");
        assert!(!status.healthy);
        assert_eq!(status.watermark, Some(1_000));
        assert_eq!(status.last_error.as_deref(), Some("request timed out"));
        assert!(store.chain_ids().await.unwrap().contains(&CHAIN));
    }
}
