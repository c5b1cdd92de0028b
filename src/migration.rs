/// Migration Engine (component F): periodically promotes
/// finalized rows out of the mutable hot zone.
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clickhouse::Row;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::clickhouse_client::ClickHouseClient;
use crate::error::Result;
use crate::metrics;
use crate::naming::{physical_table, Zone};
use crate::router::ZoneRouter;
use crate::telemetry::truncate_list;
use crate::types::HotChainState;

/// Either "every N new blocks processed at tip" (default) or "every time
/// finalizedHeight advances" ("Trigger policy"). Consulted by the
/// ingest coordinator, which owns `blocksSinceLastMigration`; the engine
/// itself is policy-agnostic and only knows how to run one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolicy {
    EveryNBlocks(u64),
    OnFinalityAdvance,
}

#[derive(Debug, Clone, Default)]
pub struct TableMigrationResult {
    pub name: String,
    pub rows: u64,
}

/// Result contract returned to the `afterMigration` hook.
#[derive(Debug, Clone, Default)]
pub struct MigrationResult {
    pub migrated: u64,
    pub cutoff_height: i64,
    pub duration_ms: u64,
    pub tables: Vec<TableMigrationResult>,
}

#[derive(Debug, Row, Deserialize)]
struct MaxHeightRow {
    value: Option<u64>,
}

pub struct MigrationEngine {
    client: Arc<ClickHouseClient>,
    router: Arc<ZoneRouter>,
    network: String,
    height_column_name: String,
    hot_blocks_depth: u64,
    last_migration_height: AtomicI64,
}

impl MigrationEngine {
    pub fn new(
        client: Arc<ClickHouseClient>,
        router: Arc<ZoneRouter>,
        network: impl Into<String>,
        height_column_name: impl Into<String>,
        hot_blocks_depth: u64,
    ) -> Self {
        Self {
            client,
            router,
            network: network.into(),
            height_column_name: height_column_name.into(),
            hot_blocks_depth,
            last_migration_height: AtomicI64::new(-1),
        }
    }

    pub fn last_migration_height(&self) -> i64 {
        self.last_migration_height.load(Ordering::SeqCst)
    }

    /// Runs one migration pass. Preconditions: `isAtChainTip`
    /// is true and hot-supported tables are non-empty; callers (the
    /// coordinator) are expected to have already checked these, but both
    /// are re-verified defensively.
    #[instrument(skip(self, hot_chain))]
    pub async fn migrate(&self, hot_chain: &HotChainState) -> Result<MigrationResult> {
        let start = Instant::now();
        let mut hot_supported: Vec<(String, String, String)> = self
            .router
            .hot_supported_tables()
            .map(|t| {
                let snake = t.snake_name().to_string();
                let hot = physical_table(&self.network, Zone::Hot, &snake);
                let cold = physical_table(&self.network, Zone::Cold, &snake);
                (snake, hot, cold)
            })
            .collect();
        hot_supported.sort_by(|a, b| a.0.cmp(&b.0));

        if !self.router.is_at_chain_tip() || hot_supported.is_empty() {
            return Ok(MigrationResult { cutoff_height: self.last_migration_height(), ..Default::default() });
        }

        // Step 1: representative table is the first by discovery order.
        let (_, representative_hot, _) = &hot_supported[0];
        let max_height = match self.fetch_max_height(representative_hot).await? {
            Some(h) => h,
            None => return Ok(MigrationResult { cutoff_height: self.last_migration_height(), ..Default::default() }),
        };

        // Step 2.
        let cutoff = max_height.saturating_sub(self.hot_blocks_depth);

        // Step 3.
        if (cutoff as i64) <= self.last_migration_height() {
            return Ok(MigrationResult { cutoff_height: self.last_migration_height(), ..Default::default() });
        }

        // Step 4: copy + delete, per hot-supported table.
        let mut tables = Vec::with_capacity(hot_supported.len());
        let mut migrated_total = 0u64;
        for (snake, hot, cold) in &hot_supported {
            match self.migrate_one_table(snake, hot, cold, cutoff).await {
                Ok(Some(result)) => {
                    migrated_total += result.rows;
                    metrics::MIGRATION_ROWS_MOVED.with_label_values(&[snake]).inc_by(result.rows);
                    tables.push(result);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(table = %snake, error = %e, "migration failed for table, skipping");
                }
            }
        }

        // Step 5: resolve the cutoff's hash, preferring the in-memory hot
        // chain (cheapest, always fresh) over a round trip to the tables
        // that were just migrated.
        let cutoff_hash = match hot_chain.hash_at(cutoff) {
            Some(hash) => Some(hash.to_string()),
            None => self.resolve_cutoff_hash_from_tables(&hot_supported, cutoff).await,
        };

        // Step 6 is performed by the caller, which owns the checkpoint
        // store; the engine only resolves and reports the hash.
        match &cutoff_hash {
            Some(hash) => info!(cutoff, hash = %hash, "migration cutoff hash resolved"),
            None => warn!(cutoff, "migration cutoff hash unresolved; cold checkpoint not advanced"),
        }

        // Step 7.
        self.last_migration_height.store(cutoff as i64, Ordering::SeqCst);

        let duration_ms = start.elapsed().as_millis() as u64;
        metrics::MIGRATIONS_RUN.inc();
        metrics::MIGRATION_DURATION.observe(duration_ms as f64 / 1000.0);
        metrics::MIGRATION_CUTOFF_HEIGHT.set(cutoff as i64);

        let table_names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        info!(
            cutoff,
            migrated = migrated_total,
            duration_ms,
            tables = %truncate_list(&table_names, 8),
            "migration pass complete"
        );

        Ok(MigrationResult { migrated: migrated_total, cutoff_height: cutoff as i64, duration_ms, tables })
    }

    pub async fn resolved_cutoff_hash(&self, hot_chain: &HotChainState, cutoff: u64) -> Option<String> {
        if let Some(hash) = hot_chain.hash_at(cutoff) {
            return Some(hash.to_string());
        }
        let hot_supported: Vec<(String, String, String)> = self
            .router
            .hot_supported_tables()
            .map(|t| {
                let snake = t.snake_name().to_string();
                let hot = physical_table(&self.network, Zone::Hot, &snake);
                let cold = physical_table(&self.network, Zone::Cold, &snake);
                (snake, hot, cold)
            })
            .collect();
        self.resolve_cutoff_hash_from_tables(&hot_supported, cutoff).await
    }

    async fn resolve_cutoff_hash_from_tables(
        &self,
        hot_supported: &[(String, String, String)],
        cutoff: u64,
    ) -> Option<String> {
        for (_, hot, cold) in hot_supported {
            for table in [hot, cold] {
                let sql = format!(
                    "SELECT hash AS value FROM {table} WHERE {} = {cutoff} LIMIT 1",
                    self.height_column_name
                );
                if let Ok(Some(hash)) = self.client.fetch_optional_string(&sql).await {
                    return Some(hash);
                }
            }
        }
        None
    }

    async fn migrate_one_table(
        &self,
        snake: &str,
        hot: &str,
        cold: &str,
        cutoff: u64,
    ) -> Result<Option<TableMigrationResult>> {
        if !self.client.table_exists("default", hot).await.unwrap_or(false) {
            warn!(table = hot, "unknown table referenced by migration, skipping");
            return Ok(None);
        }

        // a. Count rows eligible for migration.
        let count_sql = format!(
            "SELECT count() AS count FROM {hot} WHERE {} <= {cutoff}",
            self.height_column_name
        );
        let count = self.client.fetch_count(&count_sql).await?;
        if count == 0 {
            return Ok(None);
        }

        // c. Server-side copy; the cold table's merge semantics tolerate
        // re-migrating the same rows, making this safe to retry.
        let copy_sql = format!(
            "INSERT INTO {cold} SELECT * FROM {hot} WHERE {} <= {cutoff}",
            self.height_column_name
        );
        self.client.execute(&copy_sql).await?;

        // d. Delete migrated rows from the hot zone.
        let delete_sql = format!(
            "ALTER TABLE {hot} DELETE WHERE {} <= {cutoff}",
            self.height_column_name
        );
        self.client.execute(&delete_sql).await?;

        info!(table = snake, rows = count, cutoff, "migrated rows to cold zone");
        Ok(Some(TableMigrationResult { name: snake.to_string(), rows: count }))
    }

    /// Returns `None` when the table is missing or empty, which the caller
    /// treats as a no-op pass (`migrated: 0`, cutoff held at its prior
    /// value). `max()` over an empty `UInt64` column returns `0`, not
    /// `NULL`, so emptiness has to be checked with `count()` first rather
    /// than inferred from the max query's result.
    async fn fetch_max_height(&self, hot_table: &str) -> Result<Option<u64>> {
        if !self.client.table_exists("default", hot_table).await.unwrap_or(false) {
            return Ok(None);
        }
        let count_sql = format!("SELECT count() AS count FROM {hot_table}");
        if self.client.fetch_count(&count_sql).await? == 0 {
            return Ok(None);
        }
        let sql = format!("SELECT max({}) AS value FROM {hot_table}", self.height_column_name);
        let rows: Vec<MaxHeightRow> = self.client.fetch_all(&sql).await?;
        Ok(rows.into_iter().next().and_then(|r| r.value))
    }

    /// Connect-time fallback for when no cold-checkpoint row has ever been
    /// written — e.g. a database provisioned with data but no checkpoint
    /// history yet. Reads `max(heightColumnName)` from the first
    /// hot-supported table's cold zone, by the same discovery order the
    /// migration pass itself uses.
    pub async fn fallback_cold_height(&self) -> Result<Option<u64>> {
        let mut hot_supported: Vec<String> =
            self.router.hot_supported_tables().map(|t| t.snake_name().to_string()).collect();
        hot_supported.sort();
        let Some(snake) = hot_supported.first() else {
            return Ok(None);
        };
        let cold = physical_table(&self.network, Zone::Cold, snake);
        self.fetch_max_height(&cold).await
    }
}
