/// Valid-Blocks Registry (component A).
///
/// The cheap substitute for `DELETE`: rather than remove orphaned rows
/// from a data table when a reorg happens, we record which `(height,
/// hash)` pairs are currently considered canonical and let queries filter
/// on that set. Reorgs become a metadata operation.
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::clickhouse_client::ClickHouseClient;
use crate::error::Result;
use crate::metrics;
use crate::types::BlockRef;

pub const TABLE_NAME: &str = "valid_blocks";

#[derive(Debug, Row, Deserialize)]
struct ValidBlockRow {
    height: u64,
    hash: String,
    timestamp: DateTime<Utc>,
}

/// In-memory cache: `height -> (hash, write_timestamp)`. At most one entry
/// per height, latest write wins (invariant).
#[derive(Debug, Default)]
struct Cache {
    entries: BTreeMap<u64, (String, DateTime<Utc>)>,
}

pub struct ValidBlocksRegistry {
    client: Arc<ClickHouseClient>,
    processor_id: String,
    finality_depth: u64,
    cache: RwLock<Cache>,
}

impl ValidBlocksRegistry {
    pub fn new(client: Arc<ClickHouseClient>, processor_id: impl Into<String>, finality_depth: u64) -> Self {
        Self {
            client,
            processor_id: processor_id.into(),
            finality_depth,
            cache: RwLock::new(Cache::default()),
        }
    }

    /// Ensures the backing table exists and loads all entries for this
    /// `processorId` into memory. Idempotent.
    #[instrument(skip(self), fields(processor_id = %self.processor_id))]
    pub async fn initialize(&self) -> Result<()> {
        self.client
            .execute(&format!(
                "CREATE TABLE IF NOT EXISTS {TABLE_NAME} \
                 (height UInt64, hash String, timestamp DateTime64(3), processor_id String) \
                 ENGINE = ReplacingMergeTree(timestamp) \
                 ORDER BY (processor_id, height)"
            ))
            .await?;

        let sql = format!(
            "SELECT height, hash, timestamp FROM {TABLE_NAME} \
             WHERE processor_id = '{pid}' \
             ORDER BY height, timestamp",
            pid = self.processor_id
        );
        let rows: Vec<ValidBlockRow> = self.client.fetch_all(&sql).await?;

        let mut cache = self.cache.write().await;
        cache.entries.clear();
        for row in rows {
            // Later rows (by timestamp, due to ORDER BY) overwrite earlier
            // ones for the same height — "latest wins" semantics.
            cache.entries.insert(row.height, (row.hash, row.timestamp));
        }
        info!(processor_id = %self.processor_id, count = cache.entries.len(), "valid-blocks registry loaded");
        metrics::REGISTRY_SIZE.set(cache.entries.len() as i64);
        Ok(())
    }

    /// Inserts `{height, hash}` into memory and persists it, then prunes
    /// entries below the finality window.
    pub async fn add_block(&self, height: u64, hash: &str, ts: Option<DateTime<Utc>>) -> Result<()> {
        self.add_blocks(&[BlockRef::new(height, hash)], ts).await
    }

    /// Batch form of `add_block`; the prune step uses the max height of
    /// the batch.
    pub async fn add_blocks(&self, blocks: &[BlockRef], ts: Option<DateTime<Utc>>) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }
        let ts = ts.unwrap_or_else(Utc::now);

        let mut values = Vec::with_capacity(blocks.len());
        {
            let mut cache = self.cache.write().await;
            for b in blocks {
                cache.entries.insert(b.height, (b.hash.clone(), ts));
                values.push(format!(
                    "({}, '{}', '{}', '{}')",
                    b.height,
                    b.hash.replace('\'', "\\'"),
                    crate::scalar::format_timestamp(ts),
                    self.processor_id.replace('\'', "\\'"),
                ));
            }
        }

        let sql = format!(
            "INSERT INTO {TABLE_NAME} (height, hash, timestamp, processor_id) VALUES {}",
            values.join(", ")
        );
        self.client.execute(&sql).await?;

        let max_height = blocks.iter().map(|b| b.height).max().unwrap_or(0);
        self.prune_below(max_height).await
    }

    async fn prune_below(&self, max_height: u64) -> Result<()> {
        let cutoff = max_height.saturating_sub(self.finality_depth.saturating_sub(1));
        {
            let mut cache = self.cache.write().await;
            cache.entries.retain(|h, _| *h >= cutoff);
            metrics::REGISTRY_SIZE.set(cache.entries.len() as i64);
        }
        let sql = format!(
            "ALTER TABLE {TABLE_NAME} DELETE WHERE processor_id = '{}' AND height < {cutoff}",
            self.processor_id
        );
        self.client.execute(&sql).await
    }

    /// Removes all entries with `height >= from_height`, then inserts
    /// `new_blocks`. If the removal persists but the reinsert fails, the
    /// next startup still converges because the reconciler rolls back to
    /// the cold cursor and rebuilds the registry from there.
    #[instrument(skip(self, new_blocks), fields(processor_id = %self.processor_id, from_height))]
    pub async fn handle_reorg(&self, from_height: u64, new_blocks: &[BlockRef]) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            cache.entries.retain(|h, _| *h < from_height);
        }
        let sql = format!(
            "ALTER TABLE {TABLE_NAME} DELETE WHERE processor_id = '{}' AND height >= {from_height}",
            self.processor_id
        );
        self.client.execute(&sql).await?;

        info!(from_height, affected = new_blocks.len(), "registry reorg executed");
        self.add_blocks(new_blocks, None).await
    }

    /// Constant-time membership test over memory.
    pub async fn is_valid(&self, height: u64, hash: &str) -> bool {
        let cache = self.cache.read().await;
        matches!(cache.entries.get(&height), Some((h, _)) if h == hash)
    }

    pub async fn highest_block(&self) -> Option<u64> {
        self.cache.read().await.entries.keys().next_back().copied()
    }

    pub async fn lowest_block(&self) -> Option<u64> {
        self.cache.read().await.entries.keys().next().copied()
    }

    pub async fn count(&self) -> usize {
        self.cache.read().await.entries.len()
    }

    /// Returns a predicate expressible against the query engine: "height
    /// <= (currentHeight - finalityDepth) OR (height, hash) in {enumerated
    /// pairs}". When no valid blocks exist, only the cold-window arm is
    /// emitted. A row whose height sits in the hot window but whose hash
    /// is absent from the registry is filtered out by this predicate (it
    /// matches neither arm).
    pub async fn build_filter(&self, height_col: &str, hash_col: &str, current_height: u64) -> String {
        let cold_cutoff = current_height.saturating_sub(self.finality_depth);
        let cache = self.cache.read().await;
        if cache.entries.is_empty() {
            return format!("{height_col} <= {cold_cutoff}");
        }
        let pairs: Vec<String> = cache
            .entries
            .iter()
            .map(|(h, (hash, _))| format!("({height_col} = {h} AND {hash_col} = '{}')", hash.replace('\'', "\\'")))
            .collect();
        format!("({height_col} <= {cold_cutoff}) OR ({})", pairs.join(" OR "))
    }

    /// Removes all entries for this `processorId` (used only by the
    /// stale-restart reconciler).
    pub async fn clear(&self) -> Result<()> {
        self.cache.write().await.entries.clear();
        metrics::REGISTRY_SIZE.set(0);
        let sql = format!("ALTER TABLE {TABLE_NAME} DELETE WHERE processor_id = '{}'", self.processor_id);
        self.client.execute(&sql).await
    }
}
