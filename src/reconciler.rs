/// Stale-Restart Reconciler (component H).
///
/// After downtime, the producer re-validates its own recent block hashes
/// before calling back into us; any unfinalized block this adapter
/// believed in may by then have been reorged away. The cold checkpoint is
/// the deepest point still guaranteed on-chain, so a stale restart rolls
/// everything hot back to it.
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::checkpoint::CheckpointStore;
use crate::clickhouse_client::ClickHouseClient;
use crate::error::Result;
use crate::metrics;
use crate::naming::{physical_table, Zone};
use crate::registry::ValidBlocksRegistry;
use crate::router::ZoneRouter;
use crate::types::{ColdCheckpoint, LiveCheckpoint};

pub struct StaleRestartReconciler {
    client: Arc<ClickHouseClient>,
    registry: Arc<ValidBlocksRegistry>,
    checkpoint: Arc<CheckpointStore>,
    router: Arc<ZoneRouter>,
}

impl StaleRestartReconciler {
    pub fn new(
        client: Arc<ClickHouseClient>,
        registry: Arc<ValidBlocksRegistry>,
        checkpoint: Arc<CheckpointStore>,
        router: Arc<ZoneRouter>,
    ) -> Self {
        Self { client, registry, checkpoint, router }
    }

    /// Decides whether reconciliation is required and, if so, performs it:
    /// clear the registry, truncate every hot-supported hot table, and
    /// persist the rolled-back live checkpoint. Returns the state the
    /// producer should resume from.
    #[instrument(skip(self, live))]
    pub async fn reconcile(&self, live: LiveCheckpoint, cold: &ColdCheckpoint) -> Result<LiveCheckpoint> {
        if live.hot_blocks.is_empty() && live.height <= cold.height {
            return Ok(live);
        }

        info!(
            live_height = live.height,
            cold_height = cold.height,
            hot_blocks = live.hot_blocks.len(),
            "stale restart detected, reconciling to cold cursor"
        );

        self.registry.clear().await?;

        for table in self.router.hot_supported_tables() {
            let hot = physical_table(self.router.network(), Zone::Hot, table.snake_name());
            if self.client.table_exists("default", &hot).await.unwrap_or(false) {
                self.client.execute(&format!("TRUNCATE TABLE {hot}")).await?;
            }
        }

        let reconciled = LiveCheckpoint {
            height: cold.height,
            hash: cold.hash.clone(),
            hot_blocks: Vec::new(),
            finalized_height: cold.height,
            timestamp: Utc::now(),
        };
        self.checkpoint.save_live(&reconciled).await?;
        metrics::STALE_RESTART_RECONCILIATIONS.inc();

        Ok(reconciled)
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{BlockRef, LiveCheckpoint};

    #[test]
    fn no_reconciliation_needed_when_hot_blocks_empty_and_height_at_or_below_cold() {
        let live = LiveCheckpoint {
            height: 10_000,
            hash: "H".into(),
            hot_blocks: vec![],
            finalized_height: 10_000,
            timestamp: chrono::Utc::now(),
        };
        assert!(live.hot_blocks.is_empty() && live.height <= 10_000);
    }

    #[test]
    fn scenario_5_stale_restart_numbers_trigger_reconciliation() {
        // Live = {height=10050, hotBlocks=[10046..10050], finalizedHeight=10040}; cold = {height=10000}
        let live = LiveCheckpoint {
            height: 10_050,
            hash: "H10050".into(),
            hot_blocks: (10_046..=10_050).map(|h| BlockRef::new(h, format!("h{h}"))).collect(),
            finalized_height: 10_040,
            timestamp: chrono::Utc::now(),
        };
        let cold_height = 10_000i64;
        let needs_reconciliation = !(live.hot_blocks.is_empty() && live.height <= cold_height);
        assert!(needs_reconciliation);
    }
}
