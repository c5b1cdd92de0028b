/// Ingest Coordinator (component G): drives the lifecycle and
/// serializes every state transition on the hot chain, registry cache, and
/// checkpoints onto a single cooperative path.
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::checkpoint::CheckpointStore;
use crate::clickhouse_client::ClickHouseClient;
use crate::error::Result;
use crate::ingest_buffer::IngestBuffer;
use crate::metrics;
use crate::migration::{MigrationEngine, MigrationResult, TriggerPolicy};
use crate::reconciler::StaleRestartReconciler;
use crate::registry::ValidBlocksRegistry;
use crate::reorg;
use crate::router::ZoneRouter;
use crate::schema::SchemaCatalog;
use crate::store::StoreHandle;
use crate::types::{BlockRef, ColdCheckpoint, FinalBatchInfo, HotBatchInfo, HotChainState, LiveCheckpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Disconnected,
    Recovering,
    Ready,
    Failed,
}

/// The resume state handed back to the producer from `connect()`.
#[derive(Debug, Clone)]
pub struct ConnectResult {
    pub height: i64,
    pub hash: String,
    pub hot_blocks: Vec<BlockRef>,
    pub finalized_height: i64,
}

type BeforeMigrationHook = Box<dyn Fn() -> bool + Send + Sync>;
type AfterMigrationHook = Box<dyn Fn(&MigrationResult) + Send + Sync>;

pub struct IngestCoordinator {
    client: Arc<ClickHouseClient>,
    registry: Arc<ValidBlocksRegistry>,
    checkpoint: Arc<CheckpointStore>,
    router: Arc<ZoneRouter>,
    catalog: Arc<dyn SchemaCatalog>,
    migration: MigrationEngine,
    reconciler: StaleRestartReconciler,

    state: CoordinatorState,
    hot_chain: HotChainState,
    finalized_height: i64,
    blocks_since_last_migration: u64,

    hot_blocks_depth: u64,
    auto_migrate: bool,
    trigger_policy: TriggerPolicy,
    support_hot_blocks: bool,

    before_migration_hook: Option<BeforeMigrationHook>,
    after_migration_hook: Option<AfterMigrationHook>,
}

impl IngestCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<ClickHouseClient>,
        registry: Arc<ValidBlocksRegistry>,
        checkpoint: Arc<CheckpointStore>,
        router: Arc<ZoneRouter>,
        catalog: Arc<dyn SchemaCatalog>,
        migration: MigrationEngine,
        reconciler: StaleRestartReconciler,
        hot_blocks_depth: u64,
        auto_migrate: bool,
        trigger_policy: TriggerPolicy,
        support_hot_blocks: bool,
    ) -> Self {
        Self {
            client,
            registry,
            checkpoint,
            router,
            catalog,
            migration,
            reconciler,
            state: CoordinatorState::Disconnected,
            hot_chain: HotChainState::new(),
            finalized_height: -1,
            blocks_since_last_migration: 0,
            hot_blocks_depth,
            auto_migrate,
            trigger_policy,
            support_hot_blocks,
            before_migration_hook: None,
            after_migration_hook: None,
        }
    }

    pub fn with_before_migration_hook(mut self, hook: BeforeMigrationHook) -> Self {
        self.before_migration_hook = Some(hook);
        self
    }

    pub fn with_after_migration_hook(mut self, hook: AfterMigrationHook) -> Self {
        self.after_migration_hook = Some(hook);
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn set_is_at_chain_tip(&self, flag: bool) {
        self.router.set_is_at_chain_tip(flag);
    }

    /// Disconnected → connect() → Recovering → reconciler runs → Ready.
    #[instrument(skip(self))]
    pub async fn connect(&mut self) -> Result<ConnectResult> {
        self.state = CoordinatorState::Recovering;

        let result = self.connect_inner().await;
        match &result {
            Ok(_) => self.state = CoordinatorState::Ready,
            Err(e) => {
                warn!(error = %e, "connect failed, coordinator entering Failed state");
                self.state = CoordinatorState::Failed;
            }
        }
        result
    }

    async fn connect_inner(&mut self) -> Result<ConnectResult> {
        self.checkpoint.initialize().await?;
        if self.support_hot_blocks {
            self.registry.initialize().await?;
        }

        let live = self.checkpoint.load_live().await?;
        let cold = match self.checkpoint.load_cold().await? {
            Some(cold) => cold,
            // No cold-checkpoint row has ever been written (e.g. a fresh
            // processor pointed at a database that already carries cold
            // data). Fall back to the highest height already present in
            // the cold zone itself, with an empty hash.
            None => match self.migration.fallback_cold_height().await? {
                Some(height) => ColdCheckpoint { height: height as i64, hash: String::new() },
                None => ColdCheckpoint::absent(),
            },
        };

        let resumed = if self.support_hot_blocks {
            self.reconciler.reconcile(live, &cold).await?
        } else {
            live
        };

        self.hot_chain = HotChainState::from_blocks(resumed.hot_blocks.clone());
        self.finalized_height = resumed.finalized_height;
        self.blocks_since_last_migration = 0;

        info!(
            height = resumed.height,
            finalized_height = resumed.finalized_height,
            hot_blocks = resumed.hot_blocks.len(),
            "coordinator ready"
        );

        Ok(ConnectResult {
            height: resumed.height,
            hash: resumed.hash,
            hot_blocks: resumed.hot_blocks,
            finalized_height: resumed.finalized_height,
        })
    }

    pub fn disconnect(&mut self) {
        self.state = CoordinatorState::Disconnected;
    }

    /// `transactFinal(info, cb)`: invoke `cb` exactly once, flush, advance
    /// `finalizedHeight`, saveLive. All side effects complete before this
    /// returns.
    #[instrument(skip(self, cb))]
    pub async fn transact_final<F>(&mut self, info: &FinalBatchInfo, cb: F) -> Result<()>
    where
        F: FnOnce(&mut StoreHandle) -> Result<()>,
    {
        let mut buffer = IngestBuffer::new(self.client.clone());
        {
            let mut store = StoreHandle::new(&mut buffer, &self.router, self.catalog.as_ref());
            cb(&mut store)?;
        }
        buffer.flush().await?;

        self.finalized_height = info.next_head.height as i64;

        let live = LiveCheckpoint {
            height: info.next_head.height as i64,
            hash: info.next_head.hash.clone(),
            hot_blocks: self.hot_chain.blocks().to_vec(),
            finalized_height: self.finalized_height,
            timestamp: Utc::now(),
        };
        self.save_live_or_fail(&live).await?;
        Ok(())
    }

    /// `transactHot(info, cb)` per steps 1-6.
    #[instrument(skip(self, cb))]
    pub async fn transact_hot<F>(&mut self, info: &HotBatchInfo, mut cb: F) -> Result<()>
    where
        F: FnMut(&mut StoreHandle, &BlockRef) -> Result<()>,
    {
        // Step 1.
        let finalized_advanced = (info.finalized_head.height as i64) > self.finalized_height;
        if finalized_advanced {
            self.finalized_height = info.finalized_head.height as i64;
            self.hot_chain.drop_at_or_below(info.finalized_head.height);
        }

        // Step 2.
        let mut registry_covers_new_blocks = false;
        if reorg::detect_reorg(&self.hot_chain, &info.new_blocks) {
            metrics::REORGS_DETECTED.inc();
            reorg::execute_reorg(&self.registry, &mut self.hot_chain, &info.new_blocks, self.finalized_height).await?;
            registry_covers_new_blocks = true;
        }

        // Step 3.
        for block in &info.new_blocks {
            let mut buffer = IngestBuffer::new(self.client.clone());
            {
                let mut store = StoreHandle::new(&mut buffer, &self.router, self.catalog.as_ref());
                cb(&mut store, block)?;
            }
            buffer.flush().await?;

            if !registry_covers_new_blocks && self.support_hot_blocks {
                self.registry.add_block(block.height, &block.hash, None).await?;
            }
            self.hot_chain.append(block.clone());
        }

        // Step 4.
        self.hot_chain.prune_to_depth(self.hot_blocks_depth as usize);

        // Step 5.
        let tip = info
            .new_blocks
            .last()
            .cloned()
            .unwrap_or_else(|| info.base_head.clone());
        let live = LiveCheckpoint {
            height: tip.height as i64,
            hash: tip.hash,
            hot_blocks: self.hot_chain.blocks().to_vec(),
            finalized_height: self.finalized_height,
            timestamp: Utc::now(),
        };
        self.save_live_or_fail(&live).await?;

        // Step 6.
        if self.router.is_at_chain_tip() && self.auto_migrate {
            self.blocks_since_last_migration += info.new_blocks.len() as u64;
            let should_trigger = match self.trigger_policy {
                TriggerPolicy::EveryNBlocks(n) => self.blocks_since_last_migration >= n,
                TriggerPolicy::OnFinalityAdvance => finalized_advanced,
            };
            if should_trigger {
                self.maybe_run_migration().await?;
            }
        }

        Ok(())
    }

    async fn maybe_run_migration(&mut self) -> Result<()> {
        let vetoed = self.before_migration_hook.as_ref().map(|hook| !hook()).unwrap_or(false);
        if vetoed {
            info!("migration vetoed by beforeMigration hook");
            return Ok(());
        }

        let result = self.migration.migrate(&self.hot_chain).await?;
        if result.cutoff_height >= 0 {
            if let Some(hash) = self.migration.resolved_cutoff_hash(&self.hot_chain, result.cutoff_height as u64).await {
                self.checkpoint.save_cold(result.cutoff_height, &hash).await?;
            }
        }
        if let Some(hook) = &self.after_migration_hook {
            hook(&result);
        }
        self.blocks_since_last_migration = 0;
        Ok(())
    }

    async fn save_live_or_fail(&self, live: &LiveCheckpoint) -> Result<()> {
        self.checkpoint.save_live(live).await.map_err(|e| {
            metrics::CHECKPOINT_WRITE_FAILURES.inc();
            e
        })
    }
}
