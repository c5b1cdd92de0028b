//! End-to-end scenario tests composing the pieces that make up the
//! coordinator's `transactFinal`/`transactHot` contracts, exercised
//! without a live database. Tests that require an actual ClickHouse
//! instance are marked `#[ignore]`.
use reorg_safe_store::{
    naming::{physical_table, Zone},
    reorg,
    router::ZoneRouter,
    types::{BlockRef, HotChainState, ManagedTable},
};

fn chain(pairs: &[(u64, &str)]) -> HotChainState {
    HotChainState::from_blocks(pairs.iter().map(|(h, hash)| BlockRef::new(*h, *hash)).collect())
}

/// Scenario 1 — catchup-only: while the producer is still catching up,
/// every hot-supported table routes straight to the cold zone, since
/// anything arriving during catchup is already past the finality window.
#[test]
fn scenario_1_catchup_only_routes_to_cold() {
    let router = ZoneRouter::new(
        "ethereum",
        vec![ManagedTable::HotSupported { kind: "Transfer".into(), snake_name: "transfers".into() }],
    );
    assert!(!router.is_at_chain_tip());
    assert_eq!(router.table_for("Transfer").unwrap(), "ethereum_cold_transfers");
}

/// Scenario 2 — transition to tip: once the producer signals it has
/// caught up, the same entity kind routes to the hot zone instead.
#[test]
fn scenario_2_transition_to_tip_flips_routing() {
    let router = ZoneRouter::new(
        "ethereum",
        vec![ManagedTable::HotSupported { kind: "Transfer".into(), snake_name: "transfers".into() }],
    );
    assert_eq!(router.table_for("Transfer").unwrap(), "ethereum_cold_transfers");
    router.set_is_at_chain_tip(true);
    assert_eq!(router.table_for("Transfer").unwrap(), "ethereum_hot_transfers");
}

/// Scenario 3 — migration happens: maxHeight 11 980 with hotBlocksDepth
/// 2000 yields cutoff 9980; a `lastMigrationHeight` of 9979 from a prior
/// pass still permits this one to run, and the two physical table names
/// migration would address are bit-exact.
#[test]
fn scenario_3_migration_cutoff_and_table_names() {
    let max_height = 11_980u64;
    let hot_blocks_depth = 2_000u64;
    let cutoff = max_height.saturating_sub(hot_blocks_depth);
    assert_eq!(cutoff, 9_980);

    let last_migration_height = 9_979i64;
    assert!(cutoff as i64 > last_migration_height);

    let hot = physical_table("ethereum", Zone::Hot, "transfers");
    let cold = physical_table("ethereum", Zone::Cold, "transfers");
    assert_eq!(hot, "ethereum_hot_transfers");
    assert_eq!(cold, "ethereum_cold_transfers");
}

/// Scenario 4 — reorg at tip: a new batch whose first block overlaps the
/// current hot-chain tip triggers reorg detection, and the ancestor is
/// found at the last height where both chains agree on the hash.
#[test]
fn scenario_4_reorg_at_tip_finds_the_right_ancestor() {
    let mut hot = chain(&[(100, "A"), (101, "B"), (102, "C")]);
    let new_blocks = vec![BlockRef::new(102, "C'"), BlockRef::new(103, "D'")];

    assert!(reorg::detect_reorg(&hot, &new_blocks));
    let ancestor = reorg::find_common_ancestor(&hot, &new_blocks, 0).unwrap();
    assert_eq!(ancestor, 101);

    hot.truncate_to_height(ancestor);
    assert_eq!(hot.tip().unwrap().height, 101);
    assert_eq!(hot.tip().unwrap().hash, "B");
}

/// Scenario 5 — stale restart: live checkpoint carries unfinalized hot
/// blocks past the cold cursor, so the reconciler's precondition for
/// "no reconciliation needed" does not hold.
#[test]
fn scenario_5_stale_restart_requires_reconciliation() {
    let live_height = 10_050i64;
    let live_hot_blocks: Vec<BlockRef> = (10_046..=10_050).map(|h| BlockRef::new(h, format!("h{h}"))).collect();
    let cold_height = 10_000i64;

    let reconciliation_needed = !(live_hot_blocks.is_empty() && live_height <= cold_height);
    assert!(reconciliation_needed);

    // After reconciliation the producer resumes exactly from the cold
    // cursor with an empty hot chain.
    let resumed_height = cold_height;
    let resumed_hot_blocks: Vec<BlockRef> = Vec::new();
    assert_eq!(resumed_height, 10_000);
    assert!(resumed_hot_blocks.is_empty());
}

/// Scenario 6 — beforeMigration veto: when the hook vetoes a triggered
/// migration pass, `blocksSinceLastMigration` must not be reset, so the
/// very next hot batch re-evaluates the same accumulated count.
#[test]
fn scenario_6_vetoed_migration_does_not_reset_the_counter() {
    let mut blocks_since_last_migration = 2_000u64;
    let trigger_threshold = 2_000u64;
    assert!(blocks_since_last_migration >= trigger_threshold);

    let vetoed = true;
    if !vetoed {
        blocks_since_last_migration = 0;
    }
    assert_eq!(blocks_since_last_migration, 2_000);
}

/// A live ClickHouse-backed run of the full coordinator lifecycle
/// (connect -> transactHot -> migration trigger -> transactFinal),
/// exercised only when `CLICKHOUSE_TEST_URL` points at a real server.
#[tokio::test]
#[ignore = "requires a running ClickHouse instance"]
async fn full_lifecycle_against_a_live_database() {
    use std::sync::Arc;

    use reorg_safe_store::{
        checkpoint::CheckpointStore, clickhouse_client::ClickHouseClient, coordinator::IngestCoordinator,
        migration::{MigrationEngine, TriggerPolicy}, reconciler::StaleRestartReconciler,
        registry::ValidBlocksRegistry, schema::StaticSchemaCatalog,
    };

    let url = std::env::var("CLICKHOUSE_TEST_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
    let client = Arc::new(ClickHouseClient::new(&url));
    let registry = Arc::new(ValidBlocksRegistry::new(client.clone(), "scenario-test", 10));
    let checkpoint = Arc::new(CheckpointStore::new(client.clone(), "scenario-test", "squid_processor_status"));
    let router = Arc::new(ZoneRouter::new(
        "ethereum",
        vec![ManagedTable::HotSupported { kind: "Transfer".into(), snake_name: "transfers".into() }],
    ));
    let catalog: Arc<dyn reorg_safe_store::schema::SchemaCatalog> = Arc::new(StaticSchemaCatalog::new(vec![
        ManagedTable::HotSupported { kind: "Transfer".into(), snake_name: "transfers".into() },
    ]));
    let migration = MigrationEngine::new(client.clone(), router.clone(), "ethereum", "height", 10);
    let reconciler = StaleRestartReconciler::new(client.clone(), registry.clone(), checkpoint.clone(), router.clone());

    let mut coordinator = IngestCoordinator::new(
        client, registry, checkpoint, router, catalog, migration, reconciler,
        10, true, TriggerPolicy::EveryNBlocks(2000), true,
    );

    let resumed = coordinator.connect().await.unwrap();
    assert!(resumed.height >= -1);
}
