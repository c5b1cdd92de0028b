/// Metrics Module — Prometheus instrumentation (ambient component K).
///
/// A global `Registry`, metrics declared once via `lazy_static!`, grouped
/// by the component that emits them. Pulling `/metrics` or pushing to a
/// gateway is the external collaborator's job; only emission into the
/// registry lives here.
use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

const ROW_COUNT_BUCKETS: &[f64] = &[0.0, 1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0];
const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Reorg Engine ───────────────────────────────────────
    pub static ref REORGS_DETECTED: IntCounter = IntCounter::new(
        "store_reorgs_detected_total", "Total reorgs detected"
    ).unwrap();
    pub static ref REORGS_EXECUTED: IntCounter = IntCounter::new(
        "store_reorgs_executed_total", "Total reorgs successfully executed"
    ).unwrap();
    pub static ref REORG_ROLLBACK_HEIGHT: IntGauge = IntGauge::new(
        "store_reorg_rollback_height", "Height the hot chain most recently rolled back to"
    ).unwrap();
    pub static ref REORG_BLOCKS_AFFECTED: Histogram = Histogram::with_opts(
        HistogramOpts::new("store_reorg_blocks_affected", "Number of hot blocks affected per reorg")
            .buckets(ROW_COUNT_BUCKETS.to_vec())
    ).unwrap();

    // ── Migration Engine ───────────────────────────────────
    pub static ref MIGRATIONS_RUN: IntCounter = IntCounter::new(
        "store_migrations_run_total", "Total migration passes run"
    ).unwrap();
    pub static ref MIGRATION_ROWS_MOVED: IntCounterVec = IntCounterVec::new(
        Opts::new("store_migration_rows_moved_total", "Rows moved from hot to cold, by table"),
        &["table"]
    ).unwrap();
    pub static ref MIGRATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("store_migration_duration_seconds", "Migration pass wall-clock duration")
            .buckets(DURATION_BUCKETS.to_vec())
    ).unwrap();
    pub static ref MIGRATION_CUTOFF_HEIGHT: IntGauge = IntGauge::new(
        "store_migration_cutoff_height", "Cutoff height of the most recent migration pass"
    ).unwrap();

    // ── Ingest Buffer ──────────────────────────────────────
    pub static ref INGEST_ROWS_FLUSHED: IntCounterVec = IntCounterVec::new(
        Opts::new("store_ingest_rows_flushed_total", "Rows flushed to a physical table"),
        &["table"]
    ).unwrap();
    pub static ref INGEST_FLUSH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("store_ingest_flush_duration_seconds", "Ingest batch flush latency")
            .buckets(DURATION_BUCKETS.to_vec())
    ).unwrap();
    pub static ref INGEST_RETRIES: IntCounter = IntCounter::new(
        "store_ingest_retries_total", "Total transient-failure retries on data inserts"
    ).unwrap();

    // ── Registry / Checkpoint ───────────────────────────────────────────
    pub static ref REGISTRY_SIZE: IntGauge = IntGauge::new(
        "store_valid_blocks_registry_size", "Current in-memory valid-blocks registry size"
    ).unwrap();
    pub static ref CHECKPOINT_WRITE_FAILURES: IntCounter = IntCounter::new(
        "store_checkpoint_write_failures_total", "Fatal checkpoint write failures"
    ).unwrap();

    // ── Reconciler ─────────────────────────────────────────
    pub static ref STALE_RESTART_RECONCILIATIONS: IntCounter = IntCounter::new(
        "store_stale_restart_reconciliations_total", "Total stale-restart reconciliations performed"
    ).unwrap();
}

/// Registers every metric above with `REGISTRY`. Callers normally call
/// this exactly once at process startup.
pub fn register_all() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(REORGS_DETECTED.clone()))?;
    REGISTRY.register(Box::new(REORGS_EXECUTED.clone()))?;
    REGISTRY.register(Box::new(REORG_ROLLBACK_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(REORG_BLOCKS_AFFECTED.clone()))?;
    REGISTRY.register(Box::new(MIGRATIONS_RUN.clone()))?;
    REGISTRY.register(Box::new(MIGRATION_ROWS_MOVED.clone()))?;
    REGISTRY.register(Box::new(MIGRATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(MIGRATION_CUTOFF_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(INGEST_ROWS_FLUSHED.clone()))?;
    REGISTRY.register(Box::new(INGEST_FLUSH_DURATION.clone()))?;
    REGISTRY.register(Box::new(INGEST_RETRIES.clone()))?;
    REGISTRY.register(Box::new(REGISTRY_SIZE.clone()))?;
    REGISTRY.register(Box::new(CHECKPOINT_WRITE_FAILURES.clone()))?;
    REGISTRY.register(Box::new(STALE_RESTART_RECONCILIATIONS.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(REORGS_DETECTED.get(), 0);
        assert_eq!(MIGRATIONS_RUN.get(), 0);
    }
}
