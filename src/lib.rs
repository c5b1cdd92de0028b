//! A reorg-safe, dual-zone persistence adapter between a blockchain
//! event-stream processor and a columnar analytics database.
//!
//! The crate exposes an `IngestCoordinator` that a producer drives through
//! `connect()` / `transactFinal` / `transactHot`, backed by a valid-blocks
//! registry (a cheap substitute for row deletion), a migration engine that
//! periodically promotes finalized rows from a mutable hot zone to an
//! append-only cold zone, and a reconciler that recovers cleanly from a
//! stale restart.

pub mod checkpoint;
pub mod clickhouse_client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ingest_buffer;
pub mod metrics;
pub mod migration;
pub mod naming;
pub mod reconciler;
pub mod registry;
pub mod reorg;
pub mod router;
pub mod scalar;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod types;

pub use checkpoint::CheckpointStore;
pub use clickhouse_client::ClickHouseClient;
pub use config::StoreConfig;
pub use coordinator::{ConnectResult, CoordinatorState, IngestCoordinator};
pub use error::{Result, StoreError};
pub use ingest_buffer::IngestBuffer;
pub use migration::{MigrationEngine, MigrationResult, TriggerPolicy};
pub use reconciler::StaleRestartReconciler;
pub use registry::ValidBlocksRegistry;
pub use router::ZoneRouter;
pub use schema::{SchemaCatalog, StaticSchemaCatalog};
pub use store::StoreHandle;
pub use types::{
    BlockRef, ColdCheckpoint, Entity, FinalBatchInfo, HotBatchInfo, HotChainState, LiveCheckpoint,
    ManagedTable, ValidBlockEntry,
};
