/// Error taxonomy for the storage adapter.
///
/// Most variants are fatal and propagate to the `IngestCoordinator`, which aborts
/// the current batch and lets the supervisor reconnect (the reconciler then
/// guarantees convergence). `TransientIo` is the one category the ingest
/// buffer absorbs internally via retry.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unable to reach the database. Fatal; no state was mutated.
    #[error("failed to connect to the database: {0}")]
    Connect(String),

    /// A hot-supported table lacks the configured height column, or a
    /// required table is missing. Fatal at connect time.
    #[error("schema error: {0}")]
    Schema(String),

    /// Transient transport failure during an insert. Retried internally by
    /// the ingest buffer up to `MAX_INSERT_ATTEMPTS`; surfaced only once
    /// retries are exhausted.
    #[error("transient io error after {attempts} attempt(s): {message}")]
    TransientIo { attempts: u32, message: String },

    /// A migration or validation query referenced a table that does not
    /// exist yet. Logged once and skipped; never fatal.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// No common ancestor within the hot chain, and `finalizedHeight` is
    /// also unreachable. Escalated; the reconciler drops to the cold
    /// cursor on the next restart.
    #[error("reorg consistency error: no common ancestor found, finalized height {finalized_height} unreachable")]
    ReorgConsistency { finalized_height: i64 },

    /// The coordinator failed to persist a checkpoint. Fatal: the batch
    /// must not be acknowledged as complete.
    #[error("checkpoint write failed: {0}")]
    CheckpointWrite(String),

    /// Passthrough for the underlying driver, for errors that don't fit a
    /// more specific category above.
    #[error("database error: {0}")]
    Database(#[from] clickhouse::error::Error),
}

/// Substrings that mark a transport failure as transient. The driver does
/// not expose a structured transient/fatal distinction, so classification
/// falls back to matching the rendered error text, the same substring
/// approach `ingest_buffer`'s retry loop relies on via `is_transient`.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection reset",
    "broken pipe",
    "connect timeout",
    "connection refused",
    "socket hang up",
    "timed out",
];

impl StoreError {
    /// Whether this error should be retried rather than surfaced
    /// immediately. Only ever consulted for errors raised on the data-insert
    /// path — checkpoint writes are always fatal regardless of cause.
    pub fn is_transient(&self) -> bool {
        let text = match self {
            StoreError::TransientIo { .. } => return true,
            StoreError::Database(e) => e.to_string(),
            _ => return false,
        };
        let lower = text.to_lowercase();
        TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
