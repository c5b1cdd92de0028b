/// Core data model: block references, the hot chain, the two
/// checkpoints, and the managed-table classification.
use serde::{Deserialize, Serialize};

use crate::scalar::NormalizedRow;

/// `{height, hash}`. Equality is by both fields; height-only comparison is
/// used only where explicitly called out (the reorg trigger check).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: u64,
    pub hash: String,
}

impl BlockRef {
    pub fn new(height: u64, hash: impl Into<String>) -> Self {
        Self { height, hash: hash.into() }
    }
}

/// Ordered, in-memory representation of the believed unfinalized suffix of
/// the chain. Invariants:
/// - heights strictly increasing and contiguous
/// - length <= `hot_blocks_depth`
#[derive(Debug, Clone, Default)]
pub struct HotChainState {
    blocks: Vec<BlockRef>,
}

impl HotChainState {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    pub fn from_blocks(blocks: Vec<BlockRef>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[BlockRef] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> Option<&BlockRef> {
        self.blocks.last()
    }

    pub fn append(&mut self, block: BlockRef) {
        self.blocks.push(block);
    }

    /// Truncate to heights <= `height`, inclusive.
    pub fn truncate_to_height(&mut self, height: u64) {
        self.blocks.retain(|b| b.height <= height);
    }

    /// Drop entries at or below `height`, used when `finalizedHeight`
    /// advances (step 1).
    pub fn drop_at_or_below(&mut self, height: u64) {
        self.blocks.retain(|b| b.height > height);
    }

    /// Keep only the last `depth` entries, per hotBlocksDepth.
    pub fn prune_to_depth(&mut self, depth: usize) {
        if self.blocks.len() > depth {
            let drop = self.blocks.len() - depth;
            self.blocks.drain(0..drop);
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn hash_at(&self, height: u64) -> Option<&str> {
        self.blocks.iter().find(|b| b.height == height).map(|b| b.hash.as_str())
    }
}

/// One row keyed by `processorId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveCheckpoint {
    pub height: i64,
    pub hash: String,
    pub hot_blocks: Vec<BlockRef>,
    pub finalized_height: i64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl LiveCheckpoint {
    /// The sentinel "fresh" state returned when no row exists yet.
    pub fn fresh() -> Self {
        Self {
            height: -1,
            hash: String::new(),
            hot_blocks: Vec::new(),
            finalized_height: -1,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.height == -1 && self.hot_blocks.is_empty()
    }
}

/// One row keyed by `processorId`: the highest block whose data is fully
/// migrated to the cold zone — the safe resume point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdCheckpoint {
    pub height: i64,
    pub hash: String,
}

impl ColdCheckpoint {
    pub fn absent() -> Self {
        Self { height: -1, hash: String::new() }
    }
}

/// `{processorId, height, hash}` set member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidBlockEntry {
    pub processor_id: String,
    pub height: u64,
    pub hash: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// The two disjoint sets of managed tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedTable {
    /// Requires a height column; materialized as `{network}_hot_{name}`
    /// and `{network}_cold_{name}`. Participates in migration.
    HotSupported { kind: String, snake_name: String },
    /// Single physical table `{network}_{name}`. Never migrated, never
    /// routed to the hot zone.
    Regular { kind: String, snake_name: String },
}

impl ManagedTable {
    pub fn kind(&self) -> &str {
        match self {
            ManagedTable::HotSupported { kind, .. } => kind,
            ManagedTable::Regular { kind, .. } => kind,
        }
    }

    pub fn snake_name(&self) -> &str {
        match self {
            ManagedTable::HotSupported { snake_name, .. } => snake_name,
            ManagedTable::Regular { snake_name, .. } => snake_name,
        }
    }

    pub fn is_hot_supported(&self) -> bool {
        matches!(self, ManagedTable::HotSupported { .. })
    }
}

/// An application-supplied object whose type name maps deterministically
/// to a managed table ("Ingest entity").
pub trait Entity: Send + Sync {
    /// The stable "kind" tag — a runtime-stable substitute for
    /// type introspection.
    fn kind(&self) -> &'static str;

    /// This entity's block height, when the destination table is
    /// hot-supported. Regular-table entities may return `None`.
    fn height(&self) -> Option<u64>;

    /// A stable identifier for this entity instance, used by `remove`.
    /// Entities that are only ever inserted, never removed, can leave
    /// this at the default.
    fn id(&self) -> Option<String> {
        None
    }

    /// Serialize this entity's fields into a normalized row. Field-level
    /// normalization (wide integers, hex stripping, timestamp formatting)
    /// is expected to already have happened by the time this is called;
    /// `IngestBuffer` does not re-normalize.
    fn into_row(&self) -> NormalizedRow;
}

/// Info passed to `transactFinal`.
#[derive(Debug, Clone)]
pub struct FinalBatchInfo {
    pub prev_head: BlockRef,
    pub next_head: BlockRef,
    pub is_on_top: bool,
}

/// Info passed to `transactHot`.
#[derive(Debug, Clone)]
pub struct HotBatchInfo {
    pub finalized_head: BlockRef,
    pub base_head: BlockRef,
    pub new_blocks: Vec<BlockRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_chain_prunes_from_the_front() {
        let mut chain = HotChainState::from_blocks(
            (0..5).map(|h| BlockRef::new(h, format!("h{h}"))).collect(),
        );
        chain.prune_to_depth(3);
        let heights: Vec<u64> = chain.blocks().iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![2, 3, 4]);
    }

    #[test]
    fn hot_chain_truncate_keeps_heights_at_or_below() {
        let mut chain = HotChainState::from_blocks(
            (100..=103).map(|h| BlockRef::new(h, format!("h{h}"))).collect(),
        );
        chain.truncate_to_height(101);
        let heights: Vec<u64> = chain.blocks().iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![100, 101]);
    }

    #[test]
    fn fresh_checkpoint_is_the_documented_sentinel() {
        let fresh = LiveCheckpoint::fresh();
        assert_eq!(fresh.height, -1);
        assert_eq!(fresh.finalized_height, -1);
        assert!(fresh.hash.is_empty());
        assert!(fresh.is_fresh());
    }
}
