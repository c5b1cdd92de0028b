/// Reorg Engine (component E): detects a reorganization, finds
/// the common ancestor, and rewrites the registry and hot chain. No
/// data-table deletions ever occur here — that is the entire point of the
/// valid-blocks registry.
use tracing::{info, instrument};

use crate::error::{Result, StoreError};
use crate::metrics;
use crate::registry::ValidBlocksRegistry;
use crate::telemetry::truncate_hex;
use crate::types::{BlockRef, HotChainState};

/// Summarizes one reorg execution.
#[derive(Debug, Clone)]
pub struct ReorgInfo {
    pub ancestor_height: u64,
    pub rollback_to: u64,
    pub affected_blocks: usize,
    pub old_tip_hash: String,
    pub new_tip_hash: String,
}

/// A reorg is declared when the first block in the new batch has height
/// <= the current hot-chain tip's height. The producer guarantees
/// contiguous heights within a batch, so checking the first block
/// suffices.
pub fn detect_reorg(hot_chain: &HotChainState, new_blocks: &[BlockRef]) -> bool {
    match (hot_chain.tip(), new_blocks.first()) {
        (Some(tip), Some(first_new)) => first_new.height <= tip.height,
        _ => false,
    }
}

/// The ancestor is the highest height >= `finalized_height` for which the
/// hot chain and the new block list still agree. Two ways a height
/// agrees: the new batch doesn't touch it at all (the producer guarantees
/// contiguous heights, so anything below the new batch's first height was
/// never part of the reorg and is still canonical), or the new batch does
/// cover that height and offers an identical hash. If no such height
/// exists, the ancestor is `finalized_height` itself — the processor must
/// re-index from there. Hashes from the finalized zone are trusted
/// unconditionally.
pub fn find_common_ancestor(
    hot_chain: &HotChainState,
    new_blocks: &[BlockRef],
    finalized_height: i64,
) -> Result<u64> {
    let new_batch_start = new_blocks.first().map(|b| b.height);
    let mut best: Option<u64> = None;
    for old in hot_chain.blocks() {
        if (old.height as i64) < finalized_height {
            continue;
        }
        let agrees = match new_batch_start {
            Some(start) if old.height < start => true,
            _ => new_blocks.iter().any(|b| b.height == old.height && b.hash == old.hash),
        };
        if agrees {
            best = Some(best.map_or(old.height, |b| b.max(old.height)));
        }
    }
    if let Some(height) = best {
        return Ok(height);
    }
    if finalized_height < 0 {
        return Err(StoreError::ReorgConsistency { finalized_height });
    }
    Ok(finalized_height as u64)
}

/// Runs the full reorg: finds the ancestor, rewrites the registry via
/// `handleReorg(ancestor + 1, newBlocks)`, and truncates the in-memory hot
/// chain to heights <= ancestor.
#[instrument(skip(registry, hot_chain, new_blocks))]
pub async fn execute_reorg(
    registry: &ValidBlocksRegistry,
    hot_chain: &mut HotChainState,
    new_blocks: &[BlockRef],
    finalized_height: i64,
) -> Result<ReorgInfo> {
    let old_tip_hash = hot_chain.tip().map(|b| b.hash.clone()).unwrap_or_default();
    let new_tip_hash = new_blocks.last().map(|b| b.hash.clone()).unwrap_or_default();

    let ancestor = find_common_ancestor(hot_chain, new_blocks, finalized_height)?;

    registry.handle_reorg(ancestor + 1, new_blocks).await?;
    hot_chain.truncate_to_height(ancestor);

    let info = ReorgInfo {
        ancestor_height: ancestor,
        rollback_to: ancestor,
        affected_blocks: new_blocks.len(),
        old_tip_hash,
        new_tip_hash,
    };

    info!(
        ancestor = info.ancestor_height,
        affected_blocks = info.affected_blocks,
        old_tip = %truncate_hex(&info.old_tip_hash, 16),
        new_tip = %truncate_hex(&info.new_tip_hash, 16),
        "reorg executed"
    );
    metrics::REORGS_EXECUTED.inc();
    metrics::REORG_ROLLBACK_HEIGHT.set(ancestor as i64);
    metrics::REORG_BLOCKS_AFFECTED.observe(info.affected_blocks as f64);

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(pairs: &[(u64, &str)]) -> HotChainState {
        HotChainState::from_blocks(pairs.iter().map(|(h, hash)| BlockRef::new(*h, *hash)).collect())
    }

    #[test]
    fn detects_reorg_when_new_batch_overlaps_tip() {
        let hot = chain(&[(100, "A"), (101, "B"), (102, "C")]);
        let new_blocks = vec![BlockRef::new(102, "C2"), BlockRef::new(103, "D2")];
        assert!(detect_reorg(&hot, &new_blocks));
    }

    #[test]
    fn no_reorg_when_new_batch_continues_past_tip() {
        let hot = chain(&[(100, "A"), (101, "B"), (102, "C")]);
        let new_blocks = vec![BlockRef::new(103, "D")];
        assert!(!detect_reorg(&hot, &new_blocks));
    }

    #[test]
    fn reorg_at_tip_finds_the_correct_ancestor_height() {
        let hot = chain(&[(100, "A"), (101, "B"), (102, "C")]);
        let new_blocks = vec![BlockRef::new(102, "C'"), BlockRef::new(103, "D'")];
        assert!(detect_reorg(&hot, &new_blocks));
        let ancestor = find_common_ancestor(&hot, &new_blocks, 0).unwrap();
        assert_eq!(ancestor, 101);
    }

    #[test]
    fn falls_back_to_finalized_height_when_no_overlap_found() {
        let hot = chain(&[(100, "A"), (101, "B")]);
        let new_blocks = vec![BlockRef::new(90, "X")]; // no overlap at all
        let ancestor = find_common_ancestor(&hot, &new_blocks, 50).unwrap();
        assert_eq!(ancestor, 50);
    }

    #[test]
    fn errors_when_no_ancestor_and_finalized_height_unreachable() {
        let hot = chain(&[(100, "A")]);
        let new_blocks = vec![BlockRef::new(90, "X")];
        let result = find_common_ancestor(&hot, &new_blocks, -1);
        assert!(matches!(result, Err(StoreError::ReorgConsistency { .. })));
    }
}
