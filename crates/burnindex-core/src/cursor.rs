//! Indexer cursor: the in-memory position of a chain indexer.
//!
//! The durable position is the *watermark*: the highest block fully indexed
//! and recorded. The cursor holds the next block to fetch, which is always
//! `watermark + 1` except right after start-up, where it has been rewound by
//! the reorg-safety depth.

use serde::{Deserialize, Serialize};

use crate::types::BlockRange;

/// Default number of trailing blocks replayed at start-up.
pub const DEFAULT_REORG_DEPTH: u64 = 20;

/// The indexer's current position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Next block to fetch.
    next_block: u64,
}

impl Cursor {
    /// Position the cursor for start-up.
    ///
    /// Without a persisted watermark indexing begins at `start_block`.
    /// Otherwise it resumes `reorg_depth` blocks behind the watermark, clamped
    /// so it never goes below `start_block`.
    pub fn resume(watermark: Option<u64>, start_block: u64, reorg_depth: u64) -> Self {
        let next_block = match watermark {
            Some(w) => w.saturating_sub(reorg_depth).max(start_block),
            None => start_block,
        };
        Self { next_block }
    }

    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// The watermark this cursor implies (`None` before the first block).
    pub fn watermark(&self) -> Option<u64> {
        self.next_block.checked_sub(1)
    }

    /// Plan the next batch against the current chain `head`.
    ///
    /// Returns `None` when the cursor is already past the head.
    pub fn plan(&self, head: u64, batch_size: u64) -> Option<BlockRange> {
        if self.next_block > head {
            return None;
        }
        let end = self
            .next_block
            .saturating_add(batch_size.max(1) - 1)
            .min(head);
        Some(BlockRange::new(self.next_block, end))
    }

    /// Advance past a fully persisted batch.
    ///
    /// Ranges that end before the cursor are ignored so the position never
    /// moves backwards.
    pub fn advance(&mut self, range: BlockRange) {
        self.next_block = self.next_block.max(range.to + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_chain_starts_at_start_block() {
        let c = Cursor::resume(None, 29_193_678, DEFAULT_REORG_DEPTH);
        assert_eq!(c.next_block(), 29_193_678);
        assert_eq!(c.watermark(), Some(29_193_677));
    }

    #[test]
    fn restart_rewinds_by_reorg_depth() {
        let c = Cursor::resume(Some(500_000), 100_000, 20);
        assert_eq!(c.next_block(), 499_980);
    }

    #[test]
    fn rewind_clamped_to_start_block() {
        let c = Cursor::resume(Some(100_005), 100_000, 20);
        assert_eq!(c.next_block(), 100_000);
        let c = Cursor::resume(Some(3), 0, 20);
        assert_eq!(c.next_block(), 0);
        assert_eq!(c.watermark(), None);
    }

    #[test]
    fn batch_is_capped_by_head() {
        // watermark 1000, head 1050, batch 100 → 1001..=1050
        let c = Cursor::resume(None, 1001, 0);
        assert_eq!(c.plan(1050, 100), Some(BlockRange::new(1001, 1050)));
    }

    #[test]
    fn batch_is_capped_by_size() {
        let c = Cursor::resume(None, 1001, 0);
        assert_eq!(c.plan(5000, 100), Some(BlockRange::new(1001, 1100)));
    }

    #[test]
    fn caught_up_plans_nothing() {
        let c = Cursor::resume(Some(1050), 0, 0);
        assert_eq!(c.next_block(), 1050);
        let mut c2 = c;
        c2.advance(BlockRange::new(1050, 1050));
        assert_eq!(c2.plan(1050, 100), None);
    }

    #[test]
    fn advance_never_moves_backwards() {
        let mut c = Cursor::resume(None, 100, 0);
        c.advance(BlockRange::new(100, 199));
        assert_eq!(c.next_block(), 200);
        c.advance(BlockRange::new(150, 160));
        assert_eq!(c.next_block(), 200);
    }
}
