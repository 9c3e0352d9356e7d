//! Chain surgery
//!
//! Structural edits on a doubly-linked block chain: splitting a block at a
//! payload offset, merging a block with its successor, and walking a chain.

use crate::error::{Result, TesseraError};

use super::block::{Block, BlockHeader};
use super::store::BlockStore;
use super::{BlockId, NULL_BLOCK};

impl BlockStore {
    /// Split `block` at payload offset `at`.
    ///
    /// The bytes `[at, used)` move into a newly allocated block linked right
    /// after `block`, which keeps the bytes before `at`. The updated `block`
    /// is written back. Returns the new block's id, or `None` when there is
    /// nothing after `at` to move.
    ///
    /// ```text
    ///   before:  P ◄──► [abcdef] ◄──► N
    ///   split 2: P ◄──► [ab] ◄──► [cdef] ◄──► N
    /// ```
    pub fn split(&self, block: &mut Block, at: u64) -> Result<Option<BlockId>> {
        if at >= block.used {
            return Ok(None);
        }

        let moved = block.data[at as usize..block.used as usize].to_vec();
        let extent = self.allocate_linked(moved.len() as u64, Some(&moved), block.id, block.next)?;

        if block.next != NULL_BLOCK {
            self.relink_prev(block.next, extent.last)?;
        }

        block.next = extent.first;
        block.used = at;
        block.data[at as usize..].iter_mut().for_each(|b| *b = 0);
        self.write_block(block)?;

        tracing::trace!(block = block.id, at, new_block = extent.first, "split block");
        Ok(Some(extent.first))
    }

    /// Absorb `block`'s successor into it when both payloads fit in one
    /// block, then free the successor. The updated `block` is written back.
    /// Returns whether a merge happened.
    pub fn merge(&self, block: &mut Block) -> Result<bool> {
        if block.next == NULL_BLOCK {
            return Ok(false);
        }

        let successor = self.load(block.next)?;
        if successor.prev != block.id {
            return Err(TesseraError::invariant(
                successor.id,
                format!("prev points at {}, expected {}", successor.prev, block.id),
            ));
        }
        if block.used + successor.used > self.geometry().block_capacity {
            return Ok(false);
        }

        block.append(successor.payload());
        block.next = successor.next;
        if successor.next != NULL_BLOCK {
            self.relink_prev(successor.next, block.id)?;
        }
        self.write_block(block)?;
        self.release(&[successor.id])?;

        tracing::trace!(block = block.id, absorbed = successor.id, "merged blocks");
        Ok(true)
    }

    /// Headers of every block in the chain starting at `first`, in order.
    /// Checks liveness and back links along the way.
    pub fn chain(&self, first: BlockId) -> Result<Vec<BlockHeader>> {
        let limit = self.block_count();
        let mut blocks = Vec::new();
        let mut expected_prev = None;
        let mut id = first;

        while id != NULL_BLOCK {
            if blocks.len() as u64 >= limit {
                return Err(TesseraError::invariant(
                    first,
                    "chain is longer than the store (cycle)",
                ));
            }

            let block = self.load_lazy(id)?;
            check_link(&block, expected_prev)?;
            expected_prev = Some(block.id);
            id = block.next;
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Point `id`'s back link at `prev`
    pub(crate) fn relink_prev(&self, id: BlockId, prev: BlockId) -> Result<()> {
        let mut block = self.load_lazy(id)?;
        block.prev = prev;
        self.write_block_header(&block)
    }

    /// Point `id`'s forward link at `next`
    pub(crate) fn relink_next(&self, id: BlockId, next: BlockId) -> Result<()> {
        let mut block = self.load_lazy(id)?;
        block.next = next;
        self.write_block_header(&block)
    }
}

/// A chain member must be live and point back at its predecessor. The head's
/// back link is not checked.
pub(crate) fn check_link(block: &BlockHeader, expected_prev: Option<BlockId>) -> Result<()> {
    if !block.is_live() {
        return Err(TesseraError::invariant(block.id, "free block inside a file chain"));
    }
    if let Some(prev) = expected_prev {
        if block.prev != prev {
            return Err(TesseraError::invariant(
                block.id,
                format!("prev points at {}, expected {}", block.prev, prev),
            ));
        }
    }
    Ok(())
}
