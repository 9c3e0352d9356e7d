//! Free list
//!
//! Free blocks form a singly-linked list threaded through their `next`
//! pointers, headed by `Header::free_head`. A free block never carries
//! `BLOCK_FLAG_LIVE`; its payload is unspecified.
//!
//! ```text
//!   header.free_head ──► [7] ──► [8] ──► [3] ──► 0
//!                        free    free    free
//! ```
//!
//! Grown pages are appended at the tail so their blocks come out in id
//! order. Released chains are prepended at the head so recently freed
//! blocks are reused first.

use crate::error::{Result, TesseraError};

use super::block::BlockHeader;
use super::header::Header;
use super::store::BlockStore;
use super::{BlockId, NULL_BLOCK};

/// Mutable view over the free list. Borrows the locked header, so it can
/// only exist inside a structural change.
pub(crate) struct FreeList<'a> {
    store: &'a BlockStore,
    header: &'a mut Header,
}

impl<'a> FreeList<'a> {
    pub(crate) fn new(store: &'a BlockStore, header: &'a mut Header) -> Self {
        Self { store, header }
    }

    /// Append a single discarded block at the tail. Like `release`, the
    /// block must still be live.
    pub(crate) fn push(&mut self, id: BlockId) -> Result<()> {
        let current = self.store.load_lazy(id)?;
        if !current.is_live() {
            return Err(TesseraError::invariant(id, "block is already free"));
        }
        if current.next != NULL_BLOCK || current.prev != NULL_BLOCK {
            return Err(TesseraError::invariant(id, "block is still linked into a chain"));
        }

        let block = BlockHeader {
            id,
            used: 0,
            next: NULL_BLOCK,
            prev: NULL_BLOCK,
            flags: 0,
        };
        self.store.write_block_header(&block)?;
        self.push_run(id, 1)
    }

    /// Append an already linked run of `len` free blocks starting at `first`
    /// (its last block must point at 0)
    pub(crate) fn push_run(&mut self, first: BlockId, len: u64) -> Result<()> {
        match self.tail()? {
            None => self.header.free_head = first,
            Some(mut tail) => {
                tail.next = first;
                self.store.write_block_header(&tail)?;
            }
        }
        self.header.free_count += len;
        Ok(())
    }

    /// Take the head block, or `None` when the list is empty
    pub(crate) fn pop(&mut self) -> Result<Option<BlockId>> {
        let id = self.header.free_head;
        if id == NULL_BLOCK {
            return Ok(None);
        }

        let block = self.store.load_lazy(id)?;
        if block.is_live() {
            return Err(TesseraError::invariant(id, "live block on the free list"));
        }
        if self.header.free_count == 0 {
            return Err(TesseraError::invariant(
                id,
                "free list is non-empty but its count is zero",
            ));
        }

        self.header.free_head = block.next;
        self.header.free_count -= 1;

        if (self.header.free_head == NULL_BLOCK) != (self.header.free_count == 0) {
            return Err(TesseraError::invariant(
                id,
                format!(
                    "free list ended with {} blocks still counted",
                    self.header.free_count
                ),
            ));
        }
        Ok(Some(id))
    }

    /// Return the blocks of a discarded chain to the head of the list, in
    /// the given order
    pub(crate) fn release(&mut self, ids: &[BlockId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let old_head = self.header.free_head;
        for (i, &id) in ids.iter().enumerate() {
            let current = self.store.load_lazy(id)?;
            if !current.is_live() {
                return Err(TesseraError::invariant(id, "block released twice"));
            }

            let freed = BlockHeader {
                id,
                used: 0,
                next: ids.get(i + 1).copied().unwrap_or(old_head),
                prev: NULL_BLOCK,
                flags: 0,
            };
            self.store.write_block_header(&freed)?;
        }

        self.header.free_head = ids[0];
        self.header.free_count += ids.len() as u64;
        Ok(())
    }

    /// Walk to the last free block, bounded by the free count
    fn tail(&self) -> Result<Option<BlockHeader>> {
        let mut id = self.header.free_head;
        if id == NULL_BLOCK {
            return Ok(None);
        }

        let mut steps = 0u64;
        loop {
            let block = self.store.load_lazy(id)?;
            steps += 1;
            if steps > self.header.free_count {
                return Err(TesseraError::invariant(
                    id,
                    format!("free list longer than its count {}", self.header.free_count),
                ));
            }
            if block.next == NULL_BLOCK {
                return Ok(Some(block));
            }
            id = block.next;
        }
    }
}

impl BlockStore {
    /// Return a discarded chain's blocks to the free list
    pub fn release(&self, ids: &[BlockId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut header = self.lock_header();
        FreeList::new(self, &mut header).release(ids)?;
        self.flush_header(&header)?;

        tracing::trace!(count = ids.len(), head = ids[0], "released blocks");
        Ok(())
    }

    /// Return one discarded block to the tail of the free list. It must not
    /// belong to a file chain any more.
    pub fn push_free(&self, id: BlockId) -> Result<()> {
        let mut header = self.lock_header();
        FreeList::new(self, &mut header).push(id)?;
        self.flush_header(&header)
    }

    /// Ids on the free list, head first
    pub fn free_blocks(&self) -> Result<Vec<BlockId>> {
        let header = self.lock_header();
        let mut ids = Vec::with_capacity(header.free_count as usize);
        let mut id = header.free_head;

        while id != NULL_BLOCK {
            if ids.len() as u64 >= header.free_count {
                return Err(TesseraError::invariant(
                    id,
                    format!("free list longer than its count {}", header.free_count),
                ));
            }
            ids.push(id);
            id = self.load_lazy(id)?.next;
        }
        Ok(ids)
    }
}
