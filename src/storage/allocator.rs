//! Block allocator
//!
//! Hands out linked chains of live blocks. Free blocks are always reused
//! before the store grows; a page is added only when the free list is empty.
//!
//! ```text
//!   allocate(10 bytes, capacity 4)
//!
//!   prev ◄──► [a: 4 bytes] ◄──► [b: 4 bytes] ◄──► [c: 2 bytes] ◄──► next
//! ```

use crate::error::{Result, TesseraError};

use super::block::{Block, BLOCK_FLAG_LIVE};
use super::freelist::FreeList;
use super::{BlockId, NULL_BLOCK};
use super::store::BlockStore;

/// First and last block of a freshly allocated chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub first: BlockId,
    pub last: BlockId,
    /// Blocks in the chain
    pub blocks: u64,
}

impl BlockStore {
    /// Allocate an unattached chain holding `length` bytes.
    ///
    /// With `payload` the chain carries those bytes (zero-padded up to
    /// `length`); without it the chain is zero-filled. A zero length still
    /// yields one empty block.
    pub fn allocate(&self, length: u64, payload: Option<&[u8]>) -> Result<Extent> {
        self.allocate_linked(length, payload, NULL_BLOCK, NULL_BLOCK)
    }

    /// Allocate a chain whose first block points back at `prev` and whose
    /// last block points on to `next`. Neighbours are not touched; the caller
    /// relinks them.
    pub fn allocate_linked(
        &self,
        length: u64,
        payload: Option<&[u8]>,
        prev: BlockId,
        next: BlockId,
    ) -> Result<Extent> {
        if let Some(bytes) = payload {
            if bytes.len() as u64 > length {
                return Err(TesseraError::InvalidArgument(format!(
                    "payload of {} bytes does not fit an allocation of {} bytes",
                    bytes.len(),
                    length
                )));
            }
        }

        let geometry = self.geometry();
        let count = geometry.blocks_for(length);
        let mut header = self.lock_header();

        let mut ids: Vec<BlockId> = Vec::with_capacity(count as usize);
        let mut grown = 0u64;
        while (ids.len() as u64) < count {
            match FreeList::new(self, &mut header).pop()? {
                Some(id) => ids.push(id),
                None => {
                    self.grow_page(&mut header)?;
                    grown += 1;
                }
            }
        }

        let capacity = geometry.block_capacity;
        let mut written = 0u64;
        for (i, &id) in ids.iter().enumerate() {
            let take = (length - written).min(capacity);

            let mut block = Block::empty(id, &geometry);
            if let Some(bytes) = payload {
                let start = (written as usize).min(bytes.len());
                let end = ((written + take) as usize).min(bytes.len());
                block.data[..end - start].copy_from_slice(&bytes[start..end]);
            }
            block.used = take;
            block.flags = BLOCK_FLAG_LIVE;
            block.prev = if i == 0 { prev } else { ids[i - 1] };
            block.next = ids.get(i + 1).copied().unwrap_or(next);

            self.write_block(&block)?;
            written += take;
        }

        self.flush_header(&header)?;

        let extent = Extent {
            first: ids[0],
            last: ids[ids.len() - 1],
            blocks: count,
        };
        tracing::trace!(
            length,
            blocks = count,
            first = extent.first,
            pages_grown = grown,
            "allocated chain"
        );
        Ok(extent)
    }
}
