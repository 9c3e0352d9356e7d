//! File operations
//!
//! Read, write, insert and remove on a file's block chain. Every operation
//! takes the store explicitly; the handle only caches topology.
//!
//! ## Insert at offset 6 (capacity 4)
//! ```text
//!   before:  [abcd] ◄──► [efgh]
//!   split:   [abcd] ◄──► [ef] ◄──► [gh]
//!   fill:    [abcd] ◄──► [efXY] ◄──► [Z] ◄──► [gh]
//! ```
//!
//! ## Remove 5 bytes at offset 2
//! ```text
//!   before:  [abcd] ◄──► [efgh] ◄──► [ijkl]
//!   after:   [ab] ◄──► [h] ◄──► [ijkl]
//! ```
//! Blocks are compacted in place, never merged, so a removal leaves
//! partially filled blocks behind.

use std::borrow::Cow;

use crate::error::{Result, TesseraError};
use crate::storage::{compact, Block, BlockStore, NULL_BLOCK};

use super::handle::{FileHandle, Landing};

/// Bytes to place into a file: caller data or a run of zeros
#[derive(Debug, Clone, Copy)]
enum Fill<'a> {
    Bytes(&'a [u8]),
    Zeros(u64),
}

impl<'a> Fill<'a> {
    fn len(&self) -> u64 {
        match *self {
            Fill::Bytes(bytes) => bytes.len() as u64,
            Fill::Zeros(len) => len,
        }
    }

    /// `len` bytes starting at `offset`
    fn chunk(&self, offset: u64, len: u64) -> Cow<'a, [u8]> {
        match *self {
            Fill::Bytes(bytes) => Cow::Borrowed(&bytes[offset as usize..(offset + len) as usize]),
            Fill::Zeros(_) => Cow::Owned(vec![0u8; len as usize]),
        }
    }

    /// Everything from `offset` on, as an allocation payload (`None` = zeros)
    fn rest(&self, offset: u64) -> Option<&'a [u8]> {
        match *self {
            Fill::Bytes(bytes) => Some(&bytes[offset as usize..]),
            Fill::Zeros(_) => None,
        }
    }
}

impl FileHandle {
    // =========================================================================
    // Read
    // =========================================================================

    /// Read up to `len` bytes at the cursor. Clamped to the end of the file;
    /// the cursor advances by the number of bytes returned.
    pub fn read(&mut self, store: &BlockStore, len: u64) -> Result<Vec<u8>> {
        let available = self.size.saturating_sub(self.position);
        let mut buf = vec![0u8; len.min(available) as usize];
        let read = self.read_into(store, &mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    /// Fill as much of `buf` as the file has left after the cursor
    pub fn read_into(&mut self, store: &BlockStore, buf: &mut [u8]) -> Result<usize> {
        let available = self.size.saturating_sub(self.position);
        let len = (buf.len() as u64).min(available) as usize;

        let mut done = 0usize;
        while done < len {
            let (header, start) = self.locate(store, self.position, Landing::Forward)?;
            let block = store.load(header.id)?;
            let offset = (self.position - start) as usize;
            let take = (block.used as usize - offset).min(len - done);
            if take == 0 {
                return Err(TesseraError::invariant(
                    block.id,
                    format!("{} ends before its recorded size {}", self.name(), self.size),
                ));
            }

            buf[done..done + take].copy_from_slice(&block.data[offset..offset + take]);
            done += take;
            self.position += take as u64;
        }
        Ok(done)
    }

    /// Whole content; leaves the cursor at the end
    pub fn read_all(&mut self, store: &BlockStore) -> Result<Vec<u8>> {
        self.position = 0;
        self.read(store, self.size)
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Overwrite at the cursor, extending the file as needed. A cursor past
    /// the end zero-fills the gap first.
    pub fn write(&mut self, store: &BlockStore, data: &[u8]) -> Result<u64> {
        self.write_fill(store, Fill::Bytes(data))
    }

    /// Write `len` zero bytes at the cursor
    pub fn write_zeros(&mut self, store: &BlockStore, len: u64) -> Result<u64> {
        self.write_fill(store, Fill::Zeros(len))
    }

    fn write_fill(&mut self, store: &BlockStore, fill: Fill<'_>) -> Result<u64> {
        let total = fill.len();
        if total == 0 {
            return Ok(0);
        }
        if self.position > self.size {
            self.fill_gap(store)?;
        }

        let mut written = 0u64;
        let mut grew = 0u64;
        while written < total {
            let (header, start) = self.locate(store, self.position, Landing::Forward)?;
            let mut block = store.load(header.id)?;
            let offset = self.position - start;
            let mut progressed = 0u64;

            let overwrite = (block.used - offset).min(total - written);
            if overwrite > 0 {
                let chunk = fill.chunk(written, overwrite);
                block.data[offset as usize..(offset + overwrite) as usize].copy_from_slice(&chunk);
                progressed = overwrite;
            }

            // Past the old end: top up the tail, then chain new blocks
            if block.is_tail() && offset + progressed == block.used && written + progressed < total {
                let wanted = (total - written - progressed).min(block.spare());
                let appended = block.append(&fill.chunk(written + progressed, wanted)) as u64;
                progressed += appended;
                grew += appended;

                let rest = total - written - progressed;
                if rest > 0 {
                    let extent = store.allocate_linked(
                        rest,
                        fill.rest(written + progressed),
                        block.id,
                        NULL_BLOCK,
                    )?;
                    block.next = extent.first;
                    self.end = extent.last;
                    progressed += rest;
                    grew += rest;
                }
            }

            if progressed == 0 {
                return Err(TesseraError::invariant(
                    block.id,
                    format!("write into {} made no progress at {}", self.name(), self.position),
                ));
            }

            store.write_block(&block)?;
            written += progressed;
            self.position += progressed;
        }

        self.size += grew;
        store.adjust_live_bytes(grew as i64);
        Ok(total)
    }

    /// Zero-fill from the end of the file up to the cursor
    fn fill_gap(&mut self, store: &BlockStore) -> Result<()> {
        let target = self.position;
        let gap = target - self.size;
        self.position = self.size;
        self.write_fill(store, Fill::Zeros(gap))?;

        tracing::trace!(file = self.name(), gap, "zero-filled gap");
        Ok(())
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Splice `data` in at `offset`, shifting everything after it. The cursor
    /// ends just past the inserted bytes.
    pub fn insert(&mut self, store: &BlockStore, offset: u64, data: &[u8]) -> Result<u64> {
        self.insert_fill(store, offset, Fill::Bytes(data))
    }

    /// Splice `len` zero bytes in at `offset`
    pub fn insert_zeros(&mut self, store: &BlockStore, offset: u64, len: u64) -> Result<u64> {
        self.insert_fill(store, offset, Fill::Zeros(len))
    }

    fn insert_fill(&mut self, store: &BlockStore, offset: u64, fill: Fill<'_>) -> Result<u64> {
        let len = fill.len();
        if len == 0 {
            return Ok(0);
        }
        if offset > self.size {
            self.position = offset;
            self.fill_gap(store)?;
        }

        let (header, start) = self.locate(store, offset, Landing::Backward)?;
        let mut block = store.load(header.id)?;
        let at = offset - start;

        if let Some(moved) = store.split(&mut block, at)? {
            if self.end == block.id {
                self.end = moved;
            }
        }

        let after = block.next;
        let placed = block.append(&fill.chunk(0, len.min(block.spare()))) as u64;
        let rest = len - placed;
        if rest > 0 {
            let extent = store.allocate_linked(rest, fill.rest(placed), block.id, after)?;
            if after == NULL_BLOCK {
                self.end = extent.last;
            } else {
                store.relink_prev(after, extent.last)?;
            }
            block.next = extent.first;
        }
        store.write_block(&block)?;

        self.size += len;
        store.adjust_live_bytes(len as i64);
        self.reset_cursor_cache();
        self.position = offset + len;

        tracing::trace!(file = self.name(), offset, len, "inserted");
        Ok(len)
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Delete up to `len` bytes at the cursor, clamped to the end of the file.
    /// The cursor does not move. Blocks emptied by the removal go back to the
    /// free list, except the file's first block.
    pub fn remove(&mut self, store: &BlockStore, len: u64) -> Result<u64> {
        let count = len.min(self.size.saturating_sub(self.position));
        if count == 0 {
            return Ok(0);
        }

        let (header, start) = self.locate(store, self.position, Landing::Forward)?;
        let mut first = store.load(header.id)?;
        let offset = self.position - start;
        let mut remaining = count - compact(&mut first, offset, offset + count);

        let mut freed = Vec::new();
        let mut boundary: Option<Block> = None;
        let mut next = first.next;
        while remaining > 0 {
            if next == NULL_BLOCK {
                return Err(TesseraError::invariant(
                    first.id,
                    format!("chain ended with {} bytes left to remove", remaining),
                ));
            }

            let mut block = store.load(next)?;
            if block.used <= remaining {
                remaining -= block.used;
                freed.push(block.id);
                next = block.next;
            } else {
                compact(&mut block, 0, remaining);
                remaining = 0;
                boundary = Some(block);
            }
        }

        let survivor = boundary.as_ref().map_or(next, |block| block.id);

        // Block the survivor hangs off once the removed range is unlinked
        let keeper = if first.used == 0 && first.id != self.first {
            freed.insert(0, first.id);
            store.relink_next(first.prev, survivor)?;
            first.prev
        } else {
            first.next = survivor;
            store.write_block(&first)?;
            first.id
        };

        match boundary {
            Some(mut block) => {
                block.prev = keeper;
                store.write_block(&block)?;
            }
            None if survivor != NULL_BLOCK => store.relink_prev(survivor, keeper)?,
            None => self.end = keeper,
        }
        store.release(&freed)?;

        self.size -= count;
        store.adjust_live_bytes(-(count as i64));
        self.reset_cursor_cache();

        tracing::trace!(
            file = self.name(),
            offset = self.position,
            count,
            freed = freed.len(),
            "removed"
        );
        Ok(count)
    }

    /// Shrink or zero-extend the file to exactly `len` bytes. The cursor is
    /// left where it was.
    pub fn truncate(&mut self, store: &BlockStore, len: u64) -> Result<()> {
        let saved = self.position;
        if len < self.size {
            self.position = len;
            self.remove(store, self.size - len)?;
        } else if len > self.size {
            self.position = len;
            self.fill_gap(store)?;
        }
        self.position = saved;
        Ok(())
    }

    /// Replace the whole content with `bytes`, reusing the existing chain
    pub fn rewrite(&mut self, store: &BlockStore, bytes: &[u8]) -> Result<()> {
        self.position = 0;
        self.write(store, bytes)?;
        self.truncate(store, bytes.len() as u64)
    }
}
