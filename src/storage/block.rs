//! Block records
//!
//! A block is the fixed-capacity unit of storage. Each record on disk is a
//! 33-byte header followed by `block_capacity` payload bytes:
//!
//! ```text
//! ┌──────┬────────┬────────┬────────┬─────────┬──────────────────────┐
//! │Id (8)│Used (8)│Next (8)│Prev (8)│Flags (1)│ Payload (capacity)   │
//! └──────┴────────┴────────┴────────┴─────────┴──────────────────────┘
//! ```
//!
//! Only the first `used` payload bytes are meaningful; the rest is slack.

use bytes::{Buf, BufMut};

use crate::error::{Result, TesseraError};

use super::header::HEADER_REGION_SIZE;
use super::{BlockId, NULL_BLOCK};

/// Size of the fixed record header: id + used + next + prev + flags
pub const RECORD_HEADER_SIZE: usize = 8 + 8 + 8 + 8 + 1;

/// Set on every block that belongs to a file chain, clear on free blocks
pub const BLOCK_FLAG_LIVE: u8 = 0x01;

// =============================================================================
// Geometry
// =============================================================================

/// Page/block geometry of a store, fixed at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Payload bytes per block
    pub block_capacity: u64,
    /// Blocks added per growth step
    pub blocks_per_page: u64,
}

impl Geometry {
    pub fn new(block_capacity: u64, blocks_per_page: u64) -> Self {
        Self {
            block_capacity,
            blocks_per_page,
        }
    }

    /// Size of one full block record on disk
    pub fn record_size(&self) -> u64 {
        RECORD_HEADER_SIZE as u64 + self.block_capacity
    }

    /// Size of one page on disk
    pub fn page_bytes(&self) -> u64 {
        self.blocks_per_page * self.record_size()
    }

    /// Byte offset of a block's record
    pub fn block_offset(&self, id: BlockId) -> u64 {
        HEADER_REGION_SIZE + (id - 1) * self.record_size()
    }

    /// Number of addressable blocks in a store of `pages` pages
    pub fn block_count(&self, pages: u64) -> u64 {
        pages * self.blocks_per_page
    }

    /// Exact file length of a store holding `pages` pages
    pub fn file_len(&self, pages: u64) -> u64 {
        HEADER_REGION_SIZE + pages * self.page_bytes()
    }

    /// Whole pages contained in a medium of `len` bytes
    pub fn pages_in(&self, len: u64) -> u64 {
        len.saturating_sub(HEADER_REGION_SIZE) / self.page_bytes()
    }

    /// First block id of the page at zero-based `page_index`
    pub fn first_block_of_page(&self, page_index: u64) -> BlockId {
        page_index * self.blocks_per_page + 1
    }

    /// Blocks needed to hold `len` bytes (at least one)
    pub fn blocks_for(&self, len: u64) -> u64 {
        if len == 0 {
            1
        } else {
            (len + self.block_capacity - 1) / self.block_capacity
        }
    }

    fn capacity(&self) -> usize {
        self.block_capacity as usize
    }
}

// =============================================================================
// Block Header (lazy view)
// =============================================================================

/// Topology-only view of a block, decoded without copying the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub id: BlockId,
    pub used: u64,
    pub next: BlockId,
    pub prev: BlockId,
    pub flags: u8,
}

impl BlockHeader {
    pub fn is_live(&self) -> bool {
        self.flags & BLOCK_FLAG_LIVE != 0
    }

    pub fn is_tail(&self) -> bool {
        self.next == NULL_BLOCK
    }

    /// Encode the 33-byte record header
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.id);
        buf.put_u64_le(self.used);
        buf.put_u64_le(self.next);
        buf.put_u64_le(self.prev);
        buf.put_u8(self.flags);
        out
    }

    /// Decode a record header, checking it against the slot it was read from
    pub fn decode(slot: BlockId, bytes: &[u8], geometry: &Geometry) -> Result<Self> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(TesseraError::invariant(
                slot,
                format!("record header truncated to {} bytes", bytes.len()),
            ));
        }

        let mut buf = bytes;
        let header = Self {
            id: buf.get_u64_le(),
            used: buf.get_u64_le(),
            next: buf.get_u64_le(),
            prev: buf.get_u64_le(),
            flags: buf.get_u8(),
        };

        if header.id != slot {
            return Err(TesseraError::invariant(
                slot,
                format!("slot holds a record for block {}", header.id),
            ));
        }
        if header.used > geometry.block_capacity {
            return Err(TesseraError::invariant(
                slot,
                format!(
                    "used length {} exceeds block capacity {}",
                    header.used, geometry.block_capacity
                ),
            ));
        }

        Ok(header)
    }
}

// =============================================================================
// Block
// =============================================================================

/// A fully loaded block: header plus its whole payload buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    /// Payload bytes actually occupied (`<= capacity`)
    pub used: u64,
    pub next: BlockId,
    pub prev: BlockId,
    pub flags: u8,
    /// Always exactly `block_capacity` bytes long
    pub data: Vec<u8>,
}

impl Block {
    /// A zeroed, unlinked block
    pub fn empty(id: BlockId, geometry: &Geometry) -> Self {
        Self {
            id,
            used: 0,
            next: NULL_BLOCK,
            prev: NULL_BLOCK,
            flags: 0,
            data: vec![0u8; geometry.capacity()],
        }
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            id: self.id,
            used: self.used,
            next: self.next,
            prev: self.prev,
            flags: self.flags,
        }
    }

    /// The occupied part of the payload
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.used as usize]
    }

    /// Unused capacity at the end of the payload
    pub fn spare(&self) -> u64 {
        self.data.len() as u64 - self.used
    }

    pub fn is_live(&self) -> bool {
        self.flags & BLOCK_FLAG_LIVE != 0
    }

    pub fn is_tail(&self) -> bool {
        self.next == NULL_BLOCK
    }

    /// Append bytes into the spare capacity; returns how many fit
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let start = self.used as usize;
        let take = bytes.len().min(self.spare() as usize);
        self.data[start..start + take].copy_from_slice(&bytes[..take]);
        self.used += take as u64;
        take
    }

    /// Encode the full record
    pub fn encode(&self, geometry: &Geometry) -> Result<Vec<u8>> {
        if self.data.len() != geometry.capacity() {
            return Err(TesseraError::invariant(
                self.id,
                format!(
                    "payload buffer is {} bytes, expected {}",
                    self.data.len(),
                    geometry.block_capacity
                ),
            ));
        }
        if self.used > geometry.block_capacity {
            return Err(TesseraError::invariant(
                self.id,
                format!("used length {} exceeds capacity", self.used),
            ));
        }

        let mut buf = Vec::with_capacity(geometry.record_size() as usize);
        buf.put_slice(&self.header().encode());
        buf.put_slice(&self.data);
        Ok(buf)
    }

    /// Decode a full record read from `slot`
    pub fn decode(slot: BlockId, bytes: &[u8], geometry: &Geometry) -> Result<Self> {
        let header = BlockHeader::decode(slot, bytes, geometry)?;
        let record = geometry.record_size() as usize;
        if bytes.len() < record {
            return Err(TesseraError::invariant(
                slot,
                format!("record truncated to {} of {} bytes", bytes.len(), record),
            ));
        }

        Ok(Self {
            id: header.id,
            used: header.used,
            next: header.next,
            prev: header.prev,
            flags: header.flags,
            data: bytes[RECORD_HEADER_SIZE..record].to_vec(),
        })
    }
}

/// Remove payload bytes `[start, end)` from a block, shifting the bytes after
/// the range down and shrinking `used`. Out-of-range bounds are clamped.
/// Returns the number of bytes removed.
pub fn compact(block: &mut Block, start: u64, end: u64) -> u64 {
    let end = end.min(block.used);
    if start >= end {
        return 0;
    }

    let (start, end, used) = (start as usize, end as usize, block.used as usize);
    block.data.copy_within(end..used, start);
    let removed = (end - start) as u64;
    block.used -= removed;

    // Keep the slack zeroed so freed bytes never leak into later appends
    let used = block.used as usize;
    block.data[used..].iter_mut().for_each(|b| *b = 0);
    removed
}
