//! Store header
//!
//! The header occupies the first 128 bytes of the store file and is the
//! single source of truth for the store's structure. It is always the last
//! thing written after a structural change (growth, free-list mutation,
//! directory update).
//!
//! ## Layout (little endian)
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Magic "TESSERA\0" (8) │ Version u32 (4) │ Reserved (4)    │
//! │ Block capacity u64    │ Blocks per page u64               │
//! │ Page count u64        │ Live bytes u64                    │
//! │ Free head u64         │ Free count u64                    │
//! │ File count u64        │ Directory size u64                │
//! │ Directory last block u64                                  │
//! │ CRC32 of bytes 0..88 (4) │ Zero padding (36)              │
//! └──────────────────────────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut};

use crate::error::{Result, TesseraError};

use super::block::Geometry;
use super::BlockId;

/// Magic bytes identifying a Tessera store file
pub const MAGIC: &[u8; 8] = b"TESSERA\0";

/// Current store format version
pub const FORMAT_VERSION: u32 = 1;

/// Bytes reserved at the start of the file for the header
pub const HEADER_REGION_SIZE: u64 = 128;

/// Bytes covered by the checksum
const CHECKSUMMED_LEN: usize = 88;

/// In-memory copy of the persisted store header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub geometry: Geometry,
    /// Whole pages in the store; never decreases
    pub page_count: u64,
    /// Payload bytes stored across all files, directory included
    pub live_bytes: u64,
    /// First block of the free list (0 = empty)
    pub free_head: BlockId,
    /// Blocks currently on the free list
    pub free_count: u64,
    /// Files recorded in the directory
    pub file_count: u64,
    /// Byte size of the directory file
    pub directory_size: u64,
    /// Tail block of the directory file
    pub directory_last_block: BlockId,
}

impl Header {
    /// Header of a store that has not grown its first page yet
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            page_count: 0,
            live_bytes: 0,
            free_head: 0,
            free_count: 0,
            file_count: 0,
            directory_size: 0,
            directory_last_block: 0,
        }
    }

    /// Total addressable blocks
    pub fn block_count(&self) -> u64 {
        self.geometry.block_count(self.page_count)
    }

    /// Encode into the fixed header region
    pub fn encode(&self) -> [u8; HEADER_REGION_SIZE as usize] {
        let mut out = [0u8; HEADER_REGION_SIZE as usize];
        {
            let mut buf = &mut out[..CHECKSUMMED_LEN];
            buf.put_slice(MAGIC);
            buf.put_u32_le(FORMAT_VERSION);
            buf.put_u32_le(0);
            buf.put_u64_le(self.geometry.block_capacity);
            buf.put_u64_le(self.geometry.blocks_per_page);
            buf.put_u64_le(self.page_count);
            buf.put_u64_le(self.live_bytes);
            buf.put_u64_le(self.free_head);
            buf.put_u64_le(self.free_count);
            buf.put_u64_le(self.file_count);
            buf.put_u64_le(self.directory_size);
            buf.put_u64_le(self.directory_last_block);
        }

        let crc = crc32fast::hash(&out[..CHECKSUMMED_LEN]);
        out[CHECKSUMMED_LEN..CHECKSUMMED_LEN + 4].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode and check signature, version and checksum
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_REGION_SIZE as usize {
            return Err(TesseraError::CorruptHeader(format!(
                "header truncated to {} bytes",
                bytes.len()
            )));
        }

        if &bytes[0..8] != MAGIC {
            return Err(TesseraError::CorruptHeader(format!(
                "invalid signature: expected {:?}, got {:?}",
                MAGIC,
                &bytes[0..8]
            )));
        }

        let stored_crc = u32::from_le_bytes([
            bytes[CHECKSUMMED_LEN],
            bytes[CHECKSUMMED_LEN + 1],
            bytes[CHECKSUMMED_LEN + 2],
            bytes[CHECKSUMMED_LEN + 3],
        ]);
        let computed_crc = crc32fast::hash(&bytes[..CHECKSUMMED_LEN]);
        if stored_crc != computed_crc {
            return Err(TesseraError::CorruptHeader(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }

        let mut buf = &bytes[8..CHECKSUMMED_LEN];
        let version = buf.get_u32_le();
        if version != FORMAT_VERSION {
            return Err(TesseraError::CorruptHeader(format!(
                "unsupported format version {}",
                version
            )));
        }
        let _reserved = buf.get_u32_le();

        let geometry = Geometry::new(buf.get_u64_le(), buf.get_u64_le());
        Ok(Self {
            geometry,
            page_count: buf.get_u64_le(),
            live_bytes: buf.get_u64_le(),
            free_head: buf.get_u64_le(),
            free_count: buf.get_u64_le(),
            file_count: buf.get_u64_le(),
            directory_size: buf.get_u64_le(),
            directory_last_block: buf.get_u64_le(),
        })
    }

    /// Reject structurally impossible values for a medium of `medium_len` bytes
    pub fn validate(&self, medium_len: u64) -> Result<()> {
        if self.geometry.block_capacity == 0 || self.geometry.blocks_per_page == 0 {
            return Err(TesseraError::CorruptHeader(format!(
                "impossible geometry: capacity {}, blocks per page {}",
                self.geometry.block_capacity, self.geometry.blocks_per_page
            )));
        }

        let expected_len = self.geometry.file_len(self.page_count);
        if medium_len < expected_len {
            return Err(TesseraError::CorruptHeader(format!(
                "store is {} bytes but {} pages need {} bytes",
                medium_len, self.page_count, expected_len
            )));
        }

        let blocks = self.block_count();
        if self.free_head > blocks {
            return Err(TesseraError::CorruptHeader(format!(
                "free-list head {} beyond block count {}",
                self.free_head, blocks
            )));
        }
        if self.free_count > blocks {
            return Err(TesseraError::CorruptHeader(format!(
                "free count {} beyond block count {}",
                self.free_count, blocks
            )));
        }
        if (self.free_head == 0) != (self.free_count == 0) {
            return Err(TesseraError::CorruptHeader(format!(
                "free-list head {} disagrees with free count {}",
                self.free_head, self.free_count
            )));
        }
        if self.directory_last_block > blocks {
            return Err(TesseraError::CorruptHeader(format!(
                "directory last block {} beyond block count {}",
                self.directory_last_block, blocks
            )));
        }

        Ok(())
    }
}
