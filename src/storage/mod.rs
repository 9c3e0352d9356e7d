//! Storage Module
//!
//! Block-oriented storage engine: a single file carved into fixed-size block
//! records, grown a page at a time, with a free list threaded through the
//! blocks' `next` pointers.
//!
//! ## Responsibilities
//! - Own the backing medium (memory map or positioned stream)
//! - Encode/decode block records at fixed offsets
//! - Grow by whole pages and hand new blocks to the free list
//! - Allocate block chains, reusing free blocks before growing
//! - Split, merge and compact blocks for in-place file edits
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Header (128 bytes)                                         │
//! │   Magic "TESSERA\0" | Version | Geometry | Page count      │
//! │   Live bytes | Free head | Free count | File count         │
//! │   Directory size | Directory last block | CRC32            │
//! ├────────────────────────────────────────────────────────────┤
//! │ Page 0: blocks 1 ..= blocks_per_page                       │
//! │ ┌──────┬────────┬────────┬────────┬─────────┬───────────┐  │
//! │ │Id (8)│Used (8)│Next (8)│Prev (8)│Flags (1)│ Payload   │  │
//! │ └──────┴────────┴────────┴────────┴─────────┴───────────┘  │
//! │ ... (repeated for each block)                              │
//! ├────────────────────────────────────────────────────────────┤
//! │ Page 1: blocks_per_page + 1 ..= 2 * blocks_per_page        │
//! │ ...                                                        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Block `id` lives at `HEADER_REGION_SIZE + (id - 1) * record_size`.
//! Block id 0 is the chain terminator and never addresses a record.

mod allocator;
mod block;
mod chain;
mod freelist;
mod header;
mod mapped;
mod medium;
mod store;
mod stream;

pub use allocator::Extent;
pub use block::{compact, Block, BlockHeader, Geometry, BLOCK_FLAG_LIVE, RECORD_HEADER_SIZE};
pub use header::{Header, FORMAT_VERSION, HEADER_REGION_SIZE, MAGIC};
pub use mapped::MappedMedium;
pub use medium::{open_medium, Medium};
pub use store::BlockStore;
pub use stream::StreamMedium;

pub(crate) use chain::check_link;

// =============================================================================
// Shared Constants
// =============================================================================

/// Identifier of a block. 1-based; 0 terminates a chain.
pub type BlockId = u64;

/// Chain terminator / "no block"
pub const NULL_BLOCK: BlockId = 0;

/// First block of the directory file, reserved when a store is created
pub const DIRECTORY_BLOCK: BlockId = 1;

/// Default payload bytes per block (a full record is then 1 KiB)
pub const DEFAULT_BLOCK_CAPACITY: u64 = 1024 - RECORD_HEADER_SIZE as u64;

/// Default number of blocks added per growth step
pub const DEFAULT_BLOCKS_PER_PAGE: u64 = 64;
