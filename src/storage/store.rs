//! Block Store
//!
//! Owns the backing medium and the in-memory header, and exposes the block
//! layer: full and lazy block loads, block stores, page growth.
//!
//! ## Concurrency:
//! - `medium`: Mutex held around every single block read or block write
//! - `header`: Mutex held for the whole of a structural change (growth,
//!   free-list mutation, allocation) so the free list and page count move
//!   together
//! - Lock order is always `header` → `medium`, never the reverse
//! - All methods use `&self`

use parking_lot::{Mutex, MutexGuard};

use crate::config::{Backend, SyncStrategy};
use crate::error::{Result, TesseraError};

use super::block::{Block, BlockHeader, Geometry, RECORD_HEADER_SIZE};
use super::freelist::FreeList;
use super::header::{Header, HEADER_REGION_SIZE};
use super::medium::Medium;
use super::{BlockId, DIRECTORY_BLOCK, NULL_BLOCK};

/// Block-addressed view of one store file
pub struct BlockStore {
    /// Geometry fixed at creation
    geometry: Geometry,

    /// Header durability policy
    sync_strategy: SyncStrategy,

    /// Raw medium; locked per block read/write
    medium: Mutex<Box<dyn Medium>>,

    /// Source of truth for page count, free list and directory location
    header: Mutex<Header>,
}

impl BlockStore {
    /// Initialize a brand-new store on an empty medium
    ///
    /// 1. Write a header with zero pages
    /// 2. Grow the first page (all of it lands on the free list)
    /// 3. Pop block 1 off the free list for the directory
    pub fn create(
        medium: Box<dyn Medium>,
        geometry: Geometry,
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        let store = Self {
            geometry,
            sync_strategy,
            medium: Mutex::new(medium),
            header: Mutex::new(Header::new(geometry)),
        };

        {
            let mut header = store.header.lock();
            store.flush_header(&header)?;
            store.grow_page(&mut header)?;
        }

        let directory = store.allocate(0, None)?;
        if directory.first != DIRECTORY_BLOCK {
            return Err(TesseraError::invariant(
                directory.first,
                "directory was not placed at its reserved block",
            ));
        }

        tracing::info!(
            capacity = geometry.block_capacity,
            blocks_per_page = geometry.blocks_per_page,
            "created store"
        );
        Ok(store)
    }

    /// Open an existing store, validating its header
    pub fn open(mut medium: Box<dyn Medium>, sync_strategy: SyncStrategy) -> Result<Self> {
        let len = medium.len();
        if len < HEADER_REGION_SIZE {
            return Err(TesseraError::CorruptHeader(format!(
                "store is only {} bytes long",
                len
            )));
        }

        let mut raw = [0u8; HEADER_REGION_SIZE as usize];
        medium.read_at(0, &mut raw)?;
        let header = Header::decode(&raw)?;
        header.validate(len)?;

        if header.page_count == 0 {
            return Err(TesseraError::CorruptHeader(
                "store has no pages".to_string(),
            ));
        }

        tracing::debug!(
            pages = header.page_count,
            free = header.free_count,
            files = header.file_count,
            "opened store"
        );

        Ok(Self {
            geometry: header.geometry,
            sync_strategy,
            medium: Mutex::new(medium),
            header: Mutex::new(header),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn backend(&self) -> Backend {
        self.medium.lock().backend()
    }

    pub fn sync_strategy(&self) -> SyncStrategy {
        self.sync_strategy
    }

    /// Snapshot of the current header
    pub fn header(&self) -> Header {
        *self.header.lock()
    }

    /// Total addressable blocks
    pub fn block_count(&self) -> u64 {
        self.header.lock().block_count()
    }

    /// Current medium length in bytes
    pub fn medium_len(&self) -> u64 {
        self.medium.lock().len()
    }

    // =========================================================================
    // Block Layer
    // =========================================================================

    /// Decode a block's full record
    pub fn load(&self, id: BlockId) -> Result<Block> {
        let mut record = vec![0u8; self.geometry.record_size() as usize];
        {
            let mut medium = self.medium.lock();
            self.check_addressable(id, medium.len())?;
            medium.read_at(self.geometry.block_offset(id), &mut record)?;
        }
        Block::decode(id, &record, &self.geometry)
    }

    /// Decode only a block's header fields (no payload copy)
    pub fn load_lazy(&self, id: BlockId) -> Result<BlockHeader> {
        let mut raw = [0u8; RECORD_HEADER_SIZE];
        {
            let mut medium = self.medium.lock();
            self.check_addressable(id, medium.len())?;
            medium.read_at(self.geometry.block_offset(id), &mut raw)?;
        }
        BlockHeader::decode(id, &raw, &self.geometry)
    }

    /// Persist a full block record, growing the store first if its slot does
    /// not exist yet
    pub fn store(&self, block: &Block) -> Result<()> {
        if !self.is_addressable(block.id) {
            self.ensure_capacity(block.id)?;
        }
        self.write_block(block)
    }

    /// Grow by whole pages until `id` is addressable
    pub fn ensure_capacity(&self, id: BlockId) -> Result<()> {
        let mut header = self.header.lock();
        self.ensure_capacity_locked(&mut header, id)
    }

    /// Whether `id` has a slot in the medium right now
    pub fn is_addressable(&self, id: BlockId) -> bool {
        let len = self.medium.lock().len();
        self.check_addressable(id, len).is_ok()
    }

    /// Initialize every block of a freshly grown page as empty and free,
    /// linked `id -> id + 1`, with the page's last block terminating the run
    pub fn chain_page(&self, first: BlockId) -> Result<()> {
        let count = self.geometry.blocks_per_page;
        let mut page = Vec::with_capacity(self.geometry.page_bytes() as usize);

        for i in 0..count {
            let mut block = Block::empty(first + i, &self.geometry);
            block.next = if i + 1 < count { first + i + 1 } else { NULL_BLOCK };
            block.prev = if i > 0 { first + i - 1 } else { NULL_BLOCK };
            page.extend_from_slice(&block.encode(&self.geometry)?);
        }

        let mut medium = self.medium.lock();
        self.check_addressable(first + count - 1, medium.len())?;
        medium.write_at(self.geometry.block_offset(first), &page)
    }

    /// Write the header and fsync the medium regardless of strategy
    pub fn sync(&self) -> Result<()> {
        let header = self.header.lock();
        let mut medium = self.medium.lock();
        medium.write_at(0, &header.encode())?;
        medium.sync()
    }

    // =========================================================================
    // Crate-internal Structural Operations
    // =========================================================================

    /// Write a full record whose slot is known to exist
    pub(crate) fn write_block(&self, block: &Block) -> Result<()> {
        let record = block.encode(&self.geometry)?;
        let mut medium = self.medium.lock();
        self.check_addressable(block.id, medium.len())?;
        medium.write_at(self.geometry.block_offset(block.id), &record)
    }

    /// Rewrite only a block's header fields, leaving its payload untouched
    pub(crate) fn write_block_header(&self, header: &BlockHeader) -> Result<()> {
        let mut medium = self.medium.lock();
        self.check_addressable(header.id, medium.len())?;
        medium.write_at(self.geometry.block_offset(header.id), &header.encode())
    }

    pub(crate) fn lock_header(&self) -> MutexGuard<'_, Header> {
        self.header.lock()
    }

    pub(crate) fn ensure_capacity_locked(&self, header: &mut Header, id: BlockId) -> Result<()> {
        while id > header.block_count() {
            self.grow_page(header)?;
        }
        Ok(())
    }

    /// Append one page to the medium, chain its blocks and put them on the
    /// free list. Returns the page's first block id.
    pub(crate) fn grow_page(&self, header: &mut Header) -> Result<BlockId> {
        let page_index = header.page_count;
        let new_len = self.geometry.file_len(page_index + 1);

        self.medium.lock().grow(new_len)?;
        header.page_count += 1;

        let first = self.geometry.first_block_of_page(page_index);
        self.chain_page(first)?;
        FreeList::new(self, header).push_run(first, self.geometry.blocks_per_page)?;

        self.flush_header(header)?;

        tracing::debug!(
            pages = header.page_count,
            first_block = first,
            len = new_len,
            "grew store by one page"
        );
        Ok(first)
    }

    /// Write the header; fsync when the strategy asks for it
    pub(crate) fn flush_header(&self, header: &Header) -> Result<()> {
        let mut medium = self.medium.lock();
        medium.write_at(0, &header.encode())?;
        if self.sync_strategy == SyncStrategy::EveryChange {
            medium.sync()?;
        }
        Ok(())
    }

    /// Account for payload bytes added to or removed from files. Persisted
    /// with the next header flush.
    pub(crate) fn adjust_live_bytes(&self, delta: i64) {
        let mut header = self.header.lock();
        header.live_bytes = if delta >= 0 {
            header.live_bytes.saturating_add(delta as u64)
        } else {
            header.live_bytes.saturating_sub(delta.unsigned_abs())
        };
    }

    /// Record where the directory ended up after being persisted
    pub(crate) fn record_directory(&self, file_count: u64, size: u64, last: BlockId) -> Result<()> {
        let mut header = self.header.lock();
        header.file_count = file_count;
        header.directory_size = size;
        header.directory_last_block = last;
        self.flush_header(&header)
    }

    fn check_addressable(&self, id: BlockId, medium_len: u64) -> Result<()> {
        if id == NULL_BLOCK {
            return Err(TesseraError::invariant(id, "block 0 is the chain terminator"));
        }
        let end = self.geometry.block_offset(id) + self.geometry.record_size();
        if end > medium_len {
            return Err(TesseraError::invariant(
                id,
                format!(
                    "record ends at offset {} beyond store length {}",
                    end, medium_len
                ),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("geometry", &self.geometry)
            .field("sync_strategy", &self.sync_strategy)
            .field("header", &*self.header.lock())
            .finish()
    }
}
