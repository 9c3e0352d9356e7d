//! File handle
//!
//! In-memory descriptor of one open file: where its chain starts and ends,
//! how long it is, and where the cursor sits.

use std::io::SeekFrom;

use crate::error::{Result, TesseraError};
use crate::storage::{check_link, BlockHeader, BlockId, BlockStore, NULL_BLOCK};

/// Open file descriptor
#[derive(Debug, Clone)]
pub struct FileHandle {
    name: String,

    /// Head of the chain; never changes while the file exists
    pub(super) first: BlockId,

    /// Tail of the chain
    pub(super) end: BlockId,

    /// Sum of `used` over the chain
    pub(super) size: u64,

    /// Logical byte offset of the cursor; may exceed `size`
    pub(super) position: u64,

    /// Block the cursor was last resolved to
    pub(super) current: BlockId,

    /// Logical offset of `current`'s first payload byte
    pub(super) current_start: u64,

    /// Change counter of the file when this handle last saw it
    version: u64,
}

/// How `locate` resolves an offset that falls exactly on a block boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Landing {
    /// The block that holds the byte at the offset (the tail at end of file)
    Forward,

    /// The first block whose payload ends at or after the offset
    Backward,
}

impl FileHandle {
    /// Handle on a freshly allocated, empty file
    pub(crate) fn new(name: impl Into<String>, first: BlockId) -> Self {
        Self {
            name: name.into(),
            first,
            end: first,
            size: 0,
            position: 0,
            current: first,
            current_start: 0,
            version: 0,
        }
    }

    /// Handle on an existing chain. Size and tail are recomputed by walking
    /// the chain lazily; every block must be live and correctly back-linked.
    pub(crate) fn attach(store: &BlockStore, name: impl Into<String>, first: BlockId) -> Result<Self> {
        let limit = store.block_count();
        let mut size = 0u64;
        let mut end = first;
        let mut expected_prev = None;
        let mut visited = 0u64;
        let mut id = first;

        while id != NULL_BLOCK {
            visited += 1;
            if visited > limit {
                return Err(TesseraError::invariant(
                    first,
                    "chain is longer than the store (cycle)",
                ));
            }

            let block = store.load_lazy(id)?;
            check_link(&block, expected_prev)?;
            size += block.used;
            end = id;
            expected_prev = Some(id);
            id = block.next;
        }

        let mut handle = Self::new(name, first);
        handle.end = end;
        handle.size = size;
        Ok(handle)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_block(&self) -> BlockId {
        self.first
    }

    pub fn end_block(&self) -> BlockId {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Block the cursor was last resolved to
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Re-read size and tail from the chain after another handle changed the
    /// file. The cursor stays where it was.
    pub(crate) fn refresh(&mut self, store: &BlockStore) -> Result<()> {
        let fresh = Self::attach(store, self.name.as_str(), self.first)?;
        self.end = fresh.end;
        self.size = fresh.size;
        self.reset_cursor_cache();
        Ok(())
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    /// Move the cursor. Seeking past the end is allowed; the gap is
    /// zero-filled by the next write or insert.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        let target = target.ok_or_else(|| {
            TesseraError::InvalidArgument(format!(
                "seek to {:?} from position {} (size {}) leaves the file",
                pos, self.position, self.size
            ))
        })?;

        self.position = target;
        Ok(target)
    }

    /// Forget the cached block after the chain changed shape
    pub(super) fn reset_cursor_cache(&mut self) {
        self.current = self.first;
        self.current_start = 0;
    }

    /// Resolve logical offset `pos` to a block and that block's start offset.
    ///
    /// Walks forward from the cached block when it lies at or before `pos`,
    /// otherwise from the head. Errors if the chain ends before `pos`.
    pub(super) fn locate(
        &mut self,
        store: &BlockStore,
        pos: u64,
        landing: Landing,
    ) -> Result<(BlockHeader, u64)> {
        let from_cache = match landing {
            Landing::Forward => self.current_start <= pos,
            Landing::Backward => self.current_start < pos,
        };
        let (mut id, mut start) = if from_cache {
            (self.current, self.current_start)
        } else {
            (self.first, 0)
        };

        let limit = store.block_count();
        let mut steps = 0u64;
        loop {
            let block = store.load_lazy(id)?;
            if !block.is_live() {
                return Err(TesseraError::invariant(
                    block.id,
                    format!("free block inside the chain of {}", self.name),
                ));
            }
            let end = start + block.used;

            let advance = match landing {
                Landing::Forward => pos >= end,
                Landing::Backward => pos > end,
            };
            if !advance || block.next == NULL_BLOCK {
                if pos > end {
                    return Err(TesseraError::invariant(
                        block.id,
                        format!(
                            "chain of {} ends at byte {} before offset {}",
                            self.name, end, pos
                        ),
                    ));
                }
                self.current = block.id;
                self.current_start = start;
                return Ok((block, start));
            }

            steps += 1;
            if steps > limit {
                return Err(TesseraError::invariant(
                    self.first,
                    "chain is longer than the store (cycle)",
                ));
            }
            id = block.next;
            start = end;
        }
    }
}
