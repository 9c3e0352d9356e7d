//! Directory
//!
//! Maps file names to the first block of their chain. The directory is
//! itself stored as a file whose chain starts at the reserved block 1, so it
//! survives restarts without any out-of-band metadata.
//!
//! ## Persisted content
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────────────────┐
//! │ Page count   │ File count   │ Free head    │ SerialMap<String,    │
//! │ u64 LE       │ u64 LE       │ u64 LE       │           Location>  │
//! └──────────────┴──────────────┴──────────────┴──────────────────────┘
//! ```
//! The three counters are a snapshot taken just before the directory was
//! rewritten. The store header stays authoritative; the snapshot is only
//! compared against it for diagnostics.

use std::collections::HashMap;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::file::FileHandle;
use crate::map::SerialMap;
use crate::storage::{BlockId, BlockStore, DIRECTORY_BLOCK};

/// Name under which the directory's own chain is tracked
pub const DIRECTORY_NAME: &str = "__directory__";

/// Bytes of the counter snapshot ahead of the map
const SNAPSHOT_SIZE: usize = 24;

/// Where a file lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Head of the file's chain
    pub first_block: BlockId,
    /// File size in bytes at the last directory update
    pub size: u64,
}

/// Name → location index, backed by its own block chain
#[derive(Debug)]
pub struct Directory {
    handle: FileHandle,
    entries: SerialMap<String, Location>,
    /// Entries changed since the last persist
    dirty: bool,
    /// In-memory change counters, keyed by first block
    versions: HashMap<BlockId, u64>,
    /// Last counter handed out
    clock: u64,
}

impl Directory {
    /// Empty directory for a freshly created store. Block 1 must already be
    /// allocated.
    pub fn create(store: &BlockStore) -> Result<Self> {
        let mut directory = Self {
            handle: FileHandle::new(DIRECTORY_NAME, DIRECTORY_BLOCK),
            entries: SerialMap::new(),
            dirty: true,
            versions: HashMap::new(),
            clock: 0,
        };
        directory.persist(store)?;
        Ok(directory)
    }

    /// Read the directory back from block 1
    pub fn load(store: &BlockStore) -> Result<Self> {
        let header = store.header();
        let mut handle = FileHandle::attach(store, DIRECTORY_NAME, DIRECTORY_BLOCK)?;

        if handle.size() != header.directory_size {
            return Err(TesseraError::CorruptHeader(format!(
                "directory chain holds {} bytes, header records {}",
                handle.size(),
                header.directory_size
            )));
        }
        if handle.end_block() != header.directory_last_block {
            return Err(TesseraError::CorruptHeader(format!(
                "directory chain ends at block {}, header records {}",
                handle.end_block(),
                header.directory_last_block
            )));
        }

        let bytes = handle.read_all(store)?;
        if bytes.len() < SNAPSHOT_SIZE {
            return Err(TesseraError::CorruptHeader(format!(
                "directory is only {} bytes long",
                bytes.len()
            )));
        }

        let mut snapshot = &bytes[..SNAPSHOT_SIZE];
        let (pages, files, free_head) = (
            snapshot.get_u64_le(),
            snapshot.get_u64_le(),
            snapshot.get_u64_le(),
        );
        if pages != header.page_count || free_head != header.free_head {
            tracing::debug!(
                snapshot_pages = pages,
                snapshot_free_head = free_head,
                pages = header.page_count,
                free_head = header.free_head,
                "directory snapshot predates the header"
            );
        }

        let (entries, consumed) = SerialMap::<String, Location>::decode(&bytes, SNAPSHOT_SIZE)?;
        if SNAPSHOT_SIZE + consumed != bytes.len() {
            return Err(TesseraError::Serialization(format!(
                "{} trailing bytes after the directory map",
                bytes.len() - SNAPSHOT_SIZE - consumed
            )));
        }
        if entries.len() as u64 != files || files != header.file_count {
            return Err(TesseraError::CorruptHeader(format!(
                "directory holds {} files, snapshot says {}, header says {}",
                entries.len(),
                files,
                header.file_count
            )));
        }

        tracing::debug!(files = entries.len(), bytes = bytes.len(), "loaded directory");
        Ok(Self {
            handle,
            entries,
            dirty: false,
            versions: HashMap::new(),
            clock: 0,
        })
    }

    /// Rewrite the directory chain and record its new shape in the header
    pub fn persist(&mut self, store: &BlockStore) -> Result<()> {
        let header = store.header();

        let mut buf = Vec::with_capacity(SNAPSHOT_SIZE + 32 * self.entries.len());
        buf.put_u64_le(header.page_count);
        buf.put_u64_le(self.entries.len() as u64);
        buf.put_u64_le(header.free_head);
        self.entries.encode_into(&mut buf)?;

        self.handle.rewrite(store, &buf)?;
        store.record_directory(
            self.entries.len() as u64,
            self.handle.size(),
            self.handle.end_block(),
        )?;
        self.dirty = false;

        tracing::trace!(files = self.entries.len(), bytes = buf.len(), "persisted directory");
        Ok(())
    }

    // =========================================================================
    // Entries
    // =========================================================================

    pub fn lookup(&self, name: &str) -> Option<Location> {
        self.entries.lookup(name).copied()
    }

    /// Location of `name`, or `KeyNotFound`
    pub fn get(&self, name: &str) -> Result<Location> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, location: Location) -> Option<Location> {
        self.dirty = true;
        self.entries.put(name.into(), location)
    }

    pub fn remove(&mut self, name: &str) -> Option<Location> {
        let removed = self.entries.remove(name);
        self.dirty |= removed.is_some();
        removed
    }

    /// Record a file's new size; returns whether anything changed
    pub fn update_size(&mut self, name: &str, size: u64) -> bool {
        match self.entries.lookup_mut(name) {
            Some(location) if location.size != size => {
                location.size = size;
                self.dirty = true;
                true
            }
            _ => false,
        }
    }

    /// File names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn entries(&self) -> &SerialMap<String, Location> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Handle on the directory's own chain
    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }

    // =========================================================================
    // Change Tracking
    // =========================================================================

    /// Current change counter of the file starting at `first`
    pub fn version(&mut self, first: BlockId) -> u64 {
        match self.versions.get(&first) {
            Some(&version) => version,
            None => self.bump(first),
        }
    }

    /// Record that the file starting at `first` changed; returns its new
    /// counter. Counters are never reused, even across deletes.
    pub fn bump(&mut self, first: BlockId) -> u64 {
        self.clock += 1;
        self.versions.insert(first, self.clock);
        self.clock
    }

    /// Drop the counter of a deleted file
    pub fn forget(&mut self, first: BlockId) {
        self.versions.remove(&first);
    }
}
