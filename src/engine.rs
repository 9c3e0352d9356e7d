//! Engine Module
//!
//! The document store that coordinates the block store, the directory and
//! open file handles.
//!
//! ## Responsibilities
//! - Create or reopen the store file and its directory
//! - Route file operations to the block layer
//! - Keep directory entries in step with file sizes
//! - Persist the directory according to the sync strategy
//! - Offer whole-store statistics and a consistency check

use std::io::SeekFrom;
use std::path::Path;

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};

use crate::command::{Command, Output};
use crate::config::{Backend, Config, SyncStrategy};
use crate::directory::{Directory, Location, DIRECTORY_NAME};
use crate::error::{Result, TesseraError};
use crate::file::{FileHandle, FileStream};
use crate::storage::{open_medium, BlockId, BlockStore, Geometry, DIRECTORY_BLOCK};

/// The main document store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Mutations** (write/insert/remove/truncate/delete/rename/create):
///   hold `write_lock` exclusively
///   - Must acquire: write_lock → directory → store header → medium
///
/// - **Reads** (read/open_existing/check): hold `write_lock` shared, so a
///   chain is never walked while it is being edited
///   - `open_existing` upgrades only when it must repair a stale size
///
/// - **Handles**: any number may be open on one file. Every mutation bumps
///   the file's change counter; a handle that missed a change re-reads size
///   and tail from the chain before it is used again.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Block layer over the store file (internal locks)
    store: BlockStore,

    /// Name → location index
    directory: Mutex<Directory>,

    /// Shared by readers, exclusive for mutations
    write_lock: RwLock<()>,

    /// Set by `close` so dropping does not sync twice
    closed: bool,
}

/// Whole-store counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub backend: Backend,
    pub block_capacity: u64,
    pub blocks_per_page: u64,
    pub pages: u64,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub live_blocks: u64,
    pub files: u64,
    /// Payload bytes across all files, directory included
    pub live_bytes: u64,
    /// Size of the directory's own file
    pub directory_bytes: u64,
    /// Length of the store file on disk
    pub store_bytes: u64,
}

/// Outcome of `Engine::check`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub total_blocks: u64,
    pub free_blocks: u64,
    /// Blocks reachable from a file chain, directory included
    pub live_blocks: u64,
    pub files: u64,
    /// Payload bytes found by walking every chain
    pub live_bytes: u64,
    /// Blocks neither free nor in any chain
    pub leaked: Vec<BlockId>,
}

impl CheckReport {
    /// Every block is accounted for
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty()
    }
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Open/create the store file
    /// 2. New file: write the header, grow the first page, reserve block 1
    ///    and persist an empty directory
    /// 3. Existing file: validate the header and load the directory
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let (medium, existed) = open_medium(config.backend, &config.path)?;
        let (store, directory) = if existed {
            let store = BlockStore::open(medium, config.sync_strategy)?;
            let configured = Geometry::new(config.block_capacity, config.blocks_per_page);
            if store.geometry() != configured {
                tracing::warn!(
                    stored_capacity = store.geometry().block_capacity,
                    stored_blocks_per_page = store.geometry().blocks_per_page,
                    "store geometry differs from config, using the stored one"
                );
            }
            let directory = Directory::load(&store)?;
            (store, directory)
        } else {
            let geometry = Geometry::new(config.block_capacity, config.blocks_per_page);
            let store = BlockStore::create(medium, geometry, config.sync_strategy)?;
            let directory = Directory::create(&store)?;
            (store, directory)
        };

        tracing::info!(
            path = %config.path.display(),
            backend = ?config.backend,
            files = directory.len(),
            pages = store.header().page_count,
            "opened engine"
        );

        Ok(Self {
            config,
            store,
            directory: Mutex::new(directory),
            write_lock: RwLock::new(()),
            closed: false,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified store file
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().path(path).build())
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub fn execute(&self, command: Command) -> Result<Output> {
        tracing::debug!(kind = command.kind(), "executing command");

        match command {
            Command::Open { name } => {
                let handle = self.open_file(&name)?;
                Ok(Output::Location(Location {
                    first_block: handle.first_block(),
                    size: handle.size(),
                }))
            }
            Command::Read { name, offset, len } => {
                let mut handle = self.open_existing(&name)?;
                handle.seek(SeekFrom::Start(offset))?;
                Ok(Output::Bytes(self.read(&mut handle, len.unwrap_or(u64::MAX))?))
            }
            Command::Write { name, offset, data } => {
                let mut handle = self.open_file(&name)?;
                handle.seek(SeekFrom::Start(offset))?;
                Ok(Output::Count(self.write(&mut handle, &data)?))
            }
            Command::Append { name, data } => {
                let mut handle = self.open_file(&name)?;
                handle.seek(SeekFrom::End(0))?;
                Ok(Output::Count(self.write(&mut handle, &data)?))
            }
            Command::Insert { name, offset, data } => {
                let mut handle = self.open_file(&name)?;
                Ok(Output::Count(self.insert(&mut handle, offset, &data)?))
            }
            Command::Remove { name, offset, len } => {
                let mut handle = self.open_existing(&name)?;
                handle.seek(SeekFrom::Start(offset))?;
                Ok(Output::Count(self.remove(&mut handle, len)?))
            }
            Command::Delete { name } => Ok(Output::Deleted(self.delete(&name)?)),
            Command::Rename { from, to } => {
                self.rename(&from, &to)?;
                Ok(Output::Done)
            }
            Command::List => Ok(Output::Names(self.file_names())),
            Command::Stat { name } => self
                .lookup(&name)
                .map(Output::Location)
                .ok_or(TesseraError::KeyNotFound(name)),
        }
    }

    // =========================================================================
    // Directory Operations
    // =========================================================================

    /// Open a file, creating it empty if it does not exist
    pub fn open_file(&self, name: &str) -> Result<FileHandle> {
        validate_name(name)?;
        let _write_guard = self.write_lock.write();

        if let Some(location) = self.lookup(name) {
            let handle = self.attach(name, location)?;
            if handle.size() != location.size {
                self.repair_size(&handle, location)?;
            }
            return Ok(handle);
        }

        let mut directory = self.directory.lock();
        let extent = self.store.allocate(0, None)?;
        directory.insert(
            name,
            Location {
                first_block: extent.first,
                size: 0,
            },
        );
        self.after_directory_change(&mut directory)?;

        let mut handle = FileHandle::new(name, extent.first);
        handle.set_version(directory.bump(extent.first));

        tracing::debug!(file = name, first_block = extent.first, "created file");
        Ok(handle)
    }

    /// Open a file that must already exist
    pub fn open_existing(&self, name: &str) -> Result<FileHandle> {
        let read_guard = self.write_lock.upgradable_read();
        let location = self
            .lookup(name)
            .ok_or_else(|| TesseraError::KeyNotFound(name.to_string()))?;

        let handle = self.attach(name, location)?;
        if handle.size() != location.size {
            let _write_guard = RwLockUpgradableReadGuard::upgrade(read_guard);
            self.repair_size(&handle, location)?;
        }
        Ok(handle)
    }

    pub fn lookup(&self, name: &str) -> Option<Location> {
        self.directory.lock().lookup(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.directory.lock().contains(name)
    }

    /// File names in sorted order
    pub fn file_names(&self) -> Vec<String> {
        self.directory.lock().names()
    }

    pub fn file_count(&self) -> usize {
        self.directory.lock().len()
    }

    /// Delete a file and return its blocks to the free list.
    /// Returns false if there was no such file.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let _write_guard = self.write_lock.write();
        let mut directory = self.directory.lock();

        let location = match directory.lookup(name) {
            Some(location) => location,
            None => return Ok(false),
        };

        let chain = self.store.chain(location.first_block)?;
        let ids: Vec<BlockId> = chain.iter().map(|block| block.id).collect();
        let bytes: u64 = chain.iter().map(|block| block.used).sum();

        directory.remove(name);
        directory.forget(location.first_block);
        self.store.release(&ids)?;
        self.store.adjust_live_bytes(-(bytes as i64));
        self.after_directory_change(&mut directory)?;

        tracing::debug!(file = name, blocks = ids.len(), bytes, "deleted file");
        Ok(true)
    }

    /// Rename a file. Handles opened under the old name must be reopened.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        validate_name(to)?;
        let _write_guard = self.write_lock.write();
        let mut directory = self.directory.lock();

        if directory.contains(to) {
            return Err(TesseraError::FileExists(to.to_string()));
        }
        let location = directory
            .remove(from)
            .ok_or_else(|| TesseraError::KeyNotFound(from.to_string()))?;
        directory.insert(to, location);
        self.after_directory_change(&mut directory)?;

        tracing::debug!(from, to, "renamed file");
        Ok(())
    }

    // =========================================================================
    // File Operations
    // =========================================================================

    /// Read up to `len` bytes at the handle's cursor (clamped to the file end)
    pub fn read(&self, handle: &mut FileHandle, len: u64) -> Result<Vec<u8>> {
        let _read_guard = self.write_lock.read();
        self.ensure_current(handle)?;
        handle.read(&self.store, len)
    }

    /// Read into `buf` at the handle's cursor; returns bytes read
    pub fn read_into(&self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        let _read_guard = self.write_lock.read();
        self.ensure_current(handle)?;
        handle.read_into(&self.store, buf)
    }

    /// Whole file content
    pub fn read_all(&self, handle: &mut FileHandle) -> Result<Vec<u8>> {
        let _read_guard = self.write_lock.read();
        self.ensure_current(handle)?;
        handle.read_all(&self.store)
    }

    /// Overwrite/extend at the handle's cursor
    pub fn write(&self, handle: &mut FileHandle, data: &[u8]) -> Result<u64> {
        let _write_guard = self.write_lock.write();
        self.ensure_current(handle)?;
        let written = handle.write(&self.store, data)?;
        self.record_size(handle)?;
        Ok(written)
    }

    /// Write `len` zero bytes at the handle's cursor
    pub fn write_zeros(&self, handle: &mut FileHandle, len: u64) -> Result<u64> {
        let _write_guard = self.write_lock.write();
        self.ensure_current(handle)?;
        let written = handle.write_zeros(&self.store, len)?;
        self.record_size(handle)?;
        Ok(written)
    }

    /// Splice bytes in at `offset`; the cursor ends after them
    pub fn insert(&self, handle: &mut FileHandle, offset: u64, data: &[u8]) -> Result<u64> {
        let _write_guard = self.write_lock.write();
        self.ensure_current(handle)?;
        let inserted = handle.insert(&self.store, offset, data)?;
        self.record_size(handle)?;
        Ok(inserted)
    }

    /// Splice `len` zero bytes in at `offset`
    pub fn insert_zeros(&self, handle: &mut FileHandle, offset: u64, len: u64) -> Result<u64> {
        let _write_guard = self.write_lock.write();
        self.ensure_current(handle)?;
        let inserted = handle.insert_zeros(&self.store, offset, len)?;
        self.record_size(handle)?;
        Ok(inserted)
    }

    /// Delete up to `len` bytes at the handle's cursor (clamped to the end)
    pub fn remove(&self, handle: &mut FileHandle, len: u64) -> Result<u64> {
        let _write_guard = self.write_lock.write();
        self.ensure_current(handle)?;
        let removed = handle.remove(&self.store, len)?;
        self.record_size(handle)?;
        Ok(removed)
    }

    /// Shrink or zero-extend to exactly `len` bytes
    pub fn truncate(&self, handle: &mut FileHandle, len: u64) -> Result<()> {
        let _write_guard = self.write_lock.write();
        self.ensure_current(handle)?;
        handle.truncate(&self.store, len)?;
        self.record_size(handle)
    }

    /// Move the handle's cursor. `SeekFrom::End` counts from the file's
    /// current size, even if another handle changed it.
    pub fn seek(&self, handle: &mut FileHandle, pos: SeekFrom) -> Result<u64> {
        let _read_guard = self.write_lock.read();
        self.ensure_current(handle)?;
        handle.seek(pos)
    }

    /// `Read + Write + Seek` view of an open file
    pub fn stream<'a>(&'a self, handle: &'a mut FileHandle) -> FileStream<'a> {
        FileStream::new(self, handle)
    }

    // =========================================================================
    // Store Operations
    // =========================================================================

    /// Persist the directory if needed, write the header and fsync
    pub fn sync(&self) -> Result<()> {
        let _write_guard = self.write_lock.write();
        let mut directory = self.directory.lock();
        if directory.is_dirty() {
            directory.persist(&self.store)?;
        }
        self.store.sync()
    }

    /// Close the engine gracefully
    ///
    /// Persists the directory and syncs the store file
    pub fn close(mut self) -> Result<()> {
        self.sync()?;
        self.closed = true;
        tracing::info!(path = %self.config.path.display(), "closed engine");
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        let directory = self.directory.lock();
        let header = self.store.header();
        let total_blocks = header.block_count();

        StoreStats {
            backend: self.store.backend(),
            block_capacity: header.geometry.block_capacity,
            blocks_per_page: header.geometry.blocks_per_page,
            pages: header.page_count,
            total_blocks,
            free_blocks: header.free_count,
            live_blocks: total_blocks - header.free_count,
            files: directory.len() as u64,
            live_bytes: header.live_bytes,
            directory_bytes: directory.handle().size(),
            store_bytes: self.store.medium_len(),
        }
    }

    /// Walk the free list and every file chain and confirm they partition the
    /// store. Structural damage is an error; blocks that are merely
    /// unreachable are reported as leaked.
    pub fn check(&self) -> Result<CheckReport> {
        let _read_guard = self.write_lock.read();
        let directory = self.directory.lock();
        let header = self.store.header();
        let total_blocks = header.block_count();

        #[derive(Clone, Copy, PartialEq)]
        enum Owner {
            Unseen,
            Free,
            File,
        }
        let mut owners = vec![Owner::Unseen; total_blocks as usize + 1];

        let free = self.store.free_blocks()?;
        if free.len() as u64 != header.free_count {
            return Err(TesseraError::invariant(
                header.free_head,
                format!(
                    "free list holds {} blocks, header counts {}",
                    free.len(),
                    header.free_count
                ),
            ));
        }
        for &id in &free {
            if id > total_blocks || owners[id as usize] != Owner::Unseen {
                return Err(TesseraError::invariant(id, "free list revisits or overruns"));
            }
            if self.store.load_lazy(id)?.is_live() {
                return Err(TesseraError::invariant(id, "live block on the free list"));
            }
            owners[id as usize] = Owner::Free;
        }

        let mut chains = vec![(
            DIRECTORY_NAME.to_string(),
            DIRECTORY_BLOCK,
            directory.handle().size(),
        )];
        chains.extend(
            directory
                .entries()
                .iter()
                .map(|(name, location)| (name.clone(), location.first_block, location.size)),
        );

        let mut live_blocks = 0u64;
        let mut live_bytes = 0u64;
        for (name, first, expected_size) in &chains {
            let chain = self.store.chain(*first)?;
            let mut size = 0u64;
            for block in &chain {
                if block.id > total_blocks {
                    return Err(TesseraError::invariant(block.id, "chain runs past the store"));
                }
                match owners[block.id as usize] {
                    Owner::Unseen => owners[block.id as usize] = Owner::File,
                    Owner::Free => {
                        return Err(TesseraError::invariant(
                            block.id,
                            format!("block of {} is also on the free list", name),
                        ))
                    }
                    Owner::File => {
                        return Err(TesseraError::invariant(
                            block.id,
                            format!("block of {} also belongs to another file", name),
                        ))
                    }
                }
                size += block.used;
            }

            if size != *expected_size {
                return Err(TesseraError::invariant(
                    *first,
                    format!("{} holds {} bytes, directory records {}", name, size, expected_size),
                ));
            }
            live_blocks += chain.len() as u64;
            live_bytes += size;
        }

        let leaked: Vec<BlockId> = (1..=total_blocks)
            .filter(|&id| owners[id as usize] == Owner::Unseen)
            .collect();
        if !leaked.is_empty() {
            tracing::warn!(count = leaked.len(), "blocks are neither free nor in a file");
        }
        if live_bytes != header.live_bytes {
            tracing::warn!(
                counted = live_bytes,
                recorded = header.live_bytes,
                "live byte count drifted"
            );
        }

        Ok(CheckReport {
            total_blocks,
            free_blocks: free.len() as u64,
            live_blocks,
            files: directory.len() as u64,
            live_bytes,
            leaked,
        })
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the store file path
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the block layer
    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Attach a handle to a directory entry, stamped with the file's
    /// current change counter
    fn attach(&self, name: &str, location: Location) -> Result<FileHandle> {
        let mut handle = FileHandle::attach(&self.store, name, location.first_block)?;
        handle.set_version(self.directory.lock().version(location.first_block));
        Ok(handle)
    }

    /// The chain's size wins over a stale recorded one. Caller holds
    /// `write_lock` exclusively.
    fn repair_size(&self, handle: &FileHandle, location: Location) -> Result<()> {
        tracing::warn!(
            file = handle.name(),
            recorded = location.size,
            actual = handle.size(),
            "directory size was stale, using the chain's"
        );
        let mut directory = self.directory.lock();
        directory.update_size(handle.name(), handle.size());
        self.after_directory_change(&mut directory)
    }

    /// The handle must still name a live file with the same chain. A handle
    /// that missed another handle's change is brought up to date first.
    fn ensure_current(&self, handle: &mut FileHandle) -> Result<()> {
        let mut directory = self.directory.lock();
        let first = match directory.lookup(handle.name()) {
            Some(location) if location.first_block == handle.first_block() => location.first_block,
            _ => return Err(TesseraError::KeyNotFound(handle.name().to_string())),
        };

        let version = directory.version(first);
        if handle.version() != version {
            handle.refresh(&self.store)?;
            handle.set_version(version);
            tracing::trace!(file = handle.name(), size = handle.size(), "refreshed handle");
        }
        Ok(())
    }

    /// Stamp the handle with a new change counter and record its size
    fn record_size(&self, handle: &mut FileHandle) -> Result<()> {
        let mut directory = self.directory.lock();
        handle.set_version(directory.bump(handle.first_block()));
        if directory.update_size(handle.name(), handle.size()) {
            self.after_directory_change(&mut directory)?;
        }
        Ok(())
    }

    fn after_directory_change(&self, directory: &mut Directory) -> Result<()> {
        match self.config.sync_strategy {
            SyncStrategy::EveryChange => directory.persist(&self.store),
            SyncStrategy::OnClose => Ok(()),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.sync() {
            tracing::error!(error = %e, "failed to sync store on drop");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.config.path)
            .field("store", &self.store)
            .finish()
    }
}

/// File names must be non-empty and may not shadow the directory
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TesseraError::InvalidArgument("file name is empty".to_string()));
    }
    if name == DIRECTORY_NAME {
        return Err(TesseraError::InvalidArgument(format!(
            "{} is reserved",
            DIRECTORY_NAME
        )));
    }
    Ok(())
}
