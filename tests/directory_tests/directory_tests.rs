//! Tests for Directory
//!
//! These tests verify:
//! - The directory lives at block 1 and is persisted on creation
//! - Entries survive persist + reload
//! - The header's directory fields are checked on load

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tessera::config::{Backend, SyncStrategy};
use tessera::directory::{Directory, Location, DIRECTORY_NAME};
use tessera::error::TesseraError;
use tessera::storage::{
    open_medium, BlockStore, Geometry, Header, DIRECTORY_BLOCK, HEADER_REGION_SIZE,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_directory() -> (TempDir, PathBuf, BlockStore, Directory) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dir.db");
    let (medium, _) = open_medium(Backend::Stream, &path).unwrap();
    let store = BlockStore::create(medium, Geometry::new(16, 4), SyncStrategy::EveryChange).unwrap();
    let directory = Directory::create(&store).unwrap();
    (temp_dir, path, store, directory)
}

fn reopen_store(path: &Path) -> BlockStore {
    let (medium, existed) = open_medium(Backend::Stream, path).unwrap();
    assert!(existed);
    BlockStore::open(medium, SyncStrategy::EveryChange).unwrap()
}

/// Rewrite the on-disk header through `edit`, keeping its checksum valid
fn edit_header(path: &Path, edit: impl FnOnce(&mut Header)) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut raw = vec![0u8; HEADER_REGION_SIZE as usize];
    file.read_exact(&mut raw).unwrap();

    let mut header = Header::decode(&raw).unwrap();
    edit(&mut header);

    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&header.encode()).unwrap();
    file.sync_all().unwrap();
}

fn location(first_block: u64, size: u64) -> Location {
    Location { first_block, size }
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_create_persists_empty_directory() {
    let (_temp, _path, store, directory) = setup_temp_directory();
    let header = store.header();

    assert!(directory.is_empty());
    assert!(!directory.is_dirty());
    assert_eq!(directory.handle().name(), DIRECTORY_NAME);
    assert_eq!(directory.handle().first_block(), DIRECTORY_BLOCK);

    // Counter snapshot (24 bytes) + empty map count (8 bytes)
    assert_eq!(header.directory_size, 32);
    assert_eq!(header.file_count, 0);
    assert_eq!(header.directory_last_block, directory.handle().end_block());
    assert_eq!(header.live_bytes, 32);
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_insert_lookup_remove() {
    let (_temp, _path, _store, mut directory) = setup_temp_directory();

    directory.insert("notes", location(5, 0));
    assert!(directory.is_dirty());
    assert_eq!(directory.lookup("notes"), Some(location(5, 0)));
    assert!(directory.contains("notes"));

    assert!(directory.update_size("notes", 42));
    assert!(!directory.update_size("notes", 42));
    assert_eq!(directory.get("notes").unwrap().size, 42);

    assert_eq!(directory.remove("notes"), Some(location(5, 42)));
    assert!(matches!(
        directory.get("notes").unwrap_err(),
        TesseraError::KeyNotFound(_)
    ));
}

#[test]
fn test_names_are_sorted() {
    let (_temp, _path, _store, mut directory) = setup_temp_directory();

    for name in ["zeta", "alpha", "mid"] {
        directory.insert(name, location(1, 0));
    }
    assert_eq!(directory.names(), vec!["alpha", "mid", "zeta"]);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_persist_and_reload() {
    let (_temp, path, store, mut directory) = setup_temp_directory();

    directory.insert("a", location(2, 10));
    directory.insert("b", location(3, 0));
    directory.persist(&store).unwrap();
    assert_eq!(store.header().file_count, 2);
    drop(store);

    let store = reopen_store(&path);
    let loaded = Directory::load(&store).unwrap();
    assert_eq!(loaded.entries(), directory.entries());
    assert!(!loaded.is_dirty());
}

#[test]
fn test_large_directory_spans_many_blocks() {
    let (_temp, path, store, mut directory) = setup_temp_directory();

    for i in 0..200u64 {
        directory.insert(format!("file-{:03}", i), location(i + 2, i * 7));
    }
    directory.persist(&store).unwrap();

    let chain = store.chain(DIRECTORY_BLOCK).unwrap();
    assert!(chain.len() > 100);
    drop(store);

    let store = reopen_store(&path);
    let loaded = Directory::load(&store).unwrap();
    assert_eq!(loaded.len(), 200);
    assert_eq!(loaded.lookup("file-123"), Some(location(125, 861)));
}

#[test]
fn test_shrinking_directory_returns_blocks() {
    let (_temp, _path, store, mut directory) = setup_temp_directory();

    for i in 0..50u64 {
        directory.insert(format!("f{}", i), location(1, 0));
    }
    directory.persist(&store).unwrap();
    let long_chain = store.chain(DIRECTORY_BLOCK).unwrap().len();

    for i in 0..50u64 {
        directory.remove(&format!("f{}", i));
    }
    directory.persist(&store).unwrap();

    assert_eq!(store.chain(DIRECTORY_BLOCK).unwrap().len(), 2);
    assert!(store.header().free_count >= (long_chain - 2) as u64);
    assert_eq!(store.header().directory_size, 32);
}

#[test]
fn test_directory_size_mismatch_is_corrupt_header() {
    let (_temp, path, store, directory) = setup_temp_directory();
    drop(directory);
    drop(store);

    edit_header(&path, |header| header.directory_size += 1);

    let store = reopen_store(&path);
    let err = Directory::load(&store).unwrap_err();
    assert!(matches!(err, TesseraError::CorruptHeader(_)));
}

#[test]
fn test_file_count_mismatch_is_corrupt_header() {
    let (_temp, path, store, mut directory) = setup_temp_directory();
    directory.insert("only", location(2, 0));
    directory.persist(&store).unwrap();
    drop(store);

    edit_header(&path, |header| header.file_count = 5);

    let store = reopen_store(&path);
    let err = Directory::load(&store).unwrap_err();
    assert!(matches!(err, TesseraError::CorruptHeader(_)));
}
