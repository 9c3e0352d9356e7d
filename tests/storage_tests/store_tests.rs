//! Tests for BlockStore
//!
//! These tests verify:
//! - Store creation (first page, reserved directory block)
//! - Header persistence and validation on reopen
//! - Full and lazy block loads, bounds checks
//! - Growth on store of an unaddressable block
//! - Split and merge of blocks

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::TempDir;
use tessera::config::{Backend, SyncStrategy};
use tessera::error::TesseraError;
use tessera::storage::{
    open_medium, Block, BlockStore, Geometry, Medium, BLOCK_FLAG_LIVE, DIRECTORY_BLOCK,
    HEADER_REGION_SIZE, NULL_BLOCK,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn geometry() -> Geometry {
    Geometry::new(16, 4)
}

fn setup_temp_store(backend: Backend) -> (TempDir, BlockStore) {
    let temp_dir = TempDir::new().unwrap();
    let (medium, existed) = open_medium(backend, &temp_dir.path().join("store.db")).unwrap();
    assert!(!existed);
    let store = BlockStore::create(medium, geometry(), SyncStrategy::EveryChange).unwrap();
    (temp_dir, store)
}

fn reopen(path: &Path, backend: Backend) -> tessera::Result<BlockStore> {
    let (medium, existed) = open_medium(backend, path)?;
    assert!(existed);
    BlockStore::open(medium, SyncStrategy::EveryChange)
}

fn overwrite_at(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_create_grows_first_page() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);
    let header = store.header();

    assert_eq!(header.page_count, 1);
    assert_eq!(header.block_count(), 4);
    assert_eq!(store.medium_len(), geometry().file_len(1));
}

#[test]
fn test_create_reserves_directory_block() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);

    let block = store.load(DIRECTORY_BLOCK).unwrap();
    assert!(block.is_live());
    assert_eq!(block.used, 0);
    assert_eq!(block.next, NULL_BLOCK);
    assert_eq!(block.prev, NULL_BLOCK);
}

#[test]
fn test_fresh_page_is_chained_onto_free_list() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);

    assert_eq!(store.free_blocks().unwrap(), vec![2, 3, 4]);
    assert_eq!(store.header().free_count, 3);
    assert_eq!(store.load_lazy(2).unwrap().next, 3);
    assert_eq!(store.load_lazy(4).unwrap().next, NULL_BLOCK);
    assert!(!store.load_lazy(3).unwrap().is_live());
}

#[test]
fn test_stream_backend_creates_identical_layout() {
    let (_temp_a, mapped) = setup_temp_store(Backend::Mapped);
    let (_temp_b, stream) = setup_temp_store(Backend::Stream);

    assert_eq!(mapped.header(), stream.header());
    assert_eq!(mapped.medium_len(), stream.medium_len());
    assert_eq!(stream.backend(), Backend::Stream);
}

// =============================================================================
// Reopen / Validation Tests
// =============================================================================

#[test]
fn test_reopen_preserves_header() {
    let (temp, store) = setup_temp_store(Backend::Mapped);
    store.allocate(40, None).unwrap();
    let before = store.header();
    drop(store);

    let store = reopen(&temp.path().join("store.db"), Backend::Mapped).unwrap();
    assert_eq!(store.header(), before);
    assert_eq!(store.geometry(), geometry());
}

#[test]
fn test_reopen_with_other_backend() {
    let (temp, store) = setup_temp_store(Backend::Mapped);
    let extent = store.allocate(5, Some(b"hello")).unwrap();
    drop(store);

    let store = reopen(&temp.path().join("store.db"), Backend::Stream).unwrap();
    assert_eq!(store.load(extent.first).unwrap().payload(), b"hello");
}

#[test]
fn test_bad_signature_is_corrupt_header() {
    let (temp, store) = setup_temp_store(Backend::Stream);
    drop(store);

    let path = temp.path().join("store.db");
    overwrite_at(&path, 0, b"NOTASTORE");

    let err = reopen(&path, Backend::Stream).unwrap_err();
    assert!(matches!(err, TesseraError::CorruptHeader(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_truncated_store_is_corrupt_header() {
    let (temp, store) = setup_temp_store(Backend::Stream);
    drop(store);

    let path = temp.path().join("store.db");
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(HEADER_REGION_SIZE + 10).unwrap();
    drop(file);

    let err = reopen(&path, Backend::Stream).unwrap_err();
    assert!(matches!(err, TesseraError::CorruptHeader(_)));
}

#[test]
fn test_blank_header_region_is_recreated() {
    for backend in [Backend::Mapped, Backend::Stream] {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.db");

        // Creation interrupted right after the header region was reserved
        let file = OpenOptions::new().create(true).write(true).open(&path).unwrap();
        file.set_len(HEADER_REGION_SIZE).unwrap();
        drop(file);

        let (medium, existed) = open_medium(backend, &path).unwrap();
        assert!(!existed);
        assert_eq!(medium.len(), HEADER_REGION_SIZE);

        let store = BlockStore::create(medium, geometry(), SyncStrategy::EveryChange).unwrap();
        assert_eq!(store.header().page_count, 1);
        drop(store);

        let store = reopen(&path, backend).unwrap();
        assert_eq!(store.header().page_count, 1);
    }
}

#[test]
fn test_short_blank_file_is_recreated() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.db");
    std::fs::write(&path, [0u8; 7]).unwrap();

    let (medium, existed) = open_medium(Backend::Stream, &path).unwrap();
    assert!(!existed);
    assert_eq!(medium.len(), HEADER_REGION_SIZE);
}

// =============================================================================
// Block Layer Tests
// =============================================================================

#[test]
fn test_load_out_of_range_is_invariant_violation() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);

    let err = store.load(5).unwrap_err();
    assert!(matches!(err, TesseraError::InvariantViolation { block: 5, .. }));

    assert!(store.load_lazy(NULL_BLOCK).is_err());
}

#[test]
fn test_store_grows_to_unaddressable_block() {
    let (_temp, store) = setup_temp_store(Backend::Stream);
    assert!(!store.is_addressable(10));

    let mut block = Block::empty(10, &geometry());
    block.append(b"far away");
    block.flags = BLOCK_FLAG_LIVE;
    store.store(&block).unwrap();

    assert_eq!(store.header().page_count, 3);
    assert_eq!(store.medium_len(), geometry().file_len(3));
    assert_eq!(store.load(10).unwrap(), block);
}

#[test]
fn test_corrupted_record_id_is_detected() {
    let (temp, store) = setup_temp_store(Backend::Stream);
    let offset = store.geometry().block_offset(3);
    drop(store);

    let path = temp.path().join("store.db");
    overwrite_at(&path, offset, &99u64.to_le_bytes());

    let store = reopen(&path, Backend::Stream).unwrap();
    let err = store.load_lazy(3).unwrap_err();
    assert!(matches!(err, TesseraError::InvariantViolation { block: 3, .. }));
}

// =============================================================================
// Split / Merge Tests
// =============================================================================

#[test]
fn test_split_moves_tail_into_new_block() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);
    let extent = store.allocate(10, Some(b"0123456789")).unwrap();

    let mut block = store.load(extent.first).unwrap();
    let moved = store.split(&mut block, 4).unwrap().unwrap();

    assert_eq!(block.payload(), b"0123");
    assert_eq!(block.next, moved);

    let tail = store.load(moved).unwrap();
    assert_eq!(tail.payload(), b"456789");
    assert_eq!(tail.prev, extent.first);
    assert_eq!(tail.next, NULL_BLOCK);

    let used: Vec<u64> = store.chain(extent.first).unwrap().iter().map(|b| b.used).collect();
    assert_eq!(used, vec![4, 6]);
}

#[test]
fn test_split_at_end_is_noop() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);
    let extent = store.allocate(3, Some(b"abc")).unwrap();
    let free_before = store.header().free_count;

    let mut block = store.load(extent.first).unwrap();
    assert_eq!(store.split(&mut block, 3).unwrap(), None);
    assert_eq!(store.header().free_count, free_before);
}

#[test]
fn test_split_relinks_successor() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);
    let extent = store.allocate(20, Some(b"aaaaaaaaaaaaaaaabbbb")).unwrap();

    let mut block = store.load(extent.first).unwrap();
    let moved = store.split(&mut block, 8).unwrap().unwrap();

    let chain = store.chain(extent.first).unwrap();
    let ids: Vec<u64> = chain.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![extent.first, moved, extent.last]);
    assert_eq!(store.load_lazy(extent.last).unwrap().prev, moved);
}

#[test]
fn test_merge_absorbs_successor_and_frees_it() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);
    let extent = store.allocate(10, Some(b"0123456789")).unwrap();

    let mut block = store.load(extent.first).unwrap();
    let moved = store.split(&mut block, 4).unwrap().unwrap();
    let free_before = store.header().free_count;

    assert!(store.merge(&mut block).unwrap());
    assert_eq!(block.payload(), b"0123456789");
    assert_eq!(block.next, NULL_BLOCK);
    assert_eq!(store.header().free_count, free_before + 1);
    assert_eq!(store.free_blocks().unwrap()[0], moved);
}

#[test]
fn test_merge_refuses_when_payloads_do_not_fit() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);
    let extent = store.allocate(20, None).unwrap();

    let mut block = store.load(extent.first).unwrap();
    assert!(!store.merge(&mut block).unwrap());
    assert_eq!(store.chain(extent.first).unwrap().len(), 2);
}

#[test]
fn test_chain_rejects_free_block() {
    let (_temp, store) = setup_temp_store(Backend::Mapped);

    let err = store.chain(2).unwrap_err();
    assert!(matches!(err, TesseraError::InvariantViolation { block: 2, .. }));
}
