//! Tests for file operations
//!
//! These tests verify:
//! - Block layout of written data
//! - Clamped reads and removes
//! - Overwrite, extend and zero-filled gaps
//! - Insert with block splitting
//! - Remove with block compaction and release
//! - Seek, truncate and the io adapter

use std::io::{Read, Seek, SeekFrom, Write};

use tempfile::TempDir;
use tessera::config::{Config, SyncStrategy};
use tessera::engine::Engine;
use tessera::error::TesseraError;
use tessera::file::FileHandle;

// =============================================================================
// Helper Functions
// =============================================================================

/// Engine with 4-byte blocks so every operation crosses block boundaries
fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .path(temp_dir.path().join("files.db"))
        .block_capacity(4)
        .blocks_per_page(8)
        .sync_strategy(SyncStrategy::EveryChange)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn hello_world(engine: &Engine) -> FileHandle {
    let mut handle = engine.open_file("greeting").unwrap();
    engine.write(&mut handle, b"Hello, World!").unwrap();
    handle
}

fn block_usage(engine: &Engine, handle: &FileHandle) -> Vec<u64> {
    engine
        .store()
        .chain(handle.first_block())
        .unwrap()
        .iter()
        .map(|block| block.used)
        .collect()
}

fn content(engine: &Engine, handle: &mut FileHandle) -> Vec<u8> {
    let position = handle.position();
    let bytes = engine.read_all(handle).unwrap();
    handle.seek(SeekFrom::Start(position)).unwrap();
    bytes
}

// =============================================================================
// Write / Read Tests
// =============================================================================

#[test]
fn test_write_fills_blocks_in_order() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    assert_eq!(handle.size(), 13);
    assert_eq!(handle.position(), 13);
    assert_eq!(block_usage(&engine, &handle), vec![4, 4, 4, 1]);
    assert_eq!(content(&engine, &mut handle), b"Hello, World!");
}

#[test]
fn test_read_is_clamped_to_end() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(10)).unwrap();
    assert_eq!(engine.read(&mut handle, 100).unwrap(), b"ld!");
    assert_eq!(handle.position(), 13);

    assert!(engine.read(&mut handle, 5).unwrap().is_empty());

    handle.seek(SeekFrom::Start(50)).unwrap();
    assert!(engine.read(&mut handle, 5).unwrap().is_empty());
}

#[test]
fn test_read_across_blocks_from_middle() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(3)).unwrap();
    assert_eq!(engine.read(&mut handle, 7).unwrap(), b"lo, Wor");
    assert_eq!(engine.read(&mut handle, 2).unwrap(), b"ld");
}

#[test]
fn test_overwrite_keeps_size() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(7)).unwrap();
    assert_eq!(engine.write(&mut handle, b"Rust!!").unwrap(), 6);

    assert_eq!(handle.size(), 13);
    assert_eq!(handle.position(), 13);
    assert_eq!(content(&engine, &mut handle), b"Hello, Rust!!");
    assert_eq!(block_usage(&engine, &handle), vec![4, 4, 4, 1]);
}

#[test]
fn test_overwrite_past_end_extends() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(11)).unwrap();
    engine.write(&mut handle, b"d? Yes.").unwrap();

    assert_eq!(handle.size(), 18);
    assert_eq!(content(&engine, &mut handle), b"Hello, World? Yes.");
    assert_eq!(block_usage(&engine, &handle), vec![4, 4, 4, 4, 2]);
}

#[test]
fn test_write_past_end_zero_fills_gap() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(20)).unwrap();
    engine.write(&mut handle, b"x").unwrap();

    let mut expected = b"Hello, World!".to_vec();
    expected.extend_from_slice(&[0u8; 7]);
    expected.push(b'x');

    assert_eq!(handle.size(), 21);
    assert_eq!(content(&engine, &mut handle), expected);
}

#[test]
fn test_write_zeros() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = engine.open_file("zeros").unwrap();

    assert_eq!(engine.write_zeros(&mut handle, 10).unwrap(), 10);
    assert_eq!(content(&engine, &mut handle), vec![0u8; 10]);
    assert_eq!(engine.lookup("zeros").unwrap().size, 10);
}

#[test]
fn test_empty_write_is_noop() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);
    let free_before = engine.stats().free_blocks;

    assert_eq!(engine.write(&mut handle, b"").unwrap(), 0);
    assert_eq!(handle.size(), 13);
    assert_eq!(engine.stats().free_blocks, free_before);
}

// =============================================================================
// Insert Tests
// =============================================================================

#[test]
fn test_insert_in_middle_splits_block() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);
    let first = handle.first_block();

    assert_eq!(engine.insert(&mut handle, 7, b"big ").unwrap(), 4);

    assert_eq!(content(&engine, &mut handle), b"Hello, big World!");
    assert_eq!(handle.size(), 17);
    assert_eq!(handle.position(), 11);
    assert_eq!(handle.first_block(), first);
    assert_eq!(block_usage(&engine, &handle), vec![4, 4, 3, 1, 4, 1]);
}

#[test]
fn test_insert_at_start_keeps_first_block() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);
    let first = handle.first_block();

    engine.insert(&mut handle, 0, b">> ").unwrap();

    assert_eq!(content(&engine, &mut handle), b">> Hello, World!");
    assert_eq!(handle.first_block(), first);
    assert_eq!(engine.lookup("greeting").unwrap().first_block, first);
    assert_eq!(handle.position(), 3);
}

#[test]
fn test_insert_at_end_appends() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    engine.insert(&mut handle, 13, b" Bye.").unwrap();

    assert_eq!(content(&engine, &mut handle), b"Hello, World! Bye.");
    assert_eq!(handle.end_block(), engine.store().chain(handle.first_block()).unwrap().last().unwrap().id);
}

#[test]
fn test_insert_past_end_zero_fills_first() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = engine.open_file("sparse").unwrap();
    engine.write(&mut handle, b"ab").unwrap();

    engine.insert(&mut handle, 5, b"cd").unwrap();

    assert_eq!(content(&engine, &mut handle), b"ab\0\0\0cd");
    assert_eq!(handle.size(), 7);
    assert_eq!(handle.position(), 7);
}

#[test]
fn test_insert_large_payload_in_middle() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);
    let payload = vec![b'*'; 37];

    engine.insert(&mut handle, 5, &payload).unwrap();

    let mut expected = b"Hello".to_vec();
    expected.extend_from_slice(&payload);
    expected.extend_from_slice(b", World!");
    assert_eq!(content(&engine, &mut handle), expected);
    assert!(engine.check().unwrap().is_clean());
}

#[test]
fn test_insert_zeros() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    engine.insert_zeros(&mut handle, 5, 2).unwrap();
    assert_eq!(content(&engine, &mut handle), b"Hello\0\0, World!");
}

// =============================================================================
// Remove Tests
// =============================================================================

#[test]
fn test_remove_from_start() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(engine.remove(&mut handle, 5).unwrap(), 5);

    assert_eq!(handle.position(), 0);
    assert_eq!(handle.size(), 8);
    assert_eq!(engine.read(&mut handle, 8).unwrap(), b", World!");
}

#[test]
fn test_remove_then_short_read_is_clamped() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(0)).unwrap();
    engine.remove(&mut handle, 7).unwrap();

    assert_eq!(engine.read(&mut handle, 8).unwrap(), b"World!");
}

#[test]
fn test_remove_is_clamped_to_end() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(10)).unwrap();
    assert_eq!(engine.remove(&mut handle, 100).unwrap(), 3);
    assert_eq!(content(&engine, &mut handle), b"Hello, Wor");

    assert_eq!(engine.remove(&mut handle, 5).unwrap(), 0);
}

#[test]
fn test_remove_in_middle_keeps_cursor() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(5)).unwrap();
    engine.remove(&mut handle, 2).unwrap();

    assert_eq!(handle.position(), 5);
    assert_eq!(content(&engine, &mut handle), b"HelloWorld!");
    assert_eq!(engine.read(&mut handle, 5).unwrap(), b"World");
}

#[test]
fn test_remove_releases_emptied_blocks() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = engine.open_file("big").unwrap();
    let data: Vec<u8> = (0..40u8).collect();
    engine.write(&mut handle, &data).unwrap();
    assert_eq!(block_usage(&engine, &handle).len(), 10);

    let free_before = engine.stats().free_blocks;
    handle.seek(SeekFrom::Start(4)).unwrap();
    engine.remove(&mut handle, 32).unwrap();

    assert_eq!(engine.stats().free_blocks, free_before + 8);
    assert_eq!(block_usage(&engine, &handle), vec![4, 4]);

    let mut expected: Vec<u8> = (0..4u8).collect();
    expected.extend(36..40u8);
    assert_eq!(content(&engine, &mut handle), expected);
    assert!(engine.check().unwrap().is_clean());
}

#[test]
fn test_remove_everything_keeps_first_block() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);
    let first = handle.first_block();

    handle.seek(SeekFrom::Start(0)).unwrap();
    engine.remove(&mut handle, 13).unwrap();

    assert!(handle.is_empty());
    assert_eq!(handle.end_block(), first);
    assert_eq!(block_usage(&engine, &handle), vec![0]);

    engine.write(&mut handle, b"again").unwrap();
    assert_eq!(content(&engine, &mut handle), b"again");
}

#[test]
fn test_remove_emptied_middle_block_is_unlinked() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    handle.seek(SeekFrom::Start(4)).unwrap();
    engine.remove(&mut handle, 4).unwrap();

    assert_eq!(content(&engine, &mut handle), b"Hellorld!");
    assert_eq!(block_usage(&engine, &handle), vec![4, 4, 1]);
    assert!(engine.check().unwrap().is_clean());
}

// =============================================================================
// Seek / Truncate Tests
// =============================================================================

#[test]
fn test_seek_variants() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    assert_eq!(engine.seek(&mut handle, SeekFrom::End(-6)).unwrap(), 7);
    assert_eq!(engine.seek(&mut handle, SeekFrom::Current(2)).unwrap(), 9);
    assert_eq!(engine.read(&mut handle, 2).unwrap(), b"rl");

    let err = engine.seek(&mut handle, SeekFrom::Current(-100)).unwrap_err();
    assert!(matches!(err, TesseraError::InvalidArgument(_)));
    assert_eq!(handle.position(), 11);
}

#[test]
fn test_truncate_shrinks_and_extends() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    engine.truncate(&mut handle, 5).unwrap();
    assert_eq!(content(&engine, &mut handle), b"Hello");
    assert_eq!(engine.lookup("greeting").unwrap().size, 5);

    engine.truncate(&mut handle, 8).unwrap();
    assert_eq!(content(&engine, &mut handle), b"Hello\0\0\0");
    assert!(engine.check().unwrap().is_clean());
}

// =============================================================================
// Stream Adapter Tests
// =============================================================================

#[test]
fn test_stream_adapter_round_trip() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = engine.open_file("stream").unwrap();

    {
        let mut stream = engine.stream(&mut handle);
        stream.write_all(b"line one\nline two\n").unwrap();
        stream.flush().unwrap();

        stream.seek(SeekFrom::Start(5)).unwrap();
        let mut rest = String::new();
        stream.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "one\nline two\n");
    }

    assert_eq!(handle.size(), 18);
    assert_eq!(engine.lookup("stream").unwrap().size, 18);
}

#[test]
fn test_stale_handle_after_delete_is_rejected() {
    let (_temp, engine) = setup_temp_engine();
    let mut handle = hello_world(&engine);

    assert!(engine.delete("greeting").unwrap());

    let err = engine.read(&mut handle, 1).unwrap_err();
    assert!(matches!(err, TesseraError::KeyNotFound(_)));
    let err = engine.write(&mut handle, b"x").unwrap_err();
    assert!(matches!(err, TesseraError::KeyNotFound(_)));
}

#[test]
fn test_second_handle_sees_other_handles_writes() {
    let (_temp, engine) = setup_temp_engine();
    let mut first = engine.open_file("shared").unwrap();
    let mut second = engine.open_file("shared").unwrap();

    engine.write(&mut second, b"0123456789").unwrap();
    assert_eq!(engine.write(&mut first, b"xy").unwrap(), 2);

    assert_eq!(first.size(), 10);
    assert_eq!(first.position(), 2);
    assert_eq!(engine.lookup("shared").unwrap().size, 10);
    assert_eq!(content(&engine, &mut second), b"xy23456789");
    assert!(engine.check().unwrap().is_clean());
}

#[test]
fn test_second_handle_sees_other_handles_insert() {
    let (_temp, engine) = setup_temp_engine();
    let mut first = hello_world(&engine);
    let mut second = engine.open_existing("greeting").unwrap();

    engine.insert(&mut second, 0, b">> ").unwrap();
    assert_eq!(engine.seek(&mut first, SeekFrom::End(0)).unwrap(), 16);
    engine.write(&mut first, b"!").unwrap();

    assert_eq!(content(&engine, &mut second), b">> Hello, World!!");
    assert_eq!(engine.lookup("greeting").unwrap().size, 17);
    assert!(engine.check().unwrap().is_clean());
}

#[test]
fn test_read_after_other_handle_removed_everything() {
    let (_temp, engine) = setup_temp_engine();
    let mut reader = engine.open_file("shrinking").unwrap();
    engine.write(&mut reader, b"abcdefghijklmnop").unwrap();

    reader.seek(SeekFrom::Start(12)).unwrap();
    assert_eq!(engine.read(&mut reader, 2).unwrap(), b"mn");

    let mut editor = engine.open_existing("shrinking").unwrap();
    assert_eq!(engine.remove(&mut editor, 16).unwrap(), 16);

    assert_eq!(engine.read(&mut reader, 4).unwrap(), b"");
    assert_eq!(reader.size(), 0);
    assert_eq!(reader.position(), 14);
    assert!(engine.check().unwrap().is_clean());
}
