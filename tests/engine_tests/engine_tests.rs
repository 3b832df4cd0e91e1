//! Tests for Engine
//!
//! These tests verify:
//! - Lifecycle transitions (Created → Opened → Closed)
//! - Basic put/get/delete operations
//! - Space reclamation on overwrite and delete
//! - Persistence across destroy/open
//! - Fresh, foreign and damaged device handling
//! - Concurrent access patterns

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use lkvs::config::{Config, SyncStrategy};
use lkvs::engine::{Engine, EngineState};
use lkvs::layout::{Layout, Superblock};
use lkvs::{LkvsError, OpenFlags};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const DEVICE_SIZE: u64 = 1024 * 1024;
const BLOCK: u64 = 512;

fn test_config() -> Config {
    Config::builder()
        .block_size(BLOCK as u32)
        .device_size(DEVICE_SIZE)
        .meta_slot_size(64 * 1024)
        .sync_strategy(SyncStrategy::EveryWrite) // Commit every write for test reliability
        .build()
}

fn setup_temp_device() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dev0");
    (temp_dir, path)
}

fn open_engine(config: Config, path: &PathBuf, flags: OpenFlags) -> Engine {
    let engine = Engine::with_config(config);
    engine.open(path, flags).unwrap();
    engine
}

fn setup_temp_engine() -> (TempDir, PathBuf, Engine) {
    let (temp_dir, path) = setup_temp_device();
    let engine = open_engine(test_config(), &path, OpenFlags::RW | OpenFlags::CREATE);
    (temp_dir, path, engine)
}

fn get_string(engine: &Engine, key: &str) -> String {
    String::from_utf8(engine.get_vec(key).unwrap()).unwrap()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_new_engine_is_created() {
    let engine = Engine::with_config(test_config());

    assert_eq!(engine.state(), EngineState::Created);
    assert!(matches!(
        engine.put("k", b"v"),
        Err(LkvsError::InvalidState(_))
    ));
    let mut buf = [0u8; 4];
    assert!(matches!(
        engine.get("k", &mut buf),
        Err(LkvsError::InvalidState(_))
    ));
}

#[test]
fn test_open_moves_to_opened() {
    let (_temp, _path, engine) = setup_temp_engine();

    assert_eq!(engine.state(), EngineState::Opened);
    assert!(engine.is_empty().unwrap());
}

#[test]
fn test_second_open_is_already_open() {
    let (_temp, path, engine) = setup_temp_engine();

    let result = engine.open(&path, OpenFlags::RW);

    assert!(matches!(result, Err(LkvsError::AlreadyOpen)));
    assert_eq!(engine.state(), EngineState::Opened);
}

#[test]
fn test_destroy_moves_to_closed() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.put("k", b"v").unwrap();

    engine.destroy();

    assert_eq!(engine.state(), EngineState::Closed);
    assert!(matches!(engine.put("k", b"v"), Err(LkvsError::InvalidState(_))));
    assert!(matches!(engine.get_vec("k"), Err(LkvsError::InvalidState(_))));
    assert!(matches!(
        engine.open(&path, OpenFlags::RW),
        Err(LkvsError::InvalidState(_))
    ));

    // Destroying again is a no-op
    engine.destroy();
    assert_eq!(engine.state(), EngineState::Closed);
}

#[test]
fn test_destroy_never_opened_engine() {
    let engine = Engine::with_config(test_config());

    engine.destroy();

    assert_eq!(engine.state(), EngineState::Closed);
}

#[test]
fn test_failed_open_stays_created() {
    let (_temp, path) = setup_temp_device();
    let engine = Engine::with_config(test_config());

    let result = engine.open(&path, OpenFlags::RW);
    assert!(matches!(result, Err(LkvsError::DeviceNotFound(_))));
    assert_eq!(engine.state(), EngineState::Created);

    // A later open with CREATE succeeds on the same engine
    engine.open(&path, OpenFlags::RW | OpenFlags::CREATE).unwrap();
    assert_eq!(engine.state(), EngineState::Opened);
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_then_get() {
    let (_temp, _path, engine) = setup_temp_engine();

    engine.put("Test", b"HelloWorld\0").unwrap();

    let mut buf = [0u8; 11];
    let len = engine.get("Test", &mut buf).unwrap();
    assert_eq!(len, 11);
    assert_eq!(&buf, b"HelloWorld\0");
}

#[test]
fn test_get_into_larger_buffer() {
    let (_temp, _path, engine) = setup_temp_engine();
    engine.put("k", b"abc").unwrap();

    let mut buf = [0xeeu8; 16];
    let len = engine.get("k", &mut buf).unwrap();

    assert_eq!(len, 3);
    assert_eq!(&buf[..3], b"abc");
    // Bytes past the value are left alone
    assert!(buf[3..].iter().all(|&b| b == 0xee));
}

#[test]
fn test_get_missing_key() {
    let (_temp, _path, engine) = setup_temp_engine();

    let mut buf = [0u8; 8];
    assert!(matches!(
        engine.get("missing", &mut buf),
        Err(LkvsError::KeyNotFound)
    ));
    assert!(!engine.contains("missing").unwrap());
}

#[test]
fn test_get_buffer_too_small() {
    let (_temp, _path, engine) = setup_temp_engine();
    engine.put("Test", b"HelloWorld\0").unwrap();

    let mut buf = [0u8; 5];
    let result = engine.get("Test", &mut buf);

    assert!(matches!(
        result,
        Err(LkvsError::BufferTooSmall {
            required: 11,
            capacity: 5
        })
    ));
    assert_eq!(buf, [0u8; 5]);
}

#[test]
fn test_overwrite_last_write_wins() {
    let (_temp, _path, engine) = setup_temp_engine();

    engine.put("key", b"first").unwrap();
    engine.put("key", b"second value").unwrap();

    assert_eq!(get_string(&engine, "key"), "second value");
    assert_eq!(engine.len().unwrap(), 1);
    assert_eq!(engine.value_len("key").unwrap(), 12);
}

#[test]
fn test_keys_sorted() {
    let (_temp, _path, engine) = setup_temp_engine();
    for key in ["charlie", "alpha", "bravo"] {
        engine.put(key, key.as_bytes()).unwrap();
    }

    assert_eq!(engine.keys().unwrap(), vec!["alpha", "bravo", "charlie"]);
    assert!(engine.contains("bravo").unwrap());
}

#[test]
fn test_delete() {
    let (_temp, _path, engine) = setup_temp_engine();
    let capacity = engine.stats().unwrap().capacity;
    engine.put("k", &[1u8; 1000]).unwrap();

    engine.delete("k").unwrap();

    assert!(matches!(engine.get_vec("k"), Err(LkvsError::KeyNotFound)));
    assert!(matches!(engine.delete("k"), Err(LkvsError::KeyNotFound)));
    let stats = engine.stats().unwrap();
    assert_eq!(stats.free_bytes, capacity);
    assert_eq!(stats.free_extents, 1);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_empty_key_and_value_rejected() {
    let (_temp, _path, engine) = setup_temp_engine();

    assert!(matches!(engine.put("", b"v"), Err(LkvsError::InvalidArgument(_))));
    assert!(matches!(engine.put("k", b""), Err(LkvsError::InvalidArgument(_))));
    assert!(matches!(engine.get_vec(""), Err(LkvsError::InvalidArgument(_))));
    assert!(engine.is_empty().unwrap());
}

#[test]
fn test_key_length_limit() {
    let (_temp, path) = setup_temp_device();
    let config = Config::builder()
        .block_size(BLOCK as u32)
        .device_size(DEVICE_SIZE)
        .meta_slot_size(64 * 1024)
        .max_key_len(8)
        .build();
    let engine = open_engine(config, &path, OpenFlags::RW | OpenFlags::CREATE);

    engine.put("12345678", b"ok").unwrap();

    assert!(matches!(
        engine.put("123456789", b"too long"),
        Err(LkvsError::InvalidArgument(_))
    ));
}

#[test]
fn test_invalid_config_fails_open() {
    let (_temp, path) = setup_temp_device();
    let config = Config::builder().block_size(1000).build();
    let engine = Engine::with_config(config);

    let result = engine.open(&path, OpenFlags::RW | OpenFlags::CREATE);

    assert!(matches!(result, Err(LkvsError::InvalidArgument(_))));
    assert_eq!(engine.state(), EngineState::Created);
}

// =============================================================================
// Space Accounting Tests
// =============================================================================

#[test]
fn test_fresh_store_has_whole_region_free() {
    let (_temp, _path, engine) = setup_temp_engine();

    let stats = engine.stats().unwrap();
    let layout = engine.layout().unwrap();

    assert_eq!(stats.device_size, DEVICE_SIZE);
    assert_eq!(stats.capacity, layout.data_region().length);
    assert_eq!(stats.free_bytes, stats.capacity);
    assert_eq!(stats.used_bytes, 0);
    assert_eq!(stats.keys, 0);
    assert_eq!(stats.generation, 1);
}

#[test]
fn test_values_are_block_aligned() {
    let (_temp, _path, engine) = setup_temp_engine();
    let capacity = engine.stats().unwrap().capacity;

    engine.put("a", &[1u8; 1]).unwrap();
    engine.put("b", &[2u8; 513]).unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.used_bytes, BLOCK + 2 * BLOCK);
    assert_eq!(stats.free_bytes, capacity - 3 * BLOCK);
    assert_eq!(stats.live_bytes, 514);
}

#[test]
fn test_larger_overwrite_frees_old_extent() {
    let (_temp, _path, engine) = setup_temp_engine();
    let capacity = engine.stats().unwrap().capacity;

    engine.put("key", &[1u8; 100]).unwrap();
    engine.put("key", &[2u8; 1000]).unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.free_bytes, capacity - 2 * BLOCK);
    // The freed first block sits in front of the new value
    assert_eq!(stats.free_extents, 2);
    assert_eq!(engine.get_vec("key").unwrap(), vec![2u8; 1000]);
}

#[test]
fn test_same_size_overwrite_reuses_extent() {
    let (_temp, _path, engine) = setup_temp_engine();
    engine.put("key", &[1u8; 100]).unwrap();
    let before = engine.free_extents().unwrap();

    engine.put("key", &[2u8; 200]).unwrap();

    assert_eq!(engine.free_extents().unwrap(), before);
    assert_eq!(engine.get_vec("key").unwrap(), vec![2u8; 200]);
}

#[test]
fn test_overwrite_without_reuse_relocates() {
    let (_temp, path) = setup_temp_device();
    let config = Config::builder()
        .block_size(BLOCK as u32)
        .device_size(DEVICE_SIZE)
        .meta_slot_size(64 * 1024)
        .reuse_extents(false)
        .build();
    let engine = open_engine(config, &path, OpenFlags::RW | OpenFlags::CREATE);
    let capacity = engine.stats().unwrap().capacity;

    engine.put("key", &[1u8; 100]).unwrap();
    engine.put("key", &[2u8; 200]).unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.free_bytes, capacity - BLOCK);
    assert_eq!(stats.free_extents, 2);
    assert_eq!(engine.get_vec("key").unwrap(), vec![2u8; 200]);
}

#[test]
fn test_value_larger_than_device_is_out_of_space() {
    let (_temp, _path, engine) = setup_temp_engine();
    let capacity = engine.stats().unwrap().capacity;

    let result = engine.put("huge", &vec![0u8; capacity as usize + 1]);

    assert!(matches!(result, Err(LkvsError::OutOfSpace { .. })));
    assert!(!engine.contains("huge").unwrap());
    // The store is still usable
    engine.put("small", b"fits").unwrap();
    assert_eq!(get_string(&engine, "small"), "fits");
}

#[test]
fn test_value_filling_whole_region() {
    let (_temp, _path, engine) = setup_temp_engine();
    let capacity = engine.stats().unwrap().capacity;

    engine.put("all", &vec![7u8; capacity as usize]).unwrap();

    assert_eq!(engine.stats().unwrap().free_bytes, 0);
    assert!(matches!(
        engine.put("more", b"x"),
        Err(LkvsError::OutOfSpace { .. })
    ));
    engine.delete("all").unwrap();
    engine.put("more", b"x").unwrap();
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_values_survive_reopen() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.put("a", b"apple").unwrap();
    engine.put("b", b"banana").unwrap();
    engine.put("a", b"avocado").unwrap();
    engine.delete("b").unwrap();
    let stats = engine.stats().unwrap();
    engine.destroy();

    let engine = open_engine(test_config(), &path, OpenFlags::RW);

    assert_eq!(get_string(&engine, "a"), "avocado");
    assert!(!engine.contains("b").unwrap());
    let reopened = engine.stats().unwrap();
    assert_eq!(reopened.free_bytes, stats.free_bytes);
    assert_eq!(reopened.keys, 1);
    assert!(reopened.generation >= stats.generation);
}

#[test]
fn test_reopen_read_only() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.put("k", b"value").unwrap();
    engine.destroy();

    let engine = open_engine(test_config(), &path, OpenFlags::READ);

    assert_eq!(get_string(&engine, "k"), "value");
    assert!(matches!(
        engine.put("k", b"other"),
        Err(LkvsError::PermissionDenied(_))
    ));
    assert!(matches!(
        engine.delete("k"),
        Err(LkvsError::PermissionDenied(_))
    ));
}

#[test]
fn test_format_flag_discards_contents() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.put("k", b"value").unwrap();
    engine.destroy();

    let engine = open_engine(test_config(), &path, OpenFlags::FORMAT);

    assert!(engine.is_empty().unwrap());
    let stats = engine.stats().unwrap();
    assert_eq!(stats.free_bytes, stats.capacity);
}

#[test]
fn test_on_close_sync_persists_at_destroy() {
    let (_temp, path) = setup_temp_device();
    let config = Config::builder()
        .block_size(BLOCK as u32)
        .device_size(DEVICE_SIZE)
        .meta_slot_size(64 * 1024)
        .sync_strategy(SyncStrategy::OnClose)
        .build();
    let engine = open_engine(config.clone(), &path, OpenFlags::RW | OpenFlags::CREATE);

    engine.put("k1", b"one").unwrap();
    engine.put("k2", b"two").unwrap();
    // Nothing committed yet
    assert_eq!(engine.stats().unwrap().generation, 1);
    engine.destroy();

    let engine = open_engine(config, &path, OpenFlags::RW);
    assert_eq!(engine.keys().unwrap(), vec!["k1", "k2"]);
    assert_eq!(engine.stats().unwrap().generation, 2);
}

#[test]
fn test_explicit_flush() {
    let (_temp, path) = setup_temp_device();
    let config = Config::builder()
        .block_size(BLOCK as u32)
        .device_size(DEVICE_SIZE)
        .meta_slot_size(64 * 1024)
        .sync_strategy(SyncStrategy::OnClose)
        .build();
    let engine = open_engine(config, &path, OpenFlags::RW | OpenFlags::CREATE);
    engine.put("k", b"v").unwrap();

    engine.flush().unwrap();

    assert_eq!(engine.stats().unwrap().generation, 2);
}

#[test]
fn test_on_device_geometry_wins_over_config() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.put("k", b"value").unwrap();
    engine.destroy();

    let other = Config::builder()
        .block_size(4096)
        .meta_slot_size(4096)
        .build();
    let engine = open_engine(other, &path, OpenFlags::RW);

    assert_eq!(engine.layout().unwrap().block_size, BLOCK as u32);
    assert_eq!(get_string(&engine, "k"), "value");
}

// =============================================================================
// Device Handling Tests
// =============================================================================

#[test]
fn test_device_busy() {
    let (_temp, path, first) = setup_temp_engine();
    let second = Engine::with_config(test_config());

    let result = second.open(&path, OpenFlags::RW);
    assert!(matches!(result, Err(LkvsError::DeviceBusy(_))));
    assert_eq!(second.state(), EngineState::Created);

    first.destroy();
    second.open(&path, OpenFlags::RW).unwrap();
}

#[test]
fn test_foreign_data_not_formatted() {
    let (_temp, path) = setup_temp_device();
    fs::write(&path, vec![0xabu8; DEVICE_SIZE as usize]).unwrap();
    let engine = Engine::with_config(test_config());

    let result = engine.open(&path, OpenFlags::RW);
    assert!(matches!(result, Err(LkvsError::NotFormatted)));

    // The foreign bytes were not touched
    assert_eq!(fs::read(&path).unwrap()[..4], [0xab; 4]);

    engine.open(&path, OpenFlags::FORMAT).unwrap();
    assert!(engine.is_empty().unwrap());
}

#[test]
fn test_foreign_data_past_superblock_not_formatted() {
    let (_temp, path) = setup_temp_device();
    // Zero boot area followed by an ext-style superblock magic
    let mut image = vec![0u8; DEVICE_SIZE as usize];
    image[200] = 0x77;
    image[1080] = 0x53;
    image[1081] = 0xef;
    fs::write(&path, &image).unwrap();
    let engine = Engine::with_config(test_config());

    let result = engine.open(&path, OpenFlags::RW);

    assert!(matches!(result, Err(LkvsError::NotFormatted)));
    assert_eq!(engine.state(), EngineState::Created);
    assert_eq!(fs::read(&path).unwrap(), image);
}

#[test]
fn test_lost_superblock_keeps_metadata() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.put("k", b"value").unwrap();
    engine.destroy();

    {
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.write_all(&[0u8; BLOCK as usize]).unwrap();
    }
    let before = fs::read(&path).unwrap();

    let engine = Engine::with_config(test_config());
    let result = engine.open(&path, OpenFlags::RW);

    assert!(matches!(result, Err(LkvsError::NotFormatted)));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(&before[BLOCK as usize..BLOCK as usize + 4], b"META");
}

#[test]
fn test_superblock_without_data_region_is_corrupt() {
    let (_temp, path) = setup_temp_device();
    let geometries = [
        // Slots swallow the whole device
        Layout {
            block_size: BLOCK as u32,
            device_size: DEVICE_SIZE,
            meta_slot_size: DEVICE_SIZE / 2,
        },
        // Slot size large enough to overflow the reserved area
        Layout {
            block_size: BLOCK as u32,
            device_size: DEVICE_SIZE,
            meta_slot_size: (u64::MAX / 2) & !(BLOCK - 1),
        },
    ];

    for geometry in geometries {
        let mut image = vec![0u8; DEVICE_SIZE as usize];
        let superblock = Superblock::new(geometry).encode();
        image[..superblock.len()].copy_from_slice(&superblock);
        fs::write(&path, &image).unwrap();

        let engine = Engine::with_config(test_config());
        let result = engine.open(&path, OpenFlags::RW);

        assert!(matches!(result, Err(LkvsError::Corrupt(_))));
    }
}

#[test]
fn test_blank_device_read_only_not_formatted() {
    let (_temp, path) = setup_temp_device();
    fs::write(&path, vec![0u8; DEVICE_SIZE as usize]).unwrap();
    let engine = Engine::with_config(test_config());

    let result = engine.open(&path, OpenFlags::READ);

    assert!(matches!(result, Err(LkvsError::NotFormatted)));
}

#[test]
fn test_blank_existing_device_is_formatted() {
    let (_temp, path) = setup_temp_device();
    fs::write(&path, vec![0u8; DEVICE_SIZE as usize]).unwrap();

    let engine = open_engine(test_config(), &path, OpenFlags::RW);

    assert_eq!(engine.stats().unwrap().device_size, DEVICE_SIZE);
    engine.put("k", b"v").unwrap();
}

#[test]
fn test_device_too_small() {
    let (_temp, path) = setup_temp_device();
    fs::write(&path, vec![0u8; 4096]).unwrap();
    let engine = Engine::with_config(test_config());

    let result = engine.open(&path, OpenFlags::RW);

    assert!(matches!(result, Err(LkvsError::InvalidArgument(_))));
}

#[test]
fn test_damaged_superblock_is_corrupt() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.destroy();

    {
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(10)).unwrap();
        file.write_all(&[0xff]).unwrap();
    }

    let engine = Engine::with_config(test_config());
    let result = engine.open(&path, OpenFlags::RW);
    assert!(matches!(result, Err(LkvsError::Corrupt(_))));
}

#[test]
fn test_resized_device_is_corrupt() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.destroy();

    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(DEVICE_SIZE * 2)
        .unwrap();

    let engine = Engine::with_config(test_config());
    let result = engine.open(&path, OpenFlags::RW);
    assert!(matches!(result, Err(LkvsError::Corrupt(_))));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_different_keys() {
    let (_temp, path, engine) = setup_temp_engine();
    let engine = Arc::new(engine);
    let threads = 4;
    let per_thread = 25;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let key = format!("t{}-k{}", t, i);
                    let value = vec![(t * per_thread + i) as u8; 10 + i * 20];
                    engine.put(&key, &value).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len().unwrap(), threads * per_thread);
    for t in 0..threads {
        for i in 0..per_thread {
            let value = engine.get_vec(&format!("t{}-k{}", t, i)).unwrap();
            assert_eq!(value, vec![(t * per_thread + i) as u8; 10 + i * 20]);
        }
    }

    // Everything is still there after a reopen
    let engine = Arc::try_unwrap(engine).ok().unwrap();
    engine.destroy();
    let engine = open_engine(test_config(), &path, OpenFlags::READ);
    assert_eq!(engine.len().unwrap(), threads * per_thread);
}

#[test]
fn test_readers_never_see_torn_values() {
    let (_temp, path) = setup_temp_device();
    let config = Config::builder()
        .block_size(BLOCK as u32)
        .device_size(DEVICE_SIZE)
        .meta_slot_size(64 * 1024)
        .sync_strategy(SyncStrategy::OnClose)
        .build();
    let engine = Arc::new(open_engine(config, &path, OpenFlags::RW | OpenFlags::CREATE));
    engine.put("shared", &[0xaa; 300]).unwrap();

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..200 {
                let byte = if i % 2 == 0 { 0xbb } else { 0xaa };
                engine.put("shared", &[byte; 300]).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut buf = [0u8; 300];
                for _ in 0..200 {
                    let len = engine.get("shared", &mut buf).unwrap();
                    assert_eq!(len, 300);
                    assert!(buf.iter().all(|&b| b == buf[0]), "torn read");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_destroy_waits_for_in_flight_operations() {
    let (_temp, _path, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..50 {
                    match engine.put(&format!("w{}-{}", t, i), b"payload") {
                        Ok(()) => {}
                        Err(LkvsError::InvalidState(_)) => break,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    engine.destroy();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(engine.state(), EngineState::Closed);
}
