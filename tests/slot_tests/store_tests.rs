//! Tests for SlotStore
//!
//! These tests verify:
//! - put/get/has/clear semantics and index assignment
//! - Address reuse through the free pool
//! - Range visitors (for_each, for_each_empty, clear_range)
//! - Cache modes and write-back of mutated objects
//! - Persisting the slot table itself

use atlasstore::config::Config;
use atlasstore::engine::StorageEngine;
use atlasstore::error::AtlasError;
use atlasstore::engine::METADATA_BASE;
use atlasstore::slots::{CacheMode, SlotStore, MAX_INDEX_GAP};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config() -> Config {
    Config::builder()
        .initial_size(64 * 1024)
        .max_size(16 * 1024 * 1024)
        .build()
}

fn setup_memory_engine() -> StorageEngine {
    StorageEngine::in_memory(test_config()).unwrap()
}

fn filled_store(engine: &mut StorageEngine, values: &[&str]) -> SlotStore<String> {
    let mut slots = SlotStore::new();
    for value in values {
        slots.put(engine, value.to_string()).unwrap();
    }
    slots
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_then_get() {
    let mut engine = setup_memory_engine();
    let mut slots = SlotStore::new();

    let index = slots.put(&mut engine, String::from("hello")).unwrap();

    assert_eq!(index, 0);
    assert!(slots.has(index));
    assert_eq!(slots.get(&engine, index, CacheMode::Once).unwrap(), "hello");
}

#[test]
fn test_put_assigns_lowest_free_index() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b", "c"]);

    assert!(slots.clear(1));
    let index = slots.put(&mut engine, String::from("d")).unwrap();

    assert_eq!(index, 1);
    assert_eq!(slots.next_index(), 3);
    assert_eq!(slots.get(&engine, 1, CacheMode::Once).unwrap(), "d");
}

#[test]
fn test_clear_removes_slot() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b"]);

    assert!(slots.clear(0));

    assert!(!slots.has(0));
    assert!(!slots.clear(0));
    assert_eq!(slots.count(), 1);
    let err = slots.get(&engine, 0, CacheMode::Once).unwrap_err();
    assert!(matches!(err, AtlasError::EmptySlot(0)));
    assert!(err.is_contract_violation());
}

#[test]
fn test_put_at_beyond_end_leaves_gap() {
    let mut engine = setup_memory_engine();
    let mut slots = SlotStore::new();

    slots.put_at(&mut engine, String::from("far"), 5).unwrap();

    assert_eq!(slots.len(), 6);
    assert_eq!(slots.count(), 1);
    assert!(!slots.has(2));
    assert_eq!(slots.next_index(), 0);
    assert_eq!(slots.iter_present().collect::<Vec<_>>(), vec![5]);
}

#[test]
fn test_put_at_overwrites() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["first"]);

    slots.put_at(&mut engine, String::from("second"), 0).unwrap();

    assert_eq!(slots.count(), 1);
    assert_eq!(slots.get(&engine, 0, CacheMode::Once).unwrap(), "second");
}

// =============================================================================
// Address Reuse Tests
// =============================================================================

#[test]
fn test_cleared_space_is_reused_when_it_fits() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a fairly long value"]);
    let original = slots.entry(0).unwrap().address;
    let high_water = engine.stats().high_water_offset;

    slots.clear(0);
    assert_eq!(slots.pooled(), 1);
    slots.put_at(&mut engine, String::from("short"), 0).unwrap();

    assert_eq!(slots.entry(0).unwrap().address, original);
    assert_eq!(slots.pooled(), 0);
    assert_eq!(engine.stats().high_water_offset, high_water);
    assert_eq!(slots.get(&engine, 0, CacheMode::Once).unwrap(), "short");
}

#[test]
fn test_shrinking_value_keeps_address() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a fairly long value"]);
    let original = slots.entry(0).unwrap().address;

    slots.put_at(&mut engine, String::from("tiny"), 0).unwrap();

    let entry = slots.entry(0).unwrap();
    assert_eq!(entry.address, original);
    assert_eq!(entry.len, 8);
}

#[test]
fn test_growing_value_moves_to_new_address() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["ab"]);
    let original = slots.entry(0).unwrap().address;

    slots
        .put_at(&mut engine, String::from("much longer than before"), 0)
        .unwrap();

    assert_ne!(slots.entry(0).unwrap().address, original);
    assert_eq!(slots.pooled(), 1);
    assert_eq!(
        slots.get(&engine, 0, CacheMode::Once).unwrap(),
        "much longer than before"
    );
}

#[test]
fn test_pooled_address_too_small_is_skipped() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["ab"]);
    slots.clear(0);

    slots.put(&mut engine, String::from("does not fit")).unwrap();

    assert_eq!(slots.pooled(), 1);
}

#[test]
fn test_failed_regrow_keeps_old_address_in_slot() {
    // Room for exactly one minted address
    let config = Config::builder()
        .initial_size(64 * 1024)
        .max_size(16 * 1024 * 1024)
        .address_gap(METADATA_BASE - 4096 - 64)
        .build();
    let mut engine = StorageEngine::in_memory(config).unwrap();
    let mut slots = filled_store(&mut engine, &["aaaa"]);
    let original = slots.entry(0).unwrap().address;

    let err = slots
        .put_at(&mut engine, "x".repeat(64), 0)
        .unwrap_err();

    assert!(matches!(err, AtlasError::Storage(_)));
    assert_eq!(slots.entry(0).unwrap().address, original);
    assert_eq!(slots.pooled(), 0);
    assert_eq!(slots.get(&engine, 0, CacheMode::Once).unwrap(), "aaaa");
}

#[test]
fn test_failed_write_pools_new_address_only() {
    let config = Config::builder()
        .initial_size(16 * 1024)
        .max_size(16 * 1024)
        .build();
    let mut engine = StorageEngine::in_memory(config).unwrap();
    let mut slots = filled_store(&mut engine, &["aaaa"]);
    let original = slots.entry(0).unwrap().address;

    let err = slots
        .put_at(&mut engine, "x".repeat(20 * 1024), 0)
        .unwrap_err();
    assert!(matches!(err, AtlasError::CapacityExceeded { .. }));
    assert_eq!(slots.entry(0).unwrap().address, original);
    assert_eq!(slots.pooled(), 1);

    let index = slots.put(&mut engine, String::from("bbbb")).unwrap();

    assert_eq!(index, 1);
    assert_ne!(slots.entry(1).unwrap().address, original);
    assert_eq!(slots.get(&engine, 0, CacheMode::Once).unwrap(), "aaaa");
    assert_eq!(slots.get(&engine, 1, CacheMode::Once).unwrap(), "bbbb");
}

#[test]
fn test_put_at_far_past_end_is_rejected() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a"]);

    let err = slots
        .put_at(&mut engine, String::from("far"), usize::MAX)
        .unwrap_err();
    assert!(matches!(err, AtlasError::SlotIndexOutOfRange { .. }));
    assert!(err.is_contract_violation());
    assert!(slots
        .put_at(&mut engine, String::from("far"), 1 + MAX_INDEX_GAP + 1)
        .is_err());
    assert_eq!(slots.len(), 1);
    assert_eq!(slots.count(), 1);
}

// =============================================================================
// Range Operation Tests
// =============================================================================

#[test]
fn test_for_each_visits_present_only() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b", "c", "d", "e"]);
    slots.clear(1);
    slots.clear(3);

    let mut seen = Vec::new();
    slots
        .for_each(&engine, 0, 10, |i, v| seen.push((i, v.clone())))
        .unwrap();

    assert_eq!(
        seen,
        vec![(0, "a".to_string()), (2, "c".to_string()), (4, "e".to_string())]
    );
}

#[test]
fn test_for_each_empty_fills_gaps() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b", "c"]);
    slots.clear(1);

    let filled = slots
        .for_each_empty(&mut engine, 0, 5, |i| format!("gen{}", i))
        .unwrap();

    assert_eq!(filled, 3);
    assert_eq!(slots.count(), 5);
    assert_eq!(slots.get(&engine, 0, CacheMode::Once).unwrap(), "a");
    assert_eq!(slots.get(&engine, 1, CacheMode::Once).unwrap(), "gen1");
    assert_eq!(slots.get(&engine, 4, CacheMode::Once).unwrap(), "gen4");
}

#[test]
fn test_clear_range_is_half_open() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b", "c", "d", "e"]);
    slots.clear(2);

    let cleared = slots.clear_range(1, 4);

    assert_eq!(cleared, 2);
    assert_eq!(slots.iter_present().collect::<Vec<_>>(), vec![0, 4]);
    assert_eq!(slots.clear_range(10, 20), 0);
}

// =============================================================================
// Cache Tests
// =============================================================================

#[test]
fn test_cache_modes() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b"]);

    slots.get(&engine, 0, CacheMode::Once).unwrap();
    slots.get(&engine, 1, CacheMode::Keep).unwrap();

    assert!(!slots.is_cached(0));
    assert!(slots.is_cached(1));
}

#[test]
fn test_get_ref_keeps_decoded_object() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["kept"]);

    assert_eq!(slots.get_ref(&engine, 0).unwrap(), "kept");
    assert!(slots.is_cached(0));
}

#[test]
fn test_put_refreshes_cached_copy() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["old"]);
    slots.get(&engine, 0, CacheMode::Keep).unwrap();

    slots.put_at(&mut engine, String::from("new"), 0).unwrap();

    assert_eq!(slots.get(&engine, 0, CacheMode::Once).unwrap(), "new");
}

#[test]
fn test_get_mut_changes_written_by_flush() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["base"]);

    slots.get_mut(&engine, 0).unwrap().push_str(" plus a longer suffix");
    let written = slots.flush(&mut engine).unwrap();
    slots.evict_clean();

    assert_eq!(written, 1);
    assert!(!slots.is_cached(0));
    assert_eq!(
        slots.get(&engine, 0, CacheMode::Once).unwrap(),
        "base plus a longer suffix"
    );
}

#[test]
fn test_evict_clean_keeps_dirty_objects() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b"]);
    slots.get_ref(&engine, 0).unwrap();
    slots.get_mut(&engine, 1).unwrap().push('!');

    slots.evict_clean();

    assert!(!slots.is_cached(0));
    assert!(slots.is_cached(1));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_slot_table_round_trips_through_engine() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b", "c"]);
    slots.clear(1);

    let table = engine.store_object(&slots).unwrap();
    let mut loaded: SlotStore<String> = engine.load_object(table).unwrap();

    assert_eq!(loaded.iter_present().collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(loaded.pooled(), 1);
    assert_eq!(loaded.next_index(), 1);
    assert_eq!(loaded.get(&engine, 2, CacheMode::Once).unwrap(), "c");
}

#[test]
fn test_slot_table_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .initial_size(64 * 1024)
        .max_size(16 * 1024 * 1024)
        .build();

    {
        let mut engine = StorageEngine::open(config.clone()).unwrap();
        let slots = filled_store(&mut engine, &["alpha", "beta"]);
        let table = engine.store_object(&slots).unwrap();
        let section = engine.get_static_section();
        engine.write_object(section, &Some(table)).unwrap();
        engine.close().unwrap();
    }

    let engine = StorageEngine::open(config).unwrap();
    let section = engine.get_static_section();
    let table: Option<atlasstore::StorageAddress> = engine.load_object(section).unwrap();
    let mut slots: SlotStore<String> = engine.load_object(table.unwrap()).unwrap();

    assert_eq!(slots.get(&engine, 0, CacheMode::Once).unwrap(), "alpha");
    assert_eq!(slots.get(&engine, 1, CacheMode::Once).unwrap(), "beta");
}

#[test]
fn test_destroy_erases_every_address() {
    let mut engine = setup_memory_engine();
    let mut slots = filled_store(&mut engine, &["a", "b"]);
    let live = slots.entry(0).unwrap().address;
    slots.clear(1);

    slots.destroy(&mut engine).unwrap();

    assert!(matches!(
        engine.read(live, &mut [0u8; 1]),
        Err(AtlasError::UnknownAddress(_))
    ));
}
