//! Tests for Registry and UniqueIdPtr
//!
//! These tests verify:
//! - ID generation and exhaustion
//! - Registration and identity-preserving resolution
//! - Lazy decoding from a recorded address (exactly once)
//! - Deletion, eviction and type checks
//! - UniqueIdPtr resolution and its persisted form

use std::cell::Cell;
use std::rc::Rc;

use atlasstore::codec::{self, Decoder, Encoder, Persist};
use atlasstore::config::Config;
use atlasstore::engine::StorageEngine;
use atlasstore::error::{AtlasError, Result};
use atlasstore::registry::{Identified, Registry, UniqueId, UniqueIdPtr};

// =============================================================================
// Helper Functions
// =============================================================================

thread_local! {
    static DECODES: Cell<usize> = const { Cell::new(0) };
}

fn decode_count() -> usize {
    DECODES.with(Cell::get)
}

#[derive(Debug, Clone, PartialEq)]
struct Widget {
    id: UniqueId,
    name: String,
}

impl Widget {
    fn new(id: UniqueId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Identified for Widget {
    fn unique_id(&self) -> UniqueId {
        self.id
    }
}

impl Persist for Widget {
    fn encoded_len(&self) -> usize {
        self.id.encoded_len() + self.name.encoded_len()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        self.id.encode(out)?;
        self.name.encode(out)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        DECODES.with(|count| count.set(count.get() + 1));
        Ok(Self {
            id: UniqueId::decode(input)?,
            name: String::decode(input)?,
        })
    }
}

fn setup_memory_engine() -> StorageEngine {
    let config = Config::builder()
        .initial_size(64 * 1024)
        .max_size(16 * 1024 * 1024)
        .build();
    StorageEngine::in_memory(config).unwrap()
}

/// Registry that knows `id` only by address, as after a reload
fn persisted_registry(engine: &mut StorageEngine, widget: Widget) -> Registry {
    let id = widget.id;
    let mut registry = Registry::new();
    registry.register_instance(widget);
    registry.persist_instance::<Widget>(engine, id).unwrap();

    let table = engine.store_object(&registry).unwrap();
    engine.load_object(table).unwrap()
}

// =============================================================================
// ID Generation Tests
// =============================================================================

#[test]
fn test_generate_id_is_monotonic() {
    let mut registry = Registry::new();

    let ids: Vec<_> = (0..5).map(|_| registry.generate_id().unwrap()).collect();

    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_registered_ids_are_never_reissued() {
    let mut registry = Registry::new();

    registry.register_instance(Widget::new(10, "ten"));

    assert_eq!(registry.generate_id().unwrap(), 11);
}

#[test]
fn test_generate_id_fails_when_exhausted() {
    let mut registry = Registry::new();
    registry.register_instance(Widget::new(UniqueId::MAX - 1, "last"));

    assert!(matches!(
        registry.generate_id(),
        Err(AtlasError::IdSpaceExhausted)
    ));
}

// =============================================================================
// Resolution Tests
// =============================================================================

#[test]
fn test_get_instance_returns_registered_object() {
    let engine = setup_memory_engine();
    let mut registry = Registry::new();
    let id = registry.generate_id().unwrap();

    let registered = registry.register_instance(Widget::new(id, "w"));
    let resolved = registry.get_instance::<Widget>(&engine, id).unwrap();

    assert!(Rc::ptr_eq(&registered, &resolved));
    assert!(registry.is_resident(id));
}

#[test]
fn test_get_instance_of_unknown_id_fails() {
    let engine = setup_memory_engine();
    let mut registry = Registry::new();

    let err = registry.get_instance::<Widget>(&engine, 42).unwrap_err();

    assert!(matches!(err, AtlasError::UnresolvedId(42)));
    assert!(err.is_contract_violation());
}

#[test]
fn test_get_instance_with_wrong_type_fails() {
    let engine = setup_memory_engine();
    let mut registry = Registry::new();
    registry.register_instance(Widget::new(1, "w"));

    let err = registry.get_instance::<String>(&engine, 1).unwrap_err();

    assert!(matches!(err, AtlasError::InstanceTypeMismatch(1)));
}

#[test]
fn test_address_only_entry_decodes_once() {
    let mut engine = setup_memory_engine();
    let mut registry = persisted_registry(&mut engine, Widget::new(7, "stored"));
    assert!(registry.contains(7));
    assert!(!registry.is_resident(7));
    let before = decode_count();

    let first = registry.get_instance::<Widget>(&engine, 7).unwrap();
    let second = registry.get_instance::<Widget>(&engine, 7).unwrap();

    assert_eq!(*first, Widget::new(7, "stored"));
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(decode_count() - before, 1);
    assert!(registry.is_resident(7));
}

#[test]
fn test_register_instance_keeps_recorded_address() {
    let mut engine = setup_memory_engine();
    let mut registry = persisted_registry(&mut engine, Widget::new(3, "v1"));
    let address = registry.address(3).unwrap();

    registry.register_instance(Widget::new(3, "v2"));

    assert_eq!(registry.address(3), Some(address));
    assert_eq!(registry.get_instance::<Widget>(&engine, 3).unwrap().name, "v2");
}

// =============================================================================
// Registration Tests
// =============================================================================

#[test]
fn test_register_address_of_unknown_id_fails() {
    let mut engine = setup_memory_engine();
    let mut registry = Registry::new();
    let address = engine.get_random_address(16).unwrap();

    assert!(matches!(
        registry.register_instance_address(5, address),
        Err(AtlasError::UnresolvedId(5))
    ));
}

#[test]
fn test_register_address_then_reload() {
    let mut engine = setup_memory_engine();
    let mut registry = Registry::new();
    let widget = Widget::new(4, "manual");
    let address = engine.store_object(&widget).unwrap();

    registry.register_instance(widget);
    registry.register_instance_address(4, address).unwrap();
    assert!(registry.evict(4));

    let reloaded = registry.get_instance::<Widget>(&engine, 4).unwrap();
    assert_eq!(reloaded.name, "manual");
}

#[test]
fn test_delete_instance_removes_entry() {
    let engine = setup_memory_engine();
    let mut registry = Registry::new();
    registry.register_instance(Widget::new(1, "w"));

    assert!(registry.delete_instance(1));
    assert!(!registry.delete_instance(1));

    assert!(!registry.contains(1));
    assert!(registry.get_instance::<Widget>(&engine, 1).is_err());
}

#[test]
fn test_evict_requires_an_address() {
    let mut registry = Registry::new();
    registry.register_instance(Widget::new(1, "w"));

    assert!(!registry.evict(1));
    assert!(registry.is_resident(1));
}

#[test]
fn test_persist_instance_reuses_address_when_it_fits() {
    let mut engine = setup_memory_engine();
    let mut registry = Registry::new();
    registry.register_instance(Widget::new(1, "a longer name"));
    let first = registry.persist_instance::<Widget>(&mut engine, 1).unwrap();

    registry.register_instance(Widget::new(1, "short"));
    let second = registry.persist_instance::<Widget>(&mut engine, 1).unwrap();

    registry.register_instance(Widget::new(1, "a much much longer name"));
    let third = registry.persist_instance::<Widget>(&mut engine, 1).unwrap();

    assert_eq!(first, second);
    assert_ne!(second, third);
    assert!(engine.read(first, &mut [0u8; 1]).is_err());
    let stored: Widget = engine.load_object(third).unwrap();
    assert_eq!(stored.name, "a much much longer name");
}

#[test]
fn test_registry_table_keeps_counter_and_addresses_only() {
    let mut engine = setup_memory_engine();
    let mut registry = Registry::new();
    let persisted = registry.generate_id().unwrap();
    let resident = registry.generate_id().unwrap();
    registry.register_instance(Widget::new(persisted, "kept"));
    registry.register_instance(Widget::new(resident, "memory only"));
    registry.persist_instance::<Widget>(&mut engine, persisted).unwrap();

    let bytes = codec::to_vec(&registry).unwrap();
    let mut reloaded: Registry = codec::from_slice(&bytes).unwrap();

    assert!(reloaded.contains(persisted));
    assert!(!reloaded.contains(resident));
    assert_eq!(reloaded.generate_id().unwrap(), resident + 1);
}

// =============================================================================
// UniqueIdPtr Tests
// =============================================================================

#[test]
fn test_ptr_resolves_through_registry() {
    let engine = setup_memory_engine();
    let mut registry = Registry::new();
    let widget = registry.register_instance(Widget::new(9, "target"));

    let mut ptr = UniqueIdPtr::<Widget>::new(9);
    assert!(!ptr.is_resolved());
    assert!(ptr.get().is_none());

    let resolved = ptr.init(&mut registry, &engine).unwrap();

    assert!(Rc::ptr_eq(&resolved, &widget));
    assert!(ptr.is_resolved());
    assert!(Rc::ptr_eq(&ptr.get().unwrap(), &widget));
}

#[test]
fn test_ptr_init_resolves_only_once() {
    let engine = setup_memory_engine();
    let mut registry = Registry::new();
    let widget = registry.register_instance(Widget::new(9, "target"));
    let mut ptr = UniqueIdPtr::<Widget>::new(9);
    ptr.init(&mut registry, &engine).unwrap();

    // Resolved pointers no longer consult the registry
    registry.delete_instance(9);
    let again = ptr.init(&mut registry, &engine).unwrap();

    assert!(Rc::ptr_eq(&again, &widget));
}

#[test]
fn test_ptr_of_unknown_id_fails_to_init() {
    let engine = setup_memory_engine();
    let mut registry = Registry::new();
    let mut ptr = UniqueIdPtr::<Widget>::new(77);

    assert!(matches!(
        ptr.init(&mut registry, &engine),
        Err(AtlasError::UnresolvedId(77))
    ));
}

#[test]
fn test_ptr_persists_only_the_id() {
    let mut registry = Registry::new();
    let widget = registry.register_instance(Widget::new(12, "target"));
    let ptr = UniqueIdPtr::from_rc(&widget);
    assert!(ptr.is_resolved());

    let bytes = codec::to_vec(&ptr).unwrap();
    let decoded: UniqueIdPtr<Widget> = codec::from_slice(&bytes).unwrap();

    assert_eq!(bytes.len(), 4);
    assert_eq!(decoded.id(), 12);
    assert!(!decoded.is_resolved());
}

#[test]
fn test_ptr_loses_target_when_instance_is_dropped() {
    let mut registry = Registry::new();
    let widget = registry.register_instance(Widget::new(1, "w"));
    let ptr = UniqueIdPtr::from_rc(&widget);

    drop(widget);
    registry.delete_instance(1);

    assert!(ptr.get().is_none());
    assert_eq!(ptr.id(), 1);
}
