//! # Mutation Vocabulary Test Suite
//!
//! Covers key allocation, the tagged JSON form of mutation events and
//! rejection of events that do not match any kind.

use crate::event::{EntityKey, Inbound, KeyAllocator, MutationEvent, MutationKind};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn test_allocator_is_monotonic() {
  let keys = KeyAllocator::starting_at(10);
  assert_eq!(keys.peek(), EntityKey::new(10));
  assert_eq!(keys.allocate(), EntityKey::new(10));
  assert_eq!(keys.allocate(), EntityKey::new(11));
  assert_eq!(keys.peek(), EntityKey::new(12));
}

#[test]
fn test_allocator_skips_observed_keys() {
  let keys = KeyAllocator::default();
  keys.observe(EntityKey::new(5));
  assert_eq!(keys.allocate(), EntityKey::new(6));
  keys.observe(EntityKey::new(2));
  assert_eq!(keys.allocate(), EntityKey::new(7));
}

#[test]
fn test_allocator_unique_across_threads() {
  let keys = Arc::new(KeyAllocator::default());
  let handles: Vec<_> = (0..4)
    .map(|_| {
      let keys = Arc::clone(&keys);
      std::thread::spawn(move || (0..250).map(|_| keys.allocate()).collect::<Vec<_>>())
    })
    .collect();
  let mut seen = HashSet::new();
  for handle in handles {
    for key in handle.join().unwrap() {
      assert!(seen.insert(key), "duplicate key {}", key);
    }
  }
  assert_eq!(seen.len(), 1000);
}

#[test]
fn test_event_json_form() {
  let event = MutationEvent::Create {
    key: EntityKey::new(1),
    text: "milk".to_string(),
  };
  assert_eq!(
    serde_json::to_value(&event).unwrap(),
    json!({ "kind": "create", "key": 1, "text": "milk" })
  );
  assert_eq!(
    serde_json::to_value(MutationEvent::Toggle { key: EntityKey::new(2) }).unwrap(),
    json!({ "kind": "toggle", "key": 2 })
  );
}

#[test]
fn test_legacy_kind_names_are_accepted() {
  let add = MutationEvent::from_value(json!({ "kind": "add", "key": 0, "text": "a" })).unwrap();
  assert_eq!(add.kind(), MutationKind::Create);
  let edit = MutationEvent::from_value(json!({ "kind": "edit", "key": 0, "text": "b" })).unwrap();
  assert_eq!(edit.kind(), MutationKind::Update);
}

#[test]
fn test_unmatched_events_are_rejected() {
  assert!(MutationEvent::from_value(json!({ "kind": "archive", "key": 0 })).is_err());
  assert!(MutationEvent::from_value(json!({ "kind": "toggle" })).is_err());
  assert!(MutationEvent::from_value(json!({ "key": 0 })).is_err());
  assert!(MutationEvent::from_value(json!({ "kind": "create", "key": 0 })).is_err());
}

#[test]
fn test_event_accessors() {
  let delete = MutationEvent::Delete {
    key: EntityKey::new(3),
  };
  assert_eq!(delete.key(), EntityKey::new(3));
  assert_eq!(delete.kind().to_string(), "delete");
  assert!(delete.is_delete());

  let inbound = Inbound::from(delete.clone());
  assert_eq!(inbound.decode(), Ok(delete));
}

#[test]
fn test_entity_key_display() {
  assert_eq!(EntityKey::from(42).to_string(), "42");
  assert_eq!(EntityKey::new(42).get(), 42);
  assert_eq!(serde_json::to_string(&EntityKey::new(7)).unwrap(), "7");
}
