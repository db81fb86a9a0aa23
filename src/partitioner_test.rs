//! # Partitioner Test Suite
//!
//! Covers spawn-on-first-sight, routing, terminal deletion, unknown deletes,
//! malformed raw events, and the partitioner as a stream stage.

use crate::entity::EntityHandle;
use crate::event::{EntityKey, Inbound, MutationEvent};
use crate::message::{Message, MessageId};
use crate::partitioner::{DropReason, KeyedChange, Partitioner, ProcessRegistry, RetiredKeys};
use crate::transformer::Transformer;
use futures::{StreamExt, stream};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn key(raw: u64) -> EntityKey {
  EntityKey::new(raw)
}

fn create(raw: u64, text: &str) -> Inbound {
  Inbound::Mutation(MutationEvent::Create {
    key: key(raw),
    text: text.to_string(),
  })
}

fn toggle(raw: u64) -> Inbound {
  Inbound::Mutation(MutationEvent::Toggle { key: key(raw) })
}

fn delete(raw: u64) -> Inbound {
  Inbound::Mutation(MutationEvent::Delete { key: key(raw) })
}

fn spawned(change: KeyedChange) -> EntityHandle {
  match change {
    KeyedChange::Spawned { handle } => handle,
    other => panic!("expected Spawned, got {:?}", other),
  }
}

#[test]
fn test_first_event_spawns_process() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  let handle = spawned(registry.route(create(0, "milk")));

  assert_eq!(handle.key(), key(0));
  assert_eq!(handle.latest().text, "milk");
  assert_eq!(registry.active_keys(), &[key(0)]);
  assert_eq!(registry.len(), 1);
}

#[test]
fn test_update_before_create_spawns_process() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  let change = registry.route(Inbound::Mutation(MutationEvent::Update {
    key: key(3),
    text: "late".to_string(),
  }));
  assert_eq!(spawned(change).latest().text, "late");
}

#[test]
fn test_later_events_route_to_same_process() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  let handle = spawned(registry.route(create(0, "milk")));

  assert!(matches!(
    registry.route(toggle(0)),
    KeyedChange::Updated { key: k } if k == key(0)
  ));
  assert!(handle.latest().done);
  assert_eq!(registry.len(), 1);
}

#[test]
fn test_active_keys_keep_first_seen_order() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  registry.route(create(5, "e"));
  registry.route(create(1, "a"));
  registry.route(toggle(5));
  registry.route(create(3, "c"));
  assert_eq!(registry.active_keys(), &[key(5), key(1), key(3)]);
}

#[test]
fn test_delete_retires_key_and_closes_process() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  let handle = spawned(registry.route(create(0, "milk")));
  registry.route(create(1, "dog"));

  assert!(matches!(
    registry.route(delete(0)),
    KeyedChange::Terminated { key: k } if k == key(0)
  ));
  assert_eq!(registry.active_keys(), &[key(1)]);
  assert!(registry.is_retired(key(0)));
  assert!(registry.handle(key(0)).is_none());
  assert!(handle.is_closed());
}

#[test]
fn test_retired_key_is_never_resurrected() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  registry.route(create(0, "milk"));
  registry.route(delete(0));

  for inbound in [create(0, "again"), toggle(0), delete(0)] {
    match registry.route(inbound) {
      KeyedChange::Dropped { reason } => assert_eq!(reason, DropReason::Retired(key(0))),
      other => panic!("expected Dropped, got {:?}", other),
    }
  }
  assert!(registry.is_empty());
  assert!(registry.active_keys().is_empty());
}

#[test]
fn test_delete_for_unknown_key_is_noop() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  match registry.route(delete(9)) {
    KeyedChange::Dropped { reason } => assert_eq!(reason, DropReason::UnknownDelete(key(9))),
    other => panic!("expected Dropped, got {:?}", other),
  }
  assert!(registry.is_empty());
  assert!(!registry.is_retired(key(9)));

  // The key is still free for a later create.
  spawned(registry.route(create(9, "now")));
}

#[test]
fn test_malformed_raw_events_are_dropped() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  let bad = [
    json!({ "kind": "archive", "key": 1 }),
    json!({ "kind": "create", "text": "no key" }),
    json!({ "kind": "update", "key": 1 }),
    json!("not an object"),
  ];
  for value in bad {
    let change = registry.route(Inbound::Raw(value));
    assert!(matches!(
      change,
      KeyedChange::Dropped {
        reason: DropReason::Malformed(_)
      }
    ));
    assert_eq!(change.key(), None);
  }
  assert!(registry.is_empty());
}

#[test]
fn test_well_formed_raw_event_is_routed() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  let change = registry.route(Inbound::Raw(json!({ "kind": "add", "key": 2, "text": "x" })));
  assert_eq!(change.key(), Some(key(2)));
  assert_eq!(spawned(change).latest().text, "x");
}

#[test]
fn test_dropping_registry_tears_down_processes() {
  let mut registry = ProcessRegistry::new("test", &CancellationToken::new());
  let handle = spawned(registry.route(create(0, "milk")));
  drop(registry);
  assert!(handle.is_closed());
}

#[tokio::test]
async fn test_partitioner_preserves_message_ids() {
  let mut partitioner = Partitioner::default();
  let input = stream::iter(vec![
    Message::new(create(0, "a"), MessageId::new_sequence(1)),
    Message::new(delete(7), MessageId::new_sequence(2)),
    Message::new(delete(0), MessageId::new_sequence(3)),
  ]);
  let changes: Vec<_> = partitioner
    .transform(Box::pin(input))
    .await
    .map(|message| (message.id().sequence(), message.into_payload().key()))
    .collect()
    .await;

  assert_eq!(
    changes,
    vec![
      (Some(1), Some(key(0))),
      (Some(2), None),
      (Some(3), Some(key(0))),
    ]
  );
}

#[test]
fn test_partitioner_default_name() {
  assert_eq!(Partitioner::default().component_info().name, "partitioner");
  let renamed = Partitioner::default().with_name("keyed".to_string());
  assert_eq!(renamed.component_info().name, "keyed");
}

#[test]
fn test_retired_keys_are_shared_with_readers() {
  let retired = RetiredKeys::default();
  let mut registry = ProcessRegistry::with_retired("test", &CancellationToken::new(), retired.clone());
  registry.route(create(0, "milk"));
  registry.route(create(1, "dog"));
  assert!(retired.is_empty());

  registry.route(delete(0));
  assert!(retired.contains(key(0)));
  assert!(!retired.contains(key(1)));
  assert_eq!(retired.len(), 1);
  assert!(registry.retired().contains(key(0)));

  // Survives the registry that recorded it.
  drop(registry);
  assert!(retired.contains(key(0)));
}

#[tokio::test]
async fn test_partitioner_exposes_retired_keys() {
  let mut partitioner = Partitioner::default();
  let retired = partitioner.retired();
  let input = stream::iter(vec![
    Message::new(create(3, "a"), MessageId::new_sequence(1)),
    Message::new(delete(3), MessageId::new_sequence(2)),
  ]);
  let changes: Vec<_> = partitioner.transform(Box::pin(input)).await.collect().await;

  assert_eq!(changes.len(), 2);
  assert!(retired.contains(key(3)));
}
