use crate::message::{Message, MessageId, MessageMetadata};

#[test]
fn test_message_id_sequence() {
  let id = MessageId::new_sequence(42);
  assert!(id.is_sequence());
  assert_eq!(id.sequence(), Some(42));
  assert_eq!(id.to_string(), "seq:42");
}

#[test]
fn test_message_id_custom() {
  let id = MessageId::new_custom("replay-1");
  assert!(!id.is_sequence());
  assert_eq!(id.sequence(), None);
  assert_eq!(id.to_string(), "custom:replay-1");
}

#[test]
fn test_metadata_builders() {
  let metadata = MessageMetadata::with_timestamp_now().source("todos").key("3");
  assert!(metadata.timestamp.is_some());
  assert_eq!(metadata.source.as_deref(), Some("todos"));
  assert_eq!(metadata.key.as_deref(), Some("3"));
  assert_eq!(MessageMetadata::new(), MessageMetadata::default());
}

#[test]
fn test_map_preserves_id_and_metadata() {
  let metadata = MessageMetadata::new().source("bus");
  let message = Message::with_metadata(2, MessageId::new_sequence(5), metadata.clone());
  let mapped = message.map(|n| n * 10);

  assert_eq!(*mapped.payload(), 20);
  assert_eq!(mapped.id(), &MessageId::new_sequence(5));
  assert_eq!(mapped.metadata(), &metadata);

  let (id, _, payload) = mapped.into_parts();
  assert_eq!((id.sequence(), payload), (Some(5), 20));
}
