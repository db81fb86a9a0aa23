//! Message envelope for items flowing through the store pipeline.
//!
//! Every item published on the [`EventBus`](crate::bus::EventBus) is wrapped in a
//! [`Message<T>`] carrying a [`MessageId`] and [`MessageMetadata`]. Pipeline
//! stages preserve the id of the message they consumed when they emit the
//! derived message, so the last stage can report how far processing has
//! advanced.
//!
//! # Example
//!
//! ```rust
//! use todoweave::message::{Message, MessageId};
//!
//! let msg = Message::new(42, MessageId::new_sequence(7));
//! assert_eq!(*msg.payload(), 42);
//! assert_eq!(msg.id().sequence(), Some(7));
//! ```

use chrono::{DateTime, Utc};
use std::fmt::{self, Display, Formatter};

/// A unique identifier for messages.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MessageId {
  /// A sequence-based identifier, monotonically increasing per bus.
  Sequence(u64),

  /// A custom string identifier supplied by the producer.
  Custom(String),
}

impl MessageId {
  /// Create a new sequence-based message ID.
  #[must_use]
  pub const fn new_sequence(seq: u64) -> Self {
    MessageId::Sequence(seq)
  }

  /// Create a custom message ID from a string.
  #[must_use]
  pub fn new_custom(id: impl Into<String>) -> Self {
    MessageId::Custom(id.into())
  }

  /// Returns the sequence number if this is a sequence-based ID.
  #[must_use]
  pub const fn sequence(&self) -> Option<u64> {
    match self {
      MessageId::Sequence(seq) => Some(*seq),
      MessageId::Custom(_) => None,
    }
  }

  /// Returns true if this is a sequence-based ID.
  #[must_use]
  pub const fn is_sequence(&self) -> bool {
    matches!(self, MessageId::Sequence(_))
  }
}

impl Display for MessageId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      MessageId::Sequence(seq) => write!(f, "seq:{}", seq),
      MessageId::Custom(id) => write!(f, "custom:{}", id),
    }
  }
}

/// Metadata associated with a message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageMetadata {
  /// When the message was published.
  pub timestamp: Option<DateTime<Utc>>,

  /// The producer that published the message.
  pub source: Option<String>,

  /// Routing key, rendered as text for logs.
  pub key: Option<String>,
}

impl MessageMetadata {
  /// Create new empty metadata.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Create metadata stamped with the current time.
  #[must_use]
  pub fn with_timestamp_now() -> Self {
    Self {
      timestamp: Some(Utc::now()),
      ..Default::default()
    }
  }

  /// Set the source.
  #[must_use]
  pub fn source(mut self, source: impl Into<String>) -> Self {
    self.source = Some(source.into());
    self
  }

  /// Set the routing key.
  #[must_use]
  pub fn key(mut self, key: impl Into<String>) -> Self {
    self.key = Some(key.into());
    self
  }
}

/// A payload wrapped with its identifier and metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Message<T> {
  id: MessageId,
  metadata: MessageMetadata,
  payload: T,
}

impl<T> Message<T> {
  /// Create a message with empty metadata.
  #[must_use]
  pub fn new(payload: T, id: MessageId) -> Self {
    Self {
      id,
      metadata: MessageMetadata::default(),
      payload,
    }
  }

  /// Create a message with the given metadata.
  #[must_use]
  pub fn with_metadata(payload: T, id: MessageId, metadata: MessageMetadata) -> Self {
    Self {
      id,
      metadata,
      payload,
    }
  }

  /// Returns the message ID.
  pub fn id(&self) -> &MessageId {
    &self.id
  }

  /// Returns the message metadata.
  pub fn metadata(&self) -> &MessageMetadata {
    &self.metadata
  }

  /// Returns the payload.
  pub fn payload(&self) -> &T {
    &self.payload
  }

  /// Consumes the message and returns the payload.
  pub fn into_payload(self) -> T {
    self.payload
  }

  /// Consumes the message and returns its id, metadata and payload.
  pub fn into_parts(self) -> (MessageId, MessageMetadata, T) {
    (self.id, self.metadata, self.payload)
  }

  /// Transforms the payload while preserving ID and metadata.
  pub fn map<U, F>(self, f: F) -> Message<U>
  where
    F: FnOnce(T) -> U,
  {
    Message {
      id: self.id,
      metadata: self.metadata,
      payload: f(self.payload),
    }
  }
}
