//! Mutation vocabulary: keys, events and entity values.
//!
//! A [`MutationEvent`] is a closed sum over the four mutation kinds, each
//! carrying the [`EntityKey`] it targets. Producers that cannot build typed
//! events publish raw JSON instead ([`Inbound::Raw`]); the partitioner decodes
//! it with [`MutationEvent::from_value`].
//!
//! The JSON form is internally tagged by `kind`:
//!
//! ```rust
//! use todoweave::event::{EntityKey, MutationEvent};
//!
//! let event = MutationEvent::from_value(serde_json::json!({
//!   "kind": "update", "key": 3, "text": "walk dog"
//! }))
//! .unwrap();
//! assert_eq!(event, MutationEvent::Update { key: EntityKey::new(3), text: "walk dog".into() });
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(u64);

impl EntityKey {
  /// Wraps a raw key value.
  pub const fn new(raw: u64) -> Self {
    Self(raw)
  }

  /// Returns the raw key value.
  pub const fn get(self) -> u64 {
    self.0
  }
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<u64> for EntityKey {
  fn from(raw: u64) -> Self {
    Self(raw)
  }
}

/// Hands out unique keys for newly created entities.
///
/// Keys are never reused within one allocator, so two `create` calls can never
/// collide.
#[derive(Debug)]
pub struct KeyAllocator {
  next: AtomicU64,
}

impl KeyAllocator {
  /// Creates an allocator whose first key is `first`.
  pub const fn starting_at(first: u64) -> Self {
    Self {
      next: AtomicU64::new(first),
    }
  }

  /// Allocates the next key.
  pub fn allocate(&self) -> EntityKey {
    EntityKey(self.next.fetch_add(1, Ordering::Relaxed))
  }

  /// Returns the key the next call to [`allocate`](Self::allocate) will hand out.
  pub fn peek(&self) -> EntityKey {
    EntityKey(self.next.load(Ordering::Relaxed))
  }

  /// Records a key chosen outside the allocator so it is never handed out later.
  pub fn observe(&self, key: EntityKey) {
    self.next.fetch_max(key.0.saturating_add(1), Ordering::Relaxed);
  }
}

impl Default for KeyAllocator {
  fn default() -> Self {
    Self::starting_at(0)
  }
}

/// The four mutation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
  /// Creates an entity.
  Create,
  /// Replaces an entity's text.
  Update,
  /// Flips an entity's done flag.
  Toggle,
  /// Terminates an entity.
  Delete,
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MutationKind::Create => "create",
      MutationKind::Update => "update",
      MutationKind::Toggle => "toggle",
      MutationKind::Delete => "delete",
    };
    f.write_str(name)
  }
}

/// A tagged mutation targeting one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MutationEvent {
  /// Creates the entity with the given text.
  #[serde(alias = "add")]
  Create {
    /// Target entity.
    key: EntityKey,
    /// Initial text.
    text: String,
  },
  /// Replaces the entity's text.
  #[serde(alias = "edit")]
  Update {
    /// Target entity.
    key: EntityKey,
    /// New text.
    text: String,
  },
  /// Flips the entity's done flag.
  Toggle {
    /// Target entity.
    key: EntityKey,
  },
  /// Terminates the entity.
  Delete {
    /// Target entity.
    key: EntityKey,
  },
}

impl MutationEvent {
  /// Returns the key this event targets.
  pub fn key(&self) -> EntityKey {
    match self {
      MutationEvent::Create { key, .. }
      | MutationEvent::Update { key, .. }
      | MutationEvent::Toggle { key }
      | MutationEvent::Delete { key } => *key,
    }
  }

  /// Returns the kind of this event.
  pub fn kind(&self) -> MutationKind {
    match self {
      MutationEvent::Create { .. } => MutationKind::Create,
      MutationEvent::Update { .. } => MutationKind::Update,
      MutationEvent::Toggle { .. } => MutationKind::Toggle,
      MutationEvent::Delete { .. } => MutationKind::Delete,
    }
  }

  /// Returns true for delete events.
  pub fn is_delete(&self) -> bool {
    matches!(self, MutationEvent::Delete { .. })
  }

  /// Decodes an event from its JSON form.
  ///
  /// Unknown kinds and missing fields are reported as the decoder's message.
  pub fn from_value(value: serde_json::Value) -> Result<Self, String> {
    serde_json::from_value(value).map_err(|e| e.to_string())
  }
}

/// What producers put on the store's event bus.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
  /// A well-formed mutation.
  Mutation(MutationEvent),
  /// An untyped event that still has to be decoded.
  Raw(serde_json::Value),
}

impl Inbound {
  /// Decodes into a mutation, or returns the decoder's message.
  pub fn decode(self) -> Result<MutationEvent, String> {
    match self {
      Inbound::Mutation(event) => Ok(event),
      Inbound::Raw(value) => MutationEvent::from_value(value),
    }
  }
}

impl From<MutationEvent> for Inbound {
  fn from(event: MutationEvent) -> Self {
    Inbound::Mutation(event)
  }
}

/// Current value of one live entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
  /// Entity key.
  pub key: EntityKey,
  /// Free text.
  pub text: String,
  /// Completion flag.
  pub done: bool,
}

impl EntityState {
  /// The state an entity process is seeded with.
  pub fn seed(key: EntityKey) -> Self {
    Self {
      key,
      text: String::new(),
      done: false,
    }
  }
}
