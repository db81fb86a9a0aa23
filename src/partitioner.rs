//! Keyed-spawn stage: demultiplexes the bus by entity key.
//!
//! The [`Partitioner`] owns a [`ProcessRegistry`], the explicit map from key to
//! live [`EntityProcess`]. For every bus message it emits exactly one
//! [`KeyedChange`] carrying the same message id:
//!
//! - first non-delete event for an unseen key: spawn a process, fold the
//!   event into it, append the key to the active set, emit `Spawned`
//! - event for a live key: route it to its process, emit `Updated` (or
//!   `Terminated` for a delete, after removing the key and dropping the process)
//! - delete for a key never seen, any event for a terminated key, or an
//!   undecodable raw event: emit `Dropped`
//!
//! Terminated keys are remembered in a [`RetiredKeys`] set and never
//! resurrected. The set is shared, so readers outside the pipeline can tell a
//! terminated key from one that has not been published yet.

use crate::entity::{EntityHandle, EntityProcess, Step};
use crate::event::{EntityKey, Inbound};
use crate::message::Message;
use crate::transformer::{Transformer, TransformerConfig};
use crate::{Input, Output};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the partitioner dropped an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
  /// A raw event could not be decoded.
  Malformed(String),
  /// Delete for a key that was never created.
  UnknownDelete(EntityKey),
  /// Event for a key that has already been terminated.
  Retired(EntityKey),
}

impl fmt::Display for DropReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DropReason::Malformed(reason) => write!(f, "malformed event: {}", reason),
      DropReason::UnknownDelete(key) => write!(f, "delete for unknown key {}", key),
      DropReason::Retired(key) => write!(f, "event for terminated key {}", key),
    }
  }
}

/// Change to the set of live entities, one per bus message.
#[derive(Clone, Debug)]
pub enum KeyedChange {
  /// A process was spawned and has folded its first event.
  Spawned {
    /// Read side of the new process.
    handle: EntityHandle,
  },
  /// A live process emitted a new value.
  Updated {
    /// Key of the process.
    key: EntityKey,
  },
  /// A process consumed a delete and was torn down.
  Terminated {
    /// Key of the process.
    key: EntityKey,
  },
  /// The event had no effect.
  Dropped {
    /// Why.
    reason: DropReason,
  },
}

impl KeyedChange {
  /// Key affected by this change, if any.
  pub fn key(&self) -> Option<EntityKey> {
    match self {
      KeyedChange::Spawned { handle } => Some(handle.key()),
      KeyedChange::Updated { key } | KeyedChange::Terminated { key } => Some(*key),
      KeyedChange::Dropped { .. } => None,
    }
  }
}

/// Keys whose entity has been terminated. Clones share the same set.
///
/// Only the registry inserts; a key is inserted before the termination is
/// reported downstream.
#[derive(Clone, Debug, Default)]
pub struct RetiredKeys {
  keys: Arc<RwLock<HashSet<EntityKey>>>,
}

impl RetiredKeys {
  // Retirement must not fail, so a poisoned lock is recovered rather than reported.
  fn read(&self) -> RwLockReadGuard<'_, HashSet<EntityKey>> {
    self.keys.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn insert(&self, key: EntityKey) {
    self
      .keys
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key);
  }

  /// True if the key was terminated.
  pub fn contains(&self, key: EntityKey) -> bool {
    self.read().contains(&key)
  }

  /// Number of terminated keys.
  pub fn len(&self) -> usize {
    self.read().len()
  }

  /// True if no key was terminated.
  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }
}

/// Map from key to live process, plus the ordered active set and the
/// terminated keys.
///
/// Dropping the registry cancels its token, tearing down every process it
/// still owns.
#[derive(Debug)]
pub struct ProcessRegistry {
  name: String,
  processes: HashMap<EntityKey, EntityProcess>,
  active: Vec<EntityKey>,
  retired: RetiredKeys,
  token: CancellationToken,
}

impl ProcessRegistry {
  /// Creates an empty registry whose processes are children of `parent`.
  pub fn new(name: impl Into<String>, parent: &CancellationToken) -> Self {
    Self::with_retired(name, parent, RetiredKeys::default())
  }

  /// Creates an empty registry recording terminations into `retired`.
  pub fn with_retired(
    name: impl Into<String>,
    parent: &CancellationToken,
    retired: RetiredKeys,
  ) -> Self {
    Self {
      name: name.into(),
      processes: HashMap::new(),
      active: Vec::new(),
      retired,
      token: parent.child_token(),
    }
  }

  /// Routes one bus payload and reports what changed.
  pub fn route(&mut self, inbound: Inbound) -> KeyedChange {
    let event = match inbound.decode() {
      Ok(event) => event,
      Err(reason) => {
        warn!(component = %self.name, %reason, "dropping malformed event");
        return KeyedChange::Dropped {
          reason: DropReason::Malformed(reason),
        };
      }
    };
    let key = event.key();

    if self.retired.contains(key) {
      debug!(component = %self.name, %key, kind = %event.kind(), "event for terminated key dropped");
      return KeyedChange::Dropped {
        reason: DropReason::Retired(key),
      };
    }

    if let Some(process) = self.processes.get_mut(&key) {
      return match process.apply(&event) {
        Step::Emitted(_) => {
          debug!(component = %self.name, %key, kind = %event.kind(), "event routed");
          KeyedChange::Updated { key }
        }
        Step::Terminated => {
          self.retire(key);
          info!(component = %self.name, %key, "entity terminated");
          KeyedChange::Terminated { key }
        }
        Step::Ignored => KeyedChange::Dropped {
          reason: DropReason::Retired(key),
        },
      };
    }

    if event.is_delete() {
      debug!(component = %self.name, %key, "delete for unknown key ignored");
      return KeyedChange::Dropped {
        reason: DropReason::UnknownDelete(key),
      };
    }

    let mut process = EntityProcess::new(key, &self.token);
    process.apply(&event);
    let handle = process.handle();
    self.processes.insert(key, process);
    self.active.push(key);
    info!(component = %self.name, %key, kind = %event.kind(), "entity spawned");
    KeyedChange::Spawned { handle }
  }

  // Removes the process before the change is reported, so its value channel
  // is already closed when observers learn about the termination.
  fn retire(&mut self, key: EntityKey) {
    drop(self.processes.remove(&key));
    self.active.retain(|active| *active != key);
    self.retired.insert(key);
  }

  /// Live keys in first-seen order.
  pub fn active_keys(&self) -> &[EntityKey] {
    &self.active
  }

  /// True if the key was terminated.
  pub fn is_retired(&self, key: EntityKey) -> bool {
    self.retired.contains(key)
  }

  /// Shared handle to the terminated keys.
  pub fn retired(&self) -> &RetiredKeys {
    &self.retired
  }

  /// Read handle for a live key.
  pub fn handle(&self, key: EntityKey) -> Option<EntityHandle> {
    self.processes.get(&key).map(EntityProcess::handle)
  }

  /// Number of live processes.
  pub fn len(&self) -> usize {
    self.processes.len()
  }

  /// True if no process is live.
  pub fn is_empty(&self) -> bool {
    self.processes.is_empty()
  }
}

impl Drop for ProcessRegistry {
  fn drop(&mut self) {
    self.token.cancel();
  }
}

/// Pipeline stage turning bus messages into keyed changes.
#[derive(Debug, Clone)]
pub struct Partitioner {
  config: TransformerConfig,
  root: CancellationToken,
  retired: RetiredKeys,
}

impl Partitioner {
  /// Creates a partitioner whose processes are torn down when `root` is cancelled.
  pub fn new(root: CancellationToken) -> Self {
    Self {
      config: TransformerConfig::default().with_name("partitioner".to_string()),
      root,
      retired: RetiredKeys::default(),
    }
  }

  /// Keys terminated by this partitioner's registries.
  pub fn retired(&self) -> RetiredKeys {
    self.retired.clone()
  }
}

impl Default for Partitioner {
  fn default() -> Self {
    Self::new(CancellationToken::new())
  }
}

impl Input for Partitioner {
  type Input = Message<Inbound>;
  type InputStream = Pin<Box<dyn Stream<Item = Message<Inbound>> + Send>>;
}

impl Output for Partitioner {
  type Output = Message<KeyedChange>;
  type OutputStream = Pin<Box<dyn Stream<Item = Message<KeyedChange>> + Send>>;
}

#[async_trait]
impl Transformer for Partitioner {
  async fn transform(&mut self, input: Self::InputStream) -> Self::OutputStream {
    let name = self.component_info().name;
    let mut registry = ProcessRegistry::with_retired(name, &self.root, self.retired.clone());
    Box::pin(async_stream::stream! {
      let mut input = input;
      while let Some(message) = input.next().await {
        yield message.map(|inbound| registry.route(inbound));
      }
    })
  }

  fn config(&self) -> &TransformerConfig {
    &self.config
  }

  fn config_mut(&mut self) -> &mut TransformerConfig {
    &mut self.config
  }
}
