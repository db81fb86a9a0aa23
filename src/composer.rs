//! Recombination stage: folds keyed changes into one consistent view.
//!
//! The [`CollectionComposer`] keeps the ordered key set (structure) and the
//! handle of every live process (content). On each [`KeyedChange`] it reads
//! the affected process's latest value from that process's own channel and
//! emits a new [`CollectionView`]. Key removal and value removal happen in the
//! same emission, so a view never lists a key without its value or the other
//! way round.
//!
//! Snapshots are shared behind `Arc`, so handing the same view to many
//! consumers does not copy the collection. The previously published view
//! still holds the old snapshot, so each change copies the live map once.
//! Terminated keys are not part of the view; the partitioner's
//! [`RetiredKeys`](crate::partitioner::RetiredKeys) records them.

use crate::entity::EntityHandle;
use crate::event::{EntityKey, EntityState};
use crate::message::Message;
use crate::partitioner::KeyedChange;
use crate::query::AggregateStats;
use crate::transformer::{Transformer, TransformerConfig};
use crate::{Input, Output};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{trace, warn};

/// Point-in-time view of all live entities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionSnapshot {
  version: u64,
  keys: Vec<EntityKey>,
  entities: HashMap<EntityKey, EntityState>,
}

impl CollectionSnapshot {
  /// Increases by one every time the snapshot changes.
  pub fn version(&self) -> u64 {
    self.version
  }

  /// Live keys in first-seen order.
  pub fn keys(&self) -> &[EntityKey] {
    &self.keys
  }

  /// Latest value of a live key.
  pub fn get(&self, key: EntityKey) -> Option<&EntityState> {
    self.entities.get(&key)
  }

  /// True if the key is live.
  pub fn contains(&self, key: EntityKey) -> bool {
    self.entities.contains_key(&key)
  }

  /// Number of live entities.
  pub fn len(&self) -> usize {
    self.keys.len()
  }

  /// True if no entity is live.
  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }

  /// Values in key order.
  pub fn values(&self) -> impl Iterator<Item = &EntityState> + '_ {
    self.keys.iter().filter_map(|key| self.entities.get(key))
  }

  /// Owned copy of the values in key order.
  pub fn to_vec(&self) -> Vec<EntityState> {
    self.values().cloned().collect()
  }

  fn upsert(&mut self, state: EntityState) {
    if !self.entities.contains_key(&state.key) {
      self.keys.push(state.key);
    }
    self.entities.insert(state.key, state);
    self.version += 1;
  }

  fn remove(&mut self, key: EntityKey) {
    self.keys.retain(|live| *live != key);
    self.entities.remove(&key);
    self.version += 1;
  }
}

/// Everything the composer publishes after one bus message.
#[derive(Clone, Debug, Default)]
pub struct CollectionView {
  snapshot: Arc<CollectionSnapshot>,
  stats: AggregateStats,
  handles: Arc<HashMap<EntityKey, EntityHandle>>,
  processed: u64,
  dropped: u64,
}

impl CollectionView {
  /// The live collection.
  pub fn snapshot(&self) -> &Arc<CollectionSnapshot> {
    &self.snapshot
  }

  /// Stats over [`snapshot`](Self::snapshot), computed once per change.
  pub fn stats(&self) -> AggregateStats {
    self.stats
  }

  /// Read handle of a live entity process.
  pub fn handle(&self, key: EntityKey) -> Option<&EntityHandle> {
    self.handles.get(&key)
  }

  /// Latest value of a live key.
  pub fn lookup(&self, key: EntityKey) -> Option<&EntityState> {
    self.snapshot.get(key)
  }

  /// Sequence number of the last bus message folded into this view.
  pub fn processed(&self) -> u64 {
    self.processed
  }

  /// Number of bus messages that had no effect.
  pub fn dropped(&self) -> u64 {
    self.dropped
  }

  /// Folds one change. Returns true if the snapshot changed.
  pub(crate) fn apply(&mut self, change: KeyedChange) -> bool {
    match change {
      KeyedChange::Spawned { handle } => {
        let key = handle.key();
        Arc::make_mut(&mut self.snapshot).upsert(handle.latest());
        Arc::make_mut(&mut self.handles).insert(key, handle);
      }
      KeyedChange::Updated { key } => {
        let Some(handle) = self.handles.get(&key) else {
          warn!(%key, "update for a key the composer never saw");
          return false;
        };
        let latest = handle.latest();
        Arc::make_mut(&mut self.snapshot).upsert(latest);
      }
      KeyedChange::Terminated { key } => {
        Arc::make_mut(&mut self.snapshot).remove(key);
        Arc::make_mut(&mut self.handles).remove(&key);
      }
      KeyedChange::Dropped { .. } => {
        self.dropped += 1;
        return false;
      }
    }
    self.stats = AggregateStats::from_snapshot(&self.snapshot);
    true
  }
}

/// Pipeline stage turning keyed changes into collection views.
#[derive(Debug, Clone)]
pub struct CollectionComposer {
  config: TransformerConfig,
}

impl CollectionComposer {
  /// Creates a composer.
  pub fn new() -> Self {
    Self {
      config: TransformerConfig::default().with_name("composer".to_string()),
    }
  }
}

impl Default for CollectionComposer {
  fn default() -> Self {
    Self::new()
  }
}

impl Input for CollectionComposer {
  type Input = Message<KeyedChange>;
  type InputStream = Pin<Box<dyn Stream<Item = Message<KeyedChange>> + Send>>;
}

impl Output for CollectionComposer {
  type Output = CollectionView;
  type OutputStream = Pin<Box<dyn Stream<Item = CollectionView> + Send>>;
}

#[async_trait]
impl Transformer for CollectionComposer {
  async fn transform(&mut self, input: Self::InputStream) -> Self::OutputStream {
    Box::pin(async_stream::stream! {
      let mut view = CollectionView::default();
      let mut input = input;
      while let Some(message) = input.next().await {
        let sequence = message.id().sequence();
        let changed = view.apply(message.into_payload());
        if let Some(sequence) = sequence {
          view.processed = sequence;
        }
        trace!(processed = view.processed, version = view.snapshot.version(), changed, "view composed");
        yield view.clone();
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
