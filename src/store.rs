//! The store: one explicit instance owning the bus and the pipeline.
//!
//! [`Store::start`] creates the [`EventBus`], subscribes the pipeline to it
//! and spawns the pipeline task:
//!
//! ```text
//! create/update/toggle/delete ──► EventBus ──► Partitioner ──► CollectionComposer ──► watch<CollectionView>
//!                                                  │                                        │
//!                                          EntityProcess × N                 all_keys / entity_by_key / stats
//! ```
//!
//! Writes never touch entity processes directly; they publish on the bus and
//! return. [`Store::sync`] waits until everything published so far is
//! reflected in the view, which gives callers a read-your-writes point.
//!
//! ```rust,no_run
//! use todoweave::{Store, StoreConfig};
//!
//! # async fn demo() -> todoweave::StoreResult<()> {
//! let store = Store::start(StoreConfig::default());
//! let milk = store.create("buy milk")?;
//! store.toggle(milk)?;
//! store.sync().await?;
//! assert_eq!(store.stats().completed, 1);
//! store.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::bus::{BusSubscription, EventBus};
use crate::composer::{CollectionComposer, CollectionSnapshot, CollectionView};
use crate::config::StoreConfig;
use crate::entity::EntityStream;
use crate::error::{ComponentInfo, ErrorAction, EventError, StoreError, StoreResult};
use crate::event::{EntityKey, EntityState, Inbound, KeyAllocator, MutationEvent};
use crate::message::MessageMetadata;
use crate::partitioner::{Partitioner, RetiredKeys};
use crate::query::{AggregateStats, Filter};
use crate::transformer::Transformer;
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Stream of collection snapshots, one per change.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Arc<CollectionSnapshot>> + Send>>;
/// Stream of the ordered live key list, one per change.
pub type KeysStream = Pin<Box<dyn Stream<Item = Vec<EntityKey>> + Send>>;
/// Stream of aggregate stats, one per change.
pub type StatsStream = Pin<Box<dyn Stream<Item = AggregateStats> + Send>>;

struct StoreInner {
  config: StoreConfig,
  component: ComponentInfo,
  bus: EventBus<Inbound>,
  keys: KeyAllocator,
  view: watch::Receiver<CollectionView>,
  retired: RetiredKeys,
  root: CancellationToken,
  pipeline: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
  fn drop(&mut self) {
    self.root.cancel();
  }
}

/// Handle to a running store. Clones share the same store.
#[derive(Clone)]
pub struct Store {
  inner: Arc<StoreInner>,
}

impl fmt::Debug for Store {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Store")
      .field("name", &self.inner.config.name())
      .field("bus", &self.inner.bus)
      .field("closed", &self.is_closed())
      .finish()
  }
}

impl Store {
  /// Starts a store and its pipeline task.
  ///
  /// Must be called from within a Tokio runtime.
  pub fn start(config: StoreConfig) -> Self {
    let root = CancellationToken::new();
    let bus = EventBus::new();
    let events = bus.subscribe();
    let (view_tx, view_rx) = watch::channel(CollectionView::default());
    let partitioner = Partitioner::new(root.clone());
    let retired = partitioner.retired();

    let name = config.name().to_string();
    let span = info_span!("store", name = %name);
    let task = tokio::spawn(run_pipeline(partitioner, events, view_tx, root.clone()).instrument(span));
    info!(store = %name, first_key = config.first_key, "store started");

    Self {
      inner: Arc::new(StoreInner {
        component: ComponentInfo::new(name, std::any::type_name::<Self>().to_string()),
        keys: KeyAllocator::starting_at(config.first_key),
        config,
        bus,
        view: view_rx,
        retired,
        root,
        pipeline: Mutex::new(Some(task)),
      }),
    }
  }

  /// The configuration the store was started with.
  pub fn config(&self) -> &StoreConfig {
    &self.inner.config
  }

  /// True once [`shutdown`](Self::shutdown) has been called.
  pub fn is_closed(&self) -> bool {
    self.inner.root.is_cancelled()
  }

  fn ensure_open(&self) -> StoreResult<()> {
    if self.is_closed() {
      Err(StoreError::Closed)
    } else {
      Ok(())
    }
  }

  fn metadata(&self, key: Option<EntityKey>) -> MessageMetadata {
    let metadata = MessageMetadata::with_timestamp_now().source(self.inner.config.name());
    match key {
      Some(key) => metadata.key(key.to_string()),
      None => metadata,
    }
  }

  // ---------------------------------------------------------------------------
  // Write surface
  // ---------------------------------------------------------------------------

  /// Publishes a typed mutation.
  ///
  /// Any non-delete event may spawn its key, so its key is never handed out
  /// by [`create`](Self::create) afterwards.
  pub fn publish(&self, event: MutationEvent) -> StoreResult<()> {
    self.ensure_open()?;
    let key = event.key();
    if !event.is_delete() {
      self.inner.keys.observe(key);
    }
    let kind = event.kind();
    let sequence = self
      .inner
      .bus
      .publish_with(Inbound::Mutation(event), self.metadata(Some(key)));
    debug!(%key, %kind, sequence, "mutation published");
    Ok(())
  }

  /// Publishes an untyped event.
  ///
  /// Events that cannot be decoded are handled by the configured
  /// [`ErrorStrategy`](crate::error::ErrorStrategy): rejected here with
  /// [`StoreError::MalformedEvent`], or published and dropped by the
  /// partitioner.
  pub fn publish_raw(&self, value: serde_json::Value) -> StoreResult<()> {
    self.ensure_open()?;
    let key = match MutationEvent::from_value(value.clone()) {
      Ok(event) => {
        if !event.is_delete() {
          self.inner.keys.observe(event.key());
        }
        Some(event.key())
      }
      Err(reason) => {
        let error = EventError::new(reason, self.inner.component.context(Some(value.clone())));
        if self.inner.config.malformed.decide(&error) == ErrorAction::Stop {
          warn!(reason = %error.reason, "malformed event rejected");
          return Err(error.into());
        }
        None
      }
    };
    let sequence = self.inner.bus.publish_with(Inbound::Raw(value), self.metadata(key));
    debug!(sequence, "raw event published");
    Ok(())
  }

  /// Creates an entity and returns its freshly allocated key.
  pub fn create(&self, text: impl Into<String>) -> StoreResult<EntityKey> {
    self.ensure_open()?;
    let key = self.inner.keys.allocate();
    self.publish(MutationEvent::Create {
      key,
      text: text.into(),
    })?;
    Ok(key)
  }

  /// Replaces an entity's text.
  pub fn update(&self, key: EntityKey, text: impl Into<String>) -> StoreResult<()> {
    self.publish(MutationEvent::Update {
      key,
      text: text.into(),
    })
  }

  /// Flips an entity's done flag.
  pub fn toggle(&self, key: EntityKey) -> StoreResult<()> {
    self.publish(MutationEvent::Toggle { key })
  }

  /// Deletes an entity. Its key is never resurrected.
  pub fn delete(&self, key: EntityKey) -> StoreResult<()> {
    self.publish(MutationEvent::Delete { key })
  }

  // ---------------------------------------------------------------------------
  // Read surface
  // ---------------------------------------------------------------------------

  /// The most recent composed view.
  pub fn view(&self) -> CollectionView {
    self.inner.view.borrow().clone()
  }

  /// The most recent snapshot.
  pub fn snapshot(&self) -> Arc<CollectionSnapshot> {
    Arc::clone(self.inner.view.borrow().snapshot())
  }

  /// Live keys in first-seen order.
  pub fn all_keys(&self) -> Vec<EntityKey> {
    self.inner.view.borrow().snapshot().keys().to_vec()
  }

  /// Live keys passing `filter`, in first-seen order.
  pub fn visible_keys(&self, filter: Filter) -> Vec<EntityKey> {
    self
      .inner
      .view
      .borrow()
      .snapshot()
      .values()
      .filter(|state| filter.matches(state))
      .map(|state| state.key)
      .collect()
  }

  /// Stats over the most recent snapshot; all zero before the first one.
  pub fn stats(&self) -> AggregateStats {
    self.inner.view.borrow().stats()
  }

  /// Latest value of a key without waiting.
  pub fn try_entity(&self, key: EntityKey) -> StoreResult<EntityState> {
    self
      .inner
      .view
      .borrow()
      .lookup(key)
      .cloned()
      .ok_or(StoreError::NotFound { key })
  }

  /// Latest value of a key.
  ///
  /// A terminated key fails with [`StoreError::NotFound`] at once. Otherwise
  /// the read waits until events published before the call are processed
  /// and the key has its first value, at most for the configured read
  /// timeout, and fails with [`StoreError::Timeout`] if the key never shows up.
  pub async fn entity_by_key(&self, key: EntityKey) -> StoreResult<EntityState> {
    let retired = &self.inner.retired;
    if retired.contains(key) {
      return Err(StoreError::NotFound { key });
    }
    let target = self.inner.bus.last_sequence();
    let waited = self.inner.config.read_timeout;
    let mut view = self.inner.view.clone();
    let outcome = tokio::time::timeout(
      waited,
      view.wait_for(|view| {
        view.processed() >= target && (view.snapshot().contains(key) || retired.contains(key))
      }),
    )
    .await;
    match outcome {
      Err(_) => {
        debug!(%key, ?waited, "entity read timed out");
        Err(StoreError::Timeout { key, waited })
      }
      Ok(Err(_)) => self.try_entity(key),
      Ok(Ok(_)) if retired.contains(key) => Err(StoreError::NotFound { key }),
      Ok(Ok(view)) => view.lookup(key).cloned().ok_or(StoreError::NotFound { key }),
    }
  }

  /// Waits until every event published before this call is reflected in the view.
  pub async fn sync(&self) -> StoreResult<()> {
    let target = self.inner.bus.last_sequence();
    let mut view = self.inner.view.clone();
    view
      .wait_for(|view| view.processed() >= target)
      .await
      .map(|_| ())
      .map_err(|_| StoreError::Closed)
  }

  // ---------------------------------------------------------------------------
  // Subscriptions
  // ---------------------------------------------------------------------------

  /// Snapshots, starting with the current one.
  pub fn collection(&self) -> SnapshotStream {
    let mut views = WatchStream::new(self.inner.view.clone());
    Box::pin(async_stream::stream! {
      let mut last_version = None;
      while let Some(view) = views.next().await {
        let version = view.snapshot().version();
        if last_version != Some(version) {
          last_version = Some(version);
          yield Arc::clone(view.snapshot());
        }
      }
    })
  }

  /// Ordered live keys, starting with the current list; repeated lists are skipped.
  pub fn keys_stream(&self) -> KeysStream {
    let mut snapshots = self.collection();
    Box::pin(async_stream::stream! {
      let mut last: Option<Vec<EntityKey>> = None;
      while let Some(snapshot) = snapshots.next().await {
        if last.as_deref() != Some(snapshot.keys()) {
          let keys = snapshot.keys().to_vec();
          last = Some(keys.clone());
          yield keys;
        }
      }
    })
  }

  /// Stats, starting with the current value; repeated values are skipped.
  pub fn stats_stream(&self) -> StatsStream {
    let mut views = WatchStream::new(self.inner.view.clone());
    Box::pin(async_stream::stream! {
      let mut last = None;
      while let Some(view) = views.next().await {
        let stats = view.stats();
        if last != Some(stats) {
          last = Some(stats);
          yield stats;
        }
      }
    })
  }

  /// Values of one live entity, starting with the latest.
  ///
  /// The stream ends when the entity is deleted or the store shuts down.
  pub fn watch_entity(&self, key: EntityKey) -> StoreResult<EntityStream> {
    self
      .inner
      .view
      .borrow()
      .handle(key)
      .map(|handle| handle.stream())
      .ok_or(StoreError::NotFound { key })
  }

  /// Raw tap on the event bus. No replay: only messages published after this call.
  pub fn events(&self) -> BusSubscription<Inbound> {
    self.inner.bus.subscribe()
  }

  // ---------------------------------------------------------------------------
  // Lifecycle
  // ---------------------------------------------------------------------------

  /// Stops the pipeline and tears down every entity process.
  ///
  /// Later writes fail with [`StoreError::Closed`]; reads keep returning the
  /// last published view.
  pub async fn shutdown(&self) {
    self.inner.root.cancel();
    let task = self
      .inner
      .pipeline
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if let Some(task) = task {
      if let Err(error) = task.await {
        warn!(%error, "store pipeline task failed");
      }
    }
    info!(store = %self.inner.config.name(), "store shut down");
  }
}

async fn run_pipeline(
  mut partitioner: Partitioner,
  events: BusSubscription<Inbound>,
  views_tx: watch::Sender<CollectionView>,
  root: CancellationToken,
) {
  let mut composer = CollectionComposer::new();
  let changes = partitioner.transform(Box::pin(events)).await;
  let mut views = composer.transform(changes).await;

  loop {
    tokio::select! {
      biased;
      _ = root.cancelled() => break,
      next = views.next() => match next {
        Some(view) => {
          views_tx.send_replace(view);
        }
        None => break,
      },
    }
  }
  debug!("store pipeline stopped");
}
