//! Multi-producer, multicast event bus.
//!
//! [`EventBus::publish`] stamps each payload with the next sequence number and
//! delivers it to every current subscriber, in publish order. Subscribers
//! that joined late do not see earlier messages. Each subscriber owns an
//! unbounded queue, so publishing never blocks and never fails; subscribers
//! whose receiving end was dropped are pruned on the next publish.

use crate::message::{Message, MessageId, MessageMetadata};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use futures::Stream;
use pin_project::pin_project;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

struct BusState<T> {
  last_sequence: u64,
  subscribers: Vec<mpsc::UnboundedSender<Message<T>>>,
}

/// Shared handle to one bus. Cloning the handle does not create a new bus.
pub struct EventBus<T> {
  state: Arc<Mutex<BusState<T>>>,
}

impl<T> Clone for EventBus<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<T> Default for EventBus<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> std::fmt::Debug for EventBus<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.lock();
    f.debug_struct("EventBus")
      .field("last_sequence", &state.last_sequence)
      .field("subscribers", &state.subscribers.len())
      .finish()
  }
}

impl<T> EventBus<T> {
  /// Creates a bus with no subscribers.
  pub fn new() -> Self {
    Self {
      state: Arc::new(Mutex::new(BusState {
        last_sequence: 0,
        subscribers: Vec::new(),
      })),
    }
  }

  // Publishing must not fail, so a poisoned lock is recovered rather than reported.
  fn lock(&self) -> MutexGuard<'_, BusState<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Subscribes to every message published from now on.
  pub fn subscribe(&self) -> BusSubscription<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.lock().subscribers.push(tx);
    BusSubscription {
      inner: UnboundedReceiverStream::new(rx),
    }
  }

  /// Sequence number of the most recently published message, 0 if none.
  pub fn last_sequence(&self) -> u64 {
    self.lock().last_sequence
  }

  /// Number of live subscribers.
  pub fn subscriber_count(&self) -> usize {
    self.lock().subscribers.len()
  }
}

impl<T: Clone> EventBus<T> {
  /// Publishes a payload with fresh metadata.
  pub fn publish(&self, payload: T) -> u64 {
    self.publish_with(payload, MessageMetadata::with_timestamp_now())
  }

  /// Publishes a payload with the given metadata and returns its sequence number.
  ///
  /// Sequence assignment and delivery happen under one lock, so every
  /// subscriber observes messages in sequence order.
  pub fn publish_with(&self, payload: T, metadata: MessageMetadata) -> u64 {
    let mut state = self.lock();
    state.last_sequence += 1;
    let sequence = state.last_sequence;
    let message = Message::with_metadata(payload, MessageId::new_sequence(sequence), metadata);
    state
      .subscribers
      .retain(|subscriber| subscriber.send(message.clone()).is_ok());
    trace!(
      sequence,
      subscribers = state.subscribers.len(),
      "EventBus::publish"
    );
    sequence
  }
}

/// Stream of messages delivered to one subscriber.
///
/// Ends once every handle to the bus has been dropped.
#[pin_project]
pub struct BusSubscription<T> {
  #[pin]
  inner: UnboundedReceiverStream<Message<T>>,
}

impl<T> Stream for BusSubscription<T> {
  type Item = Message<T>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.project().inner.poll_next(cx)
  }
}
