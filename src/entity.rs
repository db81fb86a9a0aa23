//! Per-key entity process.
//!
//! An [`EntityProcess`] folds the events routed to one key into that key's
//! [`EntityState`]. It starts `Active`, seeded with empty text and `done ==
//! false`, and becomes `Terminated` on the first delete. Its current value is
//! published on a `watch` channel, so subscribers joining late get the latest
//! value immediately instead of waiting for the next mutation.
//!
//! Dropping the process drops the channel's sender: every subscriber stream
//! ends, and the process's cancellation token is cancelled on termination.

use crate::event::{EntityKey, EntityState, MutationEvent};
use futures::stream::TakeUntil;
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{trace, warn};

/// Lifecycle of an entity process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
  /// Accepting events.
  Active,
  /// Deleted; no further transitions.
  Terminated,
}

/// Outcome of applying one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
  /// The value changed (or was re-emitted) and the process is still active.
  Emitted(EntityState),
  /// The process consumed a delete and is now terminated.
  Terminated,
  /// The process was already terminated; the event had no effect.
  Ignored,
}

/// Folds one event into a state. Returns `false` when the event terminates
/// the entity.
pub fn fold(state: &mut EntityState, event: &MutationEvent) -> bool {
  match event {
    MutationEvent::Create { text, .. } | MutationEvent::Update { text, .. } => {
      state.text.clone_from(text);
      true
    }
    MutationEvent::Toggle { .. } => {
      state.done = !state.done;
      true
    }
    MutationEvent::Delete { .. } => false,
  }
}

/// Read side of a live entity: its value channel and cancellation token.
#[derive(Clone, Debug)]
pub struct EntityHandle {
  key: EntityKey,
  values: watch::Receiver<EntityState>,
  token: CancellationToken,
}

impl EntityHandle {
  /// Key of the entity.
  pub fn key(&self) -> EntityKey {
    self.key
  }

  /// Latest value published by the process.
  pub fn latest(&self) -> EntityState {
    self.values.borrow().clone()
  }

  /// A fresh receiver positioned at the latest value.
  pub fn subscribe(&self) -> watch::Receiver<EntityState> {
    self.values.clone()
  }

  /// Token cancelled when the process terminates or is torn down.
  pub fn token(&self) -> &CancellationToken {
    &self.token
  }

  /// True once the process has terminated or been torn down.
  pub fn is_closed(&self) -> bool {
    self.token.is_cancelled() || self.values.has_changed().is_err()
  }

  /// Stream of this entity's values, starting with the latest one.
  pub fn stream(&self) -> EntityStream {
    EntityStream {
      key: self.key,
      inner: WatchStream::new(self.values.clone())
        .take_until(Box::pin(self.token.clone().cancelled_owned())),
    }
  }
}

/// Values of one entity, latest first, ending when the entity terminates.
///
/// Dropping the stream affects neither the process nor other subscribers.
#[pin_project]
pub struct EntityStream {
  key: EntityKey,
  #[pin]
  inner: TakeUntil<WatchStream<EntityState>, Pin<Box<WaitForCancellationFutureOwned>>>,
}

impl EntityStream {
  /// Key of the observed entity.
  pub fn key(&self) -> EntityKey {
    self.key
  }
}

impl Stream for EntityStream {
  type Item = EntityState;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.project().inner.poll_next(cx)
  }
}

/// State machine owning one entity's value.
#[derive(Debug)]
pub struct EntityProcess {
  key: EntityKey,
  state: EntityState,
  lifecycle: Lifecycle,
  values: watch::Sender<EntityState>,
  token: CancellationToken,
}

impl EntityProcess {
  /// Creates an active process seeded with the default state.
  ///
  /// `parent` is the registry's token; cancelling it tears this process down too.
  pub fn new(key: EntityKey, parent: &CancellationToken) -> Self {
    let state = EntityState::seed(key);
    let (values, _) = watch::channel(state.clone());
    Self {
      key,
      state,
      lifecycle: Lifecycle::Active,
      values,
      token: parent.child_token(),
    }
  }

  /// Key of this process.
  pub fn key(&self) -> EntityKey {
    self.key
  }

  /// Current folded state.
  pub fn state(&self) -> &EntityState {
    &self.state
  }

  /// Current lifecycle.
  pub fn lifecycle(&self) -> Lifecycle {
    self.lifecycle
  }

  /// Read handle for observers.
  pub fn handle(&self) -> EntityHandle {
    EntityHandle {
      key: self.key,
      values: self.values.subscribe(),
      token: self.token.clone(),
    }
  }

  /// Applies one routed event.
  pub fn apply(&mut self, event: &MutationEvent) -> Step {
    if self.lifecycle == Lifecycle::Terminated {
      warn!(key = %self.key, kind = %event.kind(), "event after termination ignored");
      return Step::Ignored;
    }
    if fold(&mut self.state, event) {
      self.values.send_replace(self.state.clone());
      trace!(key = %self.key, kind = %event.kind(), "entity folded");
      Step::Emitted(self.state.clone())
    } else {
      self.lifecycle = Lifecycle::Terminated;
      self.token.cancel();
      Step::Terminated
    }
  }
}

impl Drop for EntityProcess {
  fn drop(&mut self) {
    self.token.cancel();
  }
}
