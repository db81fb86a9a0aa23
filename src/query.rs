//! Read-side helpers derived from the collection snapshot.
//!
//! [`AggregateStats`] is a pure function of a [`CollectionSnapshot`]. The
//! [`Filter`] and its [`FilterCell`] are owned by consumers, not by the store:
//! they are applied at read time and never change the snapshot.

use crate::composer::CollectionSnapshot;
use crate::event::EntityState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Counts derived from the live collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateStats {
  /// Number of live entities.
  pub total: usize,
  /// Entities marked done.
  pub completed: usize,
  /// Entities not marked done.
  pub pending: usize,
  /// `completed / total * 100`, rounded half up; 0 for an empty collection.
  pub percent_complete: u32,
}

impl AggregateStats {
  /// Computes stats over any set of entity values.
  pub fn from_states<'a, I>(states: I) -> Self
  where
    I: IntoIterator<Item = &'a EntityState>,
  {
    let (total, completed) = states
      .into_iter()
      .fold((0usize, 0usize), |(total, completed), state| {
        (total + 1, completed + usize::from(state.done))
      });
    Self {
      total,
      completed,
      pending: total - completed,
      percent_complete: percent(completed, total),
    }
  }

  /// Computes stats over a snapshot.
  pub fn from_snapshot(snapshot: &CollectionSnapshot) -> Self {
    Self::from_states(snapshot.values())
  }
}

// Integer half-up rounding of part / whole * 100.
fn percent(part: usize, whole: usize) -> u32 {
  if whole == 0 {
    return 0;
  }
  let rounded = (200 * part + whole) / (2 * whole);
  u32::try_from(rounded).unwrap_or(u32::MAX)
}

/// Which entities a consumer wants to see.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
  /// Every entity.
  #[default]
  All,
  /// Entities marked done.
  Done,
  /// Entities not marked done.
  Pending,
}

impl Filter {
  /// True if the entity passes this filter.
  pub fn matches(self, state: &EntityState) -> bool {
    match self {
      Filter::All => true,
      Filter::Done => state.done,
      Filter::Pending => !state.done,
    }
  }
}

impl fmt::Display for Filter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Filter::All => "all",
      Filter::Done => "done",
      Filter::Pending => "pending",
    })
  }
}

/// Error returned when parsing an unknown filter name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown filter `{0}`, expected one of all, done, pending")]
pub struct ParseFilterError(String);

impl FromStr for Filter {
  type Err = ParseFilterError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "all" => Ok(Filter::All),
      "done" | "completed" => Ok(Filter::Done),
      "pending" | "uncompleted" => Ok(Filter::Pending),
      other => Err(ParseFilterError(other.to_string())),
    }
  }
}

/// Replay-latest holder for the currently selected filter.
///
/// Clones share the same cell.
#[derive(Clone, Debug)]
pub struct FilterCell {
  current: Arc<watch::Sender<Filter>>,
}

impl FilterCell {
  /// Creates a cell holding [`Filter::All`].
  pub fn new() -> Self {
    Self::with_initial(Filter::All)
  }

  /// Creates a cell holding `initial`.
  pub fn with_initial(initial: Filter) -> Self {
    let (current, _) = watch::channel(initial);
    Self {
      current: Arc::new(current),
    }
  }

  /// The selected filter.
  pub fn get(&self) -> Filter {
    *self.current.borrow()
  }

  /// Selects a filter. Subscribers are notified only on an actual change.
  pub fn set(&self, filter: Filter) {
    self.current.send_if_modified(|current| {
      if *current == filter {
        false
      } else {
        *current = filter;
        true
      }
    });
  }

  /// Receiver positioned at the current selection.
  pub fn subscribe(&self) -> watch::Receiver<Filter> {
    self.current.subscribe()
  }

  /// Stream starting with the current selection, then every change.
  pub fn stream(&self) -> WatchStream<Filter> {
    WatchStream::new(self.subscribe())
  }
}

impl Default for FilterCell {
  fn default() -> Self {
    Self::new()
  }
}
