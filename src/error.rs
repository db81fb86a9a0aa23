//! # Error Handling
//!
//! Error types for the store and the policy used when a producer hands the
//! store an event it cannot decode.
//!
//! ## Core Types
//!
//! - **StoreError**: Every failure a caller of the store can observe
//! - **ErrorAction**: What to do with one undecodable event (Stop or Skip)
//! - **ErrorStrategy**: How actions are chosen (Stop, Skip, Custom)
//! - **EventError**: Rich context for an undecodable event, handed to custom strategies
//! - **ComponentInfo**: Component name and type information for error reporting
//!
//! ## Error Strategies
//!
//! - **Skip** (default): Publish the raw event anyway; the partitioner drops it
//!   and logs a warning, keeping the pipeline alive
//! - **Stop**: Reject the event at publish time with [`StoreError::MalformedEvent`]
//! - **Custom**: User-defined handler deciding per event
//!
//! ```rust
//! use todoweave::error::{ErrorAction, ErrorStrategy};
//!
//! let strategy = ErrorStrategy::new_custom(|error| {
//!   if error.reason.contains("unknown variant") {
//!     ErrorAction::Skip
//!   } else {
//!     ErrorAction::Stop
//!   }
//! });
//! assert_ne!(strategy, ErrorStrategy::Stop);
//! ```

use crate::event::EntityKey;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the store's read and write surfaces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
  /// The key is not (or no longer) part of the active key set.
  #[error("entity {key} not found")]
  NotFound {
    /// Key that was looked up.
    key: EntityKey,
  },
  /// Events that could materialize the key were still in flight when the
  /// read timeout elapsed.
  #[error("timed out after {waited:?} waiting for entity {key}")]
  Timeout {
    /// Key that was looked up.
    key: EntityKey,
    /// How long the read waited.
    waited: Duration,
  },
  /// A raw event could not be decoded into a mutation and the configured
  /// strategy rejected it.
  #[error("malformed mutation event: {reason}")]
  MalformedEvent {
    /// Decoder message.
    reason: String,
  },
  /// Configuration could not be parsed.
  #[error("invalid store configuration: {0}")]
  Config(String),
  /// The store has been shut down.
  #[error("store is closed")]
  Closed,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Action to take for one undecodable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
  /// Reject the event; the producer gets an error and nothing is published.
  Stop,
  /// Let the event through; the partitioner drops it.
  Skip,
}

type CustomErrorHandler = Arc<dyn Fn(&EventError) -> ErrorAction + Send + Sync>;

/// Strategy for handling undecodable events.
#[derive(Clone, Default)]
pub enum ErrorStrategy {
  /// Reject every undecodable event.
  Stop,
  /// Drop undecodable events inside the pipeline.
  #[default]
  Skip,
  /// Decide per event.
  Custom(CustomErrorHandler),
}

impl ErrorStrategy {
  /// Creates a custom strategy from a handler function.
  pub fn new_custom<F>(f: F) -> Self
  where
    F: Fn(&EventError) -> ErrorAction + Send + Sync + 'static,
  {
    ErrorStrategy::Custom(Arc::new(f))
  }

  /// Resolves the action for one error.
  pub fn decide(&self, error: &EventError) -> ErrorAction {
    match self {
      ErrorStrategy::Stop => ErrorAction::Stop,
      ErrorStrategy::Skip => ErrorAction::Skip,
      ErrorStrategy::Custom(handler) => handler(error),
    }
  }
}

impl fmt::Debug for ErrorStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorStrategy::Stop => write!(f, "ErrorStrategy::Stop"),
      ErrorStrategy::Skip => write!(f, "ErrorStrategy::Skip"),
      ErrorStrategy::Custom(_) => write!(f, "ErrorStrategy::Custom"),
    }
  }
}

impl PartialEq for ErrorStrategy {
  fn eq(&self, other: &Self) -> bool {
    matches!(
      (self, other),
      (ErrorStrategy::Stop, ErrorStrategy::Stop)
        | (ErrorStrategy::Skip, ErrorStrategy::Skip)
        | (ErrorStrategy::Custom(_), ErrorStrategy::Custom(_))
    )
  }
}

/// Where and when an error occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
  /// When the error was detected.
  pub timestamp: DateTime<Utc>,
  /// The raw item that caused the error, if available.
  pub item: Option<serde_json::Value>,
  /// Name of the component that detected the error.
  pub component_name: String,
  /// Type of the component that detected the error.
  pub component_type: String,
}

/// An undecodable event together with its context.
#[derive(Debug, Clone, PartialEq)]
pub struct EventError {
  /// Why decoding failed.
  pub reason: String,
  /// Where the failure was detected.
  pub context: ErrorContext,
}

impl EventError {
  /// Creates a new event error.
  pub fn new(reason: impl Into<String>, context: ErrorContext) -> Self {
    Self {
      reason: reason.into(),
      context,
    }
  }
}

impl fmt::Display for EventError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} ({}) rejected event: {}",
      self.context.component_name, self.context.component_type, self.reason
    )
  }
}

impl std::error::Error for EventError {}

impl From<EventError> for StoreError {
  fn from(error: EventError) -> Self {
    StoreError::MalformedEvent {
      reason: error.reason,
    }
  }
}

/// Component identification for logs and error reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
  /// Configured or default name.
  pub name: String,
  /// Rust type name of the component.
  pub type_name: String,
}

impl ComponentInfo {
  /// Creates a new component info.
  pub fn new(name: String, type_name: String) -> Self {
    Self { name, type_name }
  }

  /// Builds an [`ErrorContext`] stamped now for this component.
  pub fn context(&self, item: Option<serde_json::Value>) -> ErrorContext {
    ErrorContext {
      timestamp: Utc::now(),
      item,
      component_name: self.name.clone(),
      component_type: self.type_name.clone(),
    }
  }
}
