//! # TodoWeave
//!
//! A reactive keyed-entity store built as a two-stage stream pipeline.
//!
//! One event bus carries tagged mutations. The partitioner spawns one entity
//! process per key and routes every later event for that key to it. The
//! composer recombines the live keys with each process's latest value into a
//! single consistent, multicast collection view. The query surface reads from
//! that view.
//!
//! ## Key Features
//!
//! - **Exactly one process per key**: spawned on first sight, torn down on delete, never resurrected
//! - **Consistent snapshots**: a key and its value enter and leave the view in the same emission
//! - **Replay-latest subscriptions**: late subscribers see the current value immediately
//! - **Explicit lifecycle**: one `Store` instance, started and shut down by its owner
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use todoweave::{Store, StoreConfig, StoreError};
//!
//! # async fn run() -> todoweave::StoreResult<()> {
//! let store = Store::start(StoreConfig::default().with_name("todos"));
//! let milk = store.create("buy milk")?;
//! store.toggle(milk)?;
//! let dog = store.create("walk dog")?;
//! store.delete(milk)?;
//! store.sync().await?;
//!
//! assert_eq!(store.all_keys(), vec![dog]);
//! assert_eq!(store.entity_by_key(milk).await, Err(StoreError::NotFound { key: milk }));
//! store.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Multi-producer, multicast event bus.
pub mod bus;
/// Recombination stage producing collection views.
pub mod composer;
/// Store configuration.
pub mod config;
/// Per-key entity processes.
pub mod entity;
/// Error types and malformed-event strategies.
pub mod error;
/// Keys, mutation events and entity values.
pub mod event;
/// Input side of a pipeline stage.
pub mod input;
/// Message envelope carried on the bus.
pub mod message;
/// Output side of a pipeline stage.
pub mod output;
/// Keyed-spawn stage and its process registry.
pub mod partitioner;
/// Aggregate stats and consumer-owned filters.
pub mod query;
/// The store facade.
pub mod store;
/// Transformer trait shared by the pipeline stages.
pub mod transformer;

pub use bus::{BusSubscription, EventBus};
pub use composer::{CollectionComposer, CollectionSnapshot, CollectionView};
pub use config::StoreConfig;
pub use entity::{EntityHandle, EntityProcess, EntityStream, Lifecycle, Step};
pub use error::{
  ComponentInfo, ErrorAction, ErrorContext, ErrorStrategy, EventError, StoreError, StoreResult,
};
pub use event::{EntityKey, EntityState, Inbound, KeyAllocator, MutationEvent, MutationKind};
pub use input::Input;
pub use message::{Message, MessageId, MessageMetadata};
pub use output::Output;
pub use partitioner::{DropReason, KeyedChange, Partitioner, ProcessRegistry, RetiredKeys};
pub use query::{AggregateStats, Filter, FilterCell, ParseFilterError};
pub use store::{KeysStream, SnapshotStream, StatsStream, Store};
pub use transformer::{Transformer, TransformerConfig};

#[cfg(test)]
mod event_test;
#[cfg(test)]
mod message_test;
#[cfg(test)]
mod partitioner_test;
#[cfg(test)]
mod query_test;
#[cfg(test)]
mod transformer_test;
