//! # Transformer Trait
//!
//! A [`Transformer`] turns one message stream into another. The store
//! pipeline is two transformers chained back to back:
//!
//! ```text
//! EventBus ──Message<Inbound>──► Partitioner ──Message<KeyedChange>──► CollectionComposer ──► CollectionView
//! ```
//!
//! Both stages run inside the same task, so each bus message is fully
//! processed by both stages before the next one is pulled.
//!
//! ## Example
//!
//! ```rust,ignore
//! use todoweave::transformer::Transformer;
//! use futures::StreamExt;
//!
//! let mut changes = partitioner.transform(Box::pin(bus.subscribe())).await;
//! while let Some(change) = changes.next().await {
//!   println!("{:?}", change.payload());
//! }
//! ```

use crate::error::ComponentInfo;
use crate::{input::Input, output::Output};
use async_trait::async_trait;

/// Configuration shared by all transformers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformerConfig {
  /// Optional name for identifying this transformer in logs.
  pub name: Option<String>,
}

impl TransformerConfig {
  /// Sets the name for this transformer configuration.
  pub fn with_name(mut self, name: String) -> Self {
    self.name = Some(name);
    self
  }

  /// Returns the current name, if set.
  pub fn name(&self) -> Option<String> {
    self.name.clone()
  }
}

/// Trait for components that transform message streams.
#[async_trait]
pub trait Transformer: Input + Output {
  /// Transforms a stream of input items into a stream of output items.
  ///
  /// State the stage needs across items (a registry, a snapshot) is created
  /// here and moved into the returned stream, so each call starts fresh.
  async fn transform(&mut self, input: Self::InputStream) -> Self::OutputStream;

  /// Returns a reference to the transformer's configuration.
  fn config(&self) -> &TransformerConfig;

  /// Returns a mutable reference to the transformer's configuration.
  fn config_mut(&mut self) -> &mut TransformerConfig;

  /// Sets the name for this transformer.
  #[must_use]
  fn with_name(mut self, name: String) -> Self
  where
    Self: Sized,
  {
    self.config_mut().name = Some(name);
    self
  }

  /// Returns information about the component for logs and error reports.
  fn component_info(&self) -> ComponentInfo {
    ComponentInfo {
      name: self
        .config()
        .name()
        .unwrap_or_else(|| "transformer".to_string()),
      type_name: std::any::type_name::<Self>().to_string(),
    }
  }
}
