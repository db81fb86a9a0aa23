//! # Transformer Trait Test Suite
//!
//! Covers the trait's default methods against a minimal stage, so the
//! naming and component info used by the pipeline stages stay stable.

use crate::message::{Message, MessageId};
use crate::transformer::{Transformer, TransformerConfig};
use crate::{Input, Output};
use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use std::pin::Pin;

#[derive(Default)]
struct Doubler {
  config: TransformerConfig,
}

impl Input for Doubler {
  type Input = Message<u32>;
  type InputStream = Pin<Box<dyn Stream<Item = Message<u32>> + Send>>;
}

impl Output for Doubler {
  type Output = Message<u32>;
  type OutputStream = Pin<Box<dyn Stream<Item = Message<u32>> + Send>>;
}

#[async_trait]
impl Transformer for Doubler {
  async fn transform(&mut self, input: Self::InputStream) -> Self::OutputStream {
    Box::pin(input.map(|message| message.map(|n| n * 2)))
  }

  fn config(&self) -> &TransformerConfig {
    &self.config
  }

  fn config_mut(&mut self) -> &mut TransformerConfig {
    &mut self.config
  }
}

#[test]
fn test_config_name() {
  let config = TransformerConfig::default();
  assert_eq!(config.name(), None);
  assert_eq!(config.with_name("x".to_string()).name(), Some("x".to_string()));
}

#[test]
fn test_component_info_defaults() {
  let info = Doubler::default().component_info();
  assert_eq!(info.name, "transformer");
  assert!(info.type_name.ends_with("Doubler"));
}

#[test]
fn test_with_name() {
  let doubler = Doubler::default().with_name("double".to_string());
  assert_eq!(doubler.component_info().name, "double");
}

#[tokio::test]
async fn test_transform_keeps_message_ids() {
  let mut doubler = Doubler::default();
  let input = stream::iter((1..=3).map(|n| Message::new(n, MessageId::new_sequence(n as u64))));
  let output: Vec<_> = doubler
    .transform(Box::pin(input))
    .await
    .map(|message| (message.id().sequence(), message.into_payload()))
    .collect()
    .await;
  assert_eq!(output, vec![(Some(1), 2), (Some(2), 4), (Some(3), 6)]);
}
