//! Store configuration.
//!
//! [`StoreConfig`] follows the builder style used by the pipeline stages:
//! start from `Default` and chain `with_*` calls. It can also be read from
//! JSON, where `read_timeout` is given in milliseconds:
//!
//! ```rust
//! use todoweave::config::StoreConfig;
//! use std::time::Duration;
//!
//! let config = StoreConfig::from_json(r#"{ "name": "todos", "read_timeout": 250 }"#).unwrap();
//! assert_eq!(config.name(), "todos");
//! assert_eq!(config.read_timeout, Duration::from_millis(250));
//! assert_eq!(config.first_key, 0);
//! ```

use crate::error::{ErrorStrategy, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_NAME: &str = "store";

/// Configuration for one [`Store`](crate::store::Store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Name used in logs and component info.
  pub name: Option<String>,
  /// First key handed out by `create`.
  pub first_key: u64,
  /// Upper bound on how long `entity_by_key` waits for in-flight events.
  #[serde(with = "millis")]
  pub read_timeout: Duration,
  /// Policy for raw events that cannot be decoded.
  #[serde(skip)]
  pub malformed: ErrorStrategy,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      name: None,
      first_key: 0,
      read_timeout: Duration::from_secs(5),
      malformed: ErrorStrategy::Skip,
    }
  }
}

impl StoreConfig {
  /// Parses a configuration from JSON. Missing fields keep their defaults.
  pub fn from_json(json: &str) -> StoreResult<Self> {
    serde_json::from_str(json).map_err(|e| StoreError::Config(e.to_string()))
  }

  /// Sets the store name.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Sets the first key handed out by `create`.
  pub fn with_first_key(mut self, first_key: u64) -> Self {
    self.first_key = first_key;
    self
  }

  /// Sets the bound on `entity_by_key` waits.
  pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
    self.read_timeout = timeout;
    self
  }

  /// Sets the policy for undecodable raw events.
  pub fn with_malformed_strategy(mut self, strategy: ErrorStrategy) -> Self {
    self.malformed = strategy;
    self
  }

  /// The configured name, or `"store"`.
  pub fn name(&self) -> &str {
    self.name.as_deref().unwrap_or(DEFAULT_NAME)
  }
}

mod millis {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
  }
}
