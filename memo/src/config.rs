//! Deserializable cache settings.
//!
//! Timeouts are written as human-readable spans such as `"90s"`,
//! `"1h 30m"` or `"2 days"`, or as the words `"unlimited"` and `"zero"`.
//! Field names accept both `camelCase` and `snake_case`.

use crate::builder::{DEFAULT_MAX_TIMEOUT, DEFAULT_TIMEOUT};
use crate::ttl::Ttl;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
  /// Applied when a lookup names no TTL policy.
  #[serde(alias = "default_timeout")]
  pub default_timeout: Ttl,
  /// The ceiling every TTL is clamped to.
  #[serde(alias = "max_timeout")]
  pub max_timeout: Ttl,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub shards: Option<usize>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_timeout: DEFAULT_TIMEOUT,
      max_timeout: DEFAULT_MAX_TIMEOUT,
      shards: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_fields_take_defaults() {
    let config: CacheConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, CacheConfig::default());
  }

  #[test]
  fn reads_both_spellings() {
    let camel: CacheConfig =
      serde_json::from_str(r#"{"defaultTimeout":"90s","maxTimeout":"1 day","shards":8}"#).unwrap();
    let snake: CacheConfig =
      serde_json::from_str(r#"{"default_timeout":"90s","max_timeout":"1d","shards":8}"#).unwrap();

    assert_eq!(camel, snake);
    assert_eq!(camel.default_timeout, Ttl::from_secs(90));
    assert_eq!(camel.max_timeout, Ttl::from_days(1));
  }

  #[test]
  fn rejects_bad_spans() {
    let err = serde_json::from_str::<CacheConfig>(r#"{"defaultTimeout":"soon"}"#).unwrap_err();
    assert!(err.to_string().contains("soon"), "{err}");
  }
}
