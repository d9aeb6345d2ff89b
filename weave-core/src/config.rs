//! Binder configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the binder recognizes its attributes, and its timing defaults.
///
/// Every field has a default, so a partial JSON document is a valid
/// configuration:
///
/// ```rust
/// use weave_core::BinderConfig;
///
/// let config = BinderConfig::from_json(r#"{"prefix": "x-"}"#).unwrap();
/// assert_eq!(config.attribute("text"), "x-text");
/// assert_eq!(config.model_debounce_ms, 300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    /// Prefix of every binder attribute.
    pub prefix: String,
    /// Name (after the prefix) of the root marker attribute.
    pub root_attribute: String,
    /// Name (after the prefix) of the list key attribute.
    pub key_attribute: String,
    /// Delay of `.debounce` on model bindings without an explicit delay.
    pub model_debounce_ms: u64,
    /// Delay of `.debounce` on event handlers without an explicit delay.
    pub handler_debounce_ms: u64,
    /// Leave nested roots alone when binding an outer root.
    pub skip_nested_roots: bool,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            prefix: "data-".to_string(),
            root_attribute: "weave".to_string(),
            key_attribute: "key".to_string(),
            model_debounce_ms: 300,
            handler_debounce_ms: 300,
            skip_nested_roots: true,
        }
    }
}

impl BinderConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Full attribute name for a directive name.
    pub fn attribute(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Full name of the root marker attribute.
    pub fn root_marker(&self) -> String {
        self.attribute(&self.root_attribute)
    }

    /// Full name of the list key attribute.
    pub fn key_marker(&self) -> String {
        self.attribute(&self.key_attribute)
    }

    /// The directive part of `attribute`, if it carries the prefix.
    pub fn strip_prefix<'a>(&self, attribute: &'a str) -> Option<&'a str> {
        attribute.strip_prefix(self.prefix.as_str()).filter(|rest| !rest.is_empty())
    }

    pub fn model_debounce(&self) -> Duration {
        Duration::from_millis(self.model_debounce_ms)
    }

    pub fn handler_debounce(&self) -> Duration {
        Duration::from_millis(self.handler_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn defaults() {
        let config = BinderConfig::default();
        assert_eq!(config.root_marker(), "data-weave");
        assert_eq!(config.key_marker(), "data-key");
        assert_eq!(config.strip_prefix("data-on:click"), Some("on:click"));
        assert_eq!(config.strip_prefix("data-"), None);
        assert_eq!(config.strip_prefix("class"), None);
        assert_eq!(config.handler_debounce(), Duration::from_millis(300));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BinderConfig::from_json(r#"{"root_attribute": "app", "model_debounce_ms": 50}"#).unwrap();
        assert_eq!(config.root_marker(), "data-app");
        assert_eq!(config.model_debounce(), Duration::from_millis(50));
        assert!(config.skip_nested_roots);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = BinderConfig::from_json(r#"{"prefix": 3}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn serializes_back_to_json() {
        let json = serde_json::to_value(BinderConfig::default()).unwrap();
        assert_eq!(json["prefix"], "data-");
        assert_eq!(json["skip_nested_roots"], true);
    }
}
