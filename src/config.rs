//! Layer configuration.
//!
//! Configs are plain serde structs so they can be embedded in whatever
//! network description the caller loads. Missing fields take their
//! defaults.
//!
//! ```
//! use bagpool::config::{LayerConfig, TieGradient};
//!
//! let config = LayerConfig::from_json(
//!     r#"{ "name": "mil", "type": "MIL", "mil_param": { "instances_per_bag": 4 } }"#,
//! ).unwrap();
//! let mil = config.mil_param.unwrap();
//! assert_eq!(mil.instances_per_bag, 4);
//! assert_eq!(mil.tie_gradient, TieGradient::Duplicate);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// How the upstream gradient is shared between instances tied for a bag maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieGradient {
    /// Every tied instance receives the full gradient.
    #[default]
    Duplicate,
    /// Tied instances receive equal shares that sum to the gradient.
    Split,
}

/// Parameters of the bag max pooling layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MilConfig {
    /// Number of consecutive instances grouped into one bag.
    pub instances_per_bag: usize,
    /// Gradient policy for tied maxima.
    pub tie_gradient: TieGradient,
    /// Drop trailing instances that do not fill a whole bag instead of failing.
    pub allow_partial_bags: bool,
}

impl Default for MilConfig {
    fn default() -> Self {
        Self {
            instances_per_bag: 1,
            tie_gradient: TieGradient::Duplicate,
            allow_partial_bags: false,
        }
    }
}

impl MilConfig {
    pub fn new(instances_per_bag: usize) -> Self {
        Self {
            instances_per_bag,
            ..Default::default()
        }
    }

    /// Sets the tie gradient policy.
    pub fn with_tie_gradient(mut self, tie_gradient: TieGradient) -> Self {
        self.tie_gradient = tie_gradient;
        self
    }

    pub fn with_allow_partial_bags(mut self, allow: bool) -> Self {
        self.allow_partial_bags = allow;
        self
    }
}

/// Description of one layer inside a network definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub name: String,
    /// Registered layer type, e.g. `"MIL"`.
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mil_param: Option<MilConfig>,
}

impl LayerConfig {
    pub fn new(name: &str, layer_type: &str) -> Self {
        Self {
            name: name.to_string(),
            layer_type: layer_type.to_string(),
            mil_param: None,
        }
    }

    pub fn with_mil_param(mut self, mil_param: MilConfig) -> Self {
        self.mil_param = Some(mil_param);
        self
    }

    /// Parses a layer description from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mil_defaults() {
        let config: MilConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MilConfig::default());
        assert_eq!(config.instances_per_bag, 1);
        assert!(!config.allow_partial_bags);
    }

    #[test]
    fn test_tie_gradient_names() {
        let config: MilConfig =
            serde_json::from_str(r#"{ "instances_per_bag": 3, "tie_gradient": "split" }"#).unwrap();
        assert_eq!(config.tie_gradient, TieGradient::Split);
        assert_eq!(config.instances_per_bag, 3);
    }

    #[test]
    fn test_layer_config_roundtrip() {
        let config = LayerConfig::new("mil1", "MIL")
            .with_mil_param(MilConfig::new(8).with_allow_partial_bags(true));
        let parsed = LayerConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_type_is_error() {
        let err = LayerConfig::from_json(r#"{ "name": "x" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::JsonError(_)));
    }
}
