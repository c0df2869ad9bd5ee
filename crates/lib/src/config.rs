//! Runtime configuration for an [`Instance`](crate::Instance).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// How strictly serialized fields are checked when read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeserializeMode {
    /// A serialized object without a `__type` tag is an error.
    #[default]
    Strict,
    /// A serialized object without a `__type` tag reads as absent and logs a warning.
    Relaxed,
}

/// Settings that shape how documents are created and loaded.
///
/// Every field has a default, so a partial JSON file is a valid configuration.
///
/// ```
/// use dashfields::{DeserializeMode, ModelConfig};
///
/// let config: ModelConfig =
///     serde_json::from_str(r#"{ "deserialize_mode": "relaxed" }"#).unwrap();
/// assert_eq!(config.deserialize_mode, DeserializeMode::Relaxed);
/// assert!(config.prefetch_protos);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub deserialize_mode: DeserializeMode,
    /// Author recorded on documents produced by copy, delegate and alias.
    pub current_user: Option<String>,
    /// Start loading a document's prototype as soon as the document is deserialized.
    pub prefetch_protos: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            deserialize_mode: DeserializeMode::Strict,
            current_user: None,
            prefetch_protos: true,
        }
    }
}

impl ModelConfig {
    /// Reads a configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Returns true if missing type tags are tolerated.
    pub fn is_relaxed(&self) -> bool {
        self.deserialize_mode == DeserializeMode::Relaxed
    }
}
