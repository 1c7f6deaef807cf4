//! Prediction run configuration.

use serde::{Deserialize, Serialize};

/// Metadata kind written by the training step for this model runtime.
pub const DEFAULT_MODEL_DESC_KIND: &str = "tensorflow_model_desc";

/// Result storage driver handed to executors.
///
/// This code path writes results through the platform table service only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    #[default]
    PaiMaxcompute,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::PaiMaxcompute => "pai_maxcompute",
        }
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_kind() -> String {
    DEFAULT_MODEL_DESC_KIND.to_string()
}

fn default_batch_size() -> usize {
    1
}

/// Tunables for a prediction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictConfig {
    /// Metadata kind to load from the model root.
    #[serde(default = "default_kind")]
    pub model_desc_kind: String,

    /// Rows per batch pulled from the source table.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub driver: Driver,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            model_desc_kind: default_kind(),
            batch_size: default_batch_size(),
            driver: Driver::default(),
        }
    }
}

impl PredictConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}
