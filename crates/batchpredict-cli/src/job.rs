//! TOML job files.
//!
//! ```toml
//! [request]
//! data_table = "alifin.iris_predict_tmp"
//! result_table = "alifin.iris_predict"
//! label_column = "class"
//! model_path = "models/iris"
//!
//! [config]
//! batch_size = 64
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use batchpredict_core::{PredictConfig, PredictRequest};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PredictJob {
    pub request: PredictRequest,
    #[serde(default)]
    pub config: PredictConfig,
}

impl PredictJob {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid job file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }
}
