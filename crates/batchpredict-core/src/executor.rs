//! Inference executor contracts.
//!
//! There is one executor per model family. Both receive the same base
//! argument bundle; estimators additionally get the feature-column groups
//! and the group -> feature-name mapping.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use batchpredict_store::{BatchStream, FieldMeta, SqlDatabase};
use serde::Serialize;

use crate::config::Driver;
use crate::error::ExecutorError;
use crate::feature_column::FeatureColumn;
use crate::params::HyperParams;

/// Address fields for the Hive/HDFS result backend. Always empty on this
/// code path, which writes through the platform table service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HdfsTarget {
    pub namenode_addr: String,
    pub hive_location: String,
    pub user: String,
    pub password: String,
}

impl HdfsTarget {
    pub fn is_empty(&self) -> bool {
        self.namenode_addr.is_empty()
            && self.hive_location.is_empty()
            && self.user.is_empty()
            && self.password.is_empty()
    }
}

/// Arguments shared by both executor families.
pub struct PredictArgs {
    pub model_ref: String,
    pub params: HyperParams,
    /// Local weights directory, relative to the working directory.
    pub save_dir: PathBuf,
    pub result_table: String,
    pub feature_names: Vec<String>,
    pub feature_metas: BTreeMap<String, FieldMeta>,
    /// Label name the model was trained with.
    pub train_label_name: String,
    /// Column the predictions are written to.
    pub result_col_name: String,
    pub driver: Driver,
    /// Live connection; not used when results go through the table service.
    pub conn: Option<Arc<dyn SqlDatabase>>,
    pub batches: BatchStream,
    pub selected_cols: Vec<String>,
    pub hdfs: HdfsTarget,
}

impl std::fmt::Debug for PredictArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictArgs")
            .field("model_ref", &self.model_ref)
            .field("params", &self.params)
            .field("save_dir", &self.save_dir)
            .field("result_table", &self.result_table)
            .field("feature_names", &self.feature_names)
            .field("train_label_name", &self.train_label_name)
            .field("result_col_name", &self.result_col_name)
            .field("driver", &self.driver)
            .field("conn", &self.conn.is_some())
            .field("selected_cols", &self.selected_cols)
            .finish_non_exhaustive()
    }
}

/// Estimator calling convention.
#[derive(Debug)]
pub struct EstimatorPredictArgs {
    pub base: PredictArgs,
    pub feature_name_map: BTreeMap<String, Vec<String>>,
    pub feature_columns: BTreeMap<String, Vec<FeatureColumn>>,
}

/// Runs the estimator predict loop and writes results.
///
/// Returns only after every batch has been consumed and written.
#[async_trait]
pub trait EstimatorExecutor: Send + Sync {
    async fn predict(&self, args: EstimatorPredictArgs) -> Result<(), ExecutorError>;
}

/// Runs the differentiable-model forward pass and writes results.
///
/// Returns only after every batch has been consumed and written.
#[async_trait]
pub trait DifferentiableExecutor: Send + Sync {
    async fn predict(&self, args: PredictArgs) -> Result<(), ExecutorError>;
}
