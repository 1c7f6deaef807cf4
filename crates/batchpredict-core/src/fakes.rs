//! Recording executors (testing only)
//!
//! Both executors drain the batch stream they are handed, then record what
//! they received so tests can assert on the assembled arguments.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use crate::config::Driver;
use crate::error::ExecutorError;
use crate::executor::{
    DifferentiableExecutor, EstimatorExecutor, EstimatorPredictArgs, HdfsTarget, PredictArgs,
};
use crate::feature_column::FeatureColumn;
use crate::params::HyperParams;

/// Snapshot of one executor invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model_ref: String,
    pub params: HyperParams,
    pub save_dir: PathBuf,
    pub result_table: String,
    pub feature_names: Vec<String>,
    pub feature_meta_names: Vec<String>,
    pub train_label_name: String,
    pub result_col_name: String,
    pub driver: Driver,
    pub has_conn: bool,
    pub selected_cols: Vec<String>,
    pub hdfs: HdfsTarget,
    pub batches: usize,
    pub rows: usize,
    /// Estimator-only arguments; `None` for differentiable calls.
    pub feature_name_map: Option<BTreeMap<String, Vec<String>>>,
    pub feature_columns: Option<BTreeMap<String, Vec<FeatureColumn>>>,
}

async fn drain(args: PredictArgs) -> Result<RecordedCall, ExecutorError> {
    let PredictArgs {
        model_ref,
        params,
        save_dir,
        result_table,
        feature_names,
        feature_metas,
        train_label_name,
        result_col_name,
        driver,
        conn,
        mut batches,
        selected_cols,
        hdfs,
    } = args;

    let mut batch_count = 0;
    let mut rows = 0;
    while let Some(batch) = batches.next().await {
        let batch = batch?;
        batch_count += 1;
        rows += batch.len();
    }

    Ok(RecordedCall {
        model_ref,
        params,
        save_dir,
        result_table,
        feature_names,
        feature_meta_names: feature_metas.into_keys().collect(),
        train_label_name,
        result_col_name,
        driver,
        has_conn: conn.is_some(),
        selected_cols,
        hdfs,
        batches: batch_count,
        rows,
        feature_name_map: None,
        feature_columns: None,
    })
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Mutex<Vec<RecordedCall>>,
    failure: Option<String>,
}

impl Recorder {
    fn finish(&self, call: RecordedCall) -> Result<(), ExecutorError> {
        self.calls.lock().unwrap().push(call);
        match &self.failure {
            Some(message) => Err(ExecutorError::Numeric(message.clone())),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingEstimatorExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingEstimatorExecutor {
    recorder: Recorder,
}

impl RecordingEstimatorExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the call, then fail with a numeric error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            recorder: Recorder {
                failure: Some(message.into()),
                ..Default::default()
            },
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.recorder.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EstimatorExecutor for RecordingEstimatorExecutor {
    async fn predict(&self, args: EstimatorPredictArgs) -> Result<(), ExecutorError> {
        let EstimatorPredictArgs {
            base,
            feature_name_map,
            feature_columns,
        } = args;
        let mut call = drain(base).await?;
        call.feature_name_map = Some(feature_name_map);
        call.feature_columns = Some(feature_columns);
        self.recorder.finish(call)
    }
}

// ---------------------------------------------------------------------------
// RecordingDifferentiableExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingDifferentiableExecutor {
    recorder: Recorder,
}

impl RecordingDifferentiableExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the call, then fail with a numeric error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            recorder: Recorder {
                failure: Some(message.into()),
                ..Default::default()
            },
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.recorder.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DifferentiableExecutor for RecordingDifferentiableExecutor {
    async fn predict(&self, args: PredictArgs) -> Result<(), ExecutorError> {
        let call = drain(args).await?;
        self.recorder.finish(call)
    }
}
