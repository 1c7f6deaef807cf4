//! Error taxonomy for prediction runs.
//!
//! Every failure of `run_prediction` maps to exactly one [`PredictStage`], so
//! operators can tell a broken artifact from a broken spec from a broken
//! registration without reading the cause chain.

use batchpredict_store::StorageError;
use serde::Serialize;

use crate::result_table::ResultTableError;

/// The step of a prediction run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictStage {
    MetadataLoad,
    Reconstruction,
    Resolution,
    ArtifactFetch,
    ResultTable,
    BatchSource,
    Inference,
}

impl PredictStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictStage::MetadataLoad => "metadata_load",
            PredictStage::Reconstruction => "reconstruction",
            PredictStage::Resolution => "resolution",
            PredictStage::ArtifactFetch => "artifact_fetch",
            PredictStage::ResultTable => "result_table",
            PredictStage::BatchSource => "batch_source",
            PredictStage::Inference => "inference",
        }
    }
}

impl std::fmt::Display for PredictStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while rebuilding feature columns from their serialized form.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconstructionError {
    #[error("feature column spec is malformed: {0}")]
    Malformed(String),

    #[error("unknown feature column constructor `{name}`")]
    UnknownConstructor { name: String },

    #[error("invalid arguments to {constructor}: {reason}")]
    InvalidArguments {
        constructor: String,
        reason: String,
    },

    #[error("{constructor} expects a {expected} column, got {found}")]
    WrongNesting {
        constructor: String,
        expected: &'static str,
        found: String,
    },

    #[error("feature `{name}` has no metadata")]
    MissingFeatureMeta { name: String },
}

/// Errors produced while resolving a model reference through the registry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("unknown model `{name}`")]
    UnknownModel { name: String },

    #[error("model name `{name}` is already registered")]
    DuplicateModel { name: String },

    #[error("model `{model}` is missing hyperparameters: {}", params.join(", "))]
    MissingParams { model: String, params: Vec<String> },
}

/// Errors raised inside an inference executor.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("numeric failure: {0}")]
    Numeric(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors surfaced by `run_prediction`.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("metadata load failed: {0}")]
    MetadataLoad(#[source] StorageError),

    #[error("invalid model metadata: {0}")]
    InvalidMetadata(String),

    #[error("feature column reconstruction failed: {0}")]
    Reconstruction(#[from] ReconstructionError),

    #[error("model resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("artifact fetch failed: {0}")]
    ArtifactFetch(#[source] StorageError),

    #[error("result table creation failed: {0}")]
    ResultTable(#[from] ResultTableError),

    #[error("batch source failed: {0}")]
    BatchSource(#[source] StorageError),

    #[error("inference failed: {0}")]
    Executor(#[from] ExecutorError),
}

impl PredictError {
    /// The stage this error aborted.
    pub fn stage(&self) -> PredictStage {
        match self {
            PredictError::MetadataLoad(_) | PredictError::InvalidMetadata(_) => {
                PredictStage::MetadataLoad
            }
            PredictError::Reconstruction(_) => PredictStage::Reconstruction,
            PredictError::Resolution(_) => PredictStage::Resolution,
            PredictError::ArtifactFetch(_) => PredictStage::ArtifactFetch,
            PredictError::ResultTable(_) => PredictStage::ResultTable,
            PredictError::BatchSource(_) => PredictStage::BatchSource,
            PredictError::Executor(_) => PredictStage::Inference,
        }
    }
}

/// Result type for prediction runs.
pub type Result<T> = std::result::Result<T, PredictError>;
