//! Batchpredict Core Library
//!
//! Rehydrates a trained model from its stored metadata and dispatches batch
//! prediction to the executor of the model's family.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod feature_column;
pub mod obs;
pub mod orchestrator;
pub mod params;
pub mod registry;
pub mod result_table;
pub mod runtime;
pub mod telemetry;

pub use batchpredict_store::{
    ArtifactStore, FieldMeta, FsModelStore, JsonlTableSource, MetaStore, ModelMetas, SqlDatabase,
    SqlField, StorageError, TableRef, TableSource,
};

pub use artifacts::{fetch_artifacts, fetch_plan, FetchStep, EXPORTED_PATH_MARKER, MODEL_SAVE_DIR};
pub use config::{Driver, PredictConfig, DEFAULT_MODEL_DESC_KIND};
pub use error::{
    ExecutorError, PredictError, PredictStage, ReconstructionError, ResolutionError, Result,
};
pub use executor::{
    DifferentiableExecutor, EstimatorExecutor, EstimatorPredictArgs, HdfsTarget, PredictArgs,
};
pub use feature_column::{reconstruct, FeatureColumn, ReconstructedFeatures};
pub use obs::{
    emit_dispatch, emit_prediction_failed, emit_prediction_finished, emit_prediction_started,
    emit_stage_completed, prediction_span,
};
pub use orchestrator::{rehydrate, DispatchPlan, PredictRequest, Predictor, RehydratedModel};
pub use params::{HyperParams, ParamValue, FIELD_METAS_KEY, MODEL_DIR_KEY};
pub use registry::{classify, ModelDescriptor, ModelFamily, ModelForm, ModelRegistry, ModelType};
pub use result_table::{
    create_result_table, plan_result_table, ResultTableError, ResultTablePlan,
};
pub use runtime::{EagerModeGuard, EagerRuntime, NumericRuntime, RuntimeModeError};
pub use telemetry::init_tracing;

/// Batchpredict version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
