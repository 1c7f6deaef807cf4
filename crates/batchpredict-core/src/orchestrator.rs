//! Prediction orchestrator.
//!
//! `Predictor::run_prediction` rehydrates a trained model from its metadata,
//! fetches the family-specific artifacts, opens the batch source, and hands
//! everything to the matching executor. Steps run strictly in sequence; the
//! first failure aborts the run and is reported with the stage it hit.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use batchpredict_store::{
    ArtifactStore, ContentDigest, FieldMeta, MetaStore, SqlDatabase, TableRef, TableSource,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::artifacts::{fetch_artifacts, fetch_plan, FetchStep, MODEL_SAVE_DIR};
use crate::config::PredictConfig;
use crate::error::{PredictError, PredictStage, Result};
use crate::executor::{
    DifferentiableExecutor, EstimatorExecutor, EstimatorPredictArgs, HdfsTarget, PredictArgs,
};
use crate::feature_column::{reconstruct, ReconstructedFeatures};
use crate::obs;
use crate::params::{HyperParams, ParamValue, FIELD_METAS_KEY, MODEL_DIR_KEY};
use crate::registry::{classify, ModelDescriptor, ModelFamily, ModelForm, ModelRegistry};
use crate::result_table::create_result_table;
use crate::runtime::{EagerModeGuard, EagerRuntime, NumericRuntime};

/// One batch prediction job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Connection string of the data source the query ran against.
    #[serde(default)]
    pub datasource: String,
    /// Row-selecting query that produced `data_table`.
    #[serde(default)]
    pub select: String,
    /// Intermediate table holding the rows to score, as `project.table`.
    pub data_table: String,
    pub result_table: String,
    /// Column the predictions are written to.
    pub label_column: String,
    /// Storage root of the trained model.
    pub model_path: String,
}

// ---------------------------------------------------------------------------
// Rehydration
// ---------------------------------------------------------------------------

/// A model rebuilt from its stored metadata, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct RehydratedModel {
    /// Resolved model with feature columns merged into its parameters.
    pub descriptor: ModelDescriptor,
    pub family: ModelFamily,
    pub features: ReconstructedFeatures,
    /// Digest of the serialized feature-column spec.
    pub spec_digest: ContentDigest,
    /// Feature names as recorded at training time.
    pub feature_names: Vec<String>,
    pub feature_name_map: BTreeMap<String, Vec<String>>,
    pub feature_metas: BTreeMap<String, FieldMeta>,
    pub label_meta: FieldMeta,
}

impl RehydratedModel {
    /// Parameters the executor receives for this model.
    pub fn executor_params(&self) -> HyperParams {
        let params = &self.descriptor.params;
        match self.family {
            ModelFamily::Estimator => {
                params.with_param(MODEL_DIR_KEY, ParamValue::Json(json!(MODEL_SAVE_DIR)))
            }
            ModelFamily::Differentiable if self.descriptor.is_functional() => params.with_param(
                FIELD_METAS_KEY,
                ParamValue::FieldMetas(self.feature_metas.clone()),
            ),
            ModelFamily::Differentiable => params.clone(),
        }
    }

    /// Names present only in the metadata list and only in the column spec,
    /// or `None` when both agree.
    pub fn feature_name_divergence(&self) -> Option<(Vec<String>, Vec<String>)> {
        let recorded: BTreeSet<&String> = self.feature_names.iter().collect();
        let rebuilt: BTreeSet<&String> = self.features.feature_names.iter().collect();
        if recorded == rebuilt {
            return None;
        }
        let only_recorded = recorded.difference(&rebuilt).map(|s| s.to_string()).collect();
        let only_rebuilt = rebuilt.difference(&recorded).map(|s| s.to_string()).collect();
        Some((only_recorded, only_rebuilt))
    }

    /// Summary of what a run would do with this model.
    pub fn plan(&self) -> DispatchPlan {
        DispatchPlan {
            model_ref: self.descriptor.model_ref.clone(),
            type_name: self.descriptor.type_name.clone(),
            family: self.family,
            form: self.descriptor.form,
            fetch_steps: fetch_plan(self.family),
            feature_names: self.feature_names.clone(),
            label: self.label_meta.feature_name.clone(),
            spec_digest: self.spec_digest.clone(),
            column_count: self.features.column_count(),
            param_keys: self.executor_params().keys().map(str::to_string).collect(),
        }
    }
}

/// Serializable dispatch summary, printed by `batchpredict inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchPlan {
    pub model_ref: String,
    pub type_name: String,
    pub family: ModelFamily,
    pub form: ModelForm,
    pub fetch_steps: Vec<FetchStep>,
    pub feature_names: Vec<String>,
    pub label: String,
    pub spec_digest: ContentDigest,
    pub column_count: usize,
    pub param_keys: Vec<String>,
}

/// Load metadata under `model_path` and rebuild the model it describes.
///
/// Performs no artifact fetches.
pub async fn rehydrate(
    metas: &dyn MetaStore,
    registry: &ModelRegistry,
    model_path: &str,
    kind: &str,
) -> Result<RehydratedModel> {
    let stored = metas
        .load_metas(model_path, kind)
        .await
        .map_err(PredictError::MetadataLoad)?;

    let label = &stored.label_meta.feature_name;
    if stored.feature_names.iter().any(|name| name == label) {
        return Err(PredictError::InvalidMetadata(format!(
            "label `{label}` is listed among the features"
        )));
    }
    debug!(model_ref = %stored.model_ref, features = stored.feature_names.len(), "metadata loaded");

    let features = reconstruct(&stored.feature_columns_spec, &stored.feature_metas)?;
    let spec_digest = ContentDigest::from_bytes(stored.feature_columns_spec.as_bytes());
    debug!(
        columns = features.column_count(),
        spec = %spec_digest.short(),
        "feature columns reconstructed"
    );

    let model_type = registry.resolve(&stored.model_ref)?;
    let params = HyperParams::from_json(stored.hyperparams).with_feature_columns(&features.columns);
    let descriptor = model_type.instantiate(&stored.model_ref, params)?;
    let family = classify(&descriptor);

    Ok(RehydratedModel {
        descriptor,
        family,
        features,
        spec_digest,
        feature_names: stored.feature_names,
        feature_name_map: stored.feature_name_map,
        feature_metas: stored.feature_metas,
        label_meta: stored.label_meta,
    })
}

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

/// Runs prediction jobs against a fixed set of collaborators.
pub struct Predictor {
    metas: Arc<dyn MetaStore>,
    artifacts: Arc<dyn ArtifactStore>,
    tables: Arc<dyn TableSource>,
    estimator: Arc<dyn EstimatorExecutor>,
    differentiable: Arc<dyn DifferentiableExecutor>,
    result_db: Option<Arc<dyn SqlDatabase>>,
    registry: ModelRegistry,
    runtime: Arc<dyn NumericRuntime>,
    eager_guard: Arc<EagerModeGuard>,
    config: PredictConfig,
}

impl Predictor {
    pub fn new(
        metas: Arc<dyn MetaStore>,
        artifacts: Arc<dyn ArtifactStore>,
        tables: Arc<dyn TableSource>,
        estimator: Arc<dyn EstimatorExecutor>,
        differentiable: Arc<dyn DifferentiableExecutor>,
    ) -> Self {
        Self {
            metas,
            artifacts,
            tables,
            estimator,
            differentiable,
            result_db: None,
            registry: ModelRegistry::with_builtins(),
            runtime: Arc::new(EagerRuntime),
            eager_guard: EagerModeGuard::global(),
            config: PredictConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Recreate the result table in `db` before each run's inference.
    /// Without one the executor is expected to find the table in place.
    pub fn with_result_db(mut self, db: Arc<dyn SqlDatabase>) -> Self {
        self.result_db = Some(db);
        self
    }

    pub fn with_config(mut self, config: PredictConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn NumericRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_eager_guard(mut self, guard: Arc<EagerModeGuard>) -> Self {
        self.eager_guard = guard;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PredictConfig {
        &self.config
    }

    /// Score every row of `request.data_table` into `request.result_table`.
    pub async fn run_prediction(&self, request: &PredictRequest) -> Result<()> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::prediction_span(&run_id);

        async {
            let started = Utc::now();
            obs::emit_prediction_started(&run_id, &request.model_path, &request.result_table);

            match self.execute(&run_id, request).await {
                Ok(()) => {
                    let elapsed = Utc::now() - started;
                    let duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);
                    obs::emit_prediction_finished(&run_id, &request.result_table, duration_ms);
                    Ok(())
                }
                Err(e) => {
                    obs::emit_prediction_failed(&run_id, e.stage(), &e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, run_id: &str, request: &PredictRequest) -> Result<()> {
        self.eager_guard.ensure(self.runtime.as_ref());
        debug!(datasource = %request.datasource, select = %request.select, "request received");

        let model = rehydrate(
            self.metas.as_ref(),
            &self.registry,
            &request.model_path,
            &self.config.model_desc_kind,
        )
        .await?;
        if let Some((only_recorded, only_rebuilt)) = model.feature_name_divergence() {
            obs::emit_feature_names_diverged(run_id, &only_recorded, &only_rebuilt);
        }
        obs::emit_stage_completed(run_id, PredictStage::Resolution);

        fetch_artifacts(self.artifacts.as_ref(), &request.model_path, model.family)
            .await
            .map_err(PredictError::ArtifactFetch)?;
        obs::emit_stage_completed(run_id, PredictStage::ArtifactFetch);

        if let Some(db) = &self.result_db {
            create_result_table(
                db.as_ref(),
                &request.select,
                &request.result_table,
                &model.label_meta.feature_name,
                &request.label_column,
            )
            .await?;
            obs::emit_stage_completed(run_id, PredictStage::ResultTable);
        }

        let table = TableRef::parse(&request.data_table).map_err(PredictError::BatchSource)?;
        let selected_cols = self
            .tables
            .selected_columns(&table)
            .await
            .map_err(PredictError::BatchSource)?;
        let batches = self.tables.row_batches(&table, self.config.batch_size.max(1));
        obs::emit_stage_completed(run_id, PredictStage::BatchSource);

        let params = model.executor_params();
        let base = PredictArgs {
            model_ref: model.descriptor.model_ref.clone(),
            params,
            save_dir: PathBuf::from(MODEL_SAVE_DIR),
            result_table: request.result_table.clone(),
            feature_names: model.feature_names.clone(),
            feature_metas: model.feature_metas.clone(),
            train_label_name: model.label_meta.feature_name.clone(),
            result_col_name: request.label_column.clone(),
            driver: self.config.driver,
            conn: None,
            batches,
            selected_cols,
            hdfs: HdfsTarget::default(),
        };

        obs::emit_dispatch(
            run_id,
            &model.descriptor.model_ref,
            model.family,
            model.descriptor.form,
        );
        match model.family {
            ModelFamily::Estimator => {
                self.estimator
                    .predict(EstimatorPredictArgs {
                        base,
                        feature_name_map: model.feature_name_map,
                        feature_columns: model.features.columns,
                    })
                    .await?
            }
            ModelFamily::Differentiable => self.differentiable.predict(base).await?,
        }
        obs::emit_stage_completed(run_id, PredictStage::Inference);
        Ok(())
    }
}
