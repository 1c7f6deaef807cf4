//! Observability tests for the prediction run lifecycle.
//!
//! These check that the structured events operators rely on are emitted for
//! run start, stage completion, dispatch, finish and failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use batchpredict_core::fakes::{RecordingDifferentiableExecutor, RecordingEstimatorExecutor};
use batchpredict_core::{
    emit_dispatch, emit_prediction_failed, emit_prediction_finished, emit_prediction_started,
    emit_stage_completed, prediction_span, EagerModeGuard, FieldMeta, ModelFamily, ModelForm,
    ModelMetas, NumericRuntime, PredictRequest, PredictStage, Predictor, RuntimeModeError,
    TableRef, DEFAULT_MODEL_DESC_KIND, EXPORTED_PATH_MARKER, MODEL_SAVE_DIR,
};
use batchpredict_store::fakes::{MemoryModelStore, MemoryTableSource};
use serde_json::json;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn emitters_write_event_names() {
    emit_prediction_started("run-1", "models/iris", "preds_out");
    emit_stage_completed("run-1", PredictStage::ArtifactFetch);
    emit_dispatch("run-1", "LinearClassifier", ModelFamily::Estimator, ModelForm::Object);
    emit_prediction_finished("run-1", "preds_out", 12);

    assert!(logs_contain("prediction.started"));
    assert!(logs_contain("stage=artifact_fetch"));
    assert!(logs_contain("family=estimator"));
    assert!(logs_contain("prediction.finished"));
}

#[traced_test]
#[test]
fn failure_event_names_the_stage() {
    emit_prediction_failed("run-2", PredictStage::Reconstruction, &"unknown constructor");

    assert!(logs_contain("prediction.failed"));
    assert!(logs_contain("stage=reconstruction"));
    assert!(logs_contain("unknown constructor"));
}

#[traced_test]
#[test]
fn span_carries_run_id() {
    let span = prediction_span("run-span-7");
    span.in_scope(|| emit_stage_completed("run-span-7", PredictStage::Inference));

    assert!(logs_contain("run-span-7"));
}

struct RejectingRuntime;

impl NumericRuntime for RejectingRuntime {
    fn enable_eager_execution(&self) -> Result<(), RuntimeModeError> {
        Err(RuntimeModeError("eager mode must be set at program startup".to_string()))
    }
}

fn predictor_for(model_ref: &str) -> (Predictor, PredictRequest) {
    let store = Arc::new(MemoryModelStore::new());
    store.put_metas(
        "m",
        DEFAULT_MODEL_DESC_KIND,
        ModelMetas {
            model_ref: model_ref.to_string(),
            feature_names: vec!["x".to_string()],
            feature_name_map: BTreeMap::new(),
            feature_metas: BTreeMap::from([("x".to_string(), FieldMeta::scalar("x", "float32"))]),
            label_meta: FieldMeta::scalar("y", "int64"),
            hyperparams: BTreeMap::new(),
            feature_columns_spec: json!({"feature_columns": [
                {"constructor": "numeric_column", "key": "x"}
            ]})
            .to_string(),
        },
    );
    store.put_file("m", EXPORTED_PATH_MARKER);
    store.put_dir("m", MODEL_SAVE_DIR);

    let tables = Arc::new(MemoryTableSource::new());
    tables.put_table(
        &TableRef::parse("p.t").unwrap(),
        vec!["x".to_string()],
        vec![vec![json!(1.0)]],
    );

    let predictor = Predictor::new(
        store.clone(),
        store,
        tables,
        Arc::new(RecordingEstimatorExecutor::new()),
        Arc::new(RecordingDifferentiableExecutor::new()),
    )
    .with_runtime(Arc::new(RejectingRuntime))
    .with_eager_guard(Arc::new(EagerModeGuard::new()));

    let request = PredictRequest {
        datasource: String::new(),
        select: String::new(),
        data_table: "p.t".to_string(),
        result_table: "p.out".to_string(),
        label_column: "y".to_string(),
        model_path: "m".to_string(),
    };
    (predictor, request)
}

#[traced_test]
#[tokio::test]
async fn eager_failure_is_logged_and_run_continues() {
    let (predictor, request) = predictor_for("LinearRegressor");

    predictor.run_prediction(&request).await.unwrap();

    assert!(logs_contain("runtime.eager_mode_suppressed"));
    assert!(logs_contain("eager mode must be set at program startup"));
    assert!(logs_contain("prediction.dispatch"));
    assert!(logs_contain("prediction.finished"));
}

#[traced_test]
#[tokio::test]
async fn failed_run_logs_failure_event() {
    let (predictor, request) = predictor_for("my_models.Unregistered");

    let err = predictor.run_prediction(&request).await.unwrap_err();

    assert_eq!(err.stage(), PredictStage::Resolution);
    assert!(logs_contain("prediction.failed"));
    assert!(logs_contain("stage=resolution"));
    assert!(!logs_contain("prediction.finished"));
}
