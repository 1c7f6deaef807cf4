//! Structured observability hooks for the prediction run lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span via [`prediction_span`]
//! - Emission functions for run start/finish/failure, stage completion,
//!   dispatch, and suppressed runtime-mode errors
//!
//! Events are emitted at `info!` level unless noted.

use tracing::{info, warn, Span};

use crate::error::PredictStage;
use crate::registry::{ModelFamily, ModelForm};

/// Span tagged with the run id. Attach with `Instrument::instrument` so it
/// follows the run across await points.
pub fn prediction_span(run_id: &str) -> Span {
    tracing::info_span!("batchpredict.run", run_id = %run_id)
}

/// Emit event: prediction run started.
pub fn emit_prediction_started(run_id: &str, model_path: &str, result_table: &str) {
    info!(
        event = "prediction.started",
        run_id = %run_id,
        model_path = %model_path,
        result_table = %result_table,
    );
}

/// Emit event: one stage of the run completed.
pub fn emit_stage_completed(run_id: &str, stage: PredictStage) {
    info!(event = "prediction.stage_completed", run_id = %run_id, stage = %stage);
}

/// Emit event: executor family chosen.
pub fn emit_dispatch(run_id: &str, model_ref: &str, family: ModelFamily, form: ModelForm) {
    info!(
        event = "prediction.dispatch",
        run_id = %run_id,
        model_ref = %model_ref,
        family = %family,
        form = ?form,
    );
}

/// Emit event: prediction run finished successfully.
pub fn emit_prediction_finished(run_id: &str, result_table: &str, duration_ms: u64) {
    info!(
        event = "prediction.finished",
        run_id = %run_id,
        result_table = %result_table,
        duration_ms = duration_ms,
    );
}

/// Emit event: prediction run aborted (error level).
pub fn emit_prediction_failed(run_id: &str, stage: PredictStage, error: &dyn std::fmt::Display) {
    tracing::error!(
        event = "prediction.failed",
        run_id = %run_id,
        stage = %stage,
        error = %error,
    );
}

/// Emit event: eager-mode enable failed and was ignored (warning level).
pub fn emit_eager_mode_suppressed(error: &dyn std::fmt::Display) {
    warn!(event = "runtime.eager_mode_suppressed", error = %error);
}

/// Emit event: feature names in metadata and in the column spec disagree
/// (warning level).
pub fn emit_feature_names_diverged(run_id: &str, only_in_metadata: &[String], only_in_spec: &[String]) {
    warn!(
        event = "prediction.feature_names_diverged",
        run_id = %run_id,
        only_in_metadata = ?only_in_metadata,
        only_in_spec = ?only_in_spec,
    );
}
