//! batchpredict - batch prediction driver
//!
//! ## Commands
//!
//! - `models`: List registered model types with their family and form
//! - `inspect`: Rehydrate a stored model and print its dispatch plan
//! - `check`: Run a job against local backends, validating batches instead of scoring
//! - `result-ddl`: Print the statements that recreate a result table

mod job;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, Level};

use batchpredict_core::{
    plan_result_table, rehydrate, DifferentiableExecutor, DispatchPlan, EstimatorExecutor,
    EstimatorPredictArgs, ExecutorError, FsModelStore, JsonlTableSource, ModelRegistry,
    PredictArgs, Predictor, SqlField, TableRef, DEFAULT_MODEL_DESC_KIND,
};

use crate::job::PredictJob;

#[derive(Parser)]
#[command(name = "batchpredict")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch prediction for trained tabular models", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered model types
    Models,

    /// Rehydrate a stored model and print its dispatch plan as JSON
    Inspect {
        /// Local directory mirroring the model store
        #[arg(long, env = "BATCHPREDICT_STORE")]
        store: PathBuf,

        /// Model root inside the store
        #[arg(long, env = "BATCHPREDICT_MODEL")]
        model: String,

        /// Metadata kind to load
        #[arg(long, env = "BATCHPREDICT_MODEL_DESC_KIND", default_value = DEFAULT_MODEL_DESC_KIND)]
        kind: String,
    },

    /// Run a prediction job against local backends without scoring
    ///
    /// Artifacts are fetched and every batch is streamed and checked against
    /// the selected columns, so a job that passes here only lacks a model
    /// runtime.
    Check {
        /// TOML job file
        #[arg(long, env = "BATCHPREDICT_JOB")]
        job: PathBuf,

        /// Local directory mirroring the model store
        #[arg(long, env = "BATCHPREDICT_STORE")]
        store: PathBuf,

        /// Directory holding `<project>/<table>.jsonl` tables
        #[arg(long, env = "BATCHPREDICT_TABLES")]
        tables: PathBuf,

        /// Where artifacts are fetched to (default: a temporary directory)
        #[arg(long, env = "BATCHPREDICT_WORK_DIR")]
        work_dir: Option<PathBuf>,

        /// Override the job's batch size
        #[arg(long, env = "BATCHPREDICT_BATCH_SIZE")]
        batch_size: Option<usize>,
    },

    /// Print the statements that recreate a result table
    ResultDdl {
        /// Database driver: mysql, hive or maxcompute
        #[arg(long)]
        driver: String,

        /// Result table name
        #[arg(long)]
        table: String,

        /// Column the predictions are written to
        #[arg(long)]
        result_column: String,

        /// Label column the model was trained with
        #[arg(long, default_value = "")]
        label_column: String,

        /// Query field as NAME:TYPE (repeatable, in query order)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<SqlField>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    batchpredict_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Models => cmd_models(),
        Commands::Inspect { store, model, kind } => cmd_inspect(&store, &model, &kind).await,
        Commands::Check {
            job,
            store,
            tables,
            work_dir,
            batch_size,
        } => cmd_check(&job, &store, &tables, work_dir.as_deref(), batch_size).await,
        Commands::ResultDdl {
            driver,
            table,
            result_column,
            label_column,
            fields,
        } => cmd_result_ddl(&driver, &table, &result_column, &label_column, &fields),
    }
}

fn parse_field(raw: &str) -> std::result::Result<SqlField, String> {
    match raw.split_once(':') {
        Some((name, type_name)) if !name.trim().is_empty() && !type_name.trim().is_empty() => {
            Ok(SqlField::new(name.trim(), type_name.trim()))
        }
        _ => Err(format!("expected NAME:TYPE, got `{raw}`")),
    }
}

/// List registered model types
fn cmd_models() -> Result<()> {
    let registry = ModelRegistry::with_builtins();
    println!("{:<48} {:<15} FORM", "NAME", "FAMILY");
    for model_type in registry.list() {
        println!(
            "{:<48} {:<15} {:?}",
            model_type.name,
            model_type.family.as_str(),
            model_type.form
        );
        for alias in &model_type.aliases {
            println!("  alias: {alias}");
        }
    }
    Ok(())
}

async fn load_plan(store_dir: &Path, model: &str, kind: &str) -> Result<DispatchPlan> {
    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let store = FsModelStore::new(store_dir, scratch.path())
        .with_context(|| format!("Failed to open model store {}", store_dir.display()))?;
    let registry = ModelRegistry::with_builtins();

    let rehydrated = rehydrate(&store, &registry, model, kind)
        .await
        .with_context(|| format!("Failed to rehydrate {model}"))?;
    Ok(rehydrated.plan())
}

/// Rehydrate a stored model and print its dispatch plan
async fn cmd_inspect(store_dir: &Path, model: &str, kind: &str) -> Result<()> {
    let plan = load_plan(store_dir, model, kind).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

/// Executor for both families that streams every batch and checks row shape.
#[derive(Debug, Default)]
struct ValidatingExecutor {
    batches: AtomicUsize,
    rows: AtomicUsize,
}

#[derive(Debug, Serialize)]
struct CheckSummary {
    result_table: String,
    source: String,
    batches: usize,
    rows: usize,
}

impl ValidatingExecutor {
    async fn validate(&self, args: PredictArgs) -> std::result::Result<(), ExecutorError> {
        if let Some(missing) = args
            .feature_names
            .iter()
            .find(|name| !args.selected_cols.contains(*name))
        {
            return Err(ExecutorError::SchemaMismatch(format!(
                "feature `{missing}` is not among the selected columns"
            )));
        }

        let width = args.selected_cols.len();
        let mut batches = args.batches;
        while let Some(batch) = batches.next().await {
            let batch = batch?;
            if let Some(row) = batch.iter().find(|row| row.len() != width) {
                return Err(ExecutorError::SchemaMismatch(format!(
                    "row has {} values but {width} columns are selected",
                    row.len()
                )));
            }
            self.batches.fetch_add(1, Ordering::Relaxed);
            self.rows.fetch_add(batch.len(), Ordering::Relaxed);
        }
        Ok(())
    }
}

#[async_trait]
impl EstimatorExecutor for ValidatingExecutor {
    async fn predict(&self, args: EstimatorPredictArgs) -> std::result::Result<(), ExecutorError> {
        self.validate(args.base).await
    }
}

#[async_trait]
impl DifferentiableExecutor for ValidatingExecutor {
    async fn predict(&self, args: PredictArgs) -> std::result::Result<(), ExecutorError> {
        self.validate(args).await
    }
}

/// Run a job end to end against local backends
async fn cmd_check(
    job_path: &Path,
    store_dir: &Path,
    tables_dir: &Path,
    work_dir: Option<&Path>,
    batch_size: Option<usize>,
) -> Result<()> {
    let job = PredictJob::load(job_path)?;
    let mut config = job.config.clone();
    if let Some(size) = batch_size {
        config = config.with_batch_size(size);
    }

    let scratch;
    let work_dir = match work_dir {
        Some(dir) => dir,
        None => {
            scratch = tempfile::tempdir().context("Failed to create work directory")?;
            scratch.path()
        }
    };

    let store = Arc::new(
        FsModelStore::new(store_dir, work_dir)
            .with_context(|| format!("Failed to open model store {}", store_dir.display()))?,
    );
    let tables = Arc::new(JsonlTableSource::new(tables_dir));
    let executor = Arc::new(ValidatingExecutor::default());

    let predictor = Predictor::new(
        store.clone(),
        store,
        tables,
        executor.clone(),
        executor.clone(),
    )
    .with_config(config);

    if let Err(e) = predictor.run_prediction(&job.request).await {
        bail!("Check failed at stage {}: {e}", e.stage());
    }

    let source = TableRef::parse(&job.request.data_table)
        .map(|t| t.uri())
        .unwrap_or_else(|_| job.request.data_table.clone());
    let summary = CheckSummary {
        result_table: job.request.result_table.clone(),
        source,
        batches: executor.batches.load(Ordering::Relaxed),
        rows: executor.rows.load(Ordering::Relaxed),
    };
    info!(rows = summary.rows, batches = summary.batches, "check passed");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Print the statements that recreate a result table
fn cmd_result_ddl(
    driver: &str,
    table: &str,
    result_column: &str,
    label_column: &str,
    fields: &[SqlField],
) -> Result<()> {
    let plan = plan_result_table(driver, fields, table, label_column, result_column)
        .context("Failed to plan result table")?;
    println!("{}", plan.drop_statement);
    println!("{}", plan.create_statement);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    use batchpredict_core::{FieldMeta, ModelMetas, EXPORTED_PATH_MARKER, MODEL_SAVE_DIR};
    use serde_json::json;

    #[test]
    fn parse_field_splits_name_and_type() {
        assert_eq!(parse_field("class:INT").unwrap(), SqlField::new("class", "INT"));
        assert_eq!(
            parse_field(" x : VARCHAR(255) ").unwrap(),
            SqlField::new("x", "VARCHAR(255)")
        );
        assert!(parse_field("class").is_err());
        assert!(parse_field(":INT").is_err());
    }

    #[test]
    fn cli_parses_repeated_fields() {
        let cli = Cli::try_parse_from([
            "batchpredict",
            "result-ddl",
            "--driver",
            "hive",
            "--table",
            "db.out",
            "--result-column",
            "y",
            "--field",
            "x:INT",
            "--field",
            "y:INT",
        ])
        .unwrap();

        match cli.command {
            Commands::ResultDdl { fields, .. } => assert_eq!(fields.len(), 2),
            _ => panic!("expected result-ddl"),
        }
    }

    fn write_store(store: &Path) {
        let root = store.join("models/iris");
        fs::create_dir_all(root.join(MODEL_SAVE_DIR)).unwrap();
        fs::write(root.join(EXPORTED_PATH_MARKER), "models/iris/model_save").unwrap();
        fs::write(root.join(MODEL_SAVE_DIR).join("saved_model.pb"), b"weights").unwrap();

        let metas = ModelMetas {
            model_ref: "LinearClassifier".to_string(),
            feature_names: vec!["x".to_string()],
            feature_name_map: BTreeMap::new(),
            feature_metas: BTreeMap::from([("x".to_string(), FieldMeta::scalar("x", "float32"))]),
            label_meta: FieldMeta::scalar("y", "int64"),
            hyperparams: BTreeMap::new(),
            feature_columns_spec: json!({"feature_columns": [
                {"constructor": "numeric_column", "key": "x"}
            ]})
            .to_string(),
        };
        fs::write(
            root.join(DEFAULT_MODEL_DESC_KIND),
            serde_json::to_vec(&metas).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn inspect_plans_from_local_store() {
        let store = tempfile::tempdir().unwrap();
        write_store(store.path());

        let plan = load_plan(store.path(), "models/iris", DEFAULT_MODEL_DESC_KIND)
            .await
            .unwrap();

        assert_eq!(plan.type_name, "LinearClassifier");
        assert_eq!(plan.fetch_steps.len(), 2);
        assert!(plan.param_keys.contains(&"model_dir".to_string()));
    }

    #[tokio::test]
    async fn check_streams_every_row() {
        let store = tempfile::tempdir().unwrap();
        write_store(store.path());

        let tables = tempfile::tempdir().unwrap();
        fs::create_dir_all(tables.path().join("p")).unwrap();
        fs::write(tables.path().join("p/t.jsonl"), "[\"x\"]\n[1.0]\n[2.0]\n[3.0]\n").unwrap();

        let job_dir = tempfile::tempdir().unwrap();
        let job_path = job_dir.path().join("job.toml");
        fs::write(
            &job_path,
            "[request]\ndata_table = \"p.t\"\nresult_table = \"p.out\"\nlabel_column = \"y\"\nmodel_path = \"models/iris\"\n",
        )
        .unwrap();

        let work = tempfile::tempdir().unwrap();
        cmd_check(&job_path, store.path(), tables.path(), Some(work.path()), Some(2))
            .await
            .unwrap();

        assert!(work.path().join(MODEL_SAVE_DIR).join("saved_model.pb").exists());
    }

    #[tokio::test]
    async fn validating_executor_rejects_missing_feature() {
        let executor = ValidatingExecutor::default();
        let args = PredictArgs {
            model_ref: "LinearClassifier".to_string(),
            params: Default::default(),
            save_dir: PathBuf::from(MODEL_SAVE_DIR),
            result_table: "p.out".to_string(),
            feature_names: vec!["x".to_string()],
            feature_metas: BTreeMap::new(),
            train_label_name: "y".to_string(),
            result_col_name: "y".to_string(),
            driver: Default::default(),
            conn: None,
            batches: futures::stream::empty().boxed(),
            selected_cols: vec!["z".to_string()],
            hdfs: Default::default(),
        };

        let err = executor.validate(args).await.unwrap_err();
        assert!(matches!(err, ExecutorError::SchemaMismatch(_)));
    }
}
