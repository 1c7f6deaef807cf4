//! Storage trait definitions for batch prediction
//!
//! These traits define the collaborator boundaries of a prediction run:
//! - `MetaStore`: model metadata lookup by root and kind
//! - `ArtifactStore`: weight file/directory fetch into the working directory
//! - `TableSource`: selected columns and a lazy row-batch stream
//! - `SqlDatabase`: field-type probing and statement execution
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string) of a metadata blob or spec text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MetaStore / ArtifactStore: model metadata and weights
// ---------------------------------------------------------------------------

fn default_shape() -> Vec<i64> {
    vec![1]
}

/// Metadata describing one input field (or the label).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub feature_name: String,
    /// Element type, e.g. `float32`, `int64`, `string`.
    pub dtype: String,
    #[serde(default)]
    pub delimiter: String,
    /// Encoding of the raw cell, e.g. `csv` or `kv`; empty for plain values.
    #[serde(default)]
    pub format: String,
    #[serde(default = "default_shape")]
    pub shape: Vec<i64>,
    #[serde(default)]
    pub is_sparse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary: Option<Vec<String>>,
}

impl FieldMeta {
    /// Dense scalar field with the given dtype.
    pub fn scalar(name: impl Into<String>, dtype: impl Into<String>) -> Self {
        Self {
            feature_name: name.into(),
            dtype: dtype.into(),
            delimiter: String::new(),
            format: String::new(),
            shape: default_shape(),
            is_sparse: false,
            vocabulary: None,
        }
    }
}

/// The metadata record written next to a trained model.
///
/// Always the same seven fields; the upstream training step owns the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetas {
    /// Name of the model implementation, e.g. `DNNClassifier`.
    #[serde(alias = "estimator")]
    pub model_ref: String,
    /// Feature names in the order the batch source yields them.
    pub feature_names: Vec<String>,
    /// Constructor argument group -> feature names it consumes.
    #[serde(default)]
    pub feature_name_map: BTreeMap<String, Vec<String>>,
    pub feature_metas: BTreeMap<String, FieldMeta>,
    pub label_meta: FieldMeta,
    #[serde(default)]
    pub hyperparams: BTreeMap<String, serde_json::Value>,
    /// Serialized feature-column description (JSON text).
    pub feature_columns_spec: String,
}

/// Source of model metadata blobs.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Load the metadata blob of `kind` stored under `root`.
    /// Returns `StorageError::MetadataNotFound` if absent.
    async fn load_metas(&self, root: &str, kind: &str) -> StorageResult<ModelMetas>;
}

/// Fetches model artifacts into the local working directory.
///
/// Both calls use a name/path convention agreed with the artifact producer
/// and fail with `StorageError::ArtifactNotFound` on missing remote paths.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the single file `root/name`, returning its local path.
    async fn load_file(&self, root: &str, name: &str) -> StorageResult<PathBuf>;

    /// Recursively fetch the directory `root/relative_path`, returning its
    /// local path.
    async fn load_dir(&self, root: &str, relative_path: &str) -> StorageResult<PathBuf>;
}

// ---------------------------------------------------------------------------
// TableSource: remote table rows
// ---------------------------------------------------------------------------

/// One row, positionally aligned with the selected columns.
pub type Row = Vec<serde_json::Value>;

/// A bounded chunk of rows.
pub type RowBatch = Vec<Row>;

/// Lazy, single-pass sequence of row batches.
pub type BatchStream = BoxStream<'static, StorageResult<RowBatch>>;

/// Reference to a remote table, parsed from `project.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub table: String,
}

impl TableRef {
    /// Parse `project.table`. Both parts must be non-empty.
    pub fn parse(name: &str) -> StorageResult<Self> {
        let mut parts = name.trim().split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(project), Some(table), None) if !project.is_empty() && !table.is_empty() => {
                Ok(Self {
                    project: project.to_string(),
                    table: table.to_string(),
                })
            }
            _ => Err(StorageError::InvalidTableRef {
                table: name.to_string(),
            }),
        }
    }

    /// Table URI understood by the platform's table client.
    pub fn uri(&self) -> String {
        format!("odps://{}/tables/{}", self.project, self.table)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Remote table row source.
///
/// Guarantees:
/// - `selected_columns` lists columns in the order rows are laid out.
/// - `row_batches` does no I/O until polled and yields at most `batch_size`
///   rows per batch; it is consumed exactly once.
#[async_trait]
pub trait TableSource: Send + Sync {
    async fn selected_columns(&self, table: &TableRef) -> StorageResult<Vec<String>>;

    fn row_batches(&self, table: &TableRef, batch_size: usize) -> BatchStream;
}

// ---------------------------------------------------------------------------
// SqlDatabase: result table DDL
// ---------------------------------------------------------------------------

/// Column name and database type reported for a select statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlField {
    pub name: String,
    pub type_name: String,
}

impl SqlField {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

#[async_trait]
pub trait SqlDatabase: Send + Sync {
    /// Driver name, e.g. `mysql`, `hive`, `maxcompute`.
    fn driver(&self) -> &str;

    /// Field names and types produced by `select`.
    async fn field_types(&self, select: &str) -> StorageResult<Vec<SqlField>>;

    /// Execute a single statement.
    async fn exec(&self, statement: &str) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_formats_platform_uri() {
        let table = TableRef::parse("alifin_jtest_dev.tmp_predict_iris").unwrap();
        assert_eq!(table.project, "alifin_jtest_dev");
        assert_eq!(table.uri(), "odps://alifin_jtest_dev/tables/tmp_predict_iris");
    }

    #[test]
    fn table_ref_rejects_malformed_names() {
        for name in ["iris", "a.b.c", ".t", "p.", ""] {
            let err = TableRef::parse(name).unwrap_err();
            assert!(matches!(err, StorageError::InvalidTableRef { .. }), "{name}");
        }
    }

    #[test]
    fn model_metas_accepts_estimator_alias_and_defaults() {
        let raw = serde_json::json!({
            "estimator": "DNNClassifier",
            "feature_names": ["sepal_length"],
            "feature_metas": {
                "sepal_length": {"feature_name": "sepal_length", "dtype": "float32"}
            },
            "label_meta": {"feature_name": "class", "dtype": "int64"},
            "feature_columns_spec": "{}"
        });
        let metas: ModelMetas = serde_json::from_value(raw).unwrap();
        assert_eq!(metas.model_ref, "DNNClassifier");
        assert!(metas.hyperparams.is_empty());
        assert_eq!(metas.feature_metas["sepal_length"].shape, vec![1]);
        assert!(!metas.label_meta.is_sparse);
    }

    #[test]
    fn digest_is_stable_lowercase_hex() {
        let digest = ContentDigest::from_bytes(b"feature spec");
        assert_eq!(digest, ContentDigest::from_bytes(b"feature spec"));
        assert_eq!(digest.as_str().len(), 64);
        assert!(digest.as_str().chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_eq!(digest.short().len(), 12);
    }
}
