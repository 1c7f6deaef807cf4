//! Feature column AST.

use serde::{Deserialize, Serialize};

/// Whether a column feeds a model directly or must be wrapped first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Dense,
    Categorical,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Dense => "dense",
            ColumnKind::Categorical => "categorical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericColumn {
    pub key: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketizedColumn {
    pub source_column: NumericColumn,
    pub boundaries: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityColumn {
    pub key: String,
    pub num_buckets: u64,
    pub default_value: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabularyListColumn {
    pub key: String,
    pub vocabulary_list: Vec<String>,
    pub num_oov_buckets: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HashBucketColumn {
    pub key: String,
    pub hash_bucket_size: u64,
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossedColumn {
    pub keys: Vec<String>,
    pub hash_bucket_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combiner {
    Mean,
    Sum,
    Sqrtn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingColumn {
    pub categorical_column: Box<FeatureColumn>,
    pub dimension: u64,
    pub combiner: Combiner,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorColumn {
    pub categorical_column: Box<FeatureColumn>,
}

/// A single feature transformation.
///
/// Serializes back to the same `constructor`-tagged shape it is built from,
/// so a reconstructed column can be handed to an executor as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "constructor", rename_all = "snake_case")]
pub enum FeatureColumn {
    NumericColumn(NumericColumn),
    BucketizedColumn(BucketizedColumn),
    CategoricalColumnWithIdentity(IdentityColumn),
    CategoricalColumnWithVocabularyList(VocabularyListColumn),
    CategoricalColumnWithHashBucket(HashBucketColumn),
    CrossedColumn(CrossedColumn),
    EmbeddingColumn(EmbeddingColumn),
    IndicatorColumn(IndicatorColumn),
}

impl FeatureColumn {
    /// Constructor name as it appears in the serialized spec.
    pub fn constructor(&self) -> &'static str {
        match self {
            FeatureColumn::NumericColumn(_) => "numeric_column",
            FeatureColumn::BucketizedColumn(_) => "bucketized_column",
            FeatureColumn::CategoricalColumnWithIdentity(_) => "categorical_column_with_identity",
            FeatureColumn::CategoricalColumnWithVocabularyList(_) => {
                "categorical_column_with_vocabulary_list"
            }
            FeatureColumn::CategoricalColumnWithHashBucket(_) => {
                "categorical_column_with_hash_bucket"
            }
            FeatureColumn::CrossedColumn(_) => "crossed_column",
            FeatureColumn::EmbeddingColumn(_) => "embedding_column",
            FeatureColumn::IndicatorColumn(_) => "indicator_column",
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            FeatureColumn::NumericColumn(_)
            | FeatureColumn::EmbeddingColumn(_)
            | FeatureColumn::IndicatorColumn(_) => ColumnKind::Dense,
            _ => ColumnKind::Categorical,
        }
    }

    /// Raw input feature names this column reads, in declaration order.
    pub fn source_keys(&self) -> Vec<&str> {
        match self {
            FeatureColumn::NumericColumn(c) => vec![c.key.as_str()],
            FeatureColumn::BucketizedColumn(c) => vec![c.source_column.key.as_str()],
            FeatureColumn::CategoricalColumnWithIdentity(c) => vec![c.key.as_str()],
            FeatureColumn::CategoricalColumnWithVocabularyList(c) => vec![c.key.as_str()],
            FeatureColumn::CategoricalColumnWithHashBucket(c) => vec![c.key.as_str()],
            FeatureColumn::CrossedColumn(c) => c.keys.iter().map(String::as_str).collect(),
            FeatureColumn::EmbeddingColumn(c) => c.categorical_column.source_keys(),
            FeatureColumn::IndicatorColumn(c) => c.categorical_column.source_keys(),
        }
    }
}
