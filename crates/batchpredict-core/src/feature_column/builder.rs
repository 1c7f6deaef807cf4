//! Interpreter from the serialized feature-column spec to [`FeatureColumn`]s.
//!
//! A column spec is a JSON object mapping a constructor-argument group (for
//! example `feature_columns`, or `linear_feature_columns` and
//! `dnn_feature_columns` for wide-and-deep models) to an array of column
//! nodes. Each node names its `constructor` and carries that constructor's
//! fields; nested columns are nested nodes.

use std::collections::BTreeMap;

use batchpredict_store::FieldMeta;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::column::*;
use crate::error::ReconstructionError;

type Result<T> = std::result::Result<T, ReconstructionError>;

/// Output of [`reconstruct`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedFeatures {
    /// Group name -> columns, in spec order within each group.
    pub columns: BTreeMap<String, Vec<FeatureColumn>>,
    /// Every raw feature name the columns read, deduplicated. Groups are
    /// walked in ascending name order, columns in spec order within a group,
    /// and each name sits at its first use along that walk.
    pub feature_names: Vec<String>,
    /// Group name -> raw feature names its columns read.
    pub feature_name_map: BTreeMap<String, Vec<String>>,
}

impl ReconstructedFeatures {
    /// Total number of top-level columns across all groups.
    pub fn column_count(&self) -> usize {
        self.columns.values().map(Vec::len).sum()
    }
}

/// Rebuild the feature columns described by `spec`.
///
/// Every feature name a column reads must have an entry in `feature_metas`.
pub fn reconstruct(
    spec: &str,
    feature_metas: &BTreeMap<String, FieldMeta>,
) -> Result<ReconstructedFeatures> {
    let root: Value =
        serde_json::from_str(spec).map_err(|e| ReconstructionError::Malformed(e.to_string()))?;
    let groups = match root {
        Value::Object(groups) => groups,
        other => {
            return Err(ReconstructionError::Malformed(format!(
                "expected an object of column groups, found {}",
                json_type(&other)
            )))
        }
    };

    let mut columns = BTreeMap::new();
    let mut feature_names: Vec<String> = Vec::new();
    let mut feature_name_map = BTreeMap::new();

    for (group, nodes) in groups {
        let nodes = match nodes {
            Value::Array(nodes) => nodes,
            other => {
                return Err(ReconstructionError::Malformed(format!(
                    "group `{group}` must be an array of columns, found {}",
                    json_type(&other)
                )))
            }
        };

        let mut built = Vec::with_capacity(nodes.len());
        let mut group_names: Vec<String> = Vec::new();
        for node in nodes {
            let column = build_column(node)?;
            for key in column.source_keys() {
                if !feature_metas.contains_key(key) {
                    return Err(ReconstructionError::MissingFeatureMeta {
                        name: key.to_string(),
                    });
                }
                if !group_names.iter().any(|n| n == key) {
                    group_names.push(key.to_string());
                }
                if !feature_names.iter().any(|n| n == key) {
                    feature_names.push(key.to_string());
                }
            }
            built.push(column);
        }
        feature_name_map.insert(group.clone(), group_names);
        columns.insert(group, built);
    }

    Ok(ReconstructedFeatures {
        columns,
        feature_names,
        feature_name_map,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn default_shape() -> Vec<usize> {
    vec![1]
}

fn default_float() -> String {
    "float32".to_string()
}

fn default_string() -> String {
    "string".to_string()
}

fn default_combiner() -> Combiner {
    Combiner::Mean
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NumericArgs {
    key: String,
    #[serde(default = "default_shape")]
    shape: Vec<usize>,
    #[serde(default = "default_float")]
    dtype: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BucketizedArgs {
    source_column: Value,
    boundaries: Vec<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IdentityArgs {
    key: String,
    num_buckets: u64,
    #[serde(default)]
    default_value: Option<u64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VocabularyListArgs {
    key: String,
    vocabulary_list: Vec<String>,
    #[serde(default)]
    num_oov_buckets: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HashBucketArgs {
    key: String,
    hash_bucket_size: u64,
    #[serde(default = "default_string")]
    dtype: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CrossedArgs {
    keys: Vec<String>,
    hash_bucket_size: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EmbeddingArgs {
    categorical_column: Value,
    dimension: u64,
    #[serde(default = "default_combiner")]
    combiner: Combiner,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IndicatorArgs {
    categorical_column: Value,
}

fn parse_args<T: DeserializeOwned>(constructor: &str, fields: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| {
        ReconstructionError::InvalidArguments {
            constructor: constructor.to_string(),
            reason: e.to_string(),
        }
    })
}

fn invalid(constructor: &str, reason: impl Into<String>) -> ReconstructionError {
    ReconstructionError::InvalidArguments {
        constructor: constructor.to_string(),
        reason: reason.into(),
    }
}

fn require_positive(constructor: &str, field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(invalid(constructor, format!("{field} must be positive")));
    }
    Ok(())
}

fn require_key(constructor: &str, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(invalid(constructor, "key must not be empty"));
    }
    Ok(())
}

/// Build a nested column and check it has the kind the parent requires.
fn build_nested(parent: &str, node: Value, expected: ColumnKind) -> Result<FeatureColumn> {
    let column = build_column(node)?;
    if column.kind() != expected {
        return Err(ReconstructionError::WrongNesting {
            constructor: parent.to_string(),
            expected: expected.as_str(),
            found: column.constructor().to_string(),
        });
    }
    Ok(column)
}

fn build_column(node: Value) -> Result<FeatureColumn> {
    let mut fields = match node {
        Value::Object(fields) => fields,
        other => {
            return Err(ReconstructionError::Malformed(format!(
                "column node must be an object, found {}",
                json_type(&other)
            )))
        }
    };
    let constructor = match fields.remove("constructor") {
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(ReconstructionError::Malformed(format!(
                "`constructor` must be a string, found {}",
                json_type(&other)
            )))
        }
        None => {
            return Err(ReconstructionError::Malformed(
                "column node is missing `constructor`".to_string(),
            ))
        }
    };
    let name = constructor.as_str();

    let column = match name {
        "numeric_column" => {
            let args: NumericArgs = parse_args(name, fields)?;
            require_key(name, &args.key)?;
            if args.shape.is_empty() || args.shape.contains(&0) {
                return Err(invalid(name, "shape dimensions must be positive"));
            }
            FeatureColumn::NumericColumn(NumericColumn {
                key: args.key,
                shape: args.shape,
                dtype: args.dtype,
            })
        }
        "bucketized_column" => {
            let args: BucketizedArgs = parse_args(name, fields)?;
            let source = match build_nested(name, args.source_column, ColumnKind::Dense)? {
                FeatureColumn::NumericColumn(numeric) => numeric,
                other => {
                    return Err(ReconstructionError::WrongNesting {
                        constructor: name.to_string(),
                        expected: "numeric",
                        found: other.constructor().to_string(),
                    })
                }
            };
            if args.boundaries.is_empty() {
                return Err(invalid(name, "boundaries must not be empty"));
            }
            if args.boundaries.windows(2).any(|w| w[0] >= w[1]) {
                return Err(invalid(name, "boundaries must be strictly ascending"));
            }
            FeatureColumn::BucketizedColumn(BucketizedColumn {
                source_column: source,
                boundaries: args.boundaries,
            })
        }
        "categorical_column_with_identity" => {
            let args: IdentityArgs = parse_args(name, fields)?;
            require_key(name, &args.key)?;
            require_positive(name, "num_buckets", args.num_buckets)?;
            if let Some(default) = args.default_value {
                if default >= args.num_buckets {
                    return Err(invalid(name, "default_value must be below num_buckets"));
                }
            }
            FeatureColumn::CategoricalColumnWithIdentity(IdentityColumn {
                key: args.key,
                num_buckets: args.num_buckets,
                default_value: args.default_value,
            })
        }
        "categorical_column_with_vocabulary_list" => {
            let args: VocabularyListArgs = parse_args(name, fields)?;
            require_key(name, &args.key)?;
            if args.vocabulary_list.is_empty() {
                return Err(invalid(name, "vocabulary_list must not be empty"));
            }
            FeatureColumn::CategoricalColumnWithVocabularyList(VocabularyListColumn {
                key: args.key,
                vocabulary_list: args.vocabulary_list,
                num_oov_buckets: args.num_oov_buckets,
            })
        }
        "categorical_column_with_hash_bucket" => {
            let args: HashBucketArgs = parse_args(name, fields)?;
            require_key(name, &args.key)?;
            require_positive(name, "hash_bucket_size", args.hash_bucket_size)?;
            FeatureColumn::CategoricalColumnWithHashBucket(HashBucketColumn {
                key: args.key,
                hash_bucket_size: args.hash_bucket_size,
                dtype: args.dtype,
            })
        }
        "crossed_column" => {
            let args: CrossedArgs = parse_args(name, fields)?;
            if args.keys.len() < 2 {
                return Err(invalid(name, "keys must name at least two features"));
            }
            for key in &args.keys {
                require_key(name, key)?;
            }
            require_positive(name, "hash_bucket_size", args.hash_bucket_size)?;
            FeatureColumn::CrossedColumn(CrossedColumn {
                keys: args.keys,
                hash_bucket_size: args.hash_bucket_size,
            })
        }
        "embedding_column" => {
            let args: EmbeddingArgs = parse_args(name, fields)?;
            let inner = build_nested(name, args.categorical_column, ColumnKind::Categorical)?;
            require_positive(name, "dimension", args.dimension)?;
            FeatureColumn::EmbeddingColumn(EmbeddingColumn {
                categorical_column: Box::new(inner),
                dimension: args.dimension,
                combiner: args.combiner,
            })
        }
        "indicator_column" => {
            let args: IndicatorArgs = parse_args(name, fields)?;
            let inner = build_nested(name, args.categorical_column, ColumnKind::Categorical)?;
            FeatureColumn::IndicatorColumn(IndicatorColumn {
                categorical_column: Box::new(inner),
            })
        }
        _ => {
            return Err(ReconstructionError::UnknownConstructor {
                name: name.to_string(),
            })
        }
    };
    Ok(column)
}
