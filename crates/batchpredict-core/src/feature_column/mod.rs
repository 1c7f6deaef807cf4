//! Feature columns: the transformation plan a model was trained with.
//!
//! # Modules
//!
//! - [`column`]: `FeatureColumn` AST (numeric, bucketized, categorical,
//!   crossed, embedding, indicator)
//! - [`builder`]: `reconstruct()`: serialized spec -> columns + name bookkeeping

pub mod builder;
pub mod column;

pub use builder::{reconstruct, ReconstructedFeatures};
pub use column::{
    BucketizedColumn, ColumnKind, Combiner, CrossedColumn, EmbeddingColumn, FeatureColumn,
    HashBucketColumn, IdentityColumn, IndicatorColumn, NumericColumn, VocabularyListColumn,
};
