//! Batchpredict-Store: collaborator contracts for batch prediction
//!
//! This crate owns every boundary the prediction core talks to: the object
//! store holding model metadata and weights, the remote table rows are
//! streamed from, and the SQL database the result table is created in.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: fixed wire shapes for model metadata and lazy, single-pass row
//! batches.
//!
//! ## Key Components
//!
//! - `MetaStore` / `ArtifactStore`: model metadata and weight fetches
//! - `TableSource`: selected columns plus a lazy `BatchStream`
//! - `SqlDatabase`: field-type probing and statement execution
//! - `FsModelStore` / `JsonlTableSource`: local filesystem backends
//! - `fakes`: in-memory implementations that record every call

mod blocking;
mod error;
pub mod fakes;
mod fs_store;
mod jsonl_table;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_store::FsModelStore;
pub use jsonl_table::JsonlTableSource;
pub use storage_traits::{
    ArtifactStore, BatchStream, ContentDigest, FieldMeta, MetaStore, ModelMetas, Row, RowBatch,
    SqlDatabase, SqlField, StorageResult, TableRef, TableSource,
};
