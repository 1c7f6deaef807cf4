//! Error types for batchpredict-store

use thiserror::Error;

/// Errors raised by the storage, table and SQL collaborators.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No metadata blob of the requested kind under the model root
    #[error("no {kind} metadata under {root}")]
    MetadataNotFound { root: String, kind: String },

    /// Metadata blob exists but cannot be decoded
    #[error("{kind} metadata under {root} is corrupt: {reason}")]
    MetadataCorrupt {
        root: String,
        kind: String,
        reason: String,
    },

    /// Remote artifact file or directory is missing
    #[error("artifact {path} not found under {root}")]
    ArtifactNotFound { root: String, path: String },

    /// Table name is not of the form `project.table`
    #[error("invalid table reference: {table}")]
    InvalidTableRef { table: String },

    /// Remote table does not exist
    #[error("table not found: {table}")]
    TableNotFound { table: String },

    /// A row in the remote table cannot be decoded
    #[error("row {line} of {table} is malformed: {reason}")]
    RowDecode {
        table: String,
        line: usize,
        reason: String,
    },

    /// SQL statement failed
    #[error("sql failed: {statement}: {reason}")]
    Sql { statement: String, reason: String },

    /// Local filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Opaque backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_object() {
        let err = StorageError::ArtifactNotFound {
            root: "models/iris".to_string(),
            path: "model_save".to_string(),
        };
        assert!(err.to_string().contains("model_save"));

        let err = StorageError::RowDecode {
            table: "odps://p/tables/t".to_string(),
            line: 3,
            reason: "expected array".to_string(),
        };
        assert!(err.to_string().contains("row 3"));
    }
}
