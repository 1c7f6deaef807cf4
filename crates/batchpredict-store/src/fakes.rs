//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryModelStore`, `MemoryTableSource`, and `MemorySqlDatabase`
//! that satisfy the trait contracts without any external dependencies and
//! record every call for later inspection.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryModelStore
// ---------------------------------------------------------------------------

/// One fetch attempted against a `MemoryModelStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRecord {
    File { root: String, name: String },
    Dir { root: String, path: String },
}

/// In-memory model store implementing both `MetaStore` and `ArtifactStore`.
///
/// Fetches are recorded before the existence check, so failed attempts show
/// up in `fetches()` too.
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    metas: Mutex<HashMap<(String, String), ModelMetas>>,
    files: Mutex<HashSet<(String, String)>>,
    dirs: Mutex<HashSet<(String, String)>>,
    meta_loads: Mutex<Vec<(String, String)>>,
    fetches: Mutex<Vec<FetchRecord>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_metas(&self, root: &str, kind: &str, metas: ModelMetas) {
        self.metas
            .lock()
            .unwrap()
            .insert((root.to_string(), kind.to_string()), metas);
    }

    pub fn put_file(&self, root: &str, name: &str) {
        self.files
            .lock()
            .unwrap()
            .insert((root.to_string(), name.to_string()));
    }

    pub fn put_dir(&self, root: &str, path: &str) {
        self.dirs
            .lock()
            .unwrap()
            .insert((root.to_string(), path.to_string()));
    }

    /// Every `load_metas` call as `(root, kind)`, in call order.
    pub fn meta_loads(&self) -> Vec<(String, String)> {
        self.meta_loads.lock().unwrap().clone()
    }

    /// Every fetch attempt, in call order.
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetaStore for MemoryModelStore {
    async fn load_metas(&self, root: &str, kind: &str) -> StorageResult<ModelMetas> {
        self.meta_loads
            .lock()
            .unwrap()
            .push((root.to_string(), kind.to_string()));
        let metas = self.metas.lock().unwrap();
        metas
            .get(&(root.to_string(), kind.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::MetadataNotFound {
                root: root.to_string(),
                kind: kind.to_string(),
            })
    }
}

#[async_trait]
impl ArtifactStore for MemoryModelStore {
    async fn load_file(&self, root: &str, name: &str) -> StorageResult<PathBuf> {
        self.fetches.lock().unwrap().push(FetchRecord::File {
            root: root.to_string(),
            name: name.to_string(),
        });
        let files = self.files.lock().unwrap();
        if files.contains(&(root.to_string(), name.to_string())) {
            Ok(PathBuf::from(name))
        } else {
            Err(StorageError::ArtifactNotFound {
                root: root.to_string(),
                path: name.to_string(),
            })
        }
    }

    async fn load_dir(&self, root: &str, relative_path: &str) -> StorageResult<PathBuf> {
        self.fetches.lock().unwrap().push(FetchRecord::Dir {
            root: root.to_string(),
            path: relative_path.to_string(),
        });
        let dirs = self.dirs.lock().unwrap();
        if dirs.contains(&(root.to_string(), relative_path.to_string())) {
            Ok(PathBuf::from(relative_path))
        } else {
            Err(StorageError::ArtifactNotFound {
                root: root.to_string(),
                path: relative_path.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTableSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// In-memory table source keyed by table URI.
#[derive(Debug, Default)]
pub struct MemoryTableSource {
    tables: Mutex<HashMap<String, MemoryTable>>,
    opened: Mutex<Vec<(String, usize)>>,
}

impl MemoryTableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_table(&self, table: &TableRef, columns: Vec<String>, rows: Vec<Row>) {
        self.tables
            .lock()
            .unwrap()
            .insert(table.uri(), MemoryTable { columns, rows });
    }

    /// Every `row_batches` call as `(uri, batch_size)`.
    pub fn opened_streams(&self) -> Vec<(String, usize)> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl TableSource for MemoryTableSource {
    async fn selected_columns(&self, table: &TableRef) -> StorageResult<Vec<String>> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(&table.uri())
            .map(|t| t.columns.clone())
            .ok_or_else(|| StorageError::TableNotFound { table: table.uri() })
    }

    fn row_batches(&self, table: &TableRef, batch_size: usize) -> BatchStream {
        let uri = table.uri();
        self.opened.lock().unwrap().push((uri.clone(), batch_size));
        let tables = self.tables.lock().unwrap();
        match tables.get(&uri) {
            Some(t) => {
                let batches: Vec<StorageResult<RowBatch>> = t
                    .rows
                    .chunks(batch_size.max(1))
                    .map(|chunk| Ok(chunk.to_vec()))
                    .collect();
                stream::iter(batches).boxed()
            }
            None => stream::iter(vec![Err(StorageError::TableNotFound { table: uri })]).boxed(),
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySqlDatabase
// ---------------------------------------------------------------------------

/// In-memory SQL database that reports a fixed field list and records
/// executed statements.
#[derive(Debug)]
pub struct MemorySqlDatabase {
    driver: String,
    fields: Vec<SqlField>,
    fail_prefix: Option<String>,
    executed: Mutex<Vec<String>>,
}

impl MemorySqlDatabase {
    pub fn new(driver: impl Into<String>, fields: Vec<SqlField>) -> Self {
        Self {
            driver: driver.into(),
            fields,
            fail_prefix: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Make every statement starting with `prefix` fail.
    pub fn failing_on(mut self, prefix: impl Into<String>) -> Self {
        self.fail_prefix = Some(prefix.into());
        self
    }

    /// Statements that executed successfully, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlDatabase for MemorySqlDatabase {
    fn driver(&self) -> &str {
        &self.driver
    }

    async fn field_types(&self, _select: &str) -> StorageResult<Vec<SqlField>> {
        Ok(self.fields.clone())
    }

    async fn exec(&self, statement: &str) -> StorageResult<()> {
        if let Some(prefix) = &self.fail_prefix {
            if statement.starts_with(prefix.as_str()) {
                return Err(StorageError::Sql {
                    statement: statement.to_string(),
                    reason: "rejected by fake".to_string(),
                });
            }
        }
        self.executed.lock().unwrap().push(statement.to_string());
        Ok(())
    }
}
