use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::blocking::{join_error, run_blocking};
use crate::error::StorageError;
use crate::storage_traits::{BatchStream, Row, RowBatch, StorageResult, TableRef, TableSource};

/// Tables stored as JSON lines on the local filesystem.
///
/// Layout: `<root>/<project>/<table>.jsonl`. The first line is a JSON array
/// of column names; every following non-blank line is a JSON array holding
/// one row.
pub struct JsonlTableSource {
    root: PathBuf,
}

impl JsonlTableSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn table_path(&self, table: &TableRef) -> PathBuf {
        self.root
            .join(&table.project)
            .join(format!("{}.jsonl", table.table))
    }
}

fn open_lines(path: &Path, uri: &str) -> StorageResult<Lines<BufReader<File>>> {
    File::open(path)
        .map(|f| BufReader::new(f).lines())
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::TableNotFound {
                    table: uri.to_string(),
                }
            } else {
                StorageError::Io(e)
            }
        })
}

fn decode_header(line: Option<std::io::Result<String>>, uri: &str) -> StorageResult<Vec<String>> {
    let line = line.ok_or_else(|| StorageError::RowDecode {
        table: uri.to_string(),
        line: 1,
        reason: "missing header".to_string(),
    })??;
    serde_json::from_str(&line).map_err(|e| StorageError::RowDecode {
        table: uri.to_string(),
        line: 1,
        reason: e.to_string(),
    })
}

enum Cursor {
    Unopened { path: PathBuf, uri: String },
    Open {
        lines: Lines<BufReader<File>>,
        line: usize,
        uri: String,
    },
    Done,
}

/// Pull the next batch off the cursor. The header is consumed on open.
fn next_batch(cursor: Cursor, batch_size: usize) -> Option<(StorageResult<RowBatch>, Cursor)> {
    let (mut lines, mut line, uri) = match cursor {
        Cursor::Done => return None,
        Cursor::Open { lines, line, uri } => (lines, line, uri),
        Cursor::Unopened { path, uri } => {
            let mut lines = match open_lines(&path, &uri) {
                Ok(lines) => lines,
                Err(e) => return Some((Err(e), Cursor::Done)),
            };
            if let Err(e) = decode_header(lines.next(), &uri) {
                return Some((Err(e), Cursor::Done));
            }
            (lines, 1, uri)
        }
    };

    let mut batch: RowBatch = Vec::with_capacity(batch_size);
    while batch.len() < batch_size {
        let Some(next) = lines.next() else { break };
        line += 1;
        let text = match next {
            Ok(text) => text,
            Err(e) => return Some((Err(StorageError::Io(e)), Cursor::Done)),
        };
        if text.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Row>(&text) {
            Ok(row) => batch.push(row),
            Err(e) => {
                let err = StorageError::RowDecode {
                    table: uri,
                    line,
                    reason: e.to_string(),
                };
                return Some((Err(err), Cursor::Done));
            }
        }
    }

    if batch.is_empty() {
        None
    } else {
        Some((Ok(batch), Cursor::Open { lines, line, uri }))
    }
}

#[async_trait]
impl TableSource for JsonlTableSource {
    async fn selected_columns(&self, table: &TableRef) -> StorageResult<Vec<String>> {
        let path = self.table_path(table);
        let uri = table.uri();
        run_blocking(move || {
            let mut lines = open_lines(&path, &uri)?;
            decode_header(lines.next(), &uri)
        })
        .await
    }

    fn row_batches(&self, table: &TableRef, batch_size: usize) -> BatchStream {
        let batch_size = batch_size.max(1);
        let cursor = Cursor::Unopened {
            path: self.table_path(table),
            uri: table.uri(),
        };
        stream::unfold(cursor, move |cursor| async move {
            if matches!(cursor, Cursor::Done) {
                return None;
            }
            match tokio::task::spawn_blocking(move || next_batch(cursor, batch_size)).await {
                Ok(next) => next,
                Err(e) => Some((Err(join_error(e)), Cursor::Done)),
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn write_table(root: &Path, body: &str) -> TableRef {
        let table = TableRef::parse("proj.iris").unwrap();
        std::fs::create_dir_all(root.join("proj")).unwrap();
        std::fs::write(root.join("proj/iris.jsonl"), body).unwrap();
        table
    }

    #[tokio::test]
    async fn batches_respect_size_and_skip_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let table = write_table(
            dir.path(),
            "[\"a\",\"b\"]\n[1,2]\n\n[3,4]\n[5,6]\n",
        );
        let source = JsonlTableSource::new(dir.path());

        assert_eq!(source.selected_columns(&table).await.unwrap(), vec!["a", "b"]);

        let batches: Vec<RowBatch> = source.row_batches(&table, 2).try_collect().await.unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1], vec![vec![serde_json::json!(5), serde_json::json!(6)]]);
    }

    #[tokio::test]
    async fn malformed_row_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let table = write_table(dir.path(), "[\"a\"]\n[1]\n{oops\n");
        let source = JsonlTableSource::new(dir.path());

        let err = source
            .row_batches(&table, 1)
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::RowDecode { line: 3, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stream_can_be_driven_from_a_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = std::iter::once("[\"x\"]\n".to_string())
            .chain((0..50).map(|i| format!("[{i}]\n")))
            .collect();
        let table = write_table(dir.path(), &body);
        let source = JsonlTableSource::new(dir.path());

        let stream = source.row_batches(&table, 7);
        let handle = tokio::spawn(async move { stream.try_collect::<Vec<RowBatch>>().await });
        let batches = handle.await.unwrap().unwrap();

        assert_eq!(batches.len(), 8);
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 50);
    }

    #[tokio::test]
    async fn missing_table_surfaces_on_first_poll() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonlTableSource::new(dir.path());
        let table = TableRef::parse("proj.absent").unwrap();

        let mut batches = source.row_batches(&table, 4);
        let first = batches.next().await.expect("one item");
        assert!(matches!(first, Err(StorageError::TableNotFound { .. })));
        assert!(batches.next().await.is_none());
    }
}
