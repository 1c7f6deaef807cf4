//! Trait contract tests for MetaStore, ArtifactStore, TableSource and
//! SqlDatabase.
//!
//! The same behavioral contracts are checked against the in-memory fakes and
//! the local filesystem backends.

use std::collections::BTreeMap;

use batchpredict_store::fakes::{
    FetchRecord, MemoryModelStore, MemorySqlDatabase, MemoryTableSource,
};
use batchpredict_store::storage_traits::*;
use batchpredict_store::{FsModelStore, JsonlTableSource, StorageError};
use futures::TryStreamExt;
use serde_json::json;

fn sample_metas() -> ModelMetas {
    let mut feature_metas = BTreeMap::new();
    feature_metas.insert(
        "sepal_length".to_string(),
        FieldMeta::scalar("sepal_length", "float32"),
    );
    ModelMetas {
        model_ref: "DNNClassifier".to_string(),
        feature_names: vec!["sepal_length".to_string()],
        feature_name_map: BTreeMap::from([(
            "feature_columns".to_string(),
            vec!["sepal_length".to_string()],
        )]),
        feature_metas,
        label_meta: FieldMeta::scalar("class", "int64"),
        hyperparams: BTreeMap::from([("hidden_units".to_string(), json!([10, 20]))]),
        feature_columns_spec: r#"{"feature_columns":[{"constructor":"numeric_column","key":"sepal_length"}]}"#
            .to_string(),
    }
}

// ===========================================================================
// MetaStore contract tests
// ===========================================================================

#[tokio::test]
async fn memory_metas_round_trip_and_missing_kind() {
    let store = MemoryModelStore::new();
    store.put_metas("models/iris", "tensorflow_model_desc", sample_metas());

    let metas = store
        .load_metas("models/iris", "tensorflow_model_desc")
        .await
        .unwrap();
    assert_eq!(metas, sample_metas());

    let err = store
        .load_metas("models/iris", "xgboost_model_desc")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::MetadataNotFound { .. }));
    assert_eq!(store.meta_loads().len(), 2);
}

#[tokio::test]
async fn fs_metas_round_trip() {
    let remote = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(remote.path().join("models/iris")).unwrap();
    std::fs::write(
        remote.path().join("models/iris/tensorflow_model_desc"),
        serde_json::to_vec(&sample_metas()).unwrap(),
    )
    .unwrap();
    let store = FsModelStore::new(remote.path(), work.path()).unwrap();

    let metas = store
        .load_metas("models/iris", "tensorflow_model_desc")
        .await
        .unwrap();
    assert_eq!(metas, sample_metas());

    let err = store
        .load_metas("models/other", "tensorflow_model_desc")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::MetadataNotFound { .. }));
}

// ===========================================================================
// ArtifactStore contract tests
// ===========================================================================

#[tokio::test]
async fn memory_artifacts_record_attempts_in_order() {
    let store = MemoryModelStore::new();
    store.put_file("m", "exported_path");

    store.load_file("m", "exported_path").await.unwrap();
    let err = store.load_dir("m", "model_save").await.unwrap_err();

    assert!(matches!(err, StorageError::ArtifactNotFound { .. }));
    assert_eq!(
        store.fetches(),
        vec![
            FetchRecord::File {
                root: "m".to_string(),
                name: "exported_path".to_string()
            },
            FetchRecord::Dir {
                root: "m".to_string(),
                path: "model_save".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn fs_load_file_copies_into_work_dir() {
    let remote = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(remote.path().join("m")).unwrap();
    std::fs::write(remote.path().join("m/exported_path"), b"model_save/1589").unwrap();
    let store = FsModelStore::new(remote.path(), work.path()).unwrap();

    let local = store.load_file("m", "exported_path").await.unwrap();

    assert_eq!(local, work.path().join("exported_path"));
    assert_eq!(std::fs::read(local).unwrap(), b"model_save/1589");
}

#[tokio::test]
async fn fs_missing_dir_is_not_found() {
    let remote = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let store = FsModelStore::new(remote.path(), work.path()).unwrap();

    let err = store.load_dir("m", "model_save").await.unwrap_err();
    assert!(matches!(err, StorageError::ArtifactNotFound { .. }));
}

// ===========================================================================
// TableSource contract tests
// ===========================================================================

#[tokio::test]
async fn memory_table_chunks_rows_by_batch_size() {
    let source = MemoryTableSource::new();
    let table = TableRef::parse("proj.iris").unwrap();
    let rows: Vec<Row> = (0..5).map(|i| vec![json!(i)]).collect();
    source.put_table(&table, vec!["x".to_string()], rows);

    let batches: Vec<RowBatch> = source.row_batches(&table, 2).try_collect().await.unwrap();

    assert_eq!(
        batches.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    assert_eq!(
        source.opened_streams(),
        vec![("odps://proj/tables/iris".to_string(), 2)]
    );
}

#[tokio::test]
async fn jsonl_and_memory_agree_on_columns() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("proj")).unwrap();
    std::fs::write(
        dir.path().join("proj/iris.jsonl"),
        "[\"sepal_length\",\"class\"]\n[5.1,0]\n",
    )
    .unwrap();
    let table = TableRef::parse("proj.iris").unwrap();

    let fs_source = JsonlTableSource::new(dir.path());
    let mem_source = MemoryTableSource::new();
    mem_source.put_table(
        &table,
        vec!["sepal_length".to_string(), "class".to_string()],
        vec![vec![json!(5.1), json!(0)]],
    );

    assert_eq!(
        fs_source.selected_columns(&table).await.unwrap(),
        mem_source.selected_columns(&table).await.unwrap()
    );
    let fs_rows: Vec<RowBatch> = fs_source.row_batches(&table, 1).try_collect().await.unwrap();
    let mem_rows: Vec<RowBatch> = mem_source.row_batches(&table, 1).try_collect().await.unwrap();
    assert_eq!(fs_rows, mem_rows);
}

#[tokio::test]
async fn missing_table_columns_error() {
    let source = MemoryTableSource::new();
    let table = TableRef::parse("proj.none").unwrap();

    let err = source.selected_columns(&table).await.unwrap_err();
    assert!(matches!(err, StorageError::TableNotFound { .. }));
}

// ===========================================================================
// SqlDatabase contract tests
// ===========================================================================

#[tokio::test]
async fn sql_fake_records_and_rejects() {
    let db = MemorySqlDatabase::new("mysql", vec![SqlField::new("a", "INT")]).failing_on("create");

    db.exec("drop table if exists t;").await.unwrap();
    let err = db.exec("create table t (a INT);").await.unwrap_err();

    assert!(matches!(err, StorageError::Sql { .. }));
    assert_eq!(db.executed(), vec!["drop table if exists t;".to_string()]);
    assert_eq!(db.field_types("select a from s").await.unwrap().len(), 1);
    assert_eq!(db.driver(), "mysql");
}
