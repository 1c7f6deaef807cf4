use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::blocking::run_blocking;
use crate::error::StorageError;
use crate::storage_traits::{ArtifactStore, MetaStore, ModelMetas, StorageResult};

/// Local-filesystem mirror of the model object store.
///
/// Layout: `<store_root>/<model root>/<kind>` holds the metadata JSON and
/// `<store_root>/<model root>/<path>` holds artifacts. Fetched artifacts are
/// copied to `<work_dir>/<path>`.
pub struct FsModelStore {
    store_root: PathBuf,
    work_dir: PathBuf,
}

impl FsModelStore {
    /// Create a store reading from `store_root` and fetching into `work_dir`.
    /// Creates `work_dir` if needed.
    pub fn new(store_root: impl AsRef<Path>, work_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let work_dir = work_dir.as_ref().to_path_buf();
        fs::create_dir_all(&work_dir)?;
        Ok(Self {
            store_root: store_root.as_ref().to_path_buf(),
            work_dir,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn remote_path(&self, root: &str, relative: &str) -> PathBuf {
        let root = root.strip_prefix("oss://").unwrap_or(root);
        self.store_root
            .join(root.trim_start_matches('/'))
            .join(relative.trim_start_matches('/'))
    }
}

/// Atomic write: temp file in the destination directory, then rename.
fn copy_file_atomic(src: &Path, dest: &Path) -> StorageResult<()> {
    let data = fs::read(src)?;
    let parent = dest
        .parent()
        .ok_or_else(|| StorageError::Backend(format!("no parent for {}", dest.display())))?;
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(&data)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

fn copy_tree(src: &Path, dest: &Path) -> StorageResult<usize> {
    fs::create_dir_all(dest)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_tree(&entry.path(), &target)?;
        } else {
            copy_file_atomic(&entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Copy `src` into a staging dir under `work_dir`, then swap it in for
/// `dest`. Whatever `dest` held before is gone afterwards.
fn replace_tree(src: &Path, dest: &Path, work_dir: &Path) -> StorageResult<usize> {
    let staging = tempfile::Builder::new()
        .prefix(".fetch-")
        .tempdir_in(work_dir)?;
    let copied = copy_tree(src, staging.path())?;

    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest)?,
        Ok(_) => fs::remove_file(dest)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(staging.path(), dest)?;
    Ok(copied)
}

fn read_metas(path: &Path, root: &str, kind: &str) -> StorageResult<ModelMetas> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::MetadataNotFound {
                root: root.to_string(),
                kind: kind.to_string(),
            }
        } else {
            StorageError::Io(e)
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::MetadataCorrupt {
        root: root.to_string(),
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl MetaStore for FsModelStore {
    async fn load_metas(&self, root: &str, kind: &str) -> StorageResult<ModelMetas> {
        let path = self.remote_path(root, kind);
        let (root, kind) = (root.to_string(), kind.to_string());
        run_blocking(move || read_metas(&path, &root, &kind)).await
    }
}

#[async_trait]
impl ArtifactStore for FsModelStore {
    async fn load_file(&self, root: &str, name: &str) -> StorageResult<PathBuf> {
        let src = self.remote_path(root, name);
        let dest = self.work_dir.join(name);
        let (root, name) = (root.to_string(), name.to_string());
        run_blocking(move || {
            if !src.is_file() {
                return Err(StorageError::ArtifactNotFound { root, path: name });
            }
            copy_file_atomic(&src, &dest)?;
            debug!(src = %src.display(), dest = %dest.display(), "fetched artifact file");
            Ok(dest)
        })
        .await
    }

    async fn load_dir(&self, root: &str, relative_path: &str) -> StorageResult<PathBuf> {
        let src = self.remote_path(root, relative_path);
        let dest = self.work_dir.join(relative_path);
        let work_dir = self.work_dir.clone();
        let (root, relative_path) = (root.to_string(), relative_path.to_string());
        run_blocking(move || {
            if !src.is_dir() {
                return Err(StorageError::ArtifactNotFound {
                    root,
                    path: relative_path,
                });
            }
            let files = replace_tree(&src, &dest, &work_dir)?;
            debug!(src = %src.display(), dest = %dest.display(), files, "fetched artifact directory");
            Ok(dest)
        })
        .await
    }
}
