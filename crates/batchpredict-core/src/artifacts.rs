//! Family-specific artifact fetch.
//!
//! The directory names here are shared with the training step that exported
//! the model; a mismatch means the executor finds no weights.

use batchpredict_store::{ArtifactStore, StorageResult};
use serde::Serialize;
use tracing::debug;

use crate::registry::ModelFamily;

/// Marker file an estimator export leaves next to its weights.
pub const EXPORTED_PATH_MARKER: &str = "exported_path";

/// Relative directory holding saved weights for both families.
pub const MODEL_SAVE_DIR: &str = "model_save";

/// One fetch against the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchStep {
    File { name: String },
    Dir { path: String },
}

/// Fetch sequence for a model family.
pub fn fetch_plan(family: ModelFamily) -> Vec<FetchStep> {
    match family {
        ModelFamily::Estimator => vec![
            FetchStep::File {
                name: EXPORTED_PATH_MARKER.to_string(),
            },
            FetchStep::Dir {
                path: MODEL_SAVE_DIR.to_string(),
            },
        ],
        ModelFamily::Differentiable => vec![FetchStep::Dir {
            path: MODEL_SAVE_DIR.to_string(),
        }],
    }
}

/// Run the fetch sequence for `family` against `store`, stopping at the
/// first failure. Returns the steps performed.
pub async fn fetch_artifacts(
    store: &dyn ArtifactStore,
    root: &str,
    family: ModelFamily,
) -> StorageResult<Vec<FetchStep>> {
    let plan = fetch_plan(family);
    for step in &plan {
        let local = match step {
            FetchStep::File { name } => store.load_file(root, name).await?,
            FetchStep::Dir { path } => store.load_dir(root, path).await?,
        };
        debug!(root = %root, step = ?step, local = %local.display(), "artifact fetched");
    }
    Ok(plan)
}
