//! Hyperparameters handed to the model constructor.
//!
//! `HyperParams` is an immutable value: every `with_*` method returns a new
//! mapping and leaves the receiver untouched.

use std::collections::BTreeMap;

use batchpredict_store::FieldMeta;
use serde::Serialize;

use crate::feature_column::FeatureColumn;

/// Key under which estimators receive their weights directory.
pub const MODEL_DIR_KEY: &str = "model_dir";

/// Key under which functional models receive per-feature metadata.
pub const FIELD_METAS_KEY: &str = "field_metas";

/// One hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Json(serde_json::Value),
    FeatureColumns(Vec<FeatureColumn>),
    FieldMetas(BTreeMap<String, FieldMeta>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HyperParams(BTreeMap<String, ParamValue>);

impl HyperParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the raw hyperparameters stored in model metadata.
    pub fn from_json(params: BTreeMap<String, serde_json::Value>) -> Self {
        Self(
            params
                .into_iter()
                .map(|(k, v)| (k, ParamValue::Json(v)))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy with `key` set to `value`.
    pub fn with_param(&self, key: impl Into<String>, value: ParamValue) -> Self {
        let mut next = self.0.clone();
        next.insert(key.into(), value);
        Self(next)
    }

    /// Copy with one entry per feature-column group.
    ///
    /// Only the group keys are written, so merging the same columns again
    /// yields an equal mapping.
    pub fn with_feature_columns(&self, columns: &BTreeMap<String, Vec<FeatureColumn>>) -> Self {
        let mut next = self.0.clone();
        for (group, group_columns) in columns {
            next.insert(
                group.clone(),
                ParamValue::FeatureColumns(group_columns.clone()),
            );
        }
        Self(next)
    }

    /// The feature columns stored under `group`, if any.
    pub fn feature_columns(&self, group: &str) -> Option<&[FeatureColumn]> {
        match self.0.get(group) {
            Some(ParamValue::FeatureColumns(columns)) => Some(columns),
            _ => None,
        }
    }
}
