//! Model registry: name -> registered model type.
//!
//! Each model type is tagged with its execution family and form when it is
//! registered, so dispatch reads a tag instead of inspecting types.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ResolutionError;
use crate::params::{HyperParams, FIELD_METAS_KEY, MODEL_DIR_KEY};

/// Execution family of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// High-level trainable estimator; predicts from an exported model dir.
    Estimator,
    /// Low-level differentiable model; predicts from saved weights.
    Differentiable,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Estimator => "estimator",
            ModelFamily::Differentiable => "differentiable",
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a model is a stateful object or a bare function that builds a
/// graph from its inputs. Functional models cannot describe their own input
/// shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelForm {
    Object,
    Functional,
}

/// A registered model implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelType {
    pub name: String,
    pub aliases: Vec<String>,
    pub family: ModelFamily,
    pub form: ModelForm,
    /// Hyperparameters the constructor cannot run without.
    pub required_params: Vec<String>,
}

impl ModelType {
    pub fn new(name: impl Into<String>, family: ModelFamily, form: ModelForm) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            family,
            form,
            required_params: Vec::new(),
        }
    }

    pub fn estimator(name: impl Into<String>) -> Self {
        Self::new(name, ModelFamily::Estimator, ModelForm::Object)
    }

    pub fn model_class(name: impl Into<String>) -> Self {
        Self::new(name, ModelFamily::Differentiable, ModelForm::Object)
    }

    pub fn functional(name: impl Into<String>) -> Self {
        Self::new(name, ModelFamily::Differentiable, ModelForm::Functional)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn requires(mut self, param: impl Into<String>) -> Self {
        self.required_params.push(param.into());
        self
    }

    /// Parameter the executor adds at dispatch time for this family and
    /// form, if any.
    pub fn injected_param(&self) -> Option<&'static str> {
        match (self.family, self.form) {
            (ModelFamily::Estimator, _) => Some(MODEL_DIR_KEY),
            (ModelFamily::Differentiable, ModelForm::Functional) => Some(FIELD_METAS_KEY),
            (ModelFamily::Differentiable, ModelForm::Object) => None,
        }
    }

    /// Bind constructor parameters, checking every required one is present.
    /// The parameter injected at dispatch never counts as missing.
    pub fn instantiate(
        &self,
        model_ref: &str,
        params: HyperParams,
    ) -> Result<ModelDescriptor, ResolutionError> {
        let injected = self.injected_param();
        let missing: Vec<String> = self
            .required_params
            .iter()
            .filter(|p| Some(p.as_str()) != injected && !params.contains_key(p))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ResolutionError::MissingParams {
                model: self.name.clone(),
                params: missing,
            });
        }
        Ok(ModelDescriptor {
            model_ref: model_ref.to_string(),
            type_name: self.name.clone(),
            family: self.family,
            form: self.form,
            params,
        })
    }
}

/// A resolved model bound to its constructor parameters. Owned by a single
/// prediction run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    /// Reference string exactly as stored in metadata.
    pub model_ref: String,
    /// Canonical registered name.
    pub type_name: String,
    pub family: ModelFamily,
    pub form: ModelForm,
    pub params: HyperParams,
}

impl ModelDescriptor {
    pub fn is_functional(&self) -> bool {
        self.form == ModelForm::Functional
    }
}

/// Family of a resolved model. Total and side-effect free.
pub fn classify(descriptor: &ModelDescriptor) -> ModelFamily {
    descriptor.family
}

/// Registry of model types, keyed by canonical name and alias.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    types: BTreeMap<String, ModelType>,
    index: BTreeMap<String, String>,
}

const ESTIMATOR_NAMESPACE: &str = "tf.estimator.";
const MODEL_ZOO_NAMESPACE: &str = "sqlflow_models.";

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the canned estimators and the model-zoo types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for model_type in builtin_types() {
            // Builtin names are distinct by construction.
            if let Err(e) = registry.register(model_type) {
                tracing::error!(error = %e, "builtin model registration failed");
            }
        }
        registry
    }

    /// Register a model type under its name and every alias.
    pub fn register(&mut self, model_type: ModelType) -> Result<(), ResolutionError> {
        let keys: Vec<&String> = std::iter::once(&model_type.name)
            .chain(model_type.aliases.iter())
            .collect();
        for key in &keys {
            if self.index.contains_key(key.as_str()) {
                return Err(ResolutionError::DuplicateModel {
                    name: key.to_string(),
                });
            }
        }
        for key in keys {
            self.index.insert(key.clone(), model_type.name.clone());
        }
        self.types.insert(model_type.name.clone(), model_type);
        Ok(())
    }

    /// Look up a model reference by name or alias.
    pub fn resolve(&self, reference: &str) -> Result<&ModelType, ResolutionError> {
        let reference = reference.trim();
        self.index
            .get(reference)
            .and_then(|name| self.types.get(name))
            .ok_or_else(|| ResolutionError::UnknownModel {
                name: reference.to_string(),
            })
    }

    /// Registered types sorted by canonical name.
    pub fn list(&self) -> Vec<&ModelType> {
        self.types.values().collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn canned_estimator(name: &str) -> ModelType {
    ModelType::estimator(name).with_alias(format!("{ESTIMATOR_NAMESPACE}{name}"))
}

fn builtin_types() -> Vec<ModelType> {
    vec![
        canned_estimator("LinearClassifier").requires("feature_columns"),
        canned_estimator("LinearRegressor").requires("feature_columns"),
        canned_estimator("DNNClassifier")
            .requires("feature_columns")
            .requires("hidden_units"),
        canned_estimator("DNNRegressor")
            .requires("feature_columns")
            .requires("hidden_units"),
        canned_estimator("DNNLinearCombinedClassifier"),
        canned_estimator("DNNLinearCombinedRegressor"),
        canned_estimator("BoostedTreesClassifier")
            .requires("feature_columns")
            .requires("n_batches_per_layer"),
        canned_estimator("BoostedTreesRegressor")
            .requires("feature_columns")
            .requires("n_batches_per_layer"),
        ModelType::model_class(format!("{MODEL_ZOO_NAMESPACE}DNNClassifier")),
        ModelType::model_class(format!("{MODEL_ZOO_NAMESPACE}DNNRegressor")),
        ModelType::model_class(format!("{MODEL_ZOO_NAMESPACE}DeepEmbeddingClusterModel")),
        ModelType::functional(format!("{MODEL_ZOO_NAMESPACE}dnnclassifier_functional_model")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_resolve_by_name_and_alias() {
        let registry = ModelRegistry::with_builtins();
        assert_eq!(registry.len(), 12);

        let by_name = registry.resolve("LinearClassifier").unwrap();
        let by_alias = registry.resolve("tf.estimator.LinearClassifier").unwrap();
        assert_eq!(by_name, by_alias);
        assert_eq!(by_name.family, ModelFamily::Estimator);

        let zoo = registry.resolve("sqlflow_models.DNNClassifier").unwrap();
        assert_eq!(zoo.family, ModelFamily::Differentiable);
        assert_eq!(zoo.form, ModelForm::Object);
    }

    #[test]
    fn every_registered_type_classifies_to_exactly_one_family() {
        let registry = ModelRegistry::with_builtins();
        for model_type in registry.list() {
            let params = model_type
                .required_params
                .iter()
                .fold(HyperParams::new(), |acc, p| {
                    acc.with_param(p.clone(), crate::params::ParamValue::Json(json!(1)))
                });
            let descriptor = model_type.instantiate(&model_type.name, params).unwrap();
            let first = classify(&descriptor);
            assert_eq!(first, classify(&descriptor));
            assert_eq!(first, model_type.family);
        }
    }

    #[test]
    fn unknown_reference_fails() {
        let registry = ModelRegistry::with_builtins();
        let err = registry.resolve("tf.keras.Sequential").unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnknownModel {
                name: "tf.keras.Sequential".to_string()
            }
        );
    }

    #[test]
    fn duplicate_alias_is_rejected_atomically() {
        let mut registry = ModelRegistry::with_builtins();
        let clash = ModelType::model_class("my_models.Wide").with_alias("LinearClassifier");

        let err = registry.register(clash).unwrap_err();

        assert!(matches!(err, ResolutionError::DuplicateModel { .. }));
        assert!(registry.resolve("my_models.Wide").is_err());
    }

    #[test]
    fn extension_types_are_resolvable() {
        let mut registry = ModelRegistry::new();
        registry
            .register(ModelType::functional("my_models.tiny_net").requires("field_metas"))
            .unwrap();

        let tiny = registry.resolve(" my_models.tiny_net ").unwrap();
        let descriptor = tiny.instantiate("my_models.tiny_net", HyperParams::new()).unwrap();
        assert_eq!(descriptor.form, ModelForm::Functional);
        assert_eq!(tiny.injected_param(), Some("field_metas"));
    }

    #[test]
    fn injected_param_only_excuses_its_own_family() {
        let object = ModelType::model_class("my_models.Wide").requires("field_metas");
        let err = object.instantiate("my_models.Wide", HyperParams::new()).unwrap_err();
        assert!(matches!(err, ResolutionError::MissingParams { params, .. } if params == vec!["field_metas"]));

        let estimator = ModelType::estimator("my_models.Boosted")
            .requires("model_dir")
            .requires("n_trees");
        let err = estimator.instantiate("my_models.Boosted", HyperParams::new()).unwrap_err();
        assert!(matches!(err, ResolutionError::MissingParams { params, .. } if params == vec!["n_trees"]));
    }
}
