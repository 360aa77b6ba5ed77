//! Flavor-agnostic model wrapper
//!
//! A `MLmodel.json` descriptor lists the flavors a model was saved with and,
//! optionally, its input signature. The generic wrapper only exposes the
//! prediction function; the structure of the underlying model stays hidden.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::linear::LinearModel;
use super::tree::TreeEnsemble;
use super::Predictor;
use crate::data::CategoryLevels;
use crate::error::{Result, ShapLensError};

/// File name of the generic model descriptor
pub const DESCRIPTOR_FILE: &str = "MLmodel.json";

/// Flavors the generic loader understands, in preference order
pub const SUPPORTED_FLAVORS: [&str; 2] = ["tree_ensemble", "linear"];

/// One saved flavor of a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorSpec {
    /// Data file relative to the model directory
    pub data: String,
}

/// Ordered input columns accepted by the model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Signature {
    pub inputs: Vec<String>,
    /// Level order of string-encoded inputs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: CategoryLevels,
}

/// Contents of `MLmodel.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub flavors: BTreeMap<String, FlavorSpec>,
    #[serde(default)]
    pub signature: Option<Signature>,
}

impl ModelDescriptor {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ShapLensError::ModelFormat(format!("invalid {}: {}", DESCRIPTOR_FILE, e)))
    }

    /// First flavor this crate can load
    pub fn select_flavor(&self) -> Result<(&'static str, &FlavorSpec)> {
        SUPPORTED_FLAVORS
            .iter()
            .find_map(|name| self.flavors.get(*name).map(|spec| (*name, spec)))
            .ok_or_else(|| {
                let found: Vec<&str> = self.flavors.keys().map(|k| k.as_str()).collect();
                ShapLensError::ModelFormat(format!(
                    "no supported flavor among [{}]; supported: [{}]",
                    found.join(", "),
                    SUPPORTED_FLAVORS.join(", ")
                ))
            })
    }
}

/// Underlying model of a generic wrapper
#[derive(Debug, Clone)]
pub enum GenericFlavor {
    Trees(TreeEnsemble),
    Linear(LinearModel),
}

impl GenericFlavor {
    /// Decode a flavor's data file
    pub fn decode(flavor: &str, bytes: &[u8]) -> Result<Self> {
        match flavor {
            "tree_ensemble" => Ok(GenericFlavor::Trees(TreeEnsemble::from_json(bytes)?)),
            "linear" => Ok(GenericFlavor::Linear(LinearModel::from_json(bytes)?)),
            other => Err(ShapLensError::ModelFormat(format!(
                "unsupported flavor '{}'",
                other
            ))),
        }
    }

    fn n_features(&self) -> usize {
        match self {
            GenericFlavor::Trees(t) => t.n_features,
            GenericFlavor::Linear(l) => l.n_features(),
        }
    }

    fn n_outputs(&self) -> usize {
        match self {
            GenericFlavor::Trees(t) => t.n_outputs,
            GenericFlavor::Linear(l) => l.n_outputs(),
        }
    }
}

/// Black-box model: prediction function plus an optional input signature
#[derive(Debug, Clone)]
pub struct GenericModel {
    flavor: GenericFlavor,
    signature: Option<Vec<String>>,
    categories: CategoryLevels,
}

impl GenericModel {
    pub fn new(flavor: GenericFlavor, signature: Option<Vec<String>>) -> Result<Self> {
        let signature = signature.or_else(|| match &flavor {
            GenericFlavor::Trees(t) => t.feature_names.clone(),
            GenericFlavor::Linear(_) => None,
        });

        if let Some(inputs) = &signature {
            if inputs.len() != flavor.n_features() {
                return Err(ShapLensError::ModelFormat(format!(
                    "signature lists {} inputs but the model takes {}",
                    inputs.len(),
                    flavor.n_features()
                )));
            }
        }

        let categories = match &flavor {
            GenericFlavor::Trees(t) => t.categories.clone(),
            GenericFlavor::Linear(_) => CategoryLevels::new(),
        };

        Ok(Self {
            flavor,
            signature,
            categories,
        })
    }

    /// Levels recorded in the descriptor; they replace any the flavor carries
    pub fn with_categories(mut self, categories: CategoryLevels) -> Self {
        if !categories.is_empty() {
            self.categories = categories;
        }
        self
    }
}

impl Predictor for GenericModel {
    fn flavor(&self) -> &'static str {
        "generic"
    }

    fn n_features(&self) -> usize {
        self.flavor.n_features()
    }

    fn n_outputs(&self) -> usize {
        self.flavor.n_outputs()
    }

    fn input_names(&self) -> Option<&[String]> {
        self.signature.as_deref()
    }

    fn category_levels(&self) -> Option<&CategoryLevels> {
        (!self.categories.is_empty()).then_some(&self.categories)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(ShapLensError::ShapeError {
                expected: format!("{} input columns", self.n_features()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        match &self.flavor {
            GenericFlavor::Trees(t) => t.predict(x),
            GenericFlavor::Linear(l) => l.predict(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn descriptor(json: &str) -> ModelDescriptor {
        ModelDescriptor::from_json(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_flavor_preference() {
        let d = descriptor(
            r#"{"flavors": {"linear": {"data": "linear.json"}, "tree_ensemble": {"data": "trees.json"}}}"#,
        );
        let (name, spec) = d.select_flavor().unwrap();
        assert_eq!(name, "tree_ensemble");
        assert_eq!(spec.data, "trees.json");
    }

    #[test]
    fn test_unsupported_flavor() {
        let d = descriptor(r#"{"flavors": {"python_function": {"data": "model.pkl"}}}"#);
        let err = d.select_flavor().unwrap_err().to_string();
        assert!(err.contains("python_function"));
    }

    #[test]
    fn test_generic_model_hides_tree_structure() {
        let trees = crate::model::tree::tests::sample_ensemble();
        let model = GenericModel::new(GenericFlavor::Trees(trees), None).unwrap();
        assert!(model.as_tree_ensemble().is_none());
        assert_eq!(model.n_features(), 2);
    }

    #[test]
    fn test_signature_categories_reach_the_model() {
        let d = descriptor(
            r#"{"flavors": {"linear": {"data": "linear.json"}},
                "signature": {"inputs": ["a", "plan"], "categories": {"plan": ["basic", "plus"]}}}"#,
        );
        let signature = d.signature.unwrap();
        let linear = LinearModel::new(vec![vec![1.0, 2.0]], vec![0.0]);
        let model = GenericModel::new(GenericFlavor::Linear(linear), Some(signature.inputs))
            .unwrap()
            .with_categories(signature.categories);
        let levels = model.category_levels().unwrap();
        assert_eq!(levels["plan"], vec!["basic".to_string(), "plus".to_string()]);

        let bare = descriptor(r#"{"flavors": {"linear": {"data": "linear.json"}}, "signature": {"inputs": ["a"]}}"#);
        assert!(bare.signature.unwrap().categories.is_empty());
    }

    #[test]
    fn test_signature_length_checked() {
        let linear = LinearModel::new(vec![vec![1.0, 2.0]], vec![0.0]);
        let bad = GenericModel::new(GenericFlavor::Linear(linear.clone()), Some(vec!["a".into()]));
        assert!(bad.is_err());

        let ok = GenericModel::new(GenericFlavor::Linear(linear), Some(vec!["a".into(), "b".into()]))
            .unwrap();
        assert_eq!(ok.input_names().unwrap(), &["a".to_string(), "b".to_string()]);
        assert!(ok.predict(&array![[1.0, 2.0, 3.0]]).is_err());
        assert_eq!(ok.predict(&array![[1.0, 2.0]]).unwrap()[[0, 0]], 5.0);
    }
}
