//! Model formats and model resolution
//!
//! Models are loaded from a run's artifacts through [`ModelResolver`], which
//! tries a tree-specific loader first and a flavor-agnostic loader second.
//! Whatever loads is exposed through the [`Predictor`] trait.

mod generic;
mod linear;
mod resolver;
pub(crate) mod tree;
mod uri;

pub use generic::{
    FlavorSpec, GenericFlavor, GenericModel, ModelDescriptor, Signature, DESCRIPTOR_FILE,
    SUPPORTED_FLAVORS,
};
pub use linear::{LinearModel, Link};
pub use resolver::{GenericLoader, ModelLoader, ModelResolver, TreeFlavorLoader, TREE_MODEL_FILE};
pub use tree::{Aggregation, TreeEnsemble, TreeNode};
pub use uri::ModelUri;

use ndarray::Array2;
use std::fmt;

use crate::data::CategoryLevels;
use crate::error::Result;

/// Prediction interface shared by every loaded model
pub trait Predictor: Send + Sync {
    /// Flavor name used in logs and reports
    fn flavor(&self) -> &'static str;

    /// Number of input columns
    fn n_features(&self) -> usize;

    /// Number of raw outputs (1 for regression and binary margin models)
    fn n_outputs(&self) -> usize;

    /// Ordered input column names, when the model records them
    fn input_names(&self) -> Option<&[String]>;

    /// Class labels for multi-output models
    fn class_labels(&self) -> Option<&[String]> {
        None
    }

    /// Category levels the model was trained with, per string column
    fn category_levels(&self) -> Option<&CategoryLevels> {
        None
    }

    /// Raw outputs, one row per input row
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Tree structure, for models that expose it
    fn as_tree_ensemble(&self) -> Option<&TreeEnsemble> {
        None
    }
}

/// A loaded model and where it came from
pub struct ModelHandle {
    pub uri: ModelUri,
    /// Name of the loader strategy that succeeded
    pub loader: String,
    model: Box<dyn Predictor>,
}

impl ModelHandle {
    pub fn new(uri: ModelUri, loader: impl Into<String>, model: Box<dyn Predictor>) -> Self {
        Self {
            uri,
            loader: loader.into(),
            model,
        }
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.model.as_ref()
    }

    pub fn as_tree_ensemble(&self) -> Option<&TreeEnsemble> {
        self.model.as_tree_ensemble()
    }

    pub fn n_outputs(&self) -> usize {
        self.model.n_outputs()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("uri", &self.uri.to_string())
            .field("loader", &self.loader)
            .field("flavor", &self.model.flavor())
            .field("n_features", &self.model.n_features())
            .field("n_outputs", &self.model.n_outputs())
            .finish()
    }
}
