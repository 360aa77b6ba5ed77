//! Model resolution with ordered loader fallback

use tracing::{info, warn};

use super::generic::{GenericFlavor, GenericModel, ModelDescriptor, DESCRIPTOR_FILE};
use super::tree::TreeEnsemble;
use super::{ModelHandle, ModelUri, Predictor};
use crate::error::{Result, ShapLensError};
use crate::fallback::FallbackChain;
use crate::tracking::TrackingStore;

/// File holding a serialized tree ensemble inside the model directory
pub const TREE_MODEL_FILE: &str = "model.json";

/// One way of turning run artifacts into a model
pub trait ModelLoader: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, store: &dyn TrackingStore, uri: &ModelUri) -> Result<Box<dyn Predictor>>;
}

/// Loads the native tree flavor, keeping the tree structure visible
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeFlavorLoader;

impl ModelLoader for TreeFlavorLoader {
    fn name(&self) -> &'static str {
        "tree_ensemble"
    }

    fn load(&self, store: &dyn TrackingStore, uri: &ModelUri) -> Result<Box<dyn Predictor>> {
        let bytes = store.download_artifact(uri.run_id(), &uri.artifact(TREE_MODEL_FILE))?;
        let ensemble = TreeEnsemble::from_json(&bytes)?;
        Ok(Box::new(ensemble))
    }
}

/// Loads any supported flavor through `MLmodel.json` as a black box
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericLoader;

impl ModelLoader for GenericLoader {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn load(&self, store: &dyn TrackingStore, uri: &ModelUri) -> Result<Box<dyn Predictor>> {
        let bytes = store.download_artifact(uri.run_id(), &uri.artifact(DESCRIPTOR_FILE))?;
        let descriptor = ModelDescriptor::from_json(&bytes)?;
        let (flavor, spec) = descriptor.select_flavor()?;

        let data = store.download_artifact(uri.run_id(), &uri.artifact(&spec.data))?;
        let flavor = GenericFlavor::decode(flavor, &data)?;
        let (signature, categories) = match descriptor.signature {
            Some(s) => (Some(s.inputs), s.categories),
            None => (None, Default::default()),
        };
        Ok(Box::new(
            GenericModel::new(flavor, signature)?.with_categories(categories),
        ))
    }
}

/// Ordered list of loaders
pub struct ModelResolver {
    loaders: Vec<Box<dyn ModelLoader>>,
}

impl Default for ModelResolver {
    fn default() -> Self {
        Self::new()
            .with_loader(TreeFlavorLoader)
            .with_loader(GenericLoader)
    }
}

impl ModelResolver {
    /// Resolver with no loaders
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    pub fn with_loader(mut self, loader: impl ModelLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    /// Load the model at `uri`, trying each loader in order
    pub fn resolve(&self, store: &dyn TrackingStore, uri: &ModelUri) -> Result<ModelHandle> {
        let chain = self
            .loaders
            .iter()
            .fold(FallbackChain::new(), |chain, loader| {
                chain.then(loader.name(), move |uri: &ModelUri| loader.load(store, uri))
            });

        match chain.run(uri) {
            Ok((loader, model)) => {
                info!(
                    uri = %uri,
                    loader = %loader,
                    flavor = model.flavor(),
                    n_features = model.n_features(),
                    "Model loaded"
                );
                Ok(ModelHandle::new(uri.clone(), loader, model))
            }
            Err(failure) => {
                warn!(uri = %uri, attempts = failure.attempts.len(), "No loader could load the model");
                Err(ShapLensError::ModelLoadError {
                    uri: uri.to_string(),
                    attempts: failure.summarize(),
                })
            }
        }
    }
}
