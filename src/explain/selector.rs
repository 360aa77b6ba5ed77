//! Explainer selection: exact tree method first, permutation second

use tracing::{info, warn};

use super::{Attributions, PermutationExplainer, TreeExplainer};
use crate::config::ExplainerConfig;
use crate::data::SampleDataset;
use crate::error::{Attempt, Result, ShapLensError};
use crate::fallback::FallbackChain;
use crate::model::ModelHandle;

/// Picks the best applicable explainer for a model
#[derive(Debug, Clone, Default)]
pub struct ExplainerSelector {
    config: ExplainerConfig,
}

impl ExplainerSelector {
    pub fn new(config: ExplainerConfig) -> Self {
        Self { config }
    }

    pub fn explain(&self, handle: &ModelHandle, dataset: &SampleDataset) -> Result<Attributions> {
        let chain = FallbackChain::new()
            .then("tree", |ds: &SampleDataset| {
                let ensemble = handle.as_tree_ensemble().ok_or_else(|| {
                    ShapLensError::ModelFormat(format!(
                        "{} model does not expose a tree structure",
                        handle.predictor().flavor()
                    ))
                })?;
                TreeExplainer::new(ensemble).explain(ds)
            })
            .then("permutation", |ds: &SampleDataset| {
                PermutationExplainer::new(handle.predictor(), self.config.clone()).explain(ds)
            });

        match chain.run(dataset) {
            Ok((name, attributions)) => {
                info!(
                    explainer = %name,
                    rows = attributions.n_rows(),
                    classes = attributions.n_classes(),
                    "Attributions computed"
                );
                Ok(attributions)
            }
            Err(failure) => {
                let mut attempts: Vec<Attempt> = Vec::new();
                let mut reason = String::from("no explainer applies");
                for (name, err) in failure.attempts {
                    match err {
                        ShapLensError::ExplainerCreationError {
                            reason: inner_reason,
                            attempts: inner,
                        } => {
                            attempts.extend(
                                inner
                                    .into_iter()
                                    .map(|(step, why)| (format!("{}/{}", name, step), why)),
                            );
                            reason = inner_reason;
                        }
                        other => {
                            reason = other.to_string();
                            attempts.push((name, reason.clone()));
                        }
                    }
                }
                warn!(attempts = attempts.len(), "No explainer could be created");
                Err(ShapLensError::ExplainerCreationError { reason, attempts })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::ExplainerMethod;
    use crate::model::tree::tests::sample_ensemble;
    use crate::model::{GenericFlavor, GenericModel, LinearModel, ModelUri};

    fn handle(model: Box<dyn crate::model::Predictor>) -> ModelHandle {
        ModelHandle::new(ModelUri::new("run", "model").unwrap(), "test", model)
    }

    fn dataset(csv: &str) -> SampleDataset {
        SampleDataset::from_csv(csv.as_bytes(), 1000, 42).unwrap()
    }

    #[test]
    fn test_tree_model_uses_exact_method() {
        let h = handle(Box::new(sample_ensemble()));
        let attr = ExplainerSelector::default()
            .explain(&h, &dataset("a,b\n0,1\n1,2\n"))
            .unwrap();
        assert_eq!(attr.method, ExplainerMethod::Tree);
    }

    #[test]
    fn test_tree_shape_mismatch_falls_back() {
        let trees = sample_ensemble().with_feature_names(vec!["a".into(), "b".into()]);
        let h = handle(Box::new(trees));
        let attr = ExplainerSelector::default()
            .explain(&h, &dataset("b,z,a\n0,9,1\n1,9,2\n3,9,0\n"))
            .unwrap();
        assert_eq!(attr.method, ExplainerMethod::Permutation);
        assert!(attr.max_additivity_gap() < 1e-9);
    }

    #[test]
    fn test_all_reasons_listed() {
        let linear = LinearModel::new(vec![vec![1.0, 1.0]], vec![0.0]);
        let model = GenericModel::new(
            GenericFlavor::Linear(linear),
            Some(vec!["x".to_string(), "y".to_string()]),
        )
        .unwrap();
        let h = handle(Box::new(model));
        let err = ExplainerSelector::default()
            .explain(&h, &dataset("a,b,c\n1,2,3\n"))
            .unwrap_err();
        match &err {
            ShapLensError::ExplainerCreationError { attempts, .. } => {
                let names: Vec<&str> = attempts.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["tree", "permutation/direct", "permutation/reshaped"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("both layouts"));
    }
}
