//! Exact TreeSHAP for tree ensembles
//!
//! Path-dependent TreeSHAP (Lundberg et al., "Consistent Individualized
//! Feature Attribution for Tree Ensembles", Algorithm 2). Node covers stand in
//! for the training distribution, so the values sum to the raw model output
//! minus the cover-weighted expected output.

use ndarray::{Array2, ArrayView1};
use tracing::debug;

use super::{AttributionValues, Attributions, ExplainerMethod};
use crate::data::SampleDataset;
use crate::error::{Result, ShapLensError};
use crate::model::{TreeEnsemble, TreeNode};

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

/// Exact explainer for models that expose their trees
pub struct TreeExplainer<'a> {
    ensemble: &'a TreeEnsemble,
}

impl<'a> TreeExplainer<'a> {
    pub fn new(ensemble: &'a TreeEnsemble) -> Self {
        Self { ensemble }
    }

    /// Check that the dataset can be fed to the trees as-is
    pub fn check_input(&self, dataset: &SampleDataset) -> Result<()> {
        if dataset.n_features() != self.ensemble.n_features {
            return Err(ShapLensError::ShapeError {
                expected: format!("{} features", self.ensemble.n_features),
                actual: format!("{} columns", dataset.n_features()),
            });
        }
        if let Some(names) = &self.ensemble.feature_names {
            if names.as_slice() != dataset.feature_names() {
                return Err(ShapLensError::ShapeError {
                    expected: format!("columns [{}]", names.join(", ")),
                    actual: format!("columns [{}]", dataset.feature_names().join(", ")),
                });
            }
        }
        Ok(())
    }

    pub fn explain(&self, dataset: &SampleDataset) -> Result<Attributions> {
        self.check_input(dataset)?;

        let x = dataset.matrix();
        let n_outputs = self.ensemble.n_outputs;
        let mut tables = vec![Array2::zeros((x.nrows(), x.ncols())); n_outputs];
        let mut predictions = Array2::zeros((x.nrows(), n_outputs));

        for (i, row) in x.rows().into_iter().enumerate() {
            let phi = self.shap_row(row);
            for (j, per_output) in phi.iter().enumerate() {
                for (k, v) in per_output.iter().enumerate() {
                    tables[k][[i, j]] = *v;
                }
            }
            for (k, v) in self.ensemble.predict_row(row).into_iter().enumerate() {
                predictions[[i, k]] = v;
            }
        }

        debug!(
            rows = x.nrows(),
            trees = self.ensemble.trees.len(),
            max_depth = self.ensemble.max_depth(),
            "TreeSHAP finished"
        );

        Ok(Attributions {
            values: AttributionValues::from_outputs(tables),
            base_values: self.ensemble.expected_value(),
            predictions,
            data: x.clone(),
            feature_names: dataset.feature_names().to_vec(),
            row_indices: dataset.indices().to_vec(),
            method: ExplainerMethod::Tree,
        })
    }

    /// SHAP values of one row, `[feature][output]`
    pub fn shap_row(&self, x: ArrayView1<f64>) -> Vec<Vec<f64>> {
        let mut phi = vec![vec![0.0; self.ensemble.n_outputs]; self.ensemble.n_features];
        for tree in &self.ensemble.trees {
            recurse(tree, x, &mut phi, &[], 1.0, 1.0, None);
        }
        let scale = self.ensemble.scale();
        if scale != 1.0 {
            phi.iter_mut().flatten().for_each(|v| *v /= scale);
        }
        phi
    }
}

fn recurse(
    node: &TreeNode,
    x: ArrayView1<f64>,
    phi: &mut [Vec<f64>],
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = parent_path.to_vec();
    extend(&mut path, zero_fraction, one_fraction, feature);

    match node {
        TreeNode::Leaf { values, .. } => {
            for i in 1..path.len() {
                let w = unwound_sum(&path, i);
                let el = path[i];
                if let Some(f) = el.feature {
                    let scale = w * (el.one_fraction - el.zero_fraction);
                    for (p, v) in phi[f].iter_mut().zip(values) {
                        *p += scale * v;
                    }
                }
            }
        }
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        } => {
            let (hot, cold) = if x[*feature_idx] <= *threshold {
                (left.as_ref(), right.as_ref())
            } else {
                (right.as_ref(), left.as_ref())
            };
            let cover = *n_samples as f64;

            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(index) = path.iter().position(|e| e.feature == Some(*feature_idx)) {
                incoming_zero = path[index].zero_fraction;
                incoming_one = path[index].one_fraction;
                unwind(&mut path, index);
            }

            recurse(
                hot,
                x,
                phi,
                &path,
                hot.n_samples() as f64 / cover * incoming_zero,
                incoming_one,
                Some(*feature_idx),
            );
            recurse(
                cold,
                x,
                phi,
                &path,
                cold.n_samples() as f64 / cover * incoming_zero,
                0.0,
                Some(*feature_idx),
            );
        }
    }
}

fn extend(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let d = depth as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / (d + 1.0);
        path[i].weight = zero_fraction * path[i].weight * (d - i as f64) / (d + 1.0);
    }
}

fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let d = depth as f64;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next_one_portion * (d + 1.0) / ((i + 1) as f64 * one);
            next_one_portion = tmp - path[i].weight * zero * (d - i as f64) / (d + 1.0);
        } else {
            path[i].weight = path[i].weight * (d + 1.0) / (zero * (d - i as f64));
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total path weight with element `index` removed
fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let d = depth as f64;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = next_one_portion * (d + 1.0) / ((i + 1) as f64 * one);
            total += tmp;
            next_one_portion = path[i].weight - tmp * zero * (d - i as f64) / (d + 1.0);
        } else {
            total += path[i].weight / zero / ((d - i as f64) / (d + 1.0));
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::tests::{leaf, sample_ensemble, split};
    use crate::model::{Aggregation, TreeNode};

    fn dataset(csv: &str) -> SampleDataset {
        SampleDataset::from_csv(csv.as_bytes(), 1000, 42).unwrap()
    }

    #[test]
    fn test_single_split_attribution() {
        // f(x) = x0 <= 0 ? 0 : 10 with equal cover: phi0 = f(x) - 5
        let model = crate::model::TreeEnsemble::new(vec![split(0, 0.0, leaf(0.0, 50), leaf(10.0, 50))], 2, 1);
        let phi = TreeExplainer::new(&model).shap_row(ndarray::array![1.0, 7.0].view());
        assert!((phi[0][0] - 5.0).abs() < 1e-12);
        assert_eq!(phi[1][0], 0.0);
    }

    #[test]
    fn test_additivity_with_repeated_feature() {
        let model = sample_ensemble();
        let ds = dataset("a,b\n0.0,0.5\n1.0,3.0\n3.0,-1.0\n0.4,1.2\n2.0,0.0\n");
        let attr = TreeExplainer::new(&model).explain(&ds).unwrap();
        assert_eq!(attr.method, ExplainerMethod::Tree);
        assert!(matches!(attr.values, AttributionValues::Single(_)));
        assert!(attr.max_additivity_gap() < 1e-9);
    }

    #[test]
    fn test_additivity_with_mean_aggregation() {
        let model = sample_ensemble().with_aggregation(Aggregation::Mean);
        let ds = dataset("a,b\n0.0,0.5\n1.0,3.0\n3.0,-1.0\n");
        let attr = TreeExplainer::new(&model).explain(&ds).unwrap();
        assert!(attr.max_additivity_gap() < 1e-9);
    }

    #[test]
    fn test_symmetric_interaction_split_evenly() {
        // AND of two features with uniform covers: both get the same credit
        let tree = split(
            0,
            0.5,
            split(1, 0.5, leaf(0.0, 25), leaf(0.0, 25)),
            split(1, 0.5, leaf(0.0, 25), leaf(1.0, 25)),
        );
        let model = crate::model::TreeEnsemble::new(vec![tree], 2, 1);
        let phi = TreeExplainer::new(&model).shap_row(ndarray::array![1.0, 1.0].view());
        assert!((phi[0][0] - phi[1][0]).abs() < 1e-12);
        assert!((phi[0][0] + phi[1][0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_multi_output_gives_per_class_tables() {
        let tree = split(
            0,
            0.5,
            TreeNode::Leaf { values: vec![0.9, 0.1], n_samples: 60 },
            TreeNode::Leaf { values: vec![0.2, 0.8], n_samples: 40 },
        );
        let model = crate::model::TreeEnsemble::new(vec![tree], 1, 2)
            .with_aggregation(Aggregation::Mean);
        let ds = dataset("x\n0.0\n1.0\n");
        let attr = TreeExplainer::new(&model).explain(&ds).unwrap();
        assert_eq!(attr.n_classes(), 2);
        assert!(attr.max_additivity_gap() < 1e-12);
    }

    #[test]
    fn test_feature_count_mismatch_rejected() {
        let model = sample_ensemble();
        let ds = dataset("a,b,c\n1,2,3\n");
        assert!(TreeExplainer::new(&model).explain(&ds).is_err());
    }

    #[test]
    fn test_feature_name_mismatch_rejected() {
        let model = sample_ensemble().with_feature_names(vec!["b".into(), "a".into()]);
        let ds = dataset("a,b\n1,2\n");
        assert!(matches!(
            TreeExplainer::new(&model).check_input(&ds),
            Err(ShapLensError::ShapeError { .. })
        ));
    }
}
