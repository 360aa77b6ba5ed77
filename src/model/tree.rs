//! Tree ensemble models
//!
//! Covers single decision trees, random forests (`mean` aggregation) and
//! gradient boosted trees (`sum` aggregation). Leaves carry one value per
//! model output, so multi-class forests and per-class boosted trees share
//! one representation. The prediction is always the raw model output:
//! `base_score + aggregate(leaf values)`.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Predictor;
use crate::data::CategoryLevels;
use crate::error::{Result, ShapLensError};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Leaf node with one value per output
    Leaf {
        values: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left, NaN goes right
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    /// Training samples that reached this node (the node cover)
    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }

    /// Leaf reached by a row
    pub fn leaf_values(&self, x: ArrayView1<f64>) -> &[f64] {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { values, .. } => return values,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if x[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Cover-weighted mean leaf value, per output
    pub fn expected_values(&self) -> Vec<f64> {
        match self {
            TreeNode::Leaf { values, .. } => values.clone(),
            TreeNode::Split {
                left,
                right,
                n_samples,
                ..
            } => {
                let cover = *n_samples as f64;
                let wl = left.n_samples() as f64 / cover;
                let wr = right.n_samples() as f64 / cover;
                left.expected_values()
                    .into_iter()
                    .zip(right.expected_values())
                    .map(|(l, r)| wl * l + wr * r)
                    .collect()
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn validate(&self, n_features: usize, n_outputs: usize) -> Result<()> {
        if self.n_samples() == 0 {
            return Err(ShapLensError::ModelFormat(
                "tree node has zero samples".to_string(),
            ));
        }
        match self {
            TreeNode::Leaf { values, .. } => {
                if values.len() != n_outputs {
                    return Err(ShapLensError::ModelFormat(format!(
                        "leaf has {} values, model has {} outputs",
                        values.len(),
                        n_outputs
                    )));
                }
                Ok(())
            }
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if *feature_idx >= n_features {
                    return Err(ShapLensError::ModelFormat(format!(
                        "split on feature {} but model has {} features",
                        feature_idx, n_features
                    )));
                }
                if threshold.is_nan() {
                    return Err(ShapLensError::ModelFormat(
                        "split threshold is NaN".to_string(),
                    ));
                }
                left.validate(n_features, n_outputs)?;
                right.validate(n_features, n_outputs)
            }
        }
    }
}

/// How per-tree outputs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Boosting: outputs are summed
    #[default]
    Sum,
    /// Bagging: outputs are averaged
    Mean,
}

fn default_outputs() -> usize {
    1
}

/// Ensemble of decision trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub trees: Vec<TreeNode>,
    pub n_features: usize,
    #[serde(default = "default_outputs")]
    pub n_outputs: usize,
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Constant added to every output; empty means zero
    #[serde(default)]
    pub base_score: Vec<f64>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub classes: Option<Vec<String>>,
    /// Level order of string-encoded inputs, keyed by column name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: CategoryLevels,
}

impl TreeEnsemble {
    pub fn new(trees: Vec<TreeNode>, n_features: usize, n_outputs: usize) -> Self {
        Self {
            trees,
            n_features,
            n_outputs,
            aggregation: Aggregation::Sum,
            base_score: Vec::new(),
            feature_names: None,
            classes: None,
            categories: CategoryLevels::new(),
        }
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_base_score(mut self, base_score: Vec<f64>) -> Self {
        self.base_score = base_score;
        self
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = Some(classes);
        self
    }

    pub fn with_categories(mut self, categories: CategoryLevels) -> Self {
        self.categories = categories;
        self
    }

    /// Parse and validate a serialized ensemble
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let ensemble: TreeEnsemble = serde_json::from_slice(bytes)
            .map_err(|e| ShapLensError::ModelFormat(format!("not a tree ensemble: {}", e)))?;
        ensemble.validate()?;
        Ok(ensemble)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ShapLensError::ModelFormat("ensemble has no trees".to_string()));
        }
        if self.n_features == 0 || self.n_outputs == 0 {
            return Err(ShapLensError::ModelFormat(
                "ensemble must have at least one feature and one output".to_string(),
            ));
        }
        if !self.base_score.is_empty() && self.base_score.len() != self.n_outputs {
            return Err(ShapLensError::ModelFormat(format!(
                "base_score has {} values, model has {} outputs",
                self.base_score.len(),
                self.n_outputs
            )));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.n_features {
                return Err(ShapLensError::ModelFormat(format!(
                    "{} feature names for {} features",
                    names.len(),
                    self.n_features
                )));
            }
        }
        for tree in &self.trees {
            tree.validate(self.n_features, self.n_outputs)?;
        }
        Ok(())
    }

    fn base(&self, output: usize) -> f64 {
        self.base_score.get(output).copied().unwrap_or(0.0)
    }

    /// Divisor applied to summed tree outputs
    pub fn scale(&self) -> f64 {
        match self.aggregation {
            Aggregation::Sum => 1.0,
            Aggregation::Mean => self.trees.len() as f64,
        }
    }

    /// Raw output for one row
    pub fn predict_row(&self, x: ArrayView1<f64>) -> Vec<f64> {
        let mut out = vec![0.0; self.n_outputs];
        for tree in &self.trees {
            for (o, v) in out.iter_mut().zip(tree.leaf_values(x)) {
                *o += v;
            }
        }
        let scale = self.scale();
        out.iter_mut()
            .enumerate()
            .for_each(|(k, o)| *o = *o / scale + self.base(k));
        out
    }

    /// Model output averaged over the training distribution, per output
    pub fn expected_value(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.n_outputs];
        for tree in &self.trees {
            for (o, v) in out.iter_mut().zip(tree.expected_values()) {
                *o += v;
            }
        }
        let scale = self.scale();
        out.iter_mut()
            .enumerate()
            .for_each(|(k, o)| *o = *o / scale + self.base(k));
        out
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(|t| t.depth()).max().unwrap_or(0)
    }
}

impl Predictor for TreeEnsemble {
    fn flavor(&self) -> &'static str {
        "tree_ensemble"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    fn input_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn class_labels(&self) -> Option<&[String]> {
        self.classes.as_deref()
    }

    fn category_levels(&self) -> Option<&CategoryLevels> {
        (!self.categories.is_empty()).then_some(&self.categories)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(ShapLensError::ShapeError {
                expected: format!("{} columns", self.n_features),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let mut out = Array2::zeros((x.nrows(), self.n_outputs));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (k, v) in self.predict_row(row).into_iter().enumerate() {
                out[[i, k]] = v;
            }
        }
        Ok(out)
    }

    fn as_tree_ensemble(&self) -> Option<&TreeEnsemble> {
        Some(self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    pub(crate) fn leaf(value: f64, n: usize) -> TreeNode {
        TreeNode::Leaf {
            values: vec![value],
            n_samples: n,
        }
    }

    pub(crate) fn split(f: usize, t: f64, left: TreeNode, right: TreeNode) -> TreeNode {
        let n = left.n_samples() + right.n_samples();
        TreeNode::Split {
            feature_idx: f,
            threshold: t,
            left: Box::new(left),
            right: Box::new(right),
            n_samples: n,
        }
    }

    /// Two-feature regression ensemble with a repeated feature on one path
    pub(crate) fn sample_ensemble() -> TreeEnsemble {
        let t1 = split(
            0,
            0.5,
            split(1, 1.0, leaf(1.0, 30), leaf(3.0, 10)),
            split(0, 2.0, leaf(5.0, 40), leaf(-2.0, 20)),
        );
        let t2 = split(1, 0.0, leaf(-1.0, 50), leaf(2.0, 50));
        TreeEnsemble::new(vec![t1, t2], 2, 1).with_base_score(vec![0.5])
    }

    #[test]
    fn test_predict_sums_trees() {
        let model = sample_ensemble();
        let x = array![[0.0, 0.5], [1.0, 3.0], [3.0, -1.0]];
        let preds = model.predict(&x).unwrap();
        assert_eq!(preds[[0, 0]], 0.5 + 1.0 + 2.0);
        assert_eq!(preds[[1, 0]], 0.5 + 5.0 + 2.0);
        assert_eq!(preds[[2, 0]], 0.5 - 2.0 - 1.0);
    }

    #[test]
    fn test_mean_aggregation() {
        let model = sample_ensemble().with_aggregation(Aggregation::Mean);
        let x = array![[0.0, 0.5]];
        let preds = model.predict(&x).unwrap();
        assert!((preds[[0, 0]] - (0.5 + 3.0 / 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_nan_goes_right() {
        let tree = split(0, 0.5, leaf(1.0, 1), leaf(2.0, 1));
        let x = array![f64::NAN];
        assert_eq!(tree.leaf_values(x.view()), &[2.0]);
    }

    #[test]
    fn test_expected_value_is_cover_weighted() {
        let model = sample_ensemble();
        // t1: (30*1 + 10*3 + 40*5 + 20*-2) / 100 = 2.2 ; t2: 0.5
        let expected = model.expected_value();
        assert!((expected[0] - (0.5 + 2.2 + 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let model = sample_ensemble();
        let x = array![[1.0, 2.0, 3.0]];
        assert!(matches!(model.predict(&x), Err(ShapLensError::ShapeError { .. })));
    }

    #[test]
    fn test_validation() {
        let bad_feature = TreeEnsemble::new(vec![split(5, 0.0, leaf(1.0, 1), leaf(2.0, 1))], 2, 1);
        assert!(bad_feature.validate().is_err());

        let bad_leaf = TreeEnsemble::new(vec![leaf(1.0, 1)], 2, 3);
        assert!(bad_leaf.validate().is_err());

        let empty = TreeEnsemble::new(vec![], 2, 1);
        assert!(empty.validate().is_err());

        assert!(sample_ensemble().validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_keeps_predictions() {
        let model = sample_ensemble().with_feature_names(vec!["a".into(), "b".into()]);
        let json = serde_json::to_vec(&model).unwrap();
        let loaded = TreeEnsemble::from_json(&json).unwrap();
        let x = array![[0.2, 2.0]];
        assert_eq!(model.predict(&x).unwrap(), loaded.predict(&x).unwrap());
        assert!(String::from_utf8(json).unwrap().contains("\"type\":\"split\""));
    }

    #[test]
    fn test_from_json_rejects_non_tree() {
        assert!(matches!(
            TreeEnsemble::from_json(br#"{"coefficients": [[1.0]]}"#),
            Err(ShapLensError::ModelFormat(_))
        ));
    }
}
