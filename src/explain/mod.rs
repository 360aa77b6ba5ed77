//! Feature attribution (SHAP values)
//!
//! Two explainers are available:
//! - [`TreeExplainer`]: exact path-dependent TreeSHAP for tree ensembles
//! - [`PermutationExplainer`]: model-agnostic permutation sampling
//!
//! [`ExplainerSelector`] tries them in that order.

mod explanation;
mod permutation;
mod selector;
mod tree_shap;

pub use explanation::{FeatureContribution, LocalExplanation, ShapSummary};
pub use permutation::{InputLayout, PermutationExplainer};
pub use selector::ExplainerSelector;
pub use tree_shap::TreeExplainer;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ShapLensError};

/// Output class shown in both the aggregate and the single-instance view
pub const DISPLAY_CLASS: usize = 0;

/// Which explainer produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainerMethod {
    Tree,
    Permutation,
}

impl fmt::Display for ExplainerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplainerMethod::Tree => write!(f, "tree"),
            ExplainerMethod::Permutation => write!(f, "permutation"),
        }
    }
}

/// SHAP values, one table for single-output models or one per class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributionValues {
    /// `rows x features`
    Single(Array2<f64>),
    /// `classes x rows x features`
    PerClass(Vec<Array2<f64>>),
}

impl AttributionValues {
    /// Wrap per-output tables, collapsing a single output
    pub fn from_outputs(mut tables: Vec<Array2<f64>>) -> Self {
        if tables.len() == 1 {
            if let Some(table) = tables.pop() {
                return AttributionValues::Single(table);
            }
        }
        AttributionValues::PerClass(tables)
    }

    pub fn n_classes(&self) -> usize {
        match self {
            AttributionValues::Single(_) => 1,
            AttributionValues::PerClass(tables) => tables.len(),
        }
    }

    pub fn table(&self, class: usize) -> Option<&Array2<f64>> {
        match self {
            AttributionValues::Single(table) => (class == 0).then_some(table),
            AttributionValues::PerClass(tables) => tables.get(class),
        }
    }
}

/// Result of explaining a sample dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attributions {
    pub values: AttributionValues,
    /// Expected model output per class
    pub base_values: Vec<f64>,
    /// Model output, `rows x classes`
    pub predictions: Array2<f64>,
    /// Explained feature values, `rows x features`
    pub data: Array2<f64>,
    pub feature_names: Vec<String>,
    /// Original upload index of every row
    pub row_indices: Vec<usize>,
    pub method: ExplainerMethod,
}

impl Attributions {
    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.values.n_classes()
    }

    fn check_class(&self, class: usize) -> Result<&Array2<f64>> {
        self.values.table(class).ok_or_else(|| ShapLensError::ShapeError {
            expected: format!("class index below {}", self.n_classes()),
            actual: class.to_string(),
        })
    }

    /// `rows x features` table of one class
    pub fn class_table(&self, class: usize) -> Result<ArrayView2<'_, f64>> {
        Ok(self.check_class(class)?.view())
    }

    pub fn base_value(&self, class: usize) -> Result<f64> {
        self.check_class(class)?;
        Ok(self.base_values[class])
    }

    /// Explanation of one explained row
    pub fn row(&self, index: usize, class: usize) -> Result<LocalExplanation> {
        if index >= self.n_rows() {
            return Err(ShapLensError::InvalidSampleIndex {
                index,
                rows: self.n_rows(),
            });
        }
        let table = self.check_class(class)?;

        let contributions = table
            .row(index)
            .iter()
            .zip(self.data.row(index).iter())
            .enumerate()
            .map(|(j, (&phi, &value))| FeatureContribution {
                feature_index: j,
                feature_name: self.feature_names[j].clone(),
                feature_value: value,
                contribution: phi,
            })
            .collect();

        Ok(LocalExplanation {
            instance_index: index,
            original_index: self.row_indices.get(index).copied().unwrap_or(index),
            class_index: class,
            base_value: self.base_values[class],
            prediction: self.predictions[[index, class]],
            contributions,
        })
    }

    pub fn summary(&self, class: usize) -> Result<ShapSummary> {
        Ok(ShapSummary::from_table(
            self.class_table(class)?,
            &self.feature_names,
        ))
    }

    /// Largest `|base + sum(phi) - prediction|` over all rows and classes
    pub fn max_additivity_gap(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for class in 0..self.n_classes() {
            if let Some(table) = self.values.table(class) {
                for (i, row) in table.rows().into_iter().enumerate() {
                    let gap = self.base_values[class] + row.sum() - self.predictions[[i, class]];
                    worst = worst.max(gap.abs());
                }
            }
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn attributions() -> Attributions {
        Attributions {
            values: AttributionValues::from_outputs(vec![
                array![[1.0, -0.5], [0.0, 2.0]],
                array![[-1.0, 0.5], [0.0, -2.0]],
            ]),
            base_values: vec![0.5, -0.5],
            predictions: array![[1.0, -1.0], [2.5, -2.5]],
            data: array![[10.0, 20.0], [30.0, 40.0]],
            feature_names: vec!["a".into(), "b".into()],
            row_indices: vec![7, 42],
            method: ExplainerMethod::Tree,
        }
    }

    #[test]
    fn test_single_output_collapses() {
        let values = AttributionValues::from_outputs(vec![array![[1.0]]]);
        assert!(matches!(values, AttributionValues::Single(_)));
        assert_eq!(values.n_classes(), 1);
        assert!(values.table(1).is_none());
    }

    #[test]
    fn test_row_extraction() {
        let attr = attributions();
        let local = attr.row(1, DISPLAY_CLASS).unwrap();
        assert_eq!(local.original_index, 42);
        assert_eq!(local.base_value, 0.5);
        assert_eq!(local.prediction, 2.5);
        assert_eq!(local.contributions[1].feature_value, 40.0);
        assert_eq!(local.contributions[1].contribution, 2.0);
        assert!(attr.max_additivity_gap() < 1e-12);
    }

    #[test]
    fn test_out_of_range_row_rejected() {
        let attr = attributions();
        assert!(matches!(
            attr.row(2, DISPLAY_CLASS),
            Err(ShapLensError::InvalidSampleIndex { index: 2, rows: 2 })
        ));
        assert!(attr.class_table(5).is_err());
    }
}
