//! Local explanations and attribution summaries

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Feature contribution to one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature_index: usize,
    pub feature_name: String,
    /// Feature value for this instance
    pub feature_value: f64,
    /// SHAP value
    pub contribution: f64,
}

/// Explanation of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalExplanation {
    /// Row in the explained sample
    pub instance_index: usize,
    /// Row in the original upload
    pub original_index: usize,
    /// Output class the values refer to
    pub class_index: usize,
    /// Expected model output
    pub base_value: f64,
    /// Model output for this row
    pub prediction: f64,
    pub contributions: Vec<FeatureContribution>,
}

impl LocalExplanation {
    pub fn sum_contributions(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }

    /// Contributions by absolute value, descending
    pub fn sorted_contributions(&self) -> Vec<&FeatureContribution> {
        let mut sorted: Vec<&FeatureContribution> = self.contributions.iter().collect();
        sorted.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }

    pub fn top_k_contributors(&self, k: usize) -> Vec<&FeatureContribution> {
        self.sorted_contributions().into_iter().take(k).collect()
    }

    /// Contributions pushing the output up, largest first
    pub fn positive_contributors(&self) -> Vec<&FeatureContribution> {
        self.sorted_contributions()
            .into_iter()
            .filter(|c| c.contribution > 0.0)
            .collect()
    }

    /// Contributions pushing the output down, largest magnitude first
    pub fn negative_contributors(&self) -> Vec<&FeatureContribution> {
        self.sorted_contributions()
            .into_iter()
            .filter(|c| c.contribution < 0.0)
            .collect()
    }

    /// True when every value can be drawn
    pub fn is_finite(&self) -> bool {
        self.base_value.is_finite()
            && self.prediction.is_finite()
            && self.contributions.iter().all(|c| c.contribution.is_finite())
    }
}

/// Per-feature statistics of an attribution table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapSummary {
    pub feature_names: Vec<String>,
    /// Mean absolute SHAP value per feature
    pub mean_abs_shap: Vec<f64>,
    pub mean_shap: Vec<f64>,
    pub std_shap: Vec<f64>,
    pub min_shap: Vec<f64>,
    pub max_shap: Vec<f64>,
}

impl ShapSummary {
    /// Summarize a `rows x features` table
    pub fn from_table(table: ArrayView2<f64>, feature_names: &[String]) -> Self {
        let n = table.nrows().max(1) as f64;
        let mut summary = Self {
            feature_names: feature_names.to_vec(),
            mean_abs_shap: Vec::with_capacity(table.ncols()),
            mean_shap: Vec::with_capacity(table.ncols()),
            std_shap: Vec::with_capacity(table.ncols()),
            min_shap: Vec::with_capacity(table.ncols()),
            max_shap: Vec::with_capacity(table.ncols()),
        };

        for column in table.columns() {
            let mean = column.sum() / n;
            let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            summary.mean_abs_shap.push(column.iter().map(|v| v.abs()).sum::<f64>() / n);
            summary.mean_shap.push(mean);
            summary.std_shap.push(var.sqrt());
            summary
                .min_shap
                .push(column.iter().copied().fold(f64::INFINITY, f64::min));
            summary
                .max_shap
                .push(column.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        }
        summary
    }

    /// Feature indices by mean absolute SHAP, descending
    pub fn feature_ranking(&self) -> Vec<(usize, f64)> {
        let mut indexed: Vec<(usize, f64)> =
            self.mean_abs_shap.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed
    }
}
