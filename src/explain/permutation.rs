//! Model-agnostic permutation explainer
//!
//! Treats the model as a prediction function. For every row, features are
//! switched from background values to the row's values one at a time in a
//! random order, and each switch is credited with the change in the mean
//! prediction over the background. Each random order is also evaluated
//! reversed (antithetic sampling). The first step is the mean background
//! prediction and the last is the row's own prediction, so the values always
//! add up to `prediction - base`.

use ndarray::{Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{AttributionValues, Attributions, ExplainerMethod};
use crate::config::ExplainerConfig;
use crate::data::SampleDataset;
use crate::error::{Result, ShapLensError};
use crate::model::Predictor;

/// How dataset columns are fed to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLayout {
    /// Columns passed as uploaded
    Direct,
    /// Model input `j` reads dataset column `positions[j]`
    Reshaped { positions: Vec<usize> },
}

impl InputLayout {
    fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        match self {
            InputLayout::Direct => x.clone(),
            InputLayout::Reshaped { positions } => x.select(Axis(1), positions),
        }
    }
}

/// Permutation sampling explainer over a black-box model
pub struct PermutationExplainer<'a> {
    model: &'a dyn Predictor,
    config: ExplainerConfig,
}

impl<'a> PermutationExplainer<'a> {
    pub fn new(model: &'a dyn Predictor, config: ExplainerConfig) -> Self {
        Self { model, config }
    }

    /// Rows drawn from the dataset as the background distribution
    pub fn background(&self, dataset: &SampleDataset) -> Array2<f64> {
        let n = dataset.n_rows();
        let size = self.config.background_size.min(n).max(1);
        if size >= n {
            return dataset.matrix().clone();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut rows = rand::seq::index::sample(&mut rng, n, size).into_vec();
        rows.sort_unstable();
        dataset.matrix().select(Axis(0), &rows)
    }

    /// Probe the model with the background, reshaping by name when needed
    ///
    /// Returns the layout that worked and the background predictions.
    pub fn probe(
        &self,
        dataset: &SampleDataset,
        background: &Array2<f64>,
    ) -> Result<(InputLayout, Array2<f64>)> {
        let direct_err = match self.predict_checked(&InputLayout::Direct, background) {
            Ok(preds) => return Ok((InputLayout::Direct, preds)),
            Err(err) => err,
        };
        warn!(error = %direct_err, "Model rejected the uploaded column layout, reshaping");

        let reshaped = self
            .model
            .input_names()
            .ok_or_else(|| {
                ShapLensError::DataError("model has no input signature to reshape to".to_string())
            })
            .and_then(|names| dataset.column_positions(names))
            .map(|positions| InputLayout::Reshaped { positions })
            .and_then(|layout| {
                let preds = self.predict_checked(&layout, background)?;
                Ok((layout, preds))
            });

        reshaped.map_err(|reshaped_err| ShapLensError::ExplainerCreationError {
            reason: format!("model rejected the data in both layouts: {}", reshaped_err),
            attempts: vec![
                ("direct".to_string(), direct_err.to_string()),
                ("reshaped".to_string(), reshaped_err.to_string()),
            ],
        })
    }

    fn predict_checked(&self, layout: &InputLayout, x: &Array2<f64>) -> Result<Array2<f64>> {
        let preds = self.model.predict(&layout.apply(x))?;
        if preds.nrows() != x.nrows() || preds.ncols() != self.model.n_outputs() {
            return Err(ShapLensError::ShapeError {
                expected: format!("{} x {} predictions", x.nrows(), self.model.n_outputs()),
                actual: format!("{} x {}", preds.nrows(), preds.ncols()),
            });
        }
        Ok(preds)
    }

    pub fn explain(&self, dataset: &SampleDataset) -> Result<Attributions> {
        let background = self.background(dataset);
        let (layout, background_preds) = self.probe(dataset, &background)?;
        let base_values: Vec<f64> = background_preds
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; self.model.n_outputs()]);

        info!(
            rows = dataset.n_rows(),
            background = background.nrows(),
            permutations = self.config.n_permutations,
            layout = ?layout,
            "Running permutation explainer"
        );

        let x = dataset.matrix();
        let rows: Vec<(Vec<Vec<f64>>, Vec<f64>)> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                self.explain_row(
                    x.row(i),
                    &background,
                    &layout,
                    self.config.seed.wrapping_add(i as u64),
                )
            })
            .collect::<Result<_>>()?;

        let n_outputs = self.model.n_outputs();
        let mut tables = vec![Array2::zeros((x.nrows(), x.ncols())); n_outputs];
        let mut predictions = Array2::zeros((x.nrows(), n_outputs));
        for (i, (phi, prediction)) in rows.into_iter().enumerate() {
            for (j, per_output) in phi.iter().enumerate() {
                for (k, v) in per_output.iter().enumerate() {
                    tables[k][[i, j]] = *v;
                }
            }
            for (k, v) in prediction.into_iter().enumerate() {
                predictions[[i, k]] = v;
            }
        }

        Ok(Attributions {
            values: AttributionValues::from_outputs(tables),
            base_values,
            predictions,
            data: x.clone(),
            feature_names: dataset.feature_names().to_vec(),
            row_indices: dataset.indices().to_vec(),
            method: ExplainerMethod::Permutation,
        })
    }

    /// SHAP values `[feature][output]` and the prediction of one row
    fn explain_row(
        &self,
        row: ArrayView1<f64>,
        background: &Array2<f64>,
        layout: &InputLayout,
        seed: u64,
    ) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
        let n_features = row.len();
        let n_outputs = self.model.n_outputs();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut phi = vec![vec![0.0; n_outputs]; n_features];
        let mut prediction = vec![0.0; n_outputs];

        let mut order: Vec<usize> = (0..n_features).collect();
        let n_orders = self.config.n_permutations.max(1) * 2;

        for p in 0..n_orders {
            if p % 2 == 0 {
                order.shuffle(&mut rng);
            } else {
                order.reverse();
            }

            let steps = self.step_means(row, background, layout, &order)?;
            for (s, &feature) in order.iter().enumerate() {
                for k in 0..n_outputs {
                    phi[feature][k] += steps[[s + 1, k]] - steps[[s, k]];
                }
            }
            for k in 0..n_outputs {
                prediction[k] = steps[[n_features, k]];
            }
        }

        phi.iter_mut()
            .flatten()
            .for_each(|v| *v /= n_orders as f64);
        Ok((phi, prediction))
    }

    /// Mean prediction after switching in the first `s` features of `order`
    fn step_means(
        &self,
        row: ArrayView1<f64>,
        background: &Array2<f64>,
        layout: &InputLayout,
        order: &[usize],
    ) -> Result<Array2<f64>> {
        let n_bg = background.nrows();
        let n_steps = order.len() + 1;
        let mut batch = Array2::zeros((n_steps * n_bg, row.len()));

        let mut current = background.clone();
        for s in 0..n_steps {
            if s > 0 {
                let feature = order[s - 1];
                current.column_mut(feature).fill(row[feature]);
            }
            batch
                .slice_mut(ndarray::s![s * n_bg..(s + 1) * n_bg, ..])
                .assign(&current);
        }

        let preds = self.predict_checked(layout, &batch)?;
        let mut means = Array2::zeros((n_steps, preds.ncols()));
        for s in 0..n_steps {
            let block = preds.slice(ndarray::s![s * n_bg..(s + 1) * n_bg, ..]);
            if let Some(mean) = block.mean_axis(Axis(0)) {
                means.row_mut(s).assign(&mean);
            }
        }
        debug!(batch_rows = batch.nrows(), "Evaluated permutation batch");
        Ok(means)
    }
}
