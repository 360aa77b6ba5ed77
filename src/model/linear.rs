//! Linear and logistic models

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::Predictor;
use crate::error::{Result, ShapLensError};

/// Output link function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    #[default]
    Identity,
    Logistic,
}

/// Linear model with one coefficient row per output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    /// Coefficients, `[output][feature]`
    pub coefficients: Vec<Vec<f64>>,
    /// Intercept per output
    pub intercepts: Vec<f64>,
    #[serde(default)]
    pub link: Link,
}

impl LinearModel {
    pub fn new(coefficients: Vec<Vec<f64>>, intercepts: Vec<f64>) -> Self {
        Self {
            coefficients,
            intercepts,
            link: Link::Identity,
        }
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let model: LinearModel = serde_json::from_slice(bytes)
            .map_err(|e| ShapLensError::ModelFormat(format!("not a linear model: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        let n_features = self.n_features();
        if self.coefficients.is_empty() || n_features == 0 {
            return Err(ShapLensError::ModelFormat(
                "linear model has no coefficients".to_string(),
            ));
        }
        if self.coefficients.iter().any(|row| row.len() != n_features) {
            return Err(ShapLensError::ModelFormat(
                "coefficient rows have different lengths".to_string(),
            ));
        }
        if self.intercepts.len() != self.coefficients.len() {
            return Err(ShapLensError::ModelFormat(format!(
                "{} intercepts for {} outputs",
                self.intercepts.len(),
                self.coefficients.len()
            )));
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.first().map(|row| row.len()).unwrap_or(0)
    }

    pub fn n_outputs(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(ShapLensError::ShapeError {
                expected: format!("{} columns", self.n_features()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = Array2::zeros((x.nrows(), self.n_outputs()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (k, (coefs, intercept)) in self.coefficients.iter().zip(&self.intercepts).enumerate() {
                let z: f64 = intercept + coefs.iter().zip(row.iter()).map(|(c, v)| c * v).sum::<f64>();
                out[[i, k]] = match self.link {
                    Link::Identity => z,
                    Link::Logistic => 1.0 / (1.0 + (-z).exp()),
                };
            }
        }
        Ok(out)
    }
}

impl Predictor for LinearModel {
    fn flavor(&self) -> &'static str {
        "linear"
    }

    fn n_features(&self) -> usize {
        LinearModel::n_features(self)
    }

    fn n_outputs(&self) -> usize {
        LinearModel::n_outputs(self)
    }

    fn input_names(&self) -> Option<&[String]> {
        None
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        LinearModel::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identity_prediction() {
        let model = LinearModel::new(vec![vec![1.0, 2.0]], vec![0.5]);
        let preds = model.predict(&array![[1.0, 1.0], [0.0, -1.0]]).unwrap();
        assert_eq!(preds[[0, 0]], 3.5);
        assert_eq!(preds[[1, 0]], -1.5);
    }

    #[test]
    fn test_logistic_link() {
        let model = LinearModel::new(vec![vec![1.0]], vec![0.0]).with_link(Link::Logistic);
        let preds = model.predict(&array![[0.0]]).unwrap();
        assert!((preds[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_validation() {
        assert!(LinearModel::new(vec![], vec![]).validate().is_err());
        assert!(LinearModel::new(vec![vec![1.0], vec![1.0, 2.0]], vec![0.0, 0.0]).validate().is_err());
        assert!(LinearModel::new(vec![vec![1.0]], vec![]).validate().is_err());
    }
}
