//! Session and explainer configuration
//!
//! Mirrors the dashboard's sidebar controls. Every field has a default so a
//! bare form submit still yields a runnable session.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShapLensError};

/// Default tracking server when `MLFLOW_TRACKING_URI` is unset
pub const DEFAULT_TRACKING_URI: &str = "http://localhost:5000";
/// Default artifact sub-path holding the model
pub const DEFAULT_ARTIFACT_PATH: &str = "model";
/// Lower bound of the row sampling cap
pub const MIN_ROWS: usize = 50;
/// Upper bound of the row sampling cap
pub const MAX_ROWS: usize = 10_000;
/// Default row sampling cap
pub const DEFAULT_MAX_ROWS: usize = 1000;
/// Seed used for down-sampling and background selection
pub const DEFAULT_SEED: u64 = 42;

/// Explainer and renderer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainerConfig {
    /// Rows drawn from the sample to act as the background distribution
    pub background_size: usize,
    /// Random feature orderings per row (each is also evaluated reversed)
    pub n_permutations: usize,
    /// Maximum features shown in the aggregate view
    pub max_display: usize,
    /// Render the single-instance view as interactive markup when possible
    pub interactive: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            background_size: 50,
            n_permutations: 4,
            max_display: 20,
            interactive: true,
            seed: DEFAULT_SEED,
        }
    }
}

impl ExplainerConfig {
    pub fn with_background_size(mut self, n: usize) -> Self {
        self.background_size = n.max(1);
        self
    }

    pub fn with_n_permutations(mut self, n: usize) -> Self {
        self.n_permutations = n.max(1);
        self
    }

    pub fn with_max_display(mut self, n: usize) -> Self {
        self.max_display = n.max(1);
        self
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Inputs of one explainability session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Tracking store location (`http(s)://` server or local directory)
    pub tracking_uri: String,
    /// Experiment to list runs from
    pub experiment_name: String,
    /// Artifact sub-path of the model inside the run
    pub artifact_path: String,
    /// Selected run; the most recent run is used when unset or unknown
    pub run_id: Option<String>,
    /// Row cap for explanation
    pub max_rows: usize,
    /// Use the bar style for the aggregate view
    pub summary_bar: bool,
    /// Row shown in the single-instance view
    pub sample_index: usize,
    /// Explainer tuning
    pub explainer: ExplainerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tracking_uri: std::env::var("MLFLOW_TRACKING_URI")
                .unwrap_or_else(|_| DEFAULT_TRACKING_URI.to_string()),
            experiment_name: String::new(),
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
            run_id: None,
            max_rows: DEFAULT_MAX_ROWS,
            summary_bar: false,
            sample_index: 0,
            explainer: ExplainerConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(tracking_uri: impl Into<String>, experiment_name: impl Into<String>) -> Self {
        Self {
            tracking_uri: tracking_uri.into(),
            experiment_name: experiment_name.into(),
            ..Default::default()
        }
    }

    pub fn with_artifact_path(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = path.into();
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_summary_bar(mut self, bar: bool) -> Self {
        self.summary_bar = bar;
        self
    }

    pub fn with_sample_index(mut self, index: usize) -> Self {
        self.sample_index = index;
        self
    }

    pub fn with_explainer(mut self, explainer: ExplainerConfig) -> Self {
        self.explainer = explainer;
        self
    }

    /// Check field constraints before anything touches the tracking store
    pub fn validate(&self) -> Result<()> {
        if self.tracking_uri.trim().is_empty() {
            return Err(ShapLensError::ConfigError(
                "Tracking URI must not be empty".to_string(),
            ));
        }
        if self.artifact_path.trim_matches('/').trim().is_empty() {
            return Err(ShapLensError::ConfigError(
                "Model artifact path must not be empty".to_string(),
            ));
        }
        if !(MIN_ROWS..=MAX_ROWS).contains(&self.max_rows) {
            return Err(ShapLensError::ConfigError(format!(
                "Max rows to explain must be between {} and {}, got {}",
                MIN_ROWS, MAX_ROWS, self.max_rows
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_dashboard_controls() {
        let config = SessionConfig::new("http://localhost:5000", "exp");
        assert_eq!(config.artifact_path, "model");
        assert_eq!(config.max_rows, 1000);
        assert!(!config.summary_bar);
        assert_eq!(config.sample_index, 0);
        assert!(config.run_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_rows_bounds() {
        let base = SessionConfig::new("http://localhost:5000", "exp");
        assert!(base.clone().with_max_rows(49).validate().is_err());
        assert!(base.clone().with_max_rows(50).validate().is_ok());
        assert!(base.clone().with_max_rows(10_000).validate().is_ok());
        assert!(base.with_max_rows(10_001).validate().is_err());
    }

    #[test]
    fn test_empty_artifact_path_rejected() {
        let config = SessionConfig::new("http://localhost:5000", "exp").with_artifact_path("//");
        assert!(matches!(config.validate(), Err(ShapLensError::ConfigError(_))));
    }

    #[test]
    fn test_explainer_builders_clamp() {
        let config = ExplainerConfig::default()
            .with_background_size(0)
            .with_n_permutations(0)
            .with_max_display(0);
        assert_eq!(config.background_size, 1);
        assert_eq!(config.n_permutations, 1);
        assert_eq!(config.max_display, 1);
    }
}
