//! Error types for shaplens

use thiserror::Error;

/// Result type alias for shaplens operations
pub type Result<T> = std::result::Result<T, ShapLensError>;

/// One failed strategy in an ordered fallback: `(strategy name, reason)`
pub type Attempt = (String, String);

fn format_attempts(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(|(name, reason)| format!("[{}] {}", name, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type
#[derive(Error, Debug)]
pub enum ShapLensError {
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Could not load model from {uri}. Check artifact path/flavor. Errors: {}", format_attempts(.attempts))]
    ModelLoadError { uri: String, attempts: Vec<Attempt> },

    #[error("Failed to create SHAP explainer: {reason} (attempts: {})", format_attempts(.attempts))]
    ExplainerCreationError { reason: String, attempts: Vec<Attempt> },

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Tracking store error: {0}")]
    Tracking(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Sample index {index} is out of range for {rows} explained rows")]
    InvalidSampleIndex { index: usize, rows: usize },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid model URI: {0}")]
    InvalidModelUri(String),

    #[error("Model format error: {0}")]
    ModelFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<polars::error::PolarsError> for ShapLensError {
    fn from(err: polars::error::PolarsError) -> Self {
        ShapLensError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ShapLensError {
    fn from(err: serde_json::Error) -> Self {
        ShapLensError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ShapLensError {
    fn from(err: ndarray::ShapeError) -> Self {
        ShapLensError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ShapLensError {
    fn from(err: reqwest::Error) -> Self {
        ShapLensError::Tracking(err.to_string())
    }
}

impl From<resvg::usvg::Error> for ShapLensError {
    fn from(err: resvg::usvg::Error) -> Self {
        ShapLensError::RenderError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShapLensError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ShapLensError = io_err.into();
        assert!(matches!(err, ShapLensError::IoError(_)));
    }

    #[test]
    fn test_model_load_error_lists_every_attempt() {
        let err = ShapLensError::ModelLoadError {
            uri: "runs:/abc/model".to_string(),
            attempts: vec![
                ("tree".to_string(), "model.json missing".to_string()),
                ("generic".to_string(), "MLmodel.json missing".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("runs:/abc/model"));
        assert!(msg.contains("[tree] model.json missing"));
        assert!(msg.contains("[generic] MLmodel.json missing"));
    }
}
