//! `runs:/<run_id>/<artifact_path>` model URIs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ShapLensError};

const SCHEME: &str = "runs:/";

/// Location of a model inside a tracked run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUri {
    run_id: String,
    artifact_path: String,
}

impl ModelUri {
    /// Build a URI from a run id and an artifact sub-path
    pub fn new(run_id: &str, artifact_path: &str) -> Result<Self> {
        let run_id = run_id.trim();
        if run_id.is_empty() || run_id.contains('/') {
            return Err(ShapLensError::InvalidModelUri(format!(
                "invalid run id '{}'",
                run_id
            )));
        }

        let artifact_path = artifact_path.trim().trim_matches('/');
        if artifact_path.is_empty() {
            return Err(ShapLensError::InvalidModelUri(
                "artifact path is empty".to_string(),
            ));
        }

        Ok(Self {
            run_id: run_id.to_string(),
            artifact_path: artifact_path.to_string(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn artifact_path(&self) -> &str {
        &self.artifact_path
    }

    /// Path of a file inside the model directory, relative to the run's artifact root
    pub fn artifact(&self, file: &str) -> String {
        format!("{}/{}", self.artifact_path, file.trim_start_matches('/'))
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.run_id, self.artifact_path)
    }
}

impl FromStr for ModelUri {
    type Err = ShapLensError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s.strip_prefix(SCHEME).ok_or_else(|| {
            ShapLensError::InvalidModelUri(format!("'{}' does not start with {}", s, SCHEME))
        })?;
        let (run_id, path) = rest.split_once('/').ok_or_else(|| {
            ShapLensError::InvalidModelUri(format!("'{}' has no artifact path", s))
        })?;
        Self::new(run_id, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let uri = ModelUri::new("abc123", "model").unwrap();
        assert_eq!(uri.to_string(), "runs:/abc123/model");
        assert_eq!("runs:/abc123/model".parse::<ModelUri>().unwrap(), uri);
    }

    #[test]
    fn test_artifact_path_slashes_trimmed() {
        let uri = ModelUri::new("abc", "/nested/model/").unwrap();
        assert_eq!(uri.artifact_path(), "nested/model");
        assert_eq!(uri.artifact("model.json"), "nested/model/model.json");
    }

    #[test]
    fn test_invalid_uris() {
        assert!(ModelUri::new("", "model").is_err());
        assert!(ModelUri::new("abc", "/").is_err());
        assert!("models:/abc/model".parse::<ModelUri>().is_err());
        assert!("runs:/abc".parse::<ModelUri>().is_err());
    }
}
