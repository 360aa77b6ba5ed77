//! Experiment tracking store clients
//!
//! Resolves experiment names to runs and downloads run artifacts. Two
//! backends are provided:
//! - [`MlflowRestStore`] talks to an MLflow tracking server over REST
//! - [`LocalStore`] reads (and writes) a directory-based store

mod local;
mod rest;

pub use local::LocalStore;
pub use rest::MlflowRestStore;

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ShapLensError};

/// Default timeout for tracking server requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// An experiment in the tracking store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_location: String,
    #[serde(default)]
    pub lifecycle_stage: String,
}

/// Reference to one recorded training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub run_name: String,
    #[serde(default)]
    pub status: String,
    /// Start time in milliseconds since the epoch
    #[serde(default, deserialize_with = "lenient_i64")]
    pub start_time: i64,
    #[serde(default)]
    pub artifact_uri: String,
}

impl RunInfo {
    /// Label for run selectors: name when present, otherwise the id
    pub fn label(&self) -> String {
        if self.run_name.is_empty() {
            self.run_id.clone()
        } else {
            format!("{} ({})", self.run_name, self.run_id)
        }
    }
}

/// MLflow encodes int64 fields either as JSON numbers or as strings
fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("start_time is not an integer")),
        serde_json::Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        serde_json::Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "unexpected start_time: {}",
            other
        ))),
    }
}

/// Read access to a tracking store
///
/// Calls are blocking; the server runs sessions on a blocking thread.
pub trait TrackingStore: Send {
    /// Look up an experiment by name; `Ok(None)` when it does not exist
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>>;

    /// Runs of an experiment, most recent first
    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>>;

    /// Raw bytes of an artifact file relative to the run's artifact root
    fn download_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Open a store for a tracking URI
///
/// `http://` and `https://` select the REST client; `file://` URIs and plain
/// paths select the local store.
pub fn connect(uri: &str) -> Result<Box<dyn TrackingStore>> {
    let uri = uri.trim();
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let store = MlflowRestStore::new(uri, Duration::from_secs(DEFAULT_TIMEOUT_SECS))?;
        return Ok(Box::new(store));
    }

    let path = if uri.starts_with("file://") {
        let parsed = url::Url::parse(uri)
            .map_err(|e| ShapLensError::Tracking(format!("Invalid tracking URI '{}': {}", uri, e)))?;
        parsed
            .to_file_path()
            .map_err(|_| ShapLensError::Tracking(format!("Invalid file URI '{}'", uri)))?
    } else if uri.contains("://") {
        return Err(ShapLensError::Tracking(format!(
            "Unsupported tracking URI scheme: '{}'",
            uri
        )));
    } else {
        PathBuf::from(uri)
    };

    Ok(Box::new(LocalStore::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_info_accepts_string_and_number_times() {
        let from_string: RunInfo = serde_json::from_str(
            r#"{"run_id":"a","experiment_id":"1","start_time":"1700000000000"}"#,
        )
        .unwrap();
        let from_number: RunInfo = serde_json::from_str(
            r#"{"run_id":"a","experiment_id":"1","start_time":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(from_string.start_time, 1_700_000_000_000);
        assert_eq!(from_string, from_number);
    }

    #[test]
    fn test_run_label() {
        let mut run: RunInfo =
            serde_json::from_str(r#"{"run_id":"abc","experiment_id":"1"}"#).unwrap();
        assert_eq!(run.label(), "abc");
        run.run_name = "baseline".to_string();
        assert_eq!(run.label(), "baseline (abc)");
    }

    #[test]
    fn test_connect_rejects_unknown_scheme() {
        assert!(matches!(
            connect("s3://bucket/mlruns"),
            Err(ShapLensError::Tracking(_))
        ));
    }

    #[test]
    fn test_connect_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(connect(missing.to_str().unwrap()).is_err());
    }
}
