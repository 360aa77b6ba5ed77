//! MLflow tracking server client (REST API 2.0)

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{Experiment, RunInfo, TrackingStore};
use crate::error::{Result, ShapLensError};

const SEARCH_PAGE_SIZE: usize = 1000;

#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

#[derive(Deserialize)]
struct RunEnvelope {
    info: RunInfo,
}

#[derive(Deserialize)]
struct SearchRunsResponse {
    #[serde(default)]
    runs: Vec<RunEnvelope>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

/// Blocking client for an MLflow tracking server
pub struct MlflowRestStore {
    base_url: String,
    client: Client,
}

impl MlflowRestStore {
    /// Create a client for `base_url` (e.g. `http://localhost:5000`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShapLensError::Tracking(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn api_error(status: StatusCode, body: &str) -> ShapLensError {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(err) if !err.error_code.is_empty() => ShapLensError::Tracking(format!(
                "{} ({}): {}",
                err.error_code, status, err.message
            )),
            _ => ShapLensError::Tracking(format!("HTTP {}: {}", status, body.trim())),
        }
    }
}

impl TrackingStore for MlflowRestStore {
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        let response = self
            .client
            .get(self.endpoint("/api/2.0/mlflow/experiments/get-by-name"))
            .query(&[("experiment_name", name)])
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if status.is_success() {
            let parsed: GetExperimentResponse = serde_json::from_str(&body)?;
            return Ok(Some(parsed.experiment));
        }

        if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
            if err.error_code == "RESOURCE_DOES_NOT_EXIST" {
                debug!(experiment = %name, "Experiment does not exist on server");
                return Ok(None);
            }
        }

        Err(Self::api_error(status, &body))
    }

    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>> {
        let mut runs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = serde_json::json!({
                "experiment_ids": [experiment_id],
                "max_results": SEARCH_PAGE_SIZE,
                "order_by": ["attributes.start_time DESC"],
            });
            if let Some(token) = &page_token {
                request["page_token"] = serde_json::json!(token);
            }

            let response = self
                .client
                .post(self.endpoint("/api/2.0/mlflow/runs/search"))
                .json(&request)
                .send()?;

            let status = response.status();
            let body = response.text()?;
            if !status.is_success() {
                return Err(Self::api_error(status, &body));
            }

            let page: SearchRunsResponse = serde_json::from_str(&body)?;
            runs.extend(page.runs.into_iter().map(|r| r.info));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(experiment_id = %experiment_id, runs = runs.len(), "Fetched runs from tracking server");
        Ok(runs)
    }

    fn download_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.endpoint("/get-artifact"))
            .query(&[("path", path), ("run_uuid", run_id)])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Self::api_error(status, &body));
        }

        let bytes = response.bytes()?;
        debug!(run_id = %run_id, path = %path, bytes = bytes.len(), "Downloaded artifact");
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        format!("mlflow server at {}", self.base_url)
    }
}
