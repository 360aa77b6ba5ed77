//! Dashboard form intake

use axum::extract::Multipart;
use std::str::FromStr;
use tracing::{debug, info};

use super::error::{Result, ServerError};
use crate::config::SessionConfig;
use crate::session::Upload;

/// Session inputs submitted from the dashboard form
#[derive(Debug, Clone, Default)]
pub struct SessionForm {
    pub config: SessionConfig,
    pub upload: Option<Upload>,
}

impl SessionForm {
    /// Read every field of a multipart submission; absent fields keep their defaults
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut form = SessionForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServerError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.to_string()))?;
                // Browsers send an empty part when no file is chosen
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                info!(file_name = %file_name, bytes = bytes.len(), "Received upload");
                let file_name = if file_name.is_empty() {
                    "upload.csv".to_string()
                } else {
                    file_name
                };
                form.upload = Some(Upload::new(file_name, bytes.to_vec()));
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ServerError::BadRequest(e.to_string()))?;
            form.apply(&name, value.trim())?;
        }

        Ok(form)
    }

    /// Apply one text field
    pub fn apply(&mut self, name: &str, value: &str) -> Result<()> {
        let config = &mut self.config;
        match name {
            "tracking_uri" => config.tracking_uri = value.to_string(),
            "experiment_name" => config.experiment_name = value.to_string(),
            "artifact_path" => config.artifact_path = value.to_string(),
            "run_id" => config.run_id = (!value.is_empty()).then(|| value.to_string()),
            "max_rows" => config.max_rows = parse_number(name, value)?,
            "summary_bar" => config.summary_bar = parse_flag(value),
            "sample_index" => config.sample_index = parse_number(name, value)?,
            "static_force" => config.explainer.interactive = !parse_flag(value),
            "background_size" => {
                config.explainer = config
                    .explainer
                    .clone()
                    .with_background_size(parse_number(name, value)?)
            }
            "n_permutations" => {
                config.explainer = config
                    .explainer
                    .clone()
                    .with_n_permutations(parse_number(name, value)?)
            }
            "max_display" => {
                config.explainer = config
                    .explainer
                    .clone()
                    .with_max_display(parse_number(name, value)?)
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        ServerError::BadRequest(format!("'{}' must be a non-negative integer, got '{}'", name, value))
    })
}

/// Checkbox values
fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "on" | "true" | "1" | "yes")
}
