//! The explainability session
//!
//! One linear pass per interaction: validate configuration, discover runs,
//! resolve the model, take in data, explain, render. Any failing step records
//! a message and halts the pass; nothing is kept between sessions.

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::SessionConfig;
use crate::data::SampleDataset;
use crate::error::ShapLensError;
use crate::explain::{Attributions, ExplainerMethod, ExplainerSelector, DISPLAY_CLASS};
use crate::model::{ModelResolver, ModelUri};
use crate::render::{Artifact, Renderer};
use crate::tracking::{self, RunInfo};

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

/// One line of user-facing feedback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub level: Level,
    pub text: String,
}

/// Why a session stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    InvalidConfig,
    AwaitingExperiment,
    TrackingUnavailable,
    ExperimentNotFound,
    NoRuns,
    ModelLoadError,
    AwaitingData,
    DataError,
    ExplainerCreationError,
}

/// An uploaded file
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// First rows of the upload as display strings
#[derive(Debug, Clone, Serialize)]
pub struct PreviewTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Everything a session produced, in display order
#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub messages: Vec<StatusMessage>,
    /// Runs of the experiment; `None` when the experiment did not resolve
    pub runs: Option<Vec<RunInfo>>,
    pub selected_run: Option<String>,
    pub model_uri: Option<String>,
    pub loader: Option<String>,
    pub preview: Option<PreviewTable>,
    pub original_rows: Option<usize>,
    pub explained_rows: Option<usize>,
    pub method: Option<ExplainerMethod>,
    pub n_classes: Option<usize>,
    pub aggregate: Option<Artifact>,
    pub force: Option<Artifact>,
    pub halted: Option<HaltReason>,
    #[serde(skip)]
    pub attributions: Option<Attributions>,
}

impl SessionReport {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            runs: None,
            selected_run: None,
            model_uri: None,
            loader: None,
            preview: None,
            original_rows: None,
            explained_rows: None,
            method: None,
            n_classes: None,
            aggregate: None,
            force: None,
            halted: None,
            attributions: None,
        }
    }

    fn push(&mut self, level: Level, text: impl Into<String>) {
        self.messages.push(StatusMessage {
            level,
            text: text.into(),
        });
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(Level::Info, text);
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.push(Level::Success, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.push(Level::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(Level::Error, text);
    }

    /// Messages of one level
    pub fn messages_at(&self, level: Level) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.level == level)
            .map(|m| m.text.as_str())
            .collect()
    }

    pub fn has_error(&self) -> bool {
        self.messages.iter().any(|m| m.level == Level::Error)
    }

    fn halt(&mut self, reason: HaltReason, level: Level, text: impl Into<String>) -> HaltReason {
        self.push(level, text);
        reason
    }
}

/// Run one session to completion or to its first halting step
pub fn run_session(config: &SessionConfig, upload: Option<&Upload>) -> SessionReport {
    let session_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    let span = info_span!("session", id = %session_id, experiment = %config.experiment_name);
    let _enter = span.enter();

    let mut report = SessionReport::new(session_id);
    if let Err(reason) = execute(config, upload, &mut report) {
        warn!(reason = ?reason, "Session halted");
        report.halted = Some(reason);
    } else {
        info!(messages = report.messages.len(), "Session complete");
    }
    report
}

fn execute(
    config: &SessionConfig,
    upload: Option<&Upload>,
    report: &mut SessionReport,
) -> std::result::Result<(), HaltReason> {
    if let Err(err) = config.validate() {
        return Err(report.halt(HaltReason::InvalidConfig, Level::Error, err.to_string()));
    }

    let experiment_name = config.experiment_name.trim();
    if experiment_name.is_empty() {
        return Err(report.halt(
            HaltReason::AwaitingExperiment,
            Level::Info,
            "Please input a valid experiment name to load runs.",
        ));
    }

    // Run discovery
    let store = tracking::connect(&config.tracking_uri).map_err(|err| {
        report.halt(
            HaltReason::TrackingUnavailable,
            Level::Error,
            format!("Could not connect to tracking store: {}", err),
        )
    })?;
    info!(store = %store.describe(), "Connected to tracking store");

    let experiment = match store.get_experiment_by_name(experiment_name) {
        Ok(Some(experiment)) => experiment,
        Ok(None) => {
            return Err(report.halt(
                HaltReason::ExperimentNotFound,
                Level::Error,
                ShapLensError::ExperimentNotFound(experiment_name.to_string()).to_string(),
            ))
        }
        Err(err) => return Err(report.halt(HaltReason::TrackingUnavailable, Level::Error, err.to_string())),
    };

    let runs = store
        .search_runs(&experiment.experiment_id)
        .map_err(|err| report.halt(HaltReason::TrackingUnavailable, Level::Error, err.to_string()))?;
    info!(experiment_id = %experiment.experiment_id, runs = runs.len(), "Runs listed");
    if runs.is_empty() {
        return Err(report.halt(
            HaltReason::NoRuns,
            Level::Info,
            format!("No runs found in experiment '{}'.", experiment.name),
        ));
    }

    let run_id = match config.run_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) if runs.iter().any(|r| r.run_id == id) => id.to_string(),
        Some(id) => {
            report.warning(format!(
                "Run '{}' is not in this experiment; using the most recent run.",
                id
            ));
            runs[0].run_id.clone()
        }
        None => runs[0].run_id.clone(),
    };
    report.selected_run = Some(run_id.clone());
    report.runs = Some(runs);

    // Model resolution
    let handle = ModelUri::new(&run_id, &config.artifact_path)
        .and_then(|uri| ModelResolver::default().resolve(store.as_ref(), &uri))
        .map_err(|err| report.halt(HaltReason::ModelLoadError, Level::Error, err.to_string()))?;
    report.success(format!("Loaded model from {} ({} loader)", handle.uri, handle.loader));
    report.model_uri = Some(handle.uri.to_string());
    report.loader = Some(handle.loader.clone());

    // Data intake
    let upload = upload.ok_or_else(|| {
        report.halt(
            HaltReason::AwaitingData,
            Level::Info,
            "Upload a CSV file with the model's input features to compute explanations.",
        )
    })?;
    let dataset = SampleDataset::from_csv_with_levels(
        &upload.bytes,
        config.max_rows,
        config.explainer.seed,
        handle.predictor().category_levels(),
    )
    .map_err(|err| {
        report.halt(
            HaltReason::DataError,
            Level::Error,
            format!("Could not read '{}': {}", upload.file_name, err),
        )
    })?;

    let (headers, rows) = dataset.preview_table();
    report.preview = Some(PreviewTable { headers, rows });
    report.original_rows = Some(dataset.original_rows());
    report.explained_rows = Some(dataset.n_rows());
    report.info(format!(
        "Explaining {} rows (sampled if original > {}).",
        dataset.n_rows(),
        config.max_rows
    ));

    let index_in_range = config.sample_index < dataset.n_rows();
    if !index_in_range {
        report.error(
            ShapLensError::InvalidSampleIndex {
                index: config.sample_index,
                rows: dataset.n_rows(),
            }
            .to_string(),
        );
    }

    // Explanation
    let attributions = ExplainerSelector::new(config.explainer.clone())
        .explain(&handle, &dataset)
        .map_err(|err| {
            report.halt(HaltReason::ExplainerCreationError, Level::Error, err.to_string())
        })?;
    report.method = Some(attributions.method);
    report.n_classes = Some(attributions.n_classes());

    if attributions.n_classes() > 1 {
        let label = handle
            .predictor()
            .class_labels()
            .and_then(|labels| labels.get(DISPLAY_CLASS))
            .map(|l| format!(" ('{}')", l))
            .unwrap_or_default();
        report.info(format!(
            "Model has {} outputs; both views show class {}{} of {}.",
            attributions.n_classes(),
            DISPLAY_CLASS,
            label,
            attributions.n_classes()
        ));
    }

    // Rendering
    let renderer = Renderer::new(&config.explainer);
    match renderer.aggregate(&attributions, DISPLAY_CLASS, config.summary_bar) {
        Ok(artifact) => report.aggregate = Some(artifact),
        Err(err) => report.warning(format!("Summary plot could not be rendered: {}", err)),
    }

    if index_in_range {
        match attributions.row(config.sample_index, DISPLAY_CLASS) {
            Ok(local) => {
                let outcome = renderer.force(&local);
                for warning in outcome.warnings {
                    report.warning(warning);
                }
                report.force = outcome.artifact;
            }
            Err(err) => report.error(err.to_string()),
        }
    }

    report.attributions = Some(attributions);
    Ok(())
}
