//! Local file system tracking store
//!
//! Layout:
//! ```text
//! <root>/experiments.json                          experiments and their runs
//! <root>/<experiment_id>/<run_id>/artifacts/...    run artifacts
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::{Experiment, RunInfo, TrackingStore};
use crate::error::{Result, ShapLensError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredExperiment {
    #[serde(flatten)]
    experiment: Experiment,
    #[serde(default)]
    runs: Vec<RunInfo>,
}

/// Directory-backed tracking store
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Open an existing store; the directory must exist
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.is_dir() {
            return Err(ShapLensError::Tracking(format!(
                "Tracking directory not found: {}",
                base_dir.display()
            )));
        }
        Ok(Self { base_dir })
    }

    /// Open a store, creating the directory when missing
    pub fn create(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn experiments_file(&self) -> PathBuf {
        self.base_dir.join("experiments.json")
    }

    fn load(&self) -> Result<Vec<StoredExperiment>> {
        let file_path = self.experiments_file();
        if !file_path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&file_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, experiments: &[StoredExperiment]) -> Result<()> {
        let json = serde_json::to_string_pretty(experiments)?;
        fs::write(self.experiments_file(), json)?;
        Ok(())
    }

    fn run_artifact_dir(&self, run_id: &str) -> Result<PathBuf> {
        let experiments = self.load()?;
        experiments
            .iter()
            .find_map(|e| {
                e.runs
                    .iter()
                    .find(|r| r.run_id == run_id)
                    .map(|r| self.base_dir.join(&r.experiment_id).join(&r.run_id).join("artifacts"))
            })
            .ok_or_else(|| ShapLensError::Tracking(format!("Run '{}' not found", run_id)))
    }

    /// Create an experiment, returning the existing one if the name is taken
    pub fn create_experiment(&self, name: &str) -> Result<Experiment> {
        let mut experiments = self.load()?;
        if let Some(existing) = experiments.iter().find(|e| e.experiment.name == name) {
            return Ok(existing.experiment.clone());
        }

        let experiment_id = (experiments.len() + 1).to_string();
        let experiment = Experiment {
            experiment_id: experiment_id.clone(),
            name: name.to_string(),
            artifact_location: self.base_dir.join(&experiment_id).display().to_string(),
            lifecycle_stage: "active".to_string(),
        };
        experiments.push(StoredExperiment {
            experiment: experiment.clone(),
            runs: Vec::new(),
        });
        self.save(&experiments)?;
        Ok(experiment)
    }

    /// Record a finished run under an experiment
    pub fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo> {
        let mut experiments = self.load()?;
        let stored = experiments
            .iter_mut()
            .find(|e| e.experiment.experiment_id == experiment_id)
            .ok_or_else(|| {
                ShapLensError::Tracking(format!("Experiment id '{}' not found", experiment_id))
            })?;

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let artifact_dir = self.base_dir.join(experiment_id).join(&run_id).join("artifacts");
        fs::create_dir_all(&artifact_dir)?;

        let run = RunInfo {
            run_id,
            experiment_id: experiment_id.to_string(),
            run_name: run_name.to_string(),
            status: "FINISHED".to_string(),
            start_time: chrono::Utc::now().timestamp_millis(),
            artifact_uri: artifact_dir.display().to_string(),
        };
        stored.runs.push(run.clone());
        self.save(&experiments)?;
        Ok(run)
    }

    /// Write an artifact file for a run
    pub fn log_artifact(&self, run_id: &str, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.run_artifact_dir(run_id)?.join(checked_relative(path)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, bytes)?;
        Ok(())
    }
}

/// Reject absolute paths and parent-directory components
fn checked_relative(path: &str) -> Result<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(ShapLensError::Tracking(format!(
            "Invalid artifact path: '{}'",
            path
        )));
    }
    Ok(relative.to_path_buf())
}

impl TrackingStore for LocalStore {
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self
            .load()?
            .into_iter()
            .map(|e| e.experiment)
            .find(|e| e.name == name && e.lifecycle_stage != "deleted"))
    }

    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>> {
        let mut runs: Vec<RunInfo> = self
            .load()?
            .into_iter()
            .filter(|e| e.experiment.experiment_id == experiment_id)
            .flat_map(|e| e.runs)
            .collect();
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(runs)
    }

    fn download_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>> {
        let target = self.run_artifact_dir(run_id)?.join(checked_relative(path)?);
        debug!(path = %target.display(), "Reading local artifact");
        fs::read(&target).map_err(|e| {
            ShapLensError::Tracking(format!("Artifact '{}' not readable: {}", path, e))
        })
    }

    fn describe(&self) -> String {
        format!("local store at {}", self.base_dir.display())
    }
}
