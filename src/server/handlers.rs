//! HTTP request handlers

use std::sync::Arc;
use axum::{
    extract::{Multipart, Query, State},
    response::Html,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::config::SessionConfig;
use crate::error::ShapLensError;
use crate::session::{run_session, SessionReport};
use crate::tracking;

use super::error::{Result, ServerError};
use super::form::SessionForm;
use super::page::render_page;
use super::state::AppState;

// ============================================================================
// System Handlers
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "sessions_run": state.sessions_run(),
        "max_upload_size": state.config.max_upload_size,
    }))
}

// ============================================================================
// UI Handlers
// ============================================================================

/// Blank dashboard with default settings
pub async fn serve_index() -> Html<String> {
    Html(render_page(&SessionConfig::default(), None))
}

/// Run a session from the sidebar form and render the result
pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Html<String>> {
    let form = SessionForm::from_multipart(multipart).await?;
    let config = form.config.clone();
    let report = run_blocking(&state, form).await?;
    Ok(Html(render_page(&config, Some(&report))))
}

// ============================================================================
// API Handlers
// ============================================================================

/// Run a session and return the report as JSON
pub async fn api_session(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<SessionReport>> {
    let form = SessionForm::from_multipart(multipart).await?;
    let report = run_blocking(&state, form).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    tracking_uri: Option<String>,
    experiment_name: String,
}

/// List the runs of an experiment
pub async fn api_runs(Query(query): Query<RunsQuery>) -> Result<Json<serde_json::Value>> {
    let tracking_uri = query
        .tracking_uri
        .filter(|uri| !uri.trim().is_empty())
        .unwrap_or_else(|| SessionConfig::default().tracking_uri);
    let experiment_name = query.experiment_name.trim().to_string();
    if experiment_name.is_empty() {
        return Err(ServerError::BadRequest("experiment_name must not be empty".to_string()));
    }

    let (experiment, runs) = tokio::task::spawn_blocking(move || {
        let store = tracking::connect(&tracking_uri)?;
        let experiment = store
            .get_experiment_by_name(&experiment_name)?
            .ok_or(ShapLensError::ExperimentNotFound(experiment_name))?;
        let runs = store.search_runs(&experiment.experiment_id)?;
        Ok::<_, ShapLensError>((experiment, runs))
    })
    .await??;

    info!(experiment = %experiment.name, runs = runs.len(), "Listed runs");
    Ok(Json(serde_json::json!({
        "experiment": experiment,
        "runs": runs,
        "total": runs.len(),
    })))
}

async fn run_blocking(state: &AppState, form: SessionForm) -> Result<SessionReport> {
    let total = state.record_session();
    info!(
        experiment = %form.config.experiment_name,
        has_upload = form.upload.is_some(),
        sessions_run = total,
        "Starting session"
    );
    let report = tokio::task::spawn_blocking(move || run_session(&form.config, form.upload.as_ref())).await?;
    Ok(report)
}
