//! shaplens - Explainability dashboard for tracked models
//!
//! Loads a model recorded in an experiment tracking store, computes SHAP
//! attributions for an uploaded dataset and renders a global summary plot
//! plus a single-instance force plot.
//!
//! # Modules
//!
//! ## Pipeline
//! - [`tracking`] - Experiment tracking stores (MLflow REST, local directory)
//! - [`model`] - Model formats and loader fallback
//! - [`data`] - CSV intake, down-sampling, feature encoding
//! - [`explain`] - TreeSHAP and permutation explainers
//! - [`render`] - Summary and force plots
//! - [`session`] - One dashboard interaction end to end
//!
//! ## Services
//! - [`server`] - Dashboard and JSON API
//! - [`cli`] - Command-line interface
//!
//! ## Support
//! - [`config`] - Session and explainer settings
//! - [`fallback`] - Ordered strategy chains
//! - [`demo`] - Demo experiment seeding

// Core error handling
pub mod error;
pub mod config;
pub mod fallback;

// Pipeline
pub mod tracking;
pub mod model;
pub mod data;
pub mod explain;
pub mod render;
pub mod session;

// Services
pub mod server;
pub mod cli;

pub mod demo;

pub use error::{Result, ShapLensError};
pub use config::{ExplainerConfig, SessionConfig};
pub use session::{run_session, SessionReport};
