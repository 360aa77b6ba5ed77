//! shaplens CLI Module
//!
//! Command-line interface for serving the dashboard, running a session
//! headless, listing runs and seeding a demo store.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{ExplainerConfig, SessionConfig, DEFAULT_ARTIFACT_PATH, DEFAULT_TRACKING_URI};
use crate::render::Artifact;
use crate::session::{run_session, Level, SessionReport, Upload};
use crate::tracking::{self, LocalStore};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "shaplens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explain tracked models with SHAP summary and force plots")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the dashboard server
    Serve {
        /// Server port
        #[arg(short, long, env = "API_PORT", default_value = "8501")]
        port: u16,

        /// Server host
        #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
        host: String,
    },

    /// Run one explainability session and write the plots to a directory
    Explain {
        /// Tracking server URL or local store directory
        #[arg(long, env = "MLFLOW_TRACKING_URI", default_value = DEFAULT_TRACKING_URI)]
        tracking_uri: String,

        /// Experiment name
        #[arg(short, long)]
        experiment: String,

        /// Run id (defaults to the most recent run)
        #[arg(long)]
        run_id: Option<String>,

        /// Model artifact path inside the run
        #[arg(long, default_value = DEFAULT_ARTIFACT_PATH)]
        artifact_path: String,

        /// CSV file with the model's input features
        #[arg(short, long)]
        data: PathBuf,

        /// Row cap for explanation (50 to 10000)
        #[arg(long, default_value = "1000")]
        max_rows: usize,

        /// Row shown in the force plot
        #[arg(long, default_value = "0")]
        sample_index: usize,

        /// Bar-style summary plot
        #[arg(long)]
        bar: bool,

        /// Render the force plot as a PNG instead of HTML
        #[arg(long = "static")]
        static_force: bool,

        /// Output directory
        #[arg(short, long, default_value = "shaplens-output")]
        output: PathBuf,
    },

    /// List the runs of an experiment
    Runs {
        /// Tracking server URL or local store directory
        #[arg(long, env = "MLFLOW_TRACKING_URI", default_value = DEFAULT_TRACKING_URI)]
        tracking_uri: String,

        /// Experiment name
        #[arg(short, long)]
        experiment: String,
    },

    /// Create a local tracking store with a demo experiment and data
    SeedDemo {
        /// Store directory
        #[arg(long, default_value = "mlruns-demo")]
        dir: PathBuf,

        /// Experiment name
        #[arg(short, long, default_value = "churn-demo")]
        experiment: String,

        /// Rows of demo data to write next to the store
        #[arg(long, default_value = "2000")]
        rows: usize,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "shaplens".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("Dashboard", &format!("http://{}:{}", host, port)));
    line_box(&kv("API      ", &format!("http://{}:{}/api", host, port)));
    line_box(&kv("Health   ", &format!("http://{}:{}/api/health", host, port)));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_empty();
    line_box_bottom();
    println!();

    let config = ServerConfig::default().with_host(host).with_port(port);
    run_server(config).await
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_explain(
    tracking_uri: &str,
    experiment: &str,
    run_id: Option<&str>,
    artifact_path: &str,
    data: &Path,
    max_rows: usize,
    sample_index: usize,
    bar: bool,
    static_force: bool,
    output: &Path,
) -> anyhow::Result<()> {
    section("Explain");

    step_run(&format!("Reading {}", data.display()));
    let bytes = std::fs::read(data)?;
    step_done(&format!("{} bytes", bytes.len()));

    let file_name = data
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data.csv".to_string());
    let upload = Upload::new(file_name, bytes);

    let mut config = SessionConfig::new(tracking_uri, experiment)
        .with_artifact_path(artifact_path)
        .with_max_rows(max_rows)
        .with_sample_index(sample_index)
        .with_summary_bar(bar)
        .with_explainer(ExplainerConfig::default().with_interactive(!static_force));
    if let Some(id) = run_id {
        config = config.with_run_id(id);
    }

    step_run("Running session");
    let start = Instant::now();
    let report = tokio::task::spawn_blocking(move || run_session(&config, Some(&upload))).await?;
    step_done(&format!("{:?}", start.elapsed()));

    print_report(&report);

    let written = write_artifacts(&report, output)?;
    for path in &written {
        step_ok(&format!("Wrote {}", path.display()));
    }
    println!();

    if let Some(reason) = report.halted {
        anyhow::bail!("session halted: {:?}", reason);
    }
    Ok(())
}

pub async fn cmd_runs(tracking_uri: &str, experiment: &str) -> anyhow::Result<()> {
    section("Runs");

    let uri = tracking_uri.to_string();
    let name = experiment.to_string();
    let (experiment, runs) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let store = tracking::connect(&uri)?;
        let experiment = store
            .get_experiment_by_name(&name)?
            .ok_or_else(|| anyhow::anyhow!("Experiment not found: {}", name))?;
        let runs = store.search_runs(&experiment.experiment_id)?;
        Ok((experiment, runs))
    })
    .await??;

    println!("  {}", kv("Experiment", &format!("{} (id {})", experiment.name, experiment.experiment_id)));
    println!();
    if runs.is_empty() {
        println!("  {}", "No runs found".yellow());
    }
    for run in &runs {
        let started = chrono::DateTime::from_timestamp_millis(run.start_time)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<34} {:<20} {:<10} {}",
            run.run_id.white(),
            run.run_name,
            muted(&run.status),
            dim(&started)
        );
    }
    println!();
    Ok(())
}

pub fn cmd_seed_demo(dir: &Path, experiment: &str, rows: usize) -> anyhow::Result<()> {
    section("Seed demo");

    step_run(&format!("Creating store at {}", dir.display()));
    let store = LocalStore::create(dir)?;
    let seeded = crate::demo::seed(&store, experiment)?;
    step_done(&seeded.experiment.experiment_id);

    let data_path = dir.join("demo.csv");
    step_run(&format!("Writing {} rows", rows));
    std::fs::write(&data_path, crate::demo::csv(rows, 7, false)?)?;
    step_done(&data_path.display().to_string());

    println!();
    println!("  {}", kv("Tree run   ", &seeded.tree_run.run_id));
    println!("  {}", kv("Generic run", &seeded.generic_run.run_id));
    println!();
    println!(
        "  {} shaplens explain --tracking-uri {} -e {} -d {}",
        dim("try:"),
        dir.display(),
        experiment,
        data_path.display()
    );
    println!();
    Ok(())
}

// ─── Report output ─────────────────────────────────────────────────────────────

fn print_report(report: &SessionReport) {
    println!();
    for message in &report.messages {
        let marker = match message.level {
            Level::Info => accent("i"),
            Level::Success => ok("✓"),
            Level::Warning => "!".yellow(),
            Level::Error => "✗".red(),
        };
        println!("  {} {}", marker, message.text);
    }
    println!();

    if let Some(uri) = &report.model_uri {
        println!("  {}", kv("Model   ", uri));
    }
    if let Some(method) = report.method {
        println!("  {}", kv("Method  ", &method.to_string()));
    }
    if let (Some(original), Some(explained)) = (report.original_rows, report.explained_rows) {
        println!("  {}", kv("Rows    ", &format!("{} of {}", explained, original)));
    }

    if let Some(attributions) = &report.attributions {
        if let Ok(summary) = attributions.summary(crate::explain::DISPLAY_CLASS) {
            println!();
            println!("  {}", "Mean |SHAP|".white().bold());
            for (idx, value) in summary.feature_ranking().into_iter().take(10) {
                println!(
                    "    {:<24} {}",
                    attributions.feature_names[idx],
                    format!("{:.4}", value).white()
                );
            }
        }
    }
    println!();
}

fn write_artifacts(report: &SessionReport, output: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if report.aggregate.is_none() && report.force.is_none() {
        return Ok(written);
    }
    std::fs::create_dir_all(output)?;

    for (stem, artifact) in [("summary", &report.aggregate), ("force", &report.force)] {
        let Some(artifact) = artifact else { continue };
        let path = match artifact {
            Artifact::Image { png, .. } => {
                let path = output.join(format!("{}.png", stem));
                std::fs::write(&path, png)?;
                path
            }
            Artifact::Html { caption, markup } => {
                let path = output.join(format!("{}.html", stem));
                let page = format!(
                    "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"><title>{}</title></head>\n<body>\n{}\n<p>{}</p>\n</body></html>\n",
                    crate::render::escape_text(caption),
                    markup,
                    crate::render::escape_text(caption)
                );
                std::fs::write(&path, page)?;
                path
            }
        };
        written.push(path);
    }
    Ok(written)
}
