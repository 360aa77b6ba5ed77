//! shaplens - Main Entry Point
//!
//! Dashboard server by default; subcommands for headless use.

use clap::Parser;
use shaplens::cli::{cmd_explain, cmd_runs, cmd_seed_demo, cmd_serve, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shaplens=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, host }) => {
            cmd_serve(&host, port).await?;
        }
        Some(Commands::Explain {
            tracking_uri,
            experiment,
            run_id,
            artifact_path,
            data,
            max_rows,
            sample_index,
            bar,
            static_force,
            output,
        }) => {
            cmd_explain(
                &tracking_uri,
                &experiment,
                run_id.as_deref(),
                &artifact_path,
                &data,
                max_rows,
                sample_index,
                bar,
                static_force,
                &output,
            )
            .await?;
        }
        Some(Commands::Runs { tracking_uri, experiment }) => {
            cmd_runs(&tracking_uri, &experiment).await?;
        }
        Some(Commands::SeedDemo { dir, experiment, rows }) => {
            cmd_seed_demo(&dir, &experiment, rows)?;
        }
        None => {
            // Default: the dashboard, configured from the environment
            let config = shaplens::server::ServerConfig::default();
            cmd_serve(&config.host, config.port).await?;
        }
    }

    Ok(())
}
