mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone())),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Ingest { pdf_dir, reingest } => {
            commands::ingest(&config, &pdf_dir, reingest).await
        }
        Command::Query {
            text,
            region,
            year_min,
            top_k,
            json,
        } => commands::query(&config, &text, region, year_min, top_k, json).await,
        Command::Predict {
            case_file,
            no_reasoning,
            max_cases,
            json,
        } => commands::predict(&config, &case_file, !no_reasoning, max_cases, json).await,
        Command::Stats => commands::stats(&config).await,
        Command::Clear => commands::clear(&config).await,
        Command::RebuildBm25 => commands::rebuild_bm25(&config).await,
    }
}
