use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use iptv_aggregator::{update_playlist, Settings};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to ./iptv.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output playlist path (overrides config)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Playlist source URL or path; repeat to replace the configured list
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(output) = args.output {
        settings.output.path = output;
    }
    if !args.sources.is_empty() {
        settings.sources = args.sources;
    }
    settings.validate()?;

    info!(
        "Updating {} from {} sources",
        settings.output.path.display(),
        settings.sources.len()
    );

    match update_playlist(settings).await {
        Ok(summary) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        // already reported by the pipeline
        Err(_) => Ok(ExitCode::FAILURE),
    }
}
