// maps-extract: walk a map search's results and save every listing to xlsx.
//
// The operator performs the search in the launched browser window; extraction
// starts once they confirm. Ctrl+C stops the walk and saves what was collected.

use anyhow::Result;
use clap::Parser;
use maps_harvest::export::XlsxSink;
use maps_harvest::extraction::{ExtractionSession, ListingRecord, RunOutcome, RunSummary, run_extraction};
use maps_harvest::maps::MapsSession;
use maps_harvest::{BrowserManager, load_yaml_config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PREVIEW_ROWS: usize = 5;

#[derive(Parser)]
#[command(name = "maps-extract")]
#[command(about = "Extract map search listings into a styled xlsx workbook")]
#[command(version)]
struct Cli {
    /// Label for this search (skips the prompt; used in the file name)
    #[arg(long)]
    query: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Directory the workbook is written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// YAML config file (defaults to maps_harvest.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chromiumoxide=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_yaml_config(cli.config.as_deref())?;
    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(dir) = cli.output_dir {
        config.output.directory = dir;
    }

    let stop = CancellationToken::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stop requested (Ctrl+C), saving collected results...");
                stop.cancel();
            }
        }
    });

    let manager = Arc::new(BrowserManager::new(config.browser.clone()));
    let MapsSession { mut feed, query } =
        match MapsSession::open(manager.clone(), &config, cli.query, &stop).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(shutdown_err) = manager.shutdown().await {
                    warn!("Failed to shut down browser: {}", shutdown_err);
                }
                return Err(e);
            }
        };

    let mut session = ExtractionSession::new(query, stop);
    let sink = XlsxSink::new(
        config.output.directory.clone(),
        config.output.file_prefix.clone(),
    );

    let summary = run_extraction(&mut feed, &sink, &config.pagination, &mut session).await;
    report(&summary, &session.results);

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(summary: &RunSummary, records: &[ListingRecord]) {
    let headline = match summary.outcome {
        RunOutcome::Completed => "Extraction completed",
        RunOutcome::Stopped => "Extraction stopped by user",
        RunOutcome::SessionLost => "Browser connection lost",
        RunOutcome::Emergency => "Extraction aborted",
    };
    println!("\n{}. Total records: {}", headline, summary.records);

    if let Some(path) = &summary.saved_to {
        println!("Data saved to: {}", path.display());
    }
    if let Some(e) = &summary.save_error {
        println!("Could not save results: {}", e);
    }

    if summary.outcome == RunOutcome::Completed && !records.is_empty() {
        println!("\nPreview of first {} records:", PREVIEW_ROWS.min(records.len()));
        for record in records.iter().take(PREVIEW_ROWS) {
            println!(
                "  - {} | {} | {}",
                record.display_name(),
                record.phone.as_deref().unwrap_or("-"),
                record
                    .rating
                    .map(|r| format!("{r:.1}"))
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }
}
