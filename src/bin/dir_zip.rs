// dir-zip: archive the working directory, leaving out previous archives,
// hidden entries and temp files.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use dialoguer::Confirm;
use maps_harvest::archive::{
    ExclusionPolicy, TreeWalker, archive_path, default_archive_name, preview,
};
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dir-zip")]
#[command(about = "Zip the current directory, skipping existing zip files")]
#[command(version)]
struct Cli {
    /// Archive name (".zip" is appended when missing) [default: directory_backup_<timestamp>.zip]
    #[arg(short, long)]
    output: Option<String>,

    /// Descend into hidden directories too
    #[arg(long)]
    include_hidden: bool,

    /// Log every entry and skip the confirmation prompt
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Only an explicit yes proceeds. Without a terminal the prompt cannot be
/// answered, which counts as a no.
fn confirmed(answer: dialoguer::Result<Option<bool>>) -> bool {
    match answer {
        Ok(choice) => choice.unwrap_or(false),
        Err(e) => {
            warn!("Confirmation prompt unavailable: {}", e);
            false
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let root = std::env::current_dir().context("Cannot determine working directory")?;
    let output = archive_path(
        cli.output
            .unwrap_or_else(|| default_archive_name(&Local::now())),
    );

    let counts = preview(&root);
    println!("Current directory: {}", root.display());
    println!("Total items found: {}", counts.total_items);
    println!("Zip files to exclude: {}", counts.zip_files);
    println!("Approximately {} items will be zipped", counts.items_to_zip());

    if !cli.verbose {
        let answer = Confirm::new()
            .with_prompt(format!("Create {}?", output.display()))
            .default(false)
            .interact_opt();
        if !confirmed(answer) {
            println!("Operation cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let policy = ExclusionPolicy {
        exclude_hidden: !cli.include_hidden,
    };
    let report = TreeWalker::new(policy)
        .build(&root, &output)
        .context("Archive creation failed")?;

    let summary = report.summary;
    println!("\nZip file created successfully: {}", output.display());
    println!("Files added: {}", summary.files_added);
    println!("Folders added: {}", summary.folders_added);
    println!("Files skipped: {}", summary.files_skipped);
    if summary.files_failed > 0 {
        println!("Files that could not be read: {}", summary.files_failed);
    }
    println!("Zip file size: {:.2} MB", report.size_mb());
    println!("Location: {}", report.path.display());

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn output_defaults_to_a_generated_name() {
        let cli = Cli::parse_from(["dir-zip"]);
        assert!(cli.output.is_none());

        let cli = Cli::parse_from(["dir-zip", "-o", "snapshot"]);
        assert_eq!(cli.output.as_deref(), Some("snapshot"));
    }

    #[test]
    fn only_an_explicit_yes_proceeds() {
        assert!(confirmed(Ok(Some(true))));
        assert!(!confirmed(Ok(Some(false))));
        assert!(!confirmed(Ok(None)));
    }

    #[test]
    fn missing_terminal_cancels() {
        let not_a_tty = io::Error::new(io::ErrorKind::NotConnected, "not a terminal");
        assert!(!confirmed(Err(not_a_tty.into())));
    }
}
