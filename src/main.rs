use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use file_recovery::app::{Job, JobStatus, RecoveryService};
use file_recovery::config::{settings, AppConfig};
use file_recovery::core::{summarize, ScanCriteria, SortKey};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Find files by extension, size and date, then copy them somewhere safe
/// without overwriting anything already there.
#[derive(Parser)]
#[command(name = "file-recovery", version, about, long_about = None)]
struct Cli {
    /// Read settings from this directory instead of the default one
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory tree and print matching files, newest first
    Scan {
        /// Directory to scan
        root: PathBuf,

        /// Keep only names ending with this suffix (case-sensitive), e.g. ".txt"
        #[arg(short, long)]
        ext: Option<String>,

        /// Smallest size in bytes to keep
        #[arg(long)]
        min_size: Option<u64>,

        /// Largest size in bytes to keep
        #[arg(long)]
        max_size: Option<u64>,

        /// Earliest modification date, YYYY-MM-DD
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Latest modification date, YYYY-MM-DD (midnight)
        #[arg(long)]
        until: Option<NaiveDate>,

        /// Ranking key: modified or size
        #[arg(long, default_value_t = SortKey::Modified)]
        sort: SortKey,

        /// Also print per-extension totals
        #[arg(long)]
        summary: bool,
    },

    /// Copy files into a destination directory, renaming on collision
    Recover {
        /// Destination directory (defaults to the configured one)
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Files to recover
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Inspect or move the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the configuration to a file
    Export { path: PathBuf },
    /// Replace the configuration with the contents of a file
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir.as_deref();
    let config = settings::load_config(config_dir).context("Failed to load configuration")?;

    match cli.command {
        Commands::Scan {
            root,
            ext,
            min_size,
            max_size,
            since,
            until,
            sort,
            summary,
        } => {
            let mut criteria = ScanCriteria::new(root)
                .with_size_range(min_size, max_size)
                .with_date_range(since, until)
                .sorted_by(sort);
            if let Some(ext) = ext {
                criteria = criteria.with_extension(ext);
            }

            let service = RecoveryService::new(&config)?;
            let job = service
                .wait_for(service.submit_scan(criteria), config.poll_interval())
                .await?;

            if summary {
                let totals = summarize(job.files().unwrap_or_default());
                print_json(&json!({ "job": job, "summary": totals }))?;
            } else {
                print_json(&job)?;
            }
            ensure_done(&job)
        }
        Commands::Recover { dest, paths } => {
            let destination = dest
                .or_else(|| config.default_destination.clone())
                .context("No destination given and none configured")?;

            let service = RecoveryService::new(&config)?;
            let job = service
                .wait_for(
                    service.submit_recover(paths, destination),
                    config.poll_interval(),
                )
                .await?;

            print_json(&job)?;
            ensure_done(&job)
        }
        Commands::Config { action } => run_config(action, &config, config_dir),
    }
}

fn run_config(
    action: ConfigAction,
    config: &AppConfig,
    config_dir: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => print_json(config),
        ConfigAction::Export { path } => settings::export_config(config, &path),
        ConfigAction::Import { path } => {
            let imported = settings::import_config(&path)?;
            settings::save_config(&imported, config_dir)
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_done(job: &Job) -> Result<()> {
    if job.status == JobStatus::Error {
        anyhow::bail!(
            "Job {} failed: {}",
            job.id,
            job.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
