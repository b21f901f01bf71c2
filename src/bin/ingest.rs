use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use historic_station_data::config::DEFAULT_DATABASE_URL;
use historic_station_data::db;
use historic_station_data::fetcher::{
    DocumentFetcher, DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT_SECS,
};
use historic_station_data::services::ingestion_service::DEFAULT_DIRECTORY_URL;
use historic_station_data::services::{IngestionOptions, IngestionService, RunSummary};
use historic_station_data::station_directory::DirectoryMode;

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Scrape historic station data into the local database", long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env, default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Station listing page
    #[arg(long, env, default_value = DEFAULT_DIRECTORY_URL)]
    directory_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    fetch_timeout_secs: u64,

    /// Extra attempts for timeouts, connection errors and 5xx responses
    #[arg(long, env, default_value_t = DEFAULT_FETCH_RETRIES)]
    fetch_retries: usize,

    /// 'strict' fails the run on a malformed listing row, 'best-effort' skips it
    #[arg(long, env, value_enum, default_value_t = DirectoryMode::Strict)]
    directory_mode: DirectoryMode,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!("{}", "-".repeat(60));
    println!("Beginning...");
    println!("{}", "-".repeat(60));

    info!("Connecting to database...");
    let pool = db::connect(&cli.database_url).await?;
    db::run_migrations(&pool).await?;

    let fetcher = DocumentFetcher::new(
        Duration::from_secs(cli.fetch_timeout_secs),
        cli.fetch_retries,
    )?;
    let options = IngestionOptions {
        directory_url: cli.directory_url,
        directory_mode: cli.directory_mode,
    };

    let mut service = IngestionService::new(pool.clone(), fetcher, options);
    if !cli.no_progress {
        let progress = ProgressBar::new(0);
        progress.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
                .unwrap()
                .progress_chars("##-"),
        );
        service = service.with_progress(progress);
    }

    let result = service.run_ingestion().await;
    pool.close().await;

    match result {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            error!("Ingestion aborted: {}", e);
            Err(e.into())
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("{}", "-".repeat(60));
    println!("Finished inserting data.");
    println!("{}", "-".repeat(60));
    println!(" Stations processed:   {}", summary.stations_processed);
    println!(" Stations failed:      {}", summary.stations_failed);
    println!(" Observations written: {}", summary.observations_written);
    if summary.rows_skipped > 0 {
        println!(" Rows skipped:         {}", summary.rows_skipped);
    }
    println!(
        " Duration:             {:.1}s",
        (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0
    );

    if !summary.failures.is_empty() {
        println!("{}", "-".repeat(60));
        println!("Failed stations:");
        for failure in &summary.failures {
            println!(
                " {}\t[{}] {} ({})",
                failure.name, failure.stage, failure.reason, failure.link
            );
        }
    }
    println!("{}", "-".repeat(60));
}
