use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, error, info, instrument, warn};

use crate::db::{DbError, NewStation, ObservationRepository, StationRepository};
use crate::fetch_error::FetchError;
use crate::fetcher::{resolve_link, DocumentFetcher};
use crate::parse_error::ParseError;
use crate::series::{extract_series, MonthlyObservation};
use crate::station_directory::{extract_directory, DirectoryMode, RawStationRecord};

/// Met Office historic station data listing
pub const DEFAULT_DIRECTORY_URL: &str =
    "https://www.metoffice.gov.uk/research/climate/maps-and-data/historic-station-data";

/// Error types surfaced by an ingestion run
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Transport error: {0}")]
    Transport(#[from] FetchError),

    #[error("Structural parse error: {0}")]
    StructuralParse(#[from] ParseError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Persistence(DbError::SqlxError(e))
    }
}

/// Per-station pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StationStage {
    Fetching,
    Parsing,
    Normalizing,
    Persisting,
}

impl fmt::Display for StationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StationStage::Fetching => "fetching",
            StationStage::Parsing => "parsing",
            StationStage::Normalizing => "normalizing",
            StationStage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

impl IngestError {
    /// Stage at which a station in this state was abandoned
    pub fn stage(&self) -> StationStage {
        match self {
            IngestError::Transport(_) => StationStage::Fetching,
            IngestError::StructuralParse(_) => StationStage::Parsing,
            IngestError::Persistence(_) => StationStage::Persisting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationFailure {
    pub name: String,
    pub link: String,
    pub stage: StationStage,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stations_processed: usize,
    pub observations_written: usize,
    pub stations_failed: usize,
    /// Data rows dropped because year or month could not be read
    pub rows_skipped: usize,
    pub failures: Vec<StationFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of one station that reached `Done`
#[derive(Debug, Clone, PartialEq)]
pub struct StationReport {
    pub station_id: i64,
    pub observations_written: usize,
    pub rows_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub directory_url: String,
    pub directory_mode: DirectoryMode,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            directory_mode: DirectoryMode::Strict,
        }
    }
}

/// Drives directory discovery and the per-station fetch → parse → normalize → persist pipeline
#[derive(Clone)]
pub struct IngestionService {
    pool: SqlitePool,
    fetcher: DocumentFetcher,
    station_repo: StationRepository,
    observation_repo: ObservationRepository,
    options: IngestionOptions,
    progress: ProgressBar,
}

impl IngestionService {
    pub fn new(pool: SqlitePool, fetcher: DocumentFetcher, options: IngestionOptions) -> Self {
        Self {
            station_repo: StationRepository::new(pool.clone()),
            observation_repo: ObservationRepository::new(pool.clone()),
            pool,
            fetcher,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Run one full ingestion pass.
    ///
    /// Per-station failures are recorded in the summary and the run continues.
    /// A listing page that cannot be fetched or parsed ends the run with an error.
    #[instrument(skip(self), fields(directory_url = %self.options.directory_url))]
    pub async fn run_ingestion(&self) -> Result<RunSummary, IngestError> {
        let started_at = Utc::now();
        let start_time = Instant::now();
        info!("Starting ingestion from {}", self.options.directory_url);

        let stations = self.discover_stations().await?;
        info!("Discovered {} stations", stations.len());

        self.progress.set_length(stations.len() as u64);

        let mut stations_processed = 0;
        let mut observations_written = 0;
        let mut rows_skipped = 0;
        let mut failures = Vec::new();

        for record in &stations {
            self.progress.set_message(record.name.clone());

            match self.process_station(record).await {
                Ok(report) => {
                    info!(
                        "Inserted {} observations for {} (station id {})",
                        report.observations_written, record.name, report.station_id
                    );
                    stations_processed += 1;
                    observations_written += report.observations_written;
                    rows_skipped += report.rows_skipped;
                }
                Err(e) => {
                    let stage = e.stage();
                    warn!(
                        station = %record.name,
                        stage = %stage,
                        error = %e,
                        "Station failed, continuing with next station"
                    );
                    failures.push(StationFailure {
                        name: record.name.clone(),
                        link: record.link.clone(),
                        stage,
                        reason: e.to_string(),
                    });
                }
            }

            self.progress.inc(1);
        }

        self.progress.finish_and_clear();

        let summary = RunSummary {
            stations_processed,
            observations_written,
            stations_failed: failures.len(),
            rows_skipped,
            failures,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            "✓ Ingestion complete ({:.1}s): {} stations processed, {} failed, {} observations written",
            start_time.elapsed().as_secs_f64(),
            summary.stations_processed,
            summary.stations_failed,
            summary.observations_written
        );

        Ok(summary)
    }

    async fn discover_stations(&self) -> Result<Vec<RawStationRecord>, IngestError> {
        let html = self
            .fetcher
            .fetch_text(&self.options.directory_url)
            .await
            .map_err(|e| {
                error!("Failed to fetch station listing: {}", e);
                e
            })?;

        let stations = extract_directory(&html, self.options.directory_mode).map_err(|e| {
            error!("Failed to parse station listing: {}", e);
            e
        })?;

        Ok(stations)
    }

    /// Fetching → Parsing → Normalizing → Persisting → Done for a single station
    #[instrument(skip(self, record), fields(station = %record.name))]
    pub async fn process_station(
        &self,
        record: &RawStationRecord,
    ) -> Result<StationReport, IngestError> {
        debug!(stage = %StationStage::Fetching, "Fetching station document");
        let url = resolve_link(&self.options.directory_url, &record.link)?;
        let document = self.fetcher.fetch_text(&url).await?;

        debug!(stage = %StationStage::Parsing, "Parsing station document");
        let series = extract_series(&document)?;
        if let Some(closure) = series
            .metadata
            .trailer
            .iter()
            .find(|line| line.to_ascii_lowercase().contains("closed"))
        {
            debug!("Station note: {}", closure);
        }

        debug!(stage = %StationStage::Normalizing, rows = series.rows.len(), "Normalizing rows");
        let mut observations: Vec<MonthlyObservation> = Vec::with_capacity(series.rows.len());
        let mut rows_skipped = 0;
        for row in &series.rows {
            match row.normalize() {
                Some(observation) => observations.push(observation),
                None => {
                    warn!(
                        "Skipping line {} of {}: unusable year/month ('{}', '{}')",
                        row.line, record.name, row.year, row.month
                    );
                    rows_skipped += 1;
                }
            }
        }

        debug!(stage = %StationStage::Persisting, count = observations.len(), "Persisting station");
        let station = NewStation {
            name: record.name.clone(),
            lon: record.longitude,
            lat: record.latitude,
            opened: record.opened.clone(),
            data_url: url,
        };

        let mut tx = self.pool.begin().await?;
        let station_id = self.station_repo.upsert_station_tx(&mut tx, &station).await?;
        let observations_written = self
            .observation_repo
            .upsert_observations_tx(&mut tx, station_id, &observations)
            .await?;
        tx.commit().await?;

        Ok(StationReport {
            station_id,
            observations_written,
            rows_skipped,
        })
    }
}
