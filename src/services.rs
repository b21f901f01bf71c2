pub mod ingestion_service;
pub mod report_service;

pub use ingestion_service::{IngestionOptions, IngestionService, RunSummary};
pub use report_service::ReportService;
