pub mod error;
pub mod models;
pub mod observation_repository;
pub mod pool;
pub mod query;
pub mod report_repository;
pub mod station_repository;

pub use error::DbError;
pub use models::*;
pub use observation_repository::ObservationRepository;
pub use pool::{connect, connect_in_memory, run_migrations};
pub use query::{QueryGateway, QueryParam};
pub use report_repository::ReportRepository;
pub use station_repository::StationRepository;
