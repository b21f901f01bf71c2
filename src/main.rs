use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use historic_station_data::api::{create_router, AppState};
use historic_station_data::config::Config;
use historic_station_data::db::{self, ReportRepository};
use historic_station_data::services::ReportService;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,historic_station_data=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    info!("Starting historic station data API with config: {:?}", config);

    info!("Connecting to database...");
    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let report_service = ReportService::new(ReportRepository::new(pool.clone()));

    let app_state = AppState { report_service };
    let app = create_router(app_state).layer(TraceLayer::new_for_http());

    let addr = config.server_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    pool.close().await;
    Ok(())
}
