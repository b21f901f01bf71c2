use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::db::{LatitudePoint, StationListing, StationRainfall};
use crate::services::report_service::{
    OverallReportResponse, RainfallParams, StationReportResponse,
};
use crate::services::ReportService;

#[derive(Clone)]
pub struct AppState {
    pub report_service: ReportService,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct WelcomeResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct StationListResponse {
    pub stations: Vec<StationListing>,
}

#[derive(Serialize)]
pub struct RainfallRankingResponse {
    pub stations: Vec<StationRainfall>,
}

#[derive(Serialize)]
pub struct LatitudeProfileResponse {
    pub stations: Vec<LatitudePoint>,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/stations", get(get_stations))
        .route("/stations/rainfall", get(get_stations_by_rainfall))
        .route("/stations/{station_id}", get(get_station))
        .route("/overall", get(get_overall))
        .route("/overall/latitude", get(get_latitude_profile))
        .with_state(state);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", api_routes)
}

async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Historic station data API - see /api/v1/stations".to_string(),
    })
}

#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[instrument(skip(state))]
async fn get_stations(
    State(state): State<AppState>,
) -> Result<Json<StationListResponse>, StatusCode> {
    let stations = state.report_service.list_stations().await.map_err(|e| {
        error!("Failed to list stations: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!("Retrieved {} stations", stations.len());
    Ok(Json(StationListResponse { stations }))
}

#[instrument(skip(state))]
async fn get_stations_by_rainfall(
    State(state): State<AppState>,
    Query(params): Query<RainfallParams>,
) -> Result<Json<RainfallRankingResponse>, StatusCode> {
    debug!("Ranking stations by average rainfall ({:?})", params.order);
    let stations = state
        .report_service
        .stations_by_rainfall(params.order)
        .await
        .map_err(|e| {
            error!("Failed to rank stations by rainfall: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(RainfallRankingResponse { stations }))
}

#[instrument(skip(state), fields(station_id = %station_id))]
async fn get_station(
    State(state): State<AppState>,
    Path(station_id): Path<i64>,
) -> Result<Json<StationReportResponse>, StatusCode> {
    debug!("Fetching report for station {}", station_id);
    let report = state
        .report_service
        .station_report(station_id)
        .await
        .map_err(|e| {
            error!("Failed to build report for station {}: {}", station_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or_else(|| {
            warn!("Station {} not found", station_id);
            StatusCode::NOT_FOUND
        })?;

    info!(
        "Retrieved report for {} ({} years of data)",
        report.details.name,
        report.yearly_trend.len()
    );
    Ok(Json(report))
}

#[instrument(skip(state))]
async fn get_overall(
    State(state): State<AppState>,
) -> Result<Json<OverallReportResponse>, StatusCode> {
    let report = state.report_service.overall_report().await.map_err(|e| {
        error!("Failed to build overall report: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(report))
}

#[instrument(skip(state))]
async fn get_latitude_profile(
    State(state): State<AppState>,
) -> Result<Json<LatitudeProfileResponse>, StatusCode> {
    let stations = state.report_service.latitude_profile().await.map_err(|e| {
        error!("Failed to build latitude profile: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(LatitudeProfileResponse { stations }))
}
