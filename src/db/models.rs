use serde::Serialize;
use sqlx::FromRow;

// Database entity models
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    pub opened: Option<String>,
    pub data_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Observation {
    pub station_id: i64,
    pub year: i32,
    pub month: i32,
    pub tmax: Option<f64>,
    pub tmin: Option<f64>,
    pub af: Option<i64>,
    pub rain: Option<f64>,
    pub sun: Option<f64>,
}

/// Station identity as scraped, before an id is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct NewStation {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub opened: String,
    pub data_url: String,
}

// Aggregate rows read through the query gateway
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct StationListing {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct StationRainfall {
    pub id: i64,
    pub name: String,
    pub avg_rain: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct YearlyTrendPoint {
    pub year: i32,
    pub avg_tmax: Option<f64>,
    pub avg_tmin: Option<f64>,
    pub avg_rain: Option<f64>,
    pub avg_sun: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct MonthlyClimatePoint {
    pub month: i32,
    pub avg_tmax: Option<f64>,
    pub avg_tmin: Option<f64>,
    pub avg_rain: Option<f64>,
    pub avg_sun: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LatitudePoint {
    pub station_id: i64,
    pub name: String,
    pub lat: Option<f64>,
    pub avg_tmax: Option<f64>,
    pub avg_rain: Option<f64>,
    pub avg_sun: Option<f64>,
}
