use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::db::{
    DbError, LatitudePoint, MonthlyClimatePoint, ReportRepository, Station, StationListing,
    StationRainfall, YearlyTrendPoint,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RainfallParams {
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationReportResponse {
    pub details: Station,
    pub average_monthly_rainfall: Option<f64>,
    pub yearly_trend: Vec<YearlyTrendPoint>,
    pub monthly_climate: Vec<MonthlyClimatePoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallReportResponse {
    pub yearly_trend: Vec<YearlyTrendPoint>,
    pub monthly_climate: Vec<MonthlyClimatePoint>,
}

#[derive(Clone)]
pub struct ReportService {
    report_repo: ReportRepository,
}

impl ReportService {
    pub fn new(report_repo: ReportRepository) -> Self {
        Self { report_repo }
    }

    pub async fn list_stations(&self) -> Result<Vec<StationListing>, DbError> {
        self.report_repo.list_stations().await
    }

    /// Stations ranked by mean monthly rainfall; stations with no rainfall data go last
    pub async fn stations_by_rainfall(
        &self,
        order: SortOrder,
    ) -> Result<Vec<StationRainfall>, DbError> {
        let mut stations = self.report_repo.station_rainfall().await?;
        sort_by_rainfall(&mut stations, order);
        Ok(stations)
    }

    /// Details and aggregate series for one station, `None` when the id is unknown
    pub async fn station_report(
        &self,
        station_id: i64,
    ) -> Result<Option<StationReportResponse>, DbError> {
        let Some(details) = self.report_repo.find_station(station_id).await? else {
            return Ok(None);
        };

        let yearly_trend = self.report_repo.station_yearly_trend(station_id).await?;
        let monthly_climate = self.report_repo.station_monthly_climate(station_id).await?;
        let average_monthly_rainfall = self
            .report_repo
            .station_average_rainfall(station_id)
            .await?;

        Ok(Some(StationReportResponse {
            details,
            average_monthly_rainfall,
            yearly_trend,
            monthly_climate,
        }))
    }

    pub async fn overall_report(&self) -> Result<OverallReportResponse, DbError> {
        Ok(OverallReportResponse {
            yearly_trend: self.report_repo.overall_yearly_trend().await?,
            monthly_climate: self.report_repo.overall_monthly_climate().await?,
        })
    }

    pub async fn latitude_profile(&self) -> Result<Vec<LatitudePoint>, DbError> {
        self.report_repo.latitude_profile().await
    }
}

fn sort_by_rainfall(stations: &mut [StationRainfall], order: SortOrder) {
    stations.sort_by(|a, b| match (a.avg_rain, b.avg_rain) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}
