use sqlx::SqlitePool;
use tracing::instrument;

use crate::db::{
    DbError, LatitudePoint, MonthlyClimatePoint, QueryGateway, QueryParam, Station,
    StationListing, StationRainfall, StationRepository, YearlyTrendPoint,
};

/// Aggregate reads over normalized observations
#[derive(Clone)]
pub struct ReportRepository {
    gateway: QueryGateway,
    station_repo: StationRepository,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            gateway: QueryGateway::new(pool.clone()),
            station_repo: StationRepository::new(pool),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_stations(&self) -> Result<Vec<StationListing>, DbError> {
        self.gateway
            .run_query("SELECT id, name FROM stations ORDER BY id", &[])
            .await
    }

    pub async fn find_station(&self, station_id: i64) -> Result<Option<Station>, DbError> {
        self.station_repo.find_by_id(station_id).await
    }

    /// Mean monthly rainfall of one station, `None` without rain values
    #[instrument(skip(self))]
    pub async fn station_average_rainfall(&self, station_id: i64) -> Result<Option<f64>, DbError> {
        let mut rows: Vec<StationRainfall> = self
            .gateway
            .run_query(
                r#"
                SELECT s.id AS id, s.name AS name, AVG(o.rain) AS avg_rain
                FROM stations s
                LEFT JOIN observations o ON o.station_id = s.id
                WHERE s.id = ?
                GROUP BY s.id, s.name
                "#,
                &[QueryParam::Int(station_id)],
            )
            .await?;

        Ok(rows.pop().and_then(|row| row.avg_rain))
    }

    /// Mean monthly rainfall total per station, NULL when a station has no rain values
    #[instrument(skip(self))]
    pub async fn station_rainfall(&self) -> Result<Vec<StationRainfall>, DbError> {
        self.gateway
            .run_query(
                r#"
                SELECT s.id AS id, s.name AS name, AVG(o.rain) AS avg_rain
                FROM stations s
                LEFT JOIN observations o ON o.station_id = s.id
                GROUP BY s.id, s.name
                ORDER BY s.id
                "#,
                &[],
            )
            .await
    }

    #[instrument(skip(self))]
    pub async fn station_yearly_trend(
        &self,
        station_id: i64,
    ) -> Result<Vec<YearlyTrendPoint>, DbError> {
        self.gateway
            .run_query(
                r#"
                SELECT year,
                       AVG(tmax) AS avg_tmax, AVG(tmin) AS avg_tmin,
                       AVG(rain) AS avg_rain, AVG(sun) AS avg_sun
                FROM observations
                WHERE station_id = ?
                GROUP BY year
                ORDER BY year
                "#,
                &[QueryParam::Int(station_id)],
            )
            .await
    }

    #[instrument(skip(self))]
    pub async fn station_monthly_climate(
        &self,
        station_id: i64,
    ) -> Result<Vec<MonthlyClimatePoint>, DbError> {
        self.gateway
            .run_query(
                r#"
                SELECT month,
                       AVG(tmax) AS avg_tmax, AVG(tmin) AS avg_tmin,
                       AVG(rain) AS avg_rain, AVG(sun) AS avg_sun
                FROM observations
                WHERE station_id = ?
                GROUP BY month
                ORDER BY month
                "#,
                &[QueryParam::Int(station_id)],
            )
            .await
    }

    #[instrument(skip(self))]
    pub async fn overall_yearly_trend(&self) -> Result<Vec<YearlyTrendPoint>, DbError> {
        self.gateway
            .run_query(
                r#"
                SELECT year,
                       AVG(tmax) AS avg_tmax, AVG(tmin) AS avg_tmin,
                       AVG(rain) AS avg_rain, AVG(sun) AS avg_sun
                FROM observations
                GROUP BY year
                ORDER BY year
                "#,
                &[],
            )
            .await
    }

    #[instrument(skip(self))]
    pub async fn overall_monthly_climate(&self) -> Result<Vec<MonthlyClimatePoint>, DbError> {
        self.gateway
            .run_query(
                r#"
                SELECT month,
                       AVG(tmax) AS avg_tmax, AVG(tmin) AS avg_tmin,
                       AVG(rain) AS avg_rain, AVG(sun) AS avg_sun
                FROM observations
                GROUP BY month
                ORDER BY month
                "#,
                &[],
            )
            .await
    }

    /// Station latitude against its long-run means, stations without observations omitted
    #[instrument(skip(self))]
    pub async fn latitude_profile(&self) -> Result<Vec<LatitudePoint>, DbError> {
        self.gateway
            .run_query(
                r#"
                SELECT s.id AS station_id, s.name AS name, s.lat AS lat,
                       AVG(o.tmax) AS avg_tmax, AVG(o.rain) AS avg_rain, AVG(o.sun) AS avg_sun
                FROM stations s
                JOIN observations o ON o.station_id = s.id
                GROUP BY s.id, s.name, s.lat
                ORDER BY s.lat
                "#,
                &[],
            )
            .await
    }
}
