use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, error, instrument};

use crate::db::{DbError, Observation};
use crate::series::MonthlyObservation;

#[derive(Clone)]
pub struct ObservationRepository {
    pool: SqlitePool,
}

impl ObservationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the (station, year, month) record
    #[instrument(skip(self, observation), fields(year = observation.year, month = observation.month))]
    pub async fn upsert_observation(
        &self,
        station_id: i64,
        observation: &MonthlyObservation,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_on(&mut conn, station_id, observation).await
    }

    /// Upsert a station's rows in the caller's transaction; returns rows written
    #[instrument(skip(self, tx, observations), fields(count = observations.len()))]
    pub async fn upsert_observations_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        station_id: i64,
        observations: &[MonthlyObservation],
    ) -> Result<usize, DbError> {
        debug!(
            "Upserting {} observations for station {}",
            observations.len(),
            station_id
        );
        let mut written = 0;

        for observation in observations {
            Self::upsert_on(&mut **tx, station_id, observation).await?;
            written += 1;
        }

        debug!("Successfully upserted {} observations", written);
        Ok(written)
    }

    async fn upsert_on(
        conn: &mut SqliteConnection,
        station_id: i64,
        observation: &MonthlyObservation,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO observations (station_id, year, month, tmax, tmin, af, rain, sun)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (station_id, year, month) DO UPDATE SET
                tmax = excluded.tmax,
                tmin = excluded.tmin,
                af = excluded.af,
                rain = excluded.rain,
                sun = excluded.sun
            "#,
        )
        .bind(station_id)
        .bind(observation.year)
        .bind(observation.month)
        .bind(observation.tmax)
        .bind(observation.tmin)
        .bind(observation.af)
        .bind(observation.rain)
        .bind(observation.sun)
        .execute(conn)
        .await
        .map_err(|e| {
            error!(
                station_id,
                year = observation.year,
                month = observation.month,
                error = %e,
                "Failed to upsert observation"
            );
            e
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM observations")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    #[instrument(skip(self))]
    pub async fn find_by_station(&self, station_id: i64) -> Result<Vec<Observation>, DbError> {
        let observations = sqlx::query_as::<_, Observation>(
            r#"
            SELECT station_id, year, month, tmax, tmin, af, rain, sun
            FROM observations
            WHERE station_id = ?
            ORDER BY year ASC, month ASC
            "#,
        )
        .bind(station_id)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} observations", observations.len());
        Ok(observations)
    }
}
