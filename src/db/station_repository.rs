use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, error, instrument};

use crate::db::{DbError, NewStation, Station};

#[derive(Clone)]
pub struct StationRepository {
    pool: SqlitePool,
}

impl StationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the station if its name is new; always returns the stored id.
    /// Metadata of an existing station is left untouched.
    #[instrument(skip(self, station), fields(name = %station.name))]
    pub async fn upsert_station(&self, station: &NewStation) -> Result<i64, DbError> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_on(&mut conn, station).await
    }

    /// Same as [`upsert_station`](Self::upsert_station), inside the caller's transaction
    #[instrument(skip(self, tx, station), fields(name = %station.name))]
    pub async fn upsert_station_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        station: &NewStation,
    ) -> Result<i64, DbError> {
        Self::upsert_on(&mut **tx, station).await
    }

    async fn upsert_on(conn: &mut SqliteConnection, station: &NewStation) -> Result<i64, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO stations (name, lon, lat, opened, data_url)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(&station.name)
        .bind(station.lon)
        .bind(station.lat)
        .bind(&station.opened)
        .bind(&station.data_url)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            error!(name = %station.name, error = %e, "Failed to insert station");
            e
        })?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM stations WHERE name = ?")
            .bind(&station.name)
            .fetch_one(&mut *conn)
            .await?;

        if result.rows_affected() > 0 {
            debug!("Created station {} with id {}", station.name, id);
        } else {
            debug!("Station {} already exists with id {}", station.name, id);
        }

        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stations")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Station>, DbError> {
        let station = sqlx::query_as::<_, Station>(
            r#"
            SELECT id, name, lon, lat, opened, data_url
            FROM stations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(station)
    }

    #[instrument(skip(self), fields(name = %name))]
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Station>, DbError> {
        let station = sqlx::query_as::<_, Station>(
            r#"
            SELECT id, name, lon, lat, opened, data_url
            FROM stations
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(station)
    }
}
