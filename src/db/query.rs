use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Sqlite, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::db::DbError;

/// Bind value for a parameterized read
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        QueryParam::Int(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        QueryParam::Float(value)
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        QueryParam::Text(value.to_string())
    }
}

/// Generic parameterized reads decoding straight into typed records
#[derive(Clone)]
pub struct QueryGateway {
    pool: SqlitePool,
}

impl QueryGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, sql, params), fields(param_count = params.len()))]
    pub async fn run_query<T>(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<T>, DbError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        if !is_read_only(sql) {
            warn!("Rejected non-read statement");
            return Err(DbError::NotReadOnly(first_line(sql)));
        }

        let mut query = sqlx::query_as::<Sqlite, T>(sql);
        for param in params {
            query = match param {
                QueryParam::Int(v) => query.bind(*v),
                QueryParam::Float(v) => query.bind(*v),
                QueryParam::Text(v) => query.bind(v.clone()),
                QueryParam::Null => query.bind(None::<i64>),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        debug!("Query returned {} rows", rows.len());
        Ok(rows)
    }
}

fn is_read_only(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    (keyword == "SELECT" || keyword == "WITH") && !sql.trim_end().trim_end_matches(';').contains(';')
}

fn first_line(sql: &str) -> String {
    sql.trim().lines().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_statements() {
        assert!(is_read_only("SELECT id FROM stations"));
        assert!(is_read_only("\n  select avg(rain) from observations where station_id = ?;"));
        assert!(is_read_only("WITH s AS (SELECT 1) SELECT * FROM s"));
    }

    #[test]
    fn test_write_statements_rejected() {
        assert!(!is_read_only("DELETE FROM stations"));
        assert!(!is_read_only("INSERT INTO stations (name) VALUES ('x')"));
        assert!(!is_read_only("SELECT 1; DROP TABLE stations"));
        assert!(!is_read_only(""));
    }

    #[test]
    fn test_param_conversions() {
        assert_eq!(QueryParam::from(3_i64), QueryParam::Int(3));
        assert_eq!(QueryParam::from(1.5_f64), QueryParam::Float(1.5));
        assert_eq!(QueryParam::from("Oxford"), QueryParam::Text("Oxford".to_string()));
    }
}
