#![allow(dead_code)]

use historic_station_data::db;
use sqlx::SqlitePool;

/// Fresh in-memory database with the schema applied
pub async fn test_pool() -> SqlitePool {
    let pool = db::connect_in_memory()
        .await
        .expect("Failed to open in-memory database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Listing page with one table row per (name, "lon, lat", opened, href)
pub fn listing_html(rows: &[(&str, &str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(name, location, opened, href)| {
            format!(
                "<tr><td>{name}</td><td>{location}</td><td>{opened}</td>\
                 <td><a href=\"{href}\">View data</a></td></tr>\n"
            )
        })
        .collect();

    format!(
        r#"<html><body>
<h1>Historic station data</h1>
<table>
<thead><tr><th>Name</th><th>Location</th><th>Opened</th><th>Data</th></tr></thead>
<tbody>
{body}</tbody>
</table>
</body></html>"#
    )
}

/// Station file in the published fixed-width layout
pub fn station_document(name: &str, data_rows: &[&str]) -> String {
    let mut doc = format!(
        "{name}\n\
         Location 450900E 207200N, Lat 51.761 Lon -1.262, 63 metres amsl\n\
         Estimated data is marked with a * after the value.\n\
         Missing data (more than 2 days missing in month) is marked by  ---.\n\
         \x20  yyyy  mm   tmax    tmin      af    rain     sun\n\
         \x20             degC    degC    days      mm   hours\n"
    );
    for row in data_rows {
        doc.push_str(row);
        doc.push('\n');
    }
    doc
}
