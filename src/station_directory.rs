use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::parse_error::ParseError;

/// How a malformed listing row is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DirectoryMode {
    /// Any malformed row fails the whole directory pass
    #[default]
    Strict,
    /// Malformed rows are logged and skipped
    BestEffort,
}

// Note: this is the scraped listing row (before being persisted).
// The DB model Station (in db/models.rs) carries the generated id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStationRecord {
    pub name: String,
    /// Combined "longitude, latitude" cell as published
    pub location: String,
    pub longitude: f64,
    pub latitude: f64,
    pub opened: String,
    pub link: String,
}

/// Parse the station listing page in document order
#[instrument(skip(html), fields(html_size = html.len()))]
pub fn extract_directory(html: &str, mode: DirectoryMode) -> Result<Vec<RawStationRecord>, ParseError> {
    debug!("Parsing station listing HTML");
    let document = Html::parse_document(html);
    let table_selector = Selector::parse("table").unwrap();
    let header_selector = Selector::parse("thead th").unwrap();
    let row_selector = Selector::parse("tbody > tr").unwrap();

    let table = document.select(&table_selector).next().ok_or_else(|| {
        warn!("No table element found in station listing");
        ParseError::MissingTable
    })?;

    let headers: Vec<String> = table.select(&header_selector).map(cell_text).collect();
    debug!("Listing columns: {:?}", headers);

    let mut records = Vec::new();
    let mut skipped_rows = 0;

    for (idx, row) in table.select(&row_selector).enumerate() {
        let row_number = idx + 1;
        let cells: Vec<ElementRef> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect();

        // Header-style rows carry only <th> cells
        if cells.is_empty() {
            debug!("Row {} has no data cells, skipping", row_number);
            continue;
        }

        match parse_row(row_number, &cells) {
            Ok(record) => {
                debug!("Parsed station row {}: {}", row_number, record.name);
                records.push(record);
            }
            Err(e) if mode == DirectoryMode::BestEffort => {
                warn!("Skipping listing row: {}", e);
                skipped_rows += 1;
            }
            Err(e) => {
                warn!("Aborting directory pass: {}", e);
                return Err(e);
            }
        }
    }

    if skipped_rows > 0 {
        warn!("Skipped {} malformed listing rows", skipped_rows);
    }
    debug!("Successfully parsed {} stations", records.len());

    Ok(records)
}

fn parse_row(row: usize, cells: &[ElementRef]) -> Result<RawStationRecord, ParseError> {
    // Expected cells: name | "lon, lat" | opened | <a href="...">data</a>
    if cells.len() < 4 {
        return Err(ParseError::MalformedRow {
            row,
            reason: format!("expected 4 cells, found {}", cells.len()),
        });
    }

    let name = cell_text(cells[0]);
    if name.is_empty() {
        return Err(ParseError::MalformedRow {
            row,
            reason: "empty station name".to_string(),
        });
    }

    let location = cell_text(cells[1]);
    let (longitude, latitude) = parse_location(&location).map_err(|reason| {
        ParseError::MalformedRow {
            row,
            reason: format!("{name}: {reason}"),
        }
    })?;

    let opened = cell_text(cells[2]);

    let anchor_selector = Selector::parse("a[href]").unwrap();
    let link = cells[3]
        .select(&anchor_selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .ok_or_else(|| ParseError::MalformedRow {
            row,
            reason: format!("{name}: no data link"),
        })?;

    Ok(RawStationRecord {
        name,
        location,
        longitude,
        latitude,
        opened,
        link,
    })
}

/// Split "lon, lat" into its two coordinates
pub fn parse_location(value: &str) -> Result<(f64, f64), String> {
    let mut parts = value.split(',').map(str::trim);

    let (Some(lon), Some(lat), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("location '{value}' is not 'longitude, latitude'"));
    };

    let longitude = lon
        .parse::<f64>()
        .map_err(|e| format!("invalid longitude '{lon}': {e}"))?;
    let latitude = lat
        .parse::<f64>()
        .map_err(|e| format!("invalid latitude '{lat}': {e}"))?;

    Ok((longitude, latitude))
}

/// Element text with whitespace runs collapsed
fn cell_text(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
