//! Station observation file parsing
//!
//! A station file is free text with one embedded fixed-width table:
//!
//! ```text
//! Oxford
//! Location 450900E 207200N, Lat 51.761 Lon -1.262, 63 metres amsl
//! Estimated data is marked with a * after the value.
//!    yyyy  mm   tmax    tmin      af    rain     sun
//!               degC    degC    days      mm   hours
//!    1853   1    8.4     2.7       4    62.8     ---
//!    2020   3   11.4     3.2       3    38.0   158.0#  Provisional
//! Site closed
//! ```
//!
//! The table starts at the line whose first token is `yyyy`, the line after
//! it holds units, and data rows run while the first token is a 4-digit year.
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::normalize::{normalize_float, normalize_int, ANNOTATION_MARKERS};
use crate::parse_error::ParseError;

pub const YEAR_COLUMN: &str = "yyyy";
pub const MONTH_COLUMN: &str = "mm";

/// One table row before type coercion
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeriesRow {
    /// 1-based line number in the source document
    pub line: usize,
    pub year: String,
    pub month: String,
    /// Remaining named columns (`tmax`, `tmin`, `af`, `rain`, `sun`, ...)
    pub values: BTreeMap<String, String>,
}

impl RawSeriesRow {
    /// Raw cell text; empty when the station has no such column
    pub fn value(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }

    /// Typed monthly record, or `None` when the row has no usable year/month
    pub fn normalize(&self) -> Option<MonthlyObservation> {
        let year = normalize_int(&self.year).and_then(|y| i32::try_from(y).ok())?;
        let month = normalize_int(&self.month)
            .and_then(|m| i32::try_from(m).ok())
            .filter(|m| (1..=12).contains(m))?;

        Some(MonthlyObservation {
            year,
            month,
            tmax: normalize_float(self.value("tmax")),
            tmin: normalize_float(self.value("tmin")),
            af: normalize_int(self.value("af")),
            rain: normalize_float(self.value("rain")),
            sun: normalize_float(self.value("sun")),
        })
    }
}

/// Normalized monthly climate summary for one station
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyObservation {
    pub year: i32,
    pub month: i32,
    pub tmax: Option<f64>,
    pub tmin: Option<f64>,
    pub af: Option<i64>,
    pub rain: Option<f64>,
    pub sun: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitePosition {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: Option<i32>,
}

/// Everything in the document that is not a data row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesMetadata {
    pub preamble: Vec<String>,
    pub header: String,
    pub columns: Vec<String>,
    pub units: Option<String>,
    /// Commentary after the table, e.g. "Site closed"
    pub trailer: Vec<String>,
    pub site: Option<SitePosition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationSeries {
    pub rows: Vec<RawSeriesRow>,
    pub metadata: SeriesMetadata,
}

/// Locate and slice the observation table of a station document
#[instrument(skip(raw_document), fields(doc_size = raw_document.len()))]
pub fn extract_series(raw_document: &str) -> Result<StationSeries, ParseError> {
    let lines: Vec<&str> = raw_document.lines().collect();

    let header_idx = lines
        .iter()
        .position(|line| line.split_whitespace().next() == Some(YEAR_COLUMN))
        .ok_or_else(|| {
            warn!("No '{}' header line found in station document", YEAR_COLUMN);
            ParseError::MissingHeader
        })?;

    let header = lines[header_idx];
    let columns: Vec<String> = header.split_whitespace().map(str::to_string).collect();
    debug!("Found header at line {}: {:?}", header_idx + 1, columns);

    // The units line is optional in practice: some files go straight to data
    let (units, data_start) = match lines.get(header_idx + 1) {
        Some(next) if !starts_with_year(next) => (Some(next.trim().to_string()), header_idx + 2),
        _ => (None, header_idx + 1),
    };

    let mut data: Vec<(usize, &str)> = Vec::new();
    let mut table_end = lines.len();
    for (idx, line) in lines.iter().enumerate().skip(data_start) {
        if line.trim().is_empty() {
            continue;
        }
        if starts_with_year(line) {
            data.push((idx, line));
        } else {
            debug!("Table ends at line {}: {}", idx + 1, line.trim());
            table_end = idx;
            break;
        }
    }

    let data_lines: Vec<&str> = data.iter().map(|(_, line)| *line).collect();
    let layout = ColumnLayout::infer(header, &data_lines);
    debug!(
        "Using {} layout for {} data rows",
        if layout.is_fixed_width() { "fixed-width" } else { "header-aligned" },
        data.len()
    );

    let rows: Vec<RawSeriesRow> = data
        .iter()
        .map(|(idx, line)| layout.split_row(*idx + 1, line))
        .collect();

    let preamble = non_blank(&lines[..header_idx]);
    let trailer = non_blank(&lines[table_end.min(lines.len())..]);
    let site = parse_site_position(&preamble);

    Ok(StationSeries {
        rows,
        metadata: SeriesMetadata {
            preamble,
            header: header.trim().to_string(),
            columns,
            units,
            trailer,
            site,
        },
    })
}

fn starts_with_year(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .map(|token| token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn non_blank(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnSpan {
    name: String,
    start: usize,
    end: usize,
}

/// How data rows are cut into named cells
#[derive(Debug, Clone, PartialEq)]
enum ColumnLayout {
    /// Character spans shared by the header and every data row
    FixedWidth(Vec<ColumnSpan>),
    /// Header labels only; each column is right-aligned and ends where its label ends
    HeaderAligned(Vec<ColumnSpan>),
}

impl ColumnLayout {
    /// Spans are the maximal runs of character positions that are non-blank in
    /// at least one of the header/data lines. Each header label must land in a
    /// span of its own; otherwise cells are cut at the label edges alone.
    fn infer(header: &str, data_lines: &[&str]) -> Self {
        let labels: Vec<ColumnSpan> = positioned_tokens(header)
            .into_iter()
            .map(|(start, end, name)| ColumnSpan { name, start, end })
            .collect();

        let grid: Vec<Vec<char>> = std::iter::once(header)
            .chain(data_lines.iter().copied())
            .map(|line| line.chars().collect())
            .collect();
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);

        let occupied: Vec<bool> = (0..width)
            .map(|col| {
                grid.iter()
                    .any(|line| line.get(col).is_some_and(|c| !c.is_whitespace()))
            })
            .collect();

        let header_chars = &grid[0];
        let mut spans = Vec::new();
        let mut col = 0;
        while col < width {
            if !occupied[col] {
                col += 1;
                continue;
            }
            let start = col;
            while col < width && occupied[col] {
                col += 1;
            }
            let label: String = header_chars
                .iter()
                .skip(start)
                .take(col - start)
                .collect::<String>();
            let label = label.trim();

            // Unlabelled spans hold row notes such as "Provisional"
            if label.is_empty() {
                continue;
            }
            if label.split_whitespace().count() > 1 {
                return ColumnLayout::HeaderAligned(labels);
            }
            spans.push(ColumnSpan {
                name: label.to_string(),
                start,
                end: col,
            });
        }

        if spans.len() == labels.len() {
            ColumnLayout::FixedWidth(spans)
        } else {
            ColumnLayout::HeaderAligned(labels)
        }
    }

    fn is_fixed_width(&self) -> bool {
        matches!(self, ColumnLayout::FixedWidth(_))
    }

    fn split_row(&self, line_number: usize, line: &str) -> RawSeriesRow {
        let mut cells: BTreeMap<String, String> = match self {
            ColumnLayout::FixedWidth(spans) => {
                let chars: Vec<char> = line.chars().collect();
                spans
                    .iter()
                    .map(|span| {
                        let cell: String = chars
                            .iter()
                            .skip(span.start)
                            .take(span.end - span.start)
                            .collect();
                        (span.name.clone(), cell.trim().to_string())
                    })
                    .collect()
            }
            ColumnLayout::HeaderAligned(labels) => {
                let mut cells: BTreeMap<String, String> = labels
                    .iter()
                    .map(|label| (label.name.clone(), String::new()))
                    .collect();

                for (_, end, token) in positioned_tokens(line) {
                    // Annotation markers trail the value past the column edge
                    let markers = token.chars().count()
                        - token.trim_end_matches(ANNOTATION_MARKERS).chars().count();
                    let anchor = end - markers;

                    // Past the last label: row notes such as "Provisional"
                    let Some(label) = labels.iter().find(|label| anchor <= label.end) else {
                        continue;
                    };

                    let cell = cells.entry(label.name.clone()).or_default();
                    if !cell.is_empty() {
                        warn!(
                            "Line {}: '{}' and '{}' both fall under '{}'",
                            line_number, cell, token, label.name
                        );
                        cell.push(' ');
                    }
                    cell.push_str(&token);
                }
                cells
            }
        };

        RawSeriesRow {
            line: line_number,
            year: cells.remove(YEAR_COLUMN).unwrap_or_default(),
            month: cells.remove(MONTH_COLUMN).unwrap_or_default(),
            values: cells,
        }
    }
}

/// Non-blank runs of a line with their char start and exclusive end
fn positioned_tokens(line: &str) -> Vec<(usize, usize, String)> {
    let mut tokens = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (idx, c) in line.chars().enumerate() {
        if c.is_whitespace() {
            if let Some((start, text)) = current.take() {
                tokens.push((start, idx, text));
            }
        } else {
            current.get_or_insert_with(|| (idx, String::new())).1.push(c);
        }
    }
    if let Some((start, text)) = current {
        let end = start + text.chars().count();
        tokens.push((start, end, text));
    }

    tokens
}

fn site_regexes() -> &'static (Regex, Regex) {
    static REGEXES: OnceLock<(Regex, Regex)> = OnceLock::new();
    REGEXES.get_or_init(|| {
        (
            Regex::new(r"(?i)\blat\s*:?\s*(-?\d+(?:\.\d+)?)\s*,?\s*lon\s*:?\s*(-?\d+(?:\.\d+)?)")
                .unwrap(),
            Regex::new(r"(?i)(\d+)\s*(?:m|metres|meters)\s+amsl").unwrap(),
        )
    })
}

/// Position quoted in a preamble line like "Lat 51.761 Lon -1.262, 63 metres amsl"
fn parse_site_position(preamble: &[String]) -> Option<SitePosition> {
    let (position_re, elevation_re) = site_regexes();

    preamble.iter().find_map(|line| {
        let caps = position_re.captures(line)?;
        let latitude = caps[1].parse::<f64>().ok()?;
        let longitude = caps[2].parse::<f64>().ok()?;
        let elevation_m = elevation_re
            .captures(line)
            .and_then(|c| c[1].parse::<i32>().ok());

        Some(SitePosition {
            latitude,
            longitude,
            elevation_m,
        })
    })
}
