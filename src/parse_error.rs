/// Structural failures while reading a listing page or a station file
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No table found in station listing")]
    MissingTable,
    #[error("No 'yyyy' header line found in station file")]
    MissingHeader,
    #[error("Malformed listing row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },
}
