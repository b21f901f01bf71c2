//! Value normalization for raw station file tokens
//!
//! Station files mark missing months with `---`, estimated values with a
//! trailing `*` and provisional values with a trailing `#`. Every token maps
//! to either a number or `None`; malformed input is never an error.
//!
//! ```
//! use historic_station_data::normalize::{normalize, Numeric, NumericKind};
//!
//! assert_eq!(normalize("12.3", NumericKind::Float), Some(Numeric::Float(12.3)));
//! assert_eq!(normalize("4*", NumericKind::Int), Some(Numeric::Int(4)));
//! assert_eq!(normalize("---", NumericKind::Float), None);
//! ```

/// Placeholder the source files use for a missing month
pub const MISSING_PLACEHOLDER: &str = "---";

/// Trailing markers: `*` estimated, `#` provisional / partial month
pub const ANNOTATION_MARKERS: [char; 2] = ['*', '#'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(&self) -> f64 {
        match self {
            Numeric::Int(v) => *v as f64,
            Numeric::Float(v) => *v,
        }
    }
}

pub fn normalize(token: &str, kind: NumericKind) -> Option<Numeric> {
    let cleaned = strip_annotation(token)?;

    match kind {
        NumericKind::Int => cleaned.parse::<i64>().ok().map(Numeric::Int),
        NumericKind::Float => cleaned
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Numeric::Float),
    }
}

pub fn normalize_int(token: &str) -> Option<i64> {
    match normalize(token, NumericKind::Int) {
        Some(Numeric::Int(v)) => Some(v),
        _ => None,
    }
}

pub fn normalize_float(token: &str) -> Option<f64> {
    normalize(token, NumericKind::Float).map(|v| v.as_f64())
}

/// Trim whitespace and annotation markers; `None` when nothing numeric could remain
fn strip_annotation(token: &str) -> Option<&str> {
    let trimmed = token.trim();
    if trimmed.is_empty() || trimmed == MISSING_PLACEHOLDER {
        return None;
    }

    let cleaned = trimmed.trim_end_matches(ANNOTATION_MARKERS).trim_end();
    if cleaned.is_empty() || cleaned == MISSING_PLACEHOLDER {
        None
    } else {
        Some(cleaned)
    }
}
