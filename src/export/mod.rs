//! Persisting extracted listings

mod summary;
mod xlsx;

pub use summary::SummaryStats;
pub use xlsx::{DATA_SHEET, SUMMARY_SHEET, XlsxSink};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

use crate::extraction::ListingRecord;

static NON_WORD_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("static query regex"));
static SEPARATOR_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-\s]+").expect("static separator regex"));

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("No results to save")]
    Empty,

    #[error("Failed to write workbook: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which kind of exit produced the save; selects the file name marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Completed,
    Stopped,
    Emergency,
}

impl SaveKind {
    fn marker(self) -> Option<&'static str> {
        match self {
            SaveKind::Completed => None,
            SaveKind::Stopped => Some("stopped"),
            SaveKind::Emergency => Some("emergency"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub kind: SaveKind,
    pub query: Option<String>,
    pub extracted_at: DateTime<Local>,
}

/// Destination for a run's records
pub trait ResultSink {
    /// Write `records`, returning where they ended up
    fn save(&self, records: &[ListingRecord], request: &SaveRequest) -> Result<PathBuf, SinkError>;
}

/// `coffee shops, NYC!` -> `coffee_shops_NYC`
pub fn sanitize_query(query: &str) -> String {
    let kept = NON_WORD_CHARS.replace_all(query.trim(), "");
    SEPARATOR_RUNS.replace_all(&kept, "_").into_owned()
}

/// `<prefix>[_stopped|_emergency]_<query or "results">_<YYYYMMDD_HHMMSS>.xlsx`
pub fn output_file_name(prefix: &str, request: &SaveRequest) -> String {
    let mut name = prefix.to_string();

    if let Some(marker) = request.kind.marker() {
        name.push('_');
        name.push_str(marker);
    }

    let label = request
        .query
        .as_deref()
        .map(sanitize_query)
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| "results".to_string());

    format!(
        "{}_{}_{}.xlsx",
        name,
        label,
        request.extracted_at.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(kind: SaveKind, query: Option<&str>) -> SaveRequest {
        SaveRequest {
            kind,
            query: query.map(str::to_string),
            extracted_at: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
        }
    }

    #[test]
    fn query_is_sanitised() {
        assert_eq!(sanitize_query("coffee shops, NYC!"), "coffee_shops_NYC");
        assert_eq!(sanitize_query("pizza - brooklyn"), "pizza_brooklyn");
    }

    #[test]
    fn file_names_follow_exit_kind() {
        assert_eq!(
            output_file_name("google_maps", &request(SaveKind::Completed, Some("coffee shops"))),
            "google_maps_coffee_shops_20240309_140507.xlsx"
        );
        assert_eq!(
            output_file_name("google_maps", &request(SaveKind::Stopped, None)),
            "google_maps_stopped_results_20240309_140507.xlsx"
        );
        assert_eq!(
            output_file_name("cafes", &request(SaveKind::Emergency, Some("!!!"))),
            "cafes_emergency_results_20240309_140507.xlsx"
        );
    }
}
