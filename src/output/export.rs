//! JSON export of a run's records

use crate::crawler::ResultRecord;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One exported record
#[derive(Debug, Serialize)]
struct ExportedRecord<'a> {
    title: &'a str,
    url: &'a str,
    snippet: &'a str,
    page: u32,
}

/// Replaces every character that is unsafe in a file name with `_`
///
/// Keeps letters (any script), digits, `-` and `_`; never returns an empty
/// string.
pub fn sanitize_file_stem(raw: &str) -> String {
    let stem: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect();

    if stem.is_empty() {
        "query".to_string()
    } else {
        stem
    }
}

/// File stem for a diagnostic capture of one page
pub fn diagnostics_stem(query: &str, page_index: u32) -> String {
    format!(
        "{}_page{}_{}",
        sanitize_file_stem(query),
        page_index,
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

/// Path of the export file for a run started at `at`
pub fn export_path(results_dir: &Path, query: &str, at: DateTime<Utc>) -> PathBuf {
    results_dir.join(format!(
        "results_{}_{}.json",
        sanitize_file_stem(query),
        at.format("%Y%m%d_%H%M%S")
    ))
}

/// Writes the records as a pretty-printed JSON array and returns the path
pub fn export_json(
    results_dir: &Path,
    query: &str,
    at: DateTime<Utc>,
    records: &[ResultRecord],
) -> Result<PathBuf, HarvestError> {
    std::fs::create_dir_all(results_dir)?;
    let path = export_path(results_dir, query, at);

    let exported: Vec<ExportedRecord<'_>> = records
        .iter()
        .map(|r| ExportedRecord {
            title: &r.title,
            url: &r.url,
            snippet: &r.snippet,
            page: r.source_page,
        })
        .collect();

    let json = serde_json::to_string_pretty(&exported)?;
    std::fs::write(&path, json)?;

    tracing::info!("Exported {} records to {}", records.len(), path.display());
    Ok(path)
}
