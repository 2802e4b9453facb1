//! Output module for run exports and reports
//!
//! This module handles:
//! - Exporting a run's records as a JSON file
//! - Naming diagnostic captures
//! - Printing run summaries and store statistics

mod export;
pub mod stats;

pub use export::{diagnostics_stem, export_json, export_path, sanitize_file_stem};
pub use stats::{load_statistics, print_statistics, print_summary, StoreStatistics};
