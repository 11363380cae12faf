//! Worksheet file loading and snapshots.

mod json;

pub use json::{FormulaEntry, Snapshot, WorksheetFile, parse_worksheet, parse_worksheet_content};
