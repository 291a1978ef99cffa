//! Bulletin extraction
//!
//! Turns a downloaded report into [`BulletinRecord`]s. The report is inspected
//! for HTML first, then decoded into a cell grid by a [`TabularDecoder`],
//! and finally scanned for the metric-ton section.

mod columns;
mod decoder;
mod extractor;
mod record;

pub use columns::{Column, ColumnDescriptor, ColumnKind, ColumnMap};
pub use decoder::{CalamineDecoder, Cell, TabularDecoder};
pub use extractor::{
    extract_rows, is_html, RecordExtractor, METRIC_TON_UNIT, TOTAL_MARKERS, UNIT_PREFIX,
};
pub use record::{derive_codes, BulletinRecord, DerivedCodes, RecordBatch};

use thiserror::Error;

/// Reasons a whole report yields no records
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Response is an HTML page, not a spreadsheet")]
    Html,

    #[error("Failed to decode spreadsheet: {0}")]
    Decode(String),

    #[error("Section header is missing columns: {0}")]
    MissingColumns(String),
}

/// Reasons a single data row is skipped
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("Negative value {value} in column '{column}'")]
    Negative { column: &'static str, value: i64 },

    #[error("Instrument code '{0}' is shorter than 7 characters")]
    ShortProductId(String),
}
