//! Metric-ton section extraction
//!
//! A bulletin sheet holds one section per unit of measure. Only the
//! metric-ton section is read: its first row is the column header, the row
//! after it a sub-header, and every following row with an instrument code
//! a data row, until a totals row or another unit section begins.

use crate::extract::columns::{Column, ColumnMap};
use crate::extract::decoder::{CalamineDecoder, Cell, TabularDecoder};
use crate::extract::record::{derive_codes, BulletinRecord};
use crate::extract::{ExtractError, RowError};
use chrono::NaiveDate;

/// Second-column marker that opens the target section
pub const METRIC_TON_UNIT: &str = "Единица измерения: Метрическая тонна";

/// Second-column prefix shared by every unit section marker
pub const UNIT_PREFIX: &str = "Единица измерения:";

/// Second-column markers of a section totals row
pub const TOTAL_MARKERS: [&str; 2] = ["Итого:", "Total:"];

/// Position of the scan relative to the metric-ton section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Outside,
    Header,
    SubHeader,
    Inside,
}

/// Extracts bulletin records from report bytes
pub struct RecordExtractor {
    decoder: Box<dyn TabularDecoder>,
}

impl Default for RecordExtractor {
    fn default() -> Self {
        Self::new(CalamineDecoder)
    }
}

impl RecordExtractor {
    /// Creates an extractor over the given decoder
    pub fn new(decoder: impl TabularDecoder + 'static) -> Self {
        Self {
            decoder: Box::new(decoder),
        }
    }

    /// Extracts records, degrading every format error to an empty batch
    ///
    /// Never fails: HTML pages, undecodable files and missing header columns
    /// are logged and yield no records.
    pub fn extract(&self, bytes: &[u8], date: NaiveDate) -> Vec<BulletinRecord> {
        match self.try_extract(bytes, date) {
            Ok(records) => {
                tracing::info!("Extracted {} records for {}", records.len(), date);
                records
            }
            Err(e) => {
                tracing::warn!("No records extracted for {}: {}", date, e);
                Vec::new()
            }
        }
    }

    /// Extracts records, reporting why a file could not be read
    pub fn try_extract(
        &self,
        bytes: &[u8],
        date: NaiveDate,
    ) -> Result<Vec<BulletinRecord>, ExtractError> {
        if is_html(bytes) {
            return Err(ExtractError::Html);
        }

        let rows = self.decoder.decode(bytes)?;
        extract_rows(&rows, date)
    }
}

/// Returns true if the bytes look like an HTML document rather than a workbook
///
/// Leading whitespace and a UTF-8 byte order mark are ignored; the check is
/// case-insensitive.
pub fn is_html(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let head = &bytes[start..];

    [b"<!doctype".as_slice(), b"<html".as_slice()]
        .iter()
        .any(|marker| {
            head.len() >= marker.len() && head[..marker.len()].eq_ignore_ascii_case(marker)
        })
}

/// Scans decoded rows and builds the records of the metric-ton section
///
/// A header row lacking any required column makes the whole sheet
/// unreadable. Row-level problems only skip the offending row.
pub fn extract_rows(rows: &[Vec<Cell>], date: NaiveDate) -> Result<Vec<BulletinRecord>, ExtractError> {
    let mut records = Vec::new();
    let mut scan = Scan::Outside;
    let mut columns: Option<ColumnMap> = None;

    for (index, row) in rows.iter().enumerate() {
        let marker = row.get(1).and_then(Cell::as_text);

        if let Some(text) = marker {
            if text.contains(METRIC_TON_UNIT) {
                scan = Scan::Header;
                continue;
            }
            if text.contains(UNIT_PREFIX) {
                scan = Scan::Outside;
                continue;
            }
        }

        match scan {
            Scan::Outside => {}
            Scan::Header => {
                let map = ColumnMap::from_header_row(row).map_err(|missing| {
                    ExtractError::MissingColumns(
                        missing
                            .iter()
                            .map(|c| c.to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                    )
                })?;
                tracing::debug!("Header found at row {}: {:?}", index, map);
                columns = Some(map);
                scan = Scan::SubHeader;
            }
            Scan::SubHeader => {
                scan = Scan::Inside;
            }
            Scan::Inside => {
                let Some(text) = marker else {
                    continue;
                };

                if TOTAL_MARKERS.iter().any(|m| text.contains(m)) {
                    scan = Scan::Outside;
                    continue;
                }

                if text.chars().count() <= 3 {
                    continue;
                }

                let Some(map) = columns.as_ref() else {
                    continue;
                };

                match parse_row(row, map, date) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Skipping row {} of {}: {}", index, date, e);
                    }
                }
            }
        }
    }

    Ok(records)
}

/// Reads one data row; `Ok(None)` when the row has no contracts
fn parse_row(
    row: &[Cell],
    columns: &ColumnMap,
    date: NaiveDate,
) -> Result<Option<BulletinRecord>, RowError> {
    let cell = |column: Column| row.get(columns.index_of(column)).unwrap_or(&Cell::Empty);

    let count = int_field(cell(Column::Count));
    if count <= 0 {
        return Ok(None);
    }

    let volume = int_field(cell(Column::Volume));
    if volume < 0 {
        return Err(RowError::Negative {
            column: Column::Volume.header(),
            value: volume,
        });
    }

    let total = int_field(cell(Column::Total));
    if total < 0 {
        return Err(RowError::Negative {
            column: Column::Total.header(),
            value: total,
        });
    }

    let product_id = cell(Column::ProductId).to_text();
    let codes = derive_codes(&product_id)?;

    Ok(Some(BulletinRecord {
        product_id,
        product_name: cell(Column::ProductName).to_text(),
        oil_category: codes.oil_category,
        delivery_basis_id: codes.delivery_basis_id,
        delivery_basis_name: cell(Column::DeliveryBasisName).to_text(),
        delivery_type_id: codes.delivery_type_id,
        volume,
        total,
        count,
        date,
    }))
}

fn int_field(cell: &Cell) -> i64 {
    cell.to_int().unwrap_or(0)
}
