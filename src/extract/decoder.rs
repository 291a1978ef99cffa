//! Tabular decoding seam
//!
//! The extractor only needs a grid of cells; how the grid is obtained from
//! report bytes is hidden behind [`TabularDecoder`]. The production decoder
//! reads the first worksheet of an xls/xlsx workbook with calamine.

use crate::extract::ExtractError;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

/// A decoded spreadsheet cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Returns the raw text for text cells
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Float-tolerant integer coercion
    ///
    /// Numbers are truncated toward zero; text is parsed as a float first so
    /// `"12.0"` reads as 12. Returns `None` for anything non-numeric.
    pub fn to_int(&self) -> Option<i64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Empty | Self::Bool(_) => return None,
        };

        if value.is_finite() {
            Some(value.trunc() as i64)
        } else {
            None
        }
    }

    /// Trimmed string form; integral numbers render without a fractional part
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Turns report bytes into rows of cells
pub trait TabularDecoder: Send + Sync {
    /// Decodes the first sheet of a report into rows
    ///
    /// Row and column positions must be absolute: leading empty columns are
    /// kept so that index 1 is always the second column of the sheet.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ExtractError>;
}

/// Spreadsheet decoder backed by calamine (xls, xlsx, ods)
#[derive(Debug, Default, Clone, Copy)]
pub struct CalamineDecoder;

impl TabularDecoder for CalamineDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ExtractError> {
        let cursor = Cursor::new(bytes.to_vec());
        let mut workbook = open_workbook_auto_from_rs(cursor)
            .map_err(|e| ExtractError::Decode(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ExtractError::Decode("workbook has no worksheets".to_string()))?
            .map_err(|e| ExtractError::Decode(e.to_string()))?;

        // calamine ranges start at the first used cell
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));

        let mut rows: Vec<Vec<Cell>> = (0..row_offset).map(|_| Vec::new()).collect();
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; col_offset as usize];
            cells.extend(row.iter().map(Cell::from));
            rows.push(cells);
        }

        Ok(rows)
    }
}
