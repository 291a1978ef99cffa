//! Bulletin record types produced by the extractor

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::extract::RowError;

/// One traded instrument line of a daily bulletin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletinRecord {
    /// Exchange instrument code, e.g. `A592BO02A`
    #[serde(rename = "exchange_product_id")]
    pub product_id: String,

    #[serde(rename = "exchange_product_name")]
    pub product_name: String,

    /// First four characters of the instrument code
    #[serde(rename = "oil_id")]
    pub oil_category: String,

    /// Characters 4..7 of the instrument code
    pub delivery_basis_id: String,

    pub delivery_basis_name: String,

    /// Last character of the delivery basis code
    pub delivery_type_id: String,

    /// Contract volume in metric tons
    pub volume: i64,

    /// Contract value in roubles
    pub total: i64,

    /// Number of contracts; always positive for emitted records
    pub count: i64,

    /// Bulletin date taken from the report link
    pub date: NaiveDate,
}

/// Codes derived from an instrument code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedCodes {
    pub oil_category: String,
    pub delivery_basis_id: String,
    pub delivery_type_id: String,
}

/// Splits an instrument code into oil category, delivery basis and delivery type
///
/// Slicing is by character, not byte. Codes shorter than seven characters
/// cannot carry a delivery basis and are rejected.
///
/// # Example
///
/// ```
/// use spimex_harvest::extract::derive_codes;
///
/// let codes = derive_codes("A592BO02A").unwrap();
/// assert_eq!(codes.oil_category, "A592");
/// assert_eq!(codes.delivery_basis_id, "BO0");
/// assert_eq!(codes.delivery_type_id, "0");
/// ```
pub fn derive_codes(product_id: &str) -> Result<DerivedCodes, RowError> {
    let chars: Vec<char> = product_id.chars().collect();
    if chars.len() < 7 {
        return Err(RowError::ShortProductId(product_id.to_string()));
    }

    let oil_category: String = chars[..4].iter().collect();
    let delivery_basis_id: String = chars[4..7].iter().collect();
    let delivery_type_id = chars[6].to_string();

    Ok(DerivedCodes {
        oil_category,
        delivery_basis_id,
        delivery_type_id,
    })
}

/// Records extracted from a single downloaded report
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// Report URL the batch was extracted from
    pub source_url: String,

    /// Bulletin date of the report
    pub date: NaiveDate,

    pub records: Vec<BulletinRecord>,
}

impl RecordBatch {
    pub fn new(source_url: impl Into<String>, date: NaiveDate, records: Vec<BulletinRecord>) -> Self {
        Self {
            source_url: source_url.into(),
            date,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
