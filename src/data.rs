//! Transaction loading using Polars and customer-identity filtering

use anyhow::Context;
use polars::prelude::*;
use std::io::{Cursor, Read};
use std::path::Path;

/// Column holding the customer identity
pub const CUSTOMER_COLUMN: &str = "CustomerID";
/// Column holding the product code
pub const PRODUCT_COLUMN: &str = "StockCode";
/// Column holding the purchased quantity
pub const QUANTITY_COLUMN: &str = "Quantity";
/// Column holding the price per unit
pub const PRICE_COLUMN: &str = "UnitPrice";

/// Default field separator of the retail export files
pub const DEFAULT_DELIMITER: u8 = b';';

/// One raw line item, numeric fields still as text
///
/// Quantity and unit price are kept unparsed because exports mix `.` and `,`
/// as decimal separator; the feature aggregator normalizes them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionRow {
    pub customer_id: String,
    pub product_code: String,
    pub quantity: String,
    pub unit_price: String,
}

impl TransactionRow {
    pub fn new(
        customer_id: impl Into<String>,
        product_code: impl Into<String>,
        quantity: impl Into<String>,
        unit_price: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            product_code: product_code.into(),
            quantity: quantity.into(),
            unit_price: unit_price.into(),
        }
    }

    /// Whether the row carries a customer identity
    pub fn has_customer(&self) -> bool {
        !self.customer_id.trim().is_empty()
    }
}

/// Load transaction rows from a delimited file
///
/// # Arguments
/// * `file_path` - Path to the CSV file (ISO-8859-1 encoded)
/// * `delimiter` - Field separator, `;` for the retail exports
///
/// # Returns
/// * Rows in file order, every column read as text
pub fn load_transactions(
    file_path: impl AsRef<Path>,
    delimiter: u8,
) -> crate::Result<Vec<TransactionRow>> {
    let path = file_path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_transactions(file, delimiter)
        .with_context(|| format!("failed to read transactions from {}", path.display()))
}

/// Read transaction rows from any byte source
pub fn read_transactions<R: Read>(mut reader: R, delimiter: u8) -> crate::Result<Vec<TransactionRow>> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let text = decode_latin1(&raw);

    // Schema inference over zero rows keeps every column as String
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_separator(delimiter))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()?;

    let customers = text_column(&df, CUSTOMER_COLUMN)?;
    let products = text_column(&df, PRODUCT_COLUMN)?;
    let quantities = text_column(&df, QUANTITY_COLUMN)?;
    let prices = text_column(&df, PRICE_COLUMN)?;

    let rows = customers
        .into_iter()
        .zip(products)
        .zip(quantities)
        .zip(prices)
        .map(|(((customer_id, product_code), quantity), unit_price)| TransactionRow {
            customer_id,
            product_code,
            quantity,
            unit_price,
        })
        .collect();

    Ok(rows)
}

/// Keep only rows that carry a customer identity, preserving order
pub fn filter_rows(rows: &[TransactionRow]) -> Vec<TransactionRow> {
    rows.iter().filter(|row| row.has_customer()).cloned().collect()
}

/// Extract a column as owned strings, nulls becoming empty
fn text_column(df: &DataFrame, name: &str) -> crate::Result<Vec<String>> {
    let values = df
        .column(name)
        .with_context(|| format!("missing required column {name}"))?
        .str()
        .with_context(|| format!("column {name} is not text"))?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

/// ISO-8859-1 maps every byte to the Unicode code point of the same value
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
