//! Per-customer feature aggregation
//!
//! Folds filtered transaction rows into one [`CustomerFeatures`] per customer:
//! total spend, number of purchases and number of distinct products.

use crate::data::TransactionRow;
use crate::error::RowError;
use log::warn;
use ndarray::Array2;
use std::collections::{HashMap, HashSet};

/// Number of clustering dimensions per customer
pub const FEATURE_DIM: usize = 3;

/// Display names of the clustering dimensions, in column order
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = ["Total Spent", "Total Purchases", "Unique Products"];

/// Aggregated behaviour of one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerFeatures {
    pub customer_id: String,
    /// Sum of quantity * unit price over all accepted rows
    pub total_spent: f64,
    /// Number of accepted rows
    pub purchase_count: usize,
    /// Number of distinct product codes among accepted rows
    pub distinct_product_count: usize,
    /// Set by [`crate::model::attach_clusters`] after fitting
    pub cluster_id: Option<usize>,
}

impl CustomerFeatures {
    /// Clustering coordinates in [`FEATURE_NAMES`] order
    pub fn as_point(&self) -> [f64; FEATURE_DIM] {
        [
            self.total_spent,
            self.purchase_count as f64,
            self.distinct_product_count as f64,
        ]
    }
}

/// Row counters of one aggregation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub rows_seen: usize,
    pub rows_accumulated: usize,
    pub rows_skipped: usize,
}

/// Output of [`aggregate_features`]
#[derive(Debug, Clone)]
pub struct CustomerData {
    /// One entry per customer, in order of first accepted row
    pub customers: Vec<CustomerFeatures>,
    pub stats: AggregationStats,
}

impl CustomerData {
    /// Feature matrix with one row per customer, aligned with `customers`
    pub fn feature_matrix(&self) -> Array2<f64> {
        feature_matrix(&self.customers)
    }
}

#[derive(Default)]
struct Accumulator {
    total_spent: f64,
    purchase_count: usize,
    products: HashSet<String>,
}

/// Fold filtered rows into per-customer features
///
/// Rows whose quantity or unit price does not parse are logged and skipped.
/// A customer is only created by a row that parses, so customers without
/// any valid row are absent from the result.
pub fn aggregate_features(rows: &[TransactionRow]) -> CustomerData {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    let mut accumulators: Vec<Accumulator> = Vec::new();
    let mut stats = AggregationStats::default();

    for row in rows {
        stats.rows_seen += 1;

        let line_total = match line_total(row) {
            Ok(total) => total,
            Err(err) => {
                warn!(
                    "skipping row for customer {} product {}: {}",
                    row.customer_id, row.product_code, err
                );
                stats.rows_skipped += 1;
                continue;
            }
        };

        let slot = *index.entry(row.customer_id.as_str()).or_insert_with(|| {
            order.push(row.customer_id.as_str());
            accumulators.push(Accumulator::default());
            accumulators.len() - 1
        });

        let acc = &mut accumulators[slot];
        acc.total_spent += line_total;
        acc.purchase_count += 1;
        acc.products.insert(row.product_code.clone());
        stats.rows_accumulated += 1;
    }

    let customers = order
        .into_iter()
        .zip(accumulators)
        .map(|(customer_id, acc)| CustomerFeatures {
            customer_id: customer_id.to_string(),
            total_spent: acc.total_spent,
            purchase_count: acc.purchase_count,
            distinct_product_count: acc.products.len(),
            cluster_id: None,
        })
        .collect();

    CustomerData { customers, stats }
}

/// Build the N x 3 clustering matrix
pub fn feature_matrix(customers: &[CustomerFeatures]) -> Array2<f64> {
    let mut matrix = Array2::zeros((customers.len(), FEATURE_DIM));
    for (mut row, customer) in matrix.outer_iter_mut().zip(customers) {
        for (cell, value) in row.iter_mut().zip(customer.as_point()) {
            *cell = value;
        }
    }
    matrix
}

/// Parse a decimal that may use `,` as its separator
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, RowError> {
    let normalized = raw.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RowError::InvalidNumber {
            field,
            value: raw.to_string(),
        }),
    }
}

fn line_total(row: &TransactionRow) -> Result<f64, RowError> {
    let quantity = parse_decimal("Quantity", &row.quantity)?;
    let unit_price = parse_decimal("UnitPrice", &row.unit_price)?;
    Ok(quantity * unit_price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(customer: &str, product: &str, quantity: &str, price: &str) -> TransactionRow {
        TransactionRow::new(customer, product, quantity, price)
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("UnitPrice", "3,50").unwrap(), 3.5);
        assert_eq!(parse_decimal("UnitPrice", " 10.00 ").unwrap(), 10.0);
        assert_eq!(parse_decimal("Quantity", "-2").unwrap(), -2.0);
        assert!(parse_decimal("Quantity", "").is_err());
        assert!(parse_decimal("Quantity", "1.234,56").is_err());
        assert!(parse_decimal("Quantity", "NaN").is_err());
        assert!(parse_decimal("Quantity", "inf").is_err());
    }

    #[test]
    fn test_aggregate_mixed_separators() {
        let rows = vec![row("A", "P1", "2", "3,50"), row("A", "P2", "1", "10.00")];

        let data = aggregate_features(&rows);
        assert_eq!(data.customers.len(), 1);

        let a = &data.customers[0];
        assert_eq!(a.customer_id, "A");
        assert!((a.total_spent - 17.0).abs() < 1e-12);
        assert_eq!(a.purchase_count, 2);
        assert_eq!(a.distinct_product_count, 2);
        assert_eq!(a.cluster_id, None);
    }

    #[test]
    fn test_duplicate_products_collapse() {
        let rows = vec![
            row("A", "P1", "1", "1"),
            row("A", "P1", "2", "1"),
            row("A", "P2", "1", "1"),
        ];

        let data = aggregate_features(&rows);
        let a = &data.customers[0];
        assert_eq!(a.purchase_count, 3);
        assert_eq!(a.distinct_product_count, 2);
        assert!(a.distinct_product_count <= a.purchase_count);
    }

    #[test]
    fn test_unparseable_rows_are_skipped() {
        let rows = vec![
            row("A", "P1", "2", "1,00"),
            row("A", "P2", "two", "1,00"),
            row("A", "P3", "1", ""),
        ];

        let data = aggregate_features(&rows);
        let a = &data.customers[0];
        assert_eq!(a.purchase_count, 1);
        assert_eq!(a.distinct_product_count, 1);
        assert!((a.total_spent - 2.0).abs() < 1e-12);
        assert_eq!(
            data.stats,
            AggregationStats {
                rows_seen: 3,
                rows_accumulated: 1,
                rows_skipped: 2,
            }
        );
    }

    #[test]
    fn test_customer_with_only_invalid_rows_is_omitted() {
        let rows = vec![
            row("A", "P1", "x", "1"),
            row("B", "P1", "1", "4"),
            row("A", "P2", "1", "y"),
        ];

        let data = aggregate_features(&rows);
        let ids: Vec<&str> = data.customers.iter().map(|c| c.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["B"]);
    }

    #[test]
    fn test_order_follows_first_accepted_row() {
        let rows = vec![
            row("C", "P1", "1", "1"),
            row("A", "P1", "1", "1"),
            row("C", "P2", "1", "1"),
            row("B", "P1", "1", "1"),
        ];

        let data = aggregate_features(&rows);
        let ids: Vec<&str> = data.customers.iter().map(|c| c.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_feature_matrix_layout() {
        let rows = vec![
            row("A", "P1", "2", "3,50"),
            row("A", "P2", "1", "10.00"),
            row("B", "P1", "4", "1"),
        ];

        let matrix = aggregate_features(&rows).feature_matrix();
        assert_eq!(matrix.shape(), &[2, FEATURE_DIM]);
        assert!((matrix[[0, 0]] - 17.0).abs() < 1e-12);
        assert_eq!(matrix[[0, 1]], 2.0);
        assert_eq!(matrix[[0, 2]], 2.0);
        assert_eq!(matrix.row(1).to_vec(), vec![4.0, 1.0, 1.0]);
    }
}
