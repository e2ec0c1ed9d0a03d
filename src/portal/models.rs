//! Data models for purchase-list rows and collected orders.

use serde::{Deserialize, Serialize};

/// Placeholder for fields that could not be read from the list.
pub const UNKNOWN: &str = "unknown";

/// One order collected during the scan pass.
///
/// `order_id` is the only field used to find the order again; the other
/// fields are captured once and reused verbatim for the filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Apple order identifier (uppercase alphanumeric, at least 10 chars)
    pub order_id: String,
    /// Purchase date as `YYYY-MM-DD`, or `unknown`
    pub date: String,
    /// Amount with `.` as decimal separator, or `unknown`
    pub amount: String,
    /// Sanitized product label, or `unknown`
    pub product_name: String,
    /// Whether the portal offers a receipt for this order
    pub has_invoice: bool,
}

/// Fields parsed from the collapsed header of a list row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSummary {
    pub order_id: Option<String>,
    pub date: String,
    pub amount: String,
}

impl RowSummary {
    /// Turns the summary into a record, if the row carried an order id.
    pub fn into_record(self, product_name: String, has_invoice: bool) -> Option<PurchaseRecord> {
        Some(PurchaseRecord {
            order_id: self.order_id?,
            date: self.date,
            amount: self.amount,
            product_name,
            has_invoice,
        })
    }
}
