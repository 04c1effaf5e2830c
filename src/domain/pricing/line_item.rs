//! Billing line items.

use serde::{Deserialize, Serialize};

/// Category of a billing line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Subscription,
    Usage,
    FlatFee,
    Discount,
    Tax,
    /// Minimum/maximum clamping or multiplier adjustments.
    Adjustment,
    Base,
}

/// One line of a bill.
///
/// `amount` is signed: negative values are credits or discounts. Line items
/// are produced in display order; the pre-tax sum plus tax reconciles with
/// the strategy's total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingLineItem {
    pub description: String,
    pub amount: f64,
    pub kind: LineItemKind,
    pub quantity: Option<f64>,
}

impl BillingLineItem {
    pub fn new(description: impl Into<String>, amount: f64, kind: LineItemKind) -> Self {
        Self {
            description: description.into(),
            amount,
            kind,
            quantity: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

/// Sum of amounts, used by tests and reconciliation.
pub fn total_amount(items: &[BillingLineItem]) -> f64 {
    items.iter().map(|i| i.amount).sum()
}
