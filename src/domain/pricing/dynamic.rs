//! Dynamic pricing with a per-call multiplier.

use serde::{Deserialize, Serialize};

use super::line_item::{BillingLineItem, LineItemKind};
use super::{effective_tax, period_ratio, PricingInput, PricingStrategy};

/// `base_price * multiplier * (1 + tax_rate)`, where the multiplier is the
/// per-call override or the stored default.
///
/// Zero, negative, and very large multipliers are accepted (negative
/// multipliers are not intended for production use but must not crash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicPricing {
    pub base_price: f64,
    pub default_multiplier: f64,
    pub tax_rate: f64,
}

impl DynamicPricing {
    pub fn new(base_price: f64, default_multiplier: f64, tax_rate: f64) -> Self {
        Self {
            base_price,
            default_multiplier,
            tax_rate,
        }
    }

    fn multiplier(&self, input: &PricingInput) -> f64 {
        input.custom_multiplier.unwrap_or(self.default_multiplier)
    }
}

/// Renders the multiplier the way the adjustment line expects: whole values
/// keep one decimal ("2.0x"), fractional values print as-is ("1.25x").
fn format_multiplier(multiplier: f64) -> String {
    if multiplier.fract() == 0.0 && multiplier.abs() < 1e15 {
        format!("{:.1}", multiplier)
    } else {
        format!("{}", multiplier)
    }
}

impl PricingStrategy for DynamicPricing {
    fn calculate_price(&self, input: &PricingInput) -> f64 {
        let tax = effective_tax(self.tax_rate, input.tax_rate);
        self.base_price * self.multiplier(input) * (1.0 + tax)
    }

    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem> {
        let multiplier = self.multiplier(input);
        let mut items = vec![BillingLineItem::new(
            "Base price",
            self.base_price,
            LineItemKind::Base,
        )];

        if multiplier != 1.0 {
            items.push(BillingLineItem::new(
                format!("Price multiplier ({}x)", format_multiplier(multiplier)),
                self.base_price * (multiplier - 1.0),
                LineItemKind::Adjustment,
            ));
        }
        items
    }

    fn calculate_proration(
        &self,
        input: &PricingInput,
        days_used: u32,
        days_in_period: u32,
    ) -> f64 {
        self.base_price * self.multiplier(input) * period_ratio(days_used, days_in_period)
    }
}
