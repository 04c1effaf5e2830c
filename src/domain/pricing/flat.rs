//! Flat subscription pricing.

use serde::{Deserialize, Serialize};

use super::line_item::{BillingLineItem, LineItemKind};
use super::{effective_tax, format_units, period_ratio, PricingInput, PricingStrategy};

/// Flat recurring price: `base_price * quantity * (1 + tax_rate)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatPricing {
    pub base_price: f64,
    pub tax_rate: f64,
}

impl FlatPricing {
    pub fn new(base_price: f64, tax_rate: f64) -> Self {
        Self {
            base_price,
            tax_rate,
        }
    }
}

impl PricingStrategy for FlatPricing {
    fn calculate_price(&self, input: &PricingInput) -> f64 {
        let tax = effective_tax(self.tax_rate, input.tax_rate);
        self.base_price * input.quantity as f64 * (1.0 + tax)
    }

    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem> {
        let subtotal = self.base_price * input.quantity as f64;
        vec![BillingLineItem::new(
            format!("Subscription ({} units)", format_units(input.quantity as f64)),
            subtotal,
            LineItemKind::Subscription,
        )
        .with_quantity(input.quantity as f64)]
    }

    fn calculate_proration(
        &self,
        input: &PricingInput,
        days_used: u32,
        days_in_period: u32,
    ) -> f64 {
        self.base_price * input.quantity as f64 * period_ratio(days_used, days_in_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_applies_quantity_and_tax() {
        let pricing = FlatPricing::new(66.0, 0.2);
        let price = pricing.calculate_price(&PricingInput::new());
        assert!((price - 79.2).abs() < 1e-9);
    }

    #[test]
    fn per_call_tax_override_does_not_mutate() {
        let pricing = FlatPricing::new(100.0, 0.1);
        let overridden =
            pricing.calculate_price(&PricingInput::new().with_tax_rate(0.25));
        assert!((overridden - 125.0).abs() < 1e-9);

        // Default rate still in effect afterwards.
        let default = pricing.calculate_price(&PricingInput::new());
        assert!((default - 110.0).abs() < 1e-9);
    }

    #[test]
    fn proration_is_linear_in_days() {
        let pricing = FlatPricing::new(30.0, 0.1);
        let half = pricing.calculate_proration(&PricingInput::new(), 15, 30);
        assert!((half - 15.0).abs() < 1e-9);
        assert_eq!(pricing.calculate_proration(&PricingInput::new(), 5, 0), 0.0);
    }

    #[test]
    fn billing_items_reconcile_with_total() {
        let pricing = FlatPricing::new(20.0, 0.1);
        let input = PricingInput::new().with_quantity(2);
        let items = pricing.billing_items(&input);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Subscription (2 units)");

        let pre_tax: f64 = items.iter().map(|i| i.amount).sum();
        let total = pricing.calculate_price(&input);
        assert!((pre_tax * 1.1 - total).abs() < 1e-9);
    }
}
