//! Hybrid subscription + usage pricing.

use serde::{Deserialize, Serialize};

use super::line_item::{BillingLineItem, LineItemKind};
use super::{effective_tax, format_units, period_ratio, PricingInput, PricingStrategy};

/// Combined recurring and metered price:
/// `(base_price * quantity + usage * usage_rate) * (1 + tax_rate)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridPricing {
    pub base_price: f64,
    pub usage_rate: f64,
    pub tax_rate: f64,
}

impl HybridPricing {
    pub fn new(base_price: f64, usage_rate: f64, tax_rate: f64) -> Self {
        Self {
            base_price,
            usage_rate,
            tax_rate,
        }
    }
}

impl PricingStrategy for HybridPricing {
    fn calculate_price(&self, input: &PricingInput) -> f64 {
        let tax = effective_tax(self.tax_rate, input.tax_rate);
        let subtotal = self.base_price * input.quantity as f64 + input.usage * self.usage_rate;
        subtotal * (1.0 + tax)
    }

    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem> {
        let mut items = Vec::new();
        if input.quantity > 0 {
            items.push(
                BillingLineItem::new(
                    format!("Subscription ({} units)", format_units(input.quantity as f64)),
                    self.base_price * input.quantity as f64,
                    LineItemKind::Subscription,
                )
                .with_quantity(input.quantity as f64),
            );
        }
        if input.usage > 0.0 {
            items.push(
                BillingLineItem::new(
                    format!("Usage ({} units)", format_units(input.usage)),
                    input.usage * self.usage_rate,
                    LineItemKind::Usage,
                )
                .with_quantity(input.usage),
            );
        }
        items
    }

    /// Only the subscription component prorates; usage is billed as metered.
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
    fn base_subscription_with_tax() {
        let pricing = HybridPricing::new(20.0, 0.0, 0.1);
        let price = pricing.calculate_price(&PricingInput::new());
        assert!((price - 22.0).abs() < 1e-9);
    }

    #[test]
    fn subscription_plus_usage() {
        let pricing = HybridPricing::new(20.0, 1.0, 0.1);
        let price = pricing.calculate_price(&PricingInput::new().with_usage(5.0));
        assert!((price - 27.5).abs() < 1e-9);
    }

    #[test]
    fn multiple_subscription_units() {
        let pricing = HybridPricing::new(20.0, 0.0, 0.1);
        let price = pricing.calculate_price(&PricingInput::new().with_quantity(2));
        assert!((price - 44.0).abs() < 1e-9);
    }

    #[test]
    fn custom_tax_rate_wins() {
        let pricing = HybridPricing::new(20.0, 1.0, 0.05);
        let price =
            pricing.calculate_price(&PricingInput::new().with_usage(5.0).with_tax_rate(0.2));
        assert!((price - 30.0).abs() < 1e-9);
    }

    #[test]
    fn billing_items_subscription_only() {
        let pricing = HybridPricing::new(20.0, 1.0, 0.0);
        let items = pricing.billing_items(&PricingInput::new());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Subscription (1 units)");
        assert!((items[0].amount - 20.0).abs() < 1e-9);
    }

    #[test]
    fn billing_items_subscription_then_usage() {
        let pricing = HybridPricing::new(20.0, 1.0, 0.0);
        let items = pricing.billing_items(&PricingInput::new().with_quantity(2).with_usage(3.0));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Subscription (2 units)");
        assert!((items[0].amount - 40.0).abs() < 1e-9);
        assert_eq!(items[1].description, "Usage (3 units)");
        assert!((items[1].amount - 3.0).abs() < 1e-9);
    }

    #[test]
    fn proration_is_linear_and_guards_zero_period() {
        let pricing = HybridPricing::new(30.0, 0.0, 0.0);
        assert!((pricing.calculate_proration(&PricingInput::new(), 30, 30) - 30.0).abs() < 1e-9);
        assert!((pricing.calculate_proration(&PricingInput::new(), 15, 30) - 15.0).abs() < 1e-9);
        assert!(
            (pricing.calculate_proration(&PricingInput::new().with_quantity(2), 15, 30) - 30.0)
                .abs()
                < 1e-9
        );
        assert_eq!(pricing.calculate_proration(&PricingInput::new(), 5, 0), 0.0);
    }

    #[test]
    fn zero_component_edge_cases() {
        let usage_only = HybridPricing::new(0.0, 2.0, 0.1);
        let price = usage_only.calculate_price(&PricingInput::new().with_usage(5.0));
        assert!((price - 11.0).abs() < 1e-9);

        let base_only = HybridPricing::new(20.0, 0.0, 0.1);
        let price = base_only.calculate_price(&PricingInput::new().with_usage(5.0));
        assert!((price - 22.0).abs() < 1e-9);

        let untaxed = HybridPricing::new(20.0, 1.0, 0.0);
        let price = untaxed.calculate_price(&PricingInput::new().with_usage(5.0));
        assert!((price - 25.0).abs() < 1e-9);
    }
}
