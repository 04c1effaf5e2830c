//! Freemium pricing: free up to a usage limit, flat paid tier above it.

use serde::{Deserialize, Serialize};

use super::line_item::{BillingLineItem, LineItemKind};
use super::{effective_tax, format_units, period_ratio, PricingInput, PricingStrategy};

/// Free below (and at) `free_tier_limit`; `paid_tier_price * (1 + tax)`
/// above it. Free-tier proration is zero regardless of days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreemiumPricing {
    pub free_tier_limit: f64,
    pub paid_tier_price: f64,
    pub tax_rate: f64,
}

impl FreemiumPricing {
    pub fn new(free_tier_limit: f64, paid_tier_price: f64, tax_rate: f64) -> Self {
        Self {
            free_tier_limit,
            paid_tier_price,
            tax_rate,
        }
    }

    fn is_free(&self, usage: f64) -> bool {
        usage <= self.free_tier_limit
    }
}

impl PricingStrategy for FreemiumPricing {
    fn calculate_price(&self, input: &PricingInput) -> f64 {
        if self.is_free(input.usage) {
            return 0.0;
        }
        let tax = effective_tax(self.tax_rate, input.tax_rate);
        self.paid_tier_price * (1.0 + tax)
    }

    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem> {
        if self.is_free(input.usage) {
            return vec![BillingLineItem::new(
                format!("Free tier ({} units)", format_units(input.usage)),
                0.0,
                LineItemKind::Usage,
            )
            .with_quantity(input.usage)];
        }
        vec![BillingLineItem::new(
            "Paid tier",
            self.paid_tier_price,
            LineItemKind::Subscription,
        )]
    }

    fn calculate_proration(
        &self,
        input: &PricingInput,
        days_used: u32,
        days_in_period: u32,
    ) -> f64 {
        if self.is_free(input.usage) {
            return 0.0;
        }
        self.paid_tier_price * period_ratio(days_used, days_in_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> FreemiumPricing {
        FreemiumPricing::new(100.0, 19.99, 0.1)
    }

    #[test]
    fn free_below_limit() {
        assert_eq!(
            pricing().calculate_price(&PricingInput::new().with_usage(50.0)),
            0.0
        );
    }

    #[test]
    fn free_exactly_at_limit() {
        assert_eq!(
            pricing().calculate_price(&PricingInput::new().with_usage(100.0)),
            0.0
        );
    }

    #[test]
    fn paid_above_limit() {
        let price = pricing().calculate_price(&PricingInput::new().with_usage(101.0));
        assert!((price - 21.989).abs() < 1e-4);

        let price = pricing()
            .calculate_price(&PricingInput::new().with_usage(101.0).with_tax_rate(0.2));
        assert!((price - 23.988).abs() < 1e-4);
    }

    #[test]
    fn free_tier_proration_is_zero_regardless_of_days() {
        let proration = pricing().calculate_proration(&PricingInput::new().with_usage(50.0), 15, 30);
        assert_eq!(proration, 0.0);
    }

    #[test]
    fn paid_tier_prorates_linearly() {
        let proration =
            pricing().calculate_proration(&PricingInput::new().with_usage(150.0), 15, 30);
        assert!((proration - 9.995).abs() < 1e-9);
    }

    #[test]
    fn billing_items_reflect_tier() {
        let free = pricing().billing_items(&PricingInput::new().with_usage(50.0));
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].amount, 0.0);
        assert_eq!(free[0].description, "Free tier (50 units)");

        let paid = pricing().billing_items(&PricingInput::new().with_usage(150.0));
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].description, "Paid tier");
        assert!((paid[0].amount - 19.99).abs() < 1e-9);
    }
}
