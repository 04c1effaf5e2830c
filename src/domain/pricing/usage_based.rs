//! Usage-based (metered) pricing.

use serde::{Deserialize, Serialize};

use super::line_item::{BillingLineItem, LineItemKind};
use super::{effective_tax, format_units, period_ratio, PricingInput, PricingStrategy};

/// Metered price: raw usage charge clamped to an optional
/// [minimum_charge, maximum_charge] band, then taxed.
///
/// Clamping happens before tax. The billing items always show the raw usage
/// amount; a signed adjustment item appears only when clamping changed the
/// amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageBasedPricing {
    pub price_per_unit: f64,
    pub minimum_charge: Option<f64>,
    pub maximum_charge: Option<f64>,
    pub tax_rate: f64,
}

impl UsageBasedPricing {
    pub fn new(price_per_unit: f64, tax_rate: f64) -> Self {
        Self {
            price_per_unit,
            minimum_charge: None,
            maximum_charge: None,
            tax_rate,
        }
    }

    pub fn with_minimum(mut self, minimum_charge: f64) -> Self {
        self.minimum_charge = Some(minimum_charge);
        self
    }

    pub fn with_maximum(mut self, maximum_charge: f64) -> Self {
        self.maximum_charge = Some(maximum_charge);
        self
    }

    /// Raw usage amount before clamping and tax.
    fn raw_amount(&self, usage: f64) -> f64 {
        usage * self.price_per_unit
    }

    /// Usage amount after the min/max band.
    fn clamped_amount(&self, usage: f64) -> f64 {
        let mut amount = self.raw_amount(usage);
        if let Some(min) = self.minimum_charge {
            amount = amount.max(min);
        }
        if let Some(max) = self.maximum_charge {
            amount = amount.min(max);
        }
        amount
    }
}

impl PricingStrategy for UsageBasedPricing {
    fn calculate_price(&self, input: &PricingInput) -> f64 {
        let tax = effective_tax(self.tax_rate, input.tax_rate);
        self.clamped_amount(input.usage) * (1.0 + tax)
    }

    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem> {
        let raw = self.raw_amount(input.usage);
        let clamped = self.clamped_amount(input.usage);

        let mut items = vec![BillingLineItem::new(
            format!("Usage ({} units)", format_units(input.usage)),
            raw,
            LineItemKind::Usage,
        )
        .with_quantity(input.usage)];

        let adjustment = clamped - raw;
        if adjustment > 0.0 {
            items.push(BillingLineItem::new(
                "Minimum charge adjustment",
                adjustment,
                LineItemKind::Adjustment,
            ));
        } else if adjustment < 0.0 {
            items.push(BillingLineItem::new(
                "Maximum charge adjustment",
                adjustment,
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
        self.clamped_amount(input.usage) * period_ratio(days_used, days_in_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> UsageBasedPricing {
        UsageBasedPricing::new(0.5, 0.1).with_minimum(10.0)
    }

    fn capped() -> UsageBasedPricing {
        UsageBasedPricing::new(0.5, 0.1)
            .with_minimum(10.0)
            .with_maximum(50.0)
    }

    #[test]
    fn minimum_applies_below_threshold() {
        // 10 units would be 5.0, below the 10.0 minimum.
        let price = pricing().calculate_price(&PricingInput::new().with_usage(10.0));
        assert!((price - 11.0).abs() < 1e-9);
    }

    #[test]
    fn raw_usage_above_threshold() {
        let price = pricing().calculate_price(&PricingInput::new().with_usage(30.0));
        assert!((price - 16.5).abs() < 1e-9);
    }

    #[test]
    fn custom_tax_rate_overrides() {
        let price =
            pricing().calculate_price(&PricingInput::new().with_usage(30.0).with_tax_rate(0.2));
        assert!((price - 18.0).abs() < 1e-9);
    }

    #[test]
    fn usage_exactly_at_minimum_boundary_does_not_double_charge() {
        // 20 units * 0.5 = 10.0, exactly the minimum: greater-of-the-two.
        let p = pricing();
        let price = p.calculate_price(&PricingInput::new().with_usage(20.0));
        assert!((price - 11.0).abs() < 1e-9);

        let items = p.billing_items(&PricingInput::new().with_usage(20.0));
        assert_eq!(items.len(), 1, "no adjustment when clamping is a no-op");
    }

    #[test]
    fn billing_items_show_minimum_adjustment() {
        let items = pricing().billing_items(&PricingInput::new().with_usage(10.0));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Usage (10 units)");
        assert!((items[0].amount - 5.0).abs() < 1e-9);
        assert_eq!(items[1].description, "Minimum charge adjustment");
        assert!((items[1].amount - 5.0).abs() < 1e-9);
    }

    #[test]
    fn billing_items_above_minimum_have_no_adjustment() {
        let items = pricing().billing_items(&PricingInput::new().with_usage(30.0));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Usage (30 units)");
        assert!((items[0].amount - 15.0).abs() < 1e-9);
    }

    #[test]
    fn maximum_caps_the_charge() {
        let price = capped().calculate_price(&PricingInput::new().with_usage(200.0));
        assert!((price - 55.0).abs() < 1e-9);

        let price = capped()
            .calculate_price(&PricingInput::new().with_usage(200.0).with_tax_rate(0.2));
        assert!((price - 60.0).abs() < 1e-9);
    }

    #[test]
    fn maximum_adjustment_is_negative() {
        let items = capped().billing_items(&PricingInput::new().with_usage(200.0));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Usage (200 units)");
        assert!((items[0].amount - 100.0).abs() < 1e-9);
        assert_eq!(items[1].description, "Maximum charge adjustment");
        assert!((items[1].amount + 50.0).abs() < 1e-9);
    }

    #[test]
    fn items_reconcile_with_pre_tax_total() {
        let p = capped();
        for usage in [0.0, 10.0, 20.0, 30.0, 200.0] {
            let input = PricingInput::new().with_usage(usage);
            let pre_tax: f64 = p.billing_items(&input).iter().map(|i| i.amount).sum();
            let total = p.calculate_price(&input);
            assert!(
                (pre_tax * 1.1 - total).abs() < 1e-9,
                "usage {} does not reconcile",
                usage
            );
        }
    }

    #[test]
    fn zero_usage_does_not_panic() {
        let price = UsageBasedPricing::new(0.5, 0.1)
            .calculate_price(&PricingInput::new().with_usage(0.0));
        assert_eq!(price, 0.0);
    }
}
