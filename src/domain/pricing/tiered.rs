//! Tiered (graduated) pricing.

use serde::{Deserialize, Serialize};

use super::line_item::{BillingLineItem, LineItemKind};
use super::{effective_tax, format_units, period_ratio, PricingInput, PricingStrategy};

/// One usage tier. `max: None` means unbounded (last tier).
///
/// A tier covers the usage units numbered `max(min, 1)..=max`: the first
/// tier declared as 0-10 covers units 1 through 10, the tier 11-20 covers
/// the next ten. Usage exactly at a tier's `max` consumes only that tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTier {
    pub min: u64,
    pub max: Option<u64>,
    pub unit_price: f64,
    #[serde(default)]
    pub flat_fee: f64,
}

impl PricingTier {
    pub fn new(min: u64, max: Option<u64>, unit_price: f64, flat_fee: f64) -> Self {
        Self {
            min,
            max,
            unit_price,
            flat_fee,
        }
    }

    /// First usage unit this tier charges for.
    fn lower_unit(&self) -> f64 {
        (self.min.max(1)) as f64
    }

    /// Units of `usage` consumed within this tier's bounds.
    fn units_consumed(&self, usage: f64) -> f64 {
        let lo = self.lower_unit();
        if usage < lo {
            return 0.0;
        }
        let capped = match self.max {
            Some(max) => usage.min(max as f64),
            None => usage,
        };
        capped - lo + 1.0
    }

    fn bound_label(&self) -> String {
        match self.max {
            Some(max) => format!("{}-{}", self.min, max),
            None => format!("{}-∞", self.min),
        }
    }
}

/// Graduated pricing: usage is consumed tier-by-tier from the lowest tier
/// upward; each reached tier contributes its flat fee plus
/// `unit_price * units consumed in that tier`. Tax applies to the sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredPricing {
    pub tiers: Vec<PricingTier>,
    pub tax_rate: f64,
}

impl TieredPricing {
    pub fn new(tiers: Vec<PricingTier>, tax_rate: f64) -> Self {
        Self { tiers, tax_rate }
    }

    /// Pre-tax total across all reached tiers.
    fn pre_tax_total(&self, usage: f64) -> f64 {
        self.tiers
            .iter()
            .map(|tier| {
                let units = tier.units_consumed(usage);
                if units > 0.0 {
                    tier.flat_fee + units * tier.unit_price
                } else {
                    0.0
                }
            })
            .sum()
    }
}

impl PricingStrategy for TieredPricing {
    fn calculate_price(&self, input: &PricingInput) -> f64 {
        let tax = effective_tax(self.tax_rate, input.tax_rate);
        self.pre_tax_total(input.usage) * (1.0 + tax)
    }

    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem> {
        let mut items = Vec::new();
        for tier in &self.tiers {
            let units = tier.units_consumed(input.usage);
            if units <= 0.0 {
                continue;
            }
            if tier.flat_fee != 0.0 {
                items.push(BillingLineItem::new(
                    format!("Tier {} flat fee", tier.bound_label()),
                    tier.flat_fee,
                    LineItemKind::FlatFee,
                ));
            }
            items.push(
                BillingLineItem::new(
                    format!(
                        "Tier {} usage ({} units)",
                        tier.bound_label(),
                        format_units(units)
                    ),
                    units * tier.unit_price,
                    LineItemKind::Usage,
                )
                .with_quantity(units),
            );
        }
        items
    }

    fn calculate_proration(
        &self,
        input: &PricingInput,
        days_used: u32,
        days_in_period: u32,
    ) -> f64 {
        self.pre_tax_total(input.usage) * period_ratio(days_used, days_in_period)
    }
}
