//! Pricing strategy family.
//!
//! Pure computation: price, ordered billing line items, and proration for
//! partial periods or mid-period plan changes. Strategies are immutable once
//! constructed; per-call tax-rate and multiplier overrides never mutate the
//! stored defaults.
//!
//! Amounts are `f64`, matching the documented rounding outcomes of the
//! billing rules. This is a known precision risk for currency arithmetic;
//! minor-unit integers are the production follow-up.

mod dynamic;
mod flat;
mod freemium;
mod hybrid;
mod line_item;
mod per_user;
mod tiered;
mod usage_based;

pub use dynamic::DynamicPricing;
pub use flat::FlatPricing;
pub use freemium::FreemiumPricing;
pub use hybrid::HybridPricing;
pub use line_item::{BillingLineItem, LineItemKind};
pub use per_user::{DiscountTier, PerUserPricing};
pub use tiered::{PricingTier, TieredPricing};
pub use usage_based::UsageBasedPricing;

use serde::{Deserialize, Serialize};

/// Per-calculation inputs.
///
/// Only the fields a given strategy consumes are read; the rest are ignored.
/// `tax_rate` and `custom_multiplier` override the strategy defaults for one
/// call without mutating the strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingInput {
    pub usage: f64,
    pub quantity: u32,
    pub num_users: u32,
    /// Per-call override of the strategy's per-seat amount.
    pub base_amount: Option<f64>,
    pub custom_multiplier: Option<f64>,
    pub tax_rate: Option<f64>,
    pub minimum_users: Option<u32>,
    pub discount_percentage: Option<f64>,
    pub discount_tiers: Vec<DiscountTier>,
    pub previous_plan: Option<PlanSnapshot>,
    pub new_plan: Option<PlanSnapshot>,
}

impl Default for PricingInput {
    fn default() -> Self {
        Self {
            usage: 0.0,
            quantity: 1,
            num_users: 0,
            base_amount: None,
            custom_multiplier: None,
            tax_rate: None,
            minimum_users: None,
            discount_percentage: None,
            discount_tiers: Vec::new(),
            previous_plan: None,
            new_plan: None,
        }
    }
}

impl PricingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_usage(mut self, usage: f64) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_num_users(mut self, num_users: u32) -> Self {
        self.num_users = num_users;
        self
    }

    pub fn with_base_amount(mut self, base_amount: f64) -> Self {
        self.base_amount = Some(base_amount);
        self
    }

    pub fn with_tax_rate(mut self, tax_rate: f64) -> Self {
        self.tax_rate = Some(tax_rate);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.custom_multiplier = Some(multiplier);
        self
    }

    pub fn with_minimum_users(mut self, minimum_users: u32) -> Self {
        self.minimum_users = Some(minimum_users);
        self
    }

    pub fn with_discount_percentage(mut self, discount: f64) -> Self {
        self.discount_percentage = Some(discount);
        self
    }

    pub fn with_discount_tiers(mut self, tiers: Vec<DiscountTier>) -> Self {
        self.discount_tiers = tiers;
        self
    }

    pub fn with_plan_change(mut self, previous: PlanSnapshot, new: PlanSnapshot) -> Self {
        self.previous_plan = Some(previous);
        self.new_plan = Some(new);
        self
    }
}

/// Snapshot of a plan's cost basis for plan-change proration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub amount: f64,
    pub num_users: u32,
}

impl PlanSnapshot {
    pub fn new(amount: f64, num_users: u32) -> Self {
        Self { amount, num_users }
    }

    /// Total cost of this plan for a full period.
    pub fn period_cost(&self) -> f64 {
        self.amount * self.num_users as f64
    }
}

/// Common contract for all pricing strategies.
pub trait PricingStrategy: Send + Sync {
    /// Total billable amount, tax included.
    fn calculate_price(&self, input: &PricingInput) -> f64;

    /// Ordered billing line items. Order is significant for display and for
    /// reconciling totals: the pre-tax line sum plus tax equals the total.
    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem>;

    /// Signed pro-rata amount for a partial period.
    ///
    /// `days_in_period == 0` short-circuits to `0.0` rather than dividing by
    /// zero. Strategies that support plan changes read
    /// `input.previous_plan`/`input.new_plan` when both are present.
    fn calculate_proration(&self, input: &PricingInput, days_used: u32, days_in_period: u32)
        -> f64;
}

/// Tagged union over the strategy structs.
///
/// This is the serializable form carried in plan definitions; it implements
/// `PricingStrategy` by delegation so callers can hold either the enum or a
/// trait object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PricingSpec {
    Flat(FlatPricing),
    Tiered(TieredPricing),
    UsageBased(UsageBasedPricing),
    Hybrid(HybridPricing),
    PerUser(PerUserPricing),
    Freemium(FreemiumPricing),
    Dynamic(DynamicPricing),
}

impl PricingSpec {
    fn as_strategy(&self) -> &dyn PricingStrategy {
        match self {
            PricingSpec::Flat(s) => s,
            PricingSpec::Tiered(s) => s,
            PricingSpec::UsageBased(s) => s,
            PricingSpec::Hybrid(s) => s,
            PricingSpec::PerUser(s) => s,
            PricingSpec::Freemium(s) => s,
            PricingSpec::Dynamic(s) => s,
        }
    }

    /// Strategy tag for logging and event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            PricingSpec::Flat(_) => "flat",
            PricingSpec::Tiered(_) => "tiered",
            PricingSpec::UsageBased(_) => "usage_based",
            PricingSpec::Hybrid(_) => "hybrid",
            PricingSpec::PerUser(_) => "per_user",
            PricingSpec::Freemium(_) => "freemium",
            PricingSpec::Dynamic(_) => "dynamic",
        }
    }
}

impl PricingStrategy for PricingSpec {
    fn calculate_price(&self, input: &PricingInput) -> f64 {
        self.as_strategy().calculate_price(input)
    }

    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem> {
        self.as_strategy().billing_items(input)
    }

    fn calculate_proration(
        &self,
        input: &PricingInput,
        days_used: u32,
        days_in_period: u32,
    ) -> f64 {
        self.as_strategy()
            .calculate_proration(input, days_used, days_in_period)
    }
}

/// Resolves the effective tax rate for one call.
pub(crate) fn effective_tax(default_rate: f64, override_rate: Option<f64>) -> f64 {
    override_rate.unwrap_or(default_rate)
}

/// Ratio of days used to days in period, zero when the period is empty.
pub(crate) fn period_ratio(days_used: u32, days_in_period: u32) -> f64 {
    if days_in_period == 0 {
        0.0
    } else {
        days_used as f64 / days_in_period as f64
    }
}

/// Renders a unit count the way invoices expect: whole numbers without a
/// trailing fraction, fractional usage as-is.
pub(crate) fn format_units(units: f64) -> String {
    if units.fract() == 0.0 && units.abs() < 1e15 {
        format!("{}", units as i64)
    } else {
        format!("{}", units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_ratio_short_circuits_empty_period() {
        assert_eq!(period_ratio(5, 0), 0.0);
        assert_eq!(period_ratio(15, 30), 0.5);
    }

    #[test]
    fn format_units_drops_trailing_fraction() {
        assert_eq!(format_units(10.0), "10");
        assert_eq!(format_units(2.5), "2.5");
    }

    #[test]
    fn pricing_spec_round_trips_through_json() {
        let spec = PricingSpec::UsageBased(UsageBasedPricing::new(0.5, 0.1).with_minimum(10.0));
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"strategy\":\"usage_based\""));

        let back: PricingSpec = serde_json::from_str(&json).unwrap();
        let input = PricingInput::new().with_usage(10.0);
        assert_eq!(back.calculate_price(&input), spec.calculate_price(&input));
    }

    #[test]
    fn pricing_spec_delegates_to_strategy() {
        let spec = PricingSpec::Flat(FlatPricing::new(66.0, 0.2));
        let input = PricingInput::new();
        assert!((spec.calculate_price(&input) - 79.2).abs() < 1e-9);
        assert_eq!(spec.kind(), "flat");
    }
}
