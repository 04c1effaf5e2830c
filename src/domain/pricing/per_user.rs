//! Per-seat pricing with volume discount tiers.

use serde::{Deserialize, Serialize};

use super::line_item::{BillingLineItem, LineItemKind};
use super::{effective_tax, period_ratio, PricingInput, PricingStrategy};

/// Volume discount threshold: applies when the effective seat count meets or
/// exceeds `min_users`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountTier {
    pub min_users: u32,
    pub discount_percentage: f64,
}

impl DiscountTier {
    pub fn new(min_users: u32, discount_percentage: f64) -> Self {
        Self {
            min_users,
            discount_percentage,
        }
    }
}

/// Per-seat price:
/// `base_amount * effective_users * (1 - discount) * (1 + tax_rate)`
/// where `effective_users = max(num_users, minimum_users)`.
///
/// Exactly one discount applies: the tier with the highest `min_users`
/// threshold the seat count meets. Tiers never stack, and a flat
/// `discount_percentage` on the input wins over tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerUserPricing {
    /// Default per-seat amount; callers may override per calculation.
    pub price_per_user: f64,
    pub minimum_users: u32,
    pub tax_rate: f64,
}

impl PerUserPricing {
    pub fn new(price_per_user: f64, minimum_users: u32, tax_rate: f64) -> Self {
        Self {
            price_per_user,
            minimum_users,
            tax_rate,
        }
    }

    fn effective_users(&self, input: &PricingInput) -> u32 {
        let floor = input.minimum_users.unwrap_or(self.minimum_users);
        input.num_users.max(floor)
    }

    fn per_seat_amount(&self, input: &PricingInput) -> f64 {
        input.base_amount.unwrap_or(self.price_per_user)
    }

    /// Best-matching discount: flat override first, otherwise the highest
    /// threshold met. Never stacked.
    fn discount_for(&self, input: &PricingInput, effective_users: u32) -> f64 {
        if let Some(flat) = input.discount_percentage {
            return flat;
        }
        input
            .discount_tiers
            .iter()
            .filter(|tier| effective_users >= tier.min_users)
            .max_by_key(|tier| tier.min_users)
            .map(|tier| tier.discount_percentage)
            .unwrap_or(0.0)
    }
}

impl PricingStrategy for PerUserPricing {
    fn calculate_price(&self, input: &PricingInput) -> f64 {
        let tax = effective_tax(self.tax_rate, input.tax_rate);
        let users = self.effective_users(input);
        let discount = self.discount_for(input, users);
        self.per_seat_amount(input) * users as f64 * (1.0 - discount) * (1.0 + tax)
    }

    fn billing_items(&self, input: &PricingInput) -> Vec<BillingLineItem> {
        let tax = effective_tax(self.tax_rate, input.tax_rate);
        let users = self.effective_users(input);
        let per_seat = self.per_seat_amount(input);
        let subtotal = per_seat * users as f64;
        let discount = self.discount_for(input, users);

        let mut items = vec![BillingLineItem::new(
            format!("Subscription ({} users)", users),
            subtotal,
            LineItemKind::Subscription,
        )
        .with_quantity(users as f64)];

        let mut net = subtotal;
        if discount > 0.0 {
            let discount_amount = subtotal * discount;
            net -= discount_amount;
            items.push(BillingLineItem::new(
                format!("Volume discount ({}%)", (discount * 100.0).round() as i64),
                -discount_amount,
                LineItemKind::Discount,
            ));
        }

        items.push(BillingLineItem::new("Tax", net * tax, LineItemKind::Tax));
        items
    }

    /// Plan-change adjustment when both plan snapshots are present:
    /// `(new_cost - previous_cost) * days_remaining / days_in_period`,
    /// each cost being that plan's `amount * num_users`. Without a plan
    /// change this prorates the current pre-tax amount over days used.
    fn calculate_proration(
        &self,
        input: &PricingInput,
        days_used: u32,
        days_in_period: u32,
    ) -> f64 {
        if days_in_period == 0 {
            return 0.0;
        }

        if let (Some(previous), Some(new)) = (&input.previous_plan, &input.new_plan) {
            let days_remaining = days_in_period.saturating_sub(days_used);
            let remaining_ratio = days_remaining as f64 / days_in_period as f64;
            return (new.period_cost() - previous.period_cost()) * remaining_ratio;
        }

        let users = self.effective_users(input);
        self.per_seat_amount(input) * users as f64 * period_ratio(days_used, days_in_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::PlanSnapshot;

    fn pricing() -> PerUserPricing {
        PerUserPricing::new(10.0, 2, 0.1)
    }

    fn tiers() -> Vec<DiscountTier> {
        vec![
            DiscountTier::new(20, 0.3),
            DiscountTier::new(10, 0.2),
            DiscountTier::new(5, 0.1),
        ]
    }

    #[test]
    fn basic_per_seat_price() {
        let price = pricing().calculate_price(
            &PricingInput::new().with_base_amount(10.0).with_num_users(5),
        );
        assert!((price - 55.0).abs() < 1e-9);
    }

    #[test]
    fn minimum_users_floor_applies() {
        let price = pricing().calculate_price(
            &PricingInput::new()
                .with_base_amount(10.0)
                .with_num_users(2)
                .with_minimum_users(5),
        );
        assert!((price - 55.0).abs() < 1e-9);
    }

    #[test]
    fn flat_discount() {
        let price = pricing().calculate_price(
            &PricingInput::new()
                .with_base_amount(10.0)
                .with_num_users(5)
                .with_discount_percentage(0.1),
        );
        assert!((price - 49.5).abs() < 1e-9);
    }

    #[test]
    fn tiered_discounts_pick_best_match_never_stack() {
        let p = pricing();

        // 5 users -> 10% discount.
        let price = p.calculate_price(
            &PricingInput::new()
                .with_base_amount(10.0)
                .with_num_users(5)
                .with_discount_tiers(tiers()),
        );
        assert!((price - 49.5).abs() < 1e-9);

        // 15 users -> 20% discount.
        let price = p.calculate_price(
            &PricingInput::new()
                .with_base_amount(10.0)
                .with_num_users(15)
                .with_discount_tiers(tiers()),
        );
        assert!((price - 132.0).abs() < 1e-9);

        // 25 users -> 30% discount.
        let price = p.calculate_price(
            &PricingInput::new()
                .with_base_amount(10.0)
                .with_num_users(25)
                .with_discount_tiers(tiers()),
        );
        assert!((price - 192.5).abs() < 1e-9);
    }

    #[test]
    fn upgrade_proration_charges_the_difference() {
        let proration = pricing().calculate_proration(
            &PricingInput::new()
                .with_plan_change(PlanSnapshot::new(10.0, 5), PlanSnapshot::new(10.0, 10)),
            10,
            30,
        );
        assert!((proration - 33.333333).abs() < 1e-2);
    }

    #[test]
    fn downgrade_proration_credits_the_difference() {
        let proration = pricing().calculate_proration(
            &PricingInput::new()
                .with_plan_change(PlanSnapshot::new(10.0, 10), PlanSnapshot::new(10.0, 5)),
            10,
            30,
        );
        assert!((proration + 33.333333).abs() < 1e-2);
    }

    #[test]
    fn proration_guards_zero_period() {
        let proration = pricing().calculate_proration(
            &PricingInput::new()
                .with_plan_change(PlanSnapshot::new(10.0, 5), PlanSnapshot::new(10.0, 10)),
            10,
            0,
        );
        assert_eq!(proration, 0.0);
    }

    #[test]
    fn billing_items_without_discount() {
        let items = pricing().billing_items(
            &PricingInput::new().with_base_amount(10.0).with_num_users(5),
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, LineItemKind::Subscription);
        assert_eq!(items[0].quantity, Some(5.0));
        assert!((items[0].amount - 50.0).abs() < 1e-9);
        assert_eq!(items[1].kind, LineItemKind::Tax);
        assert!((items[1].amount - 5.0).abs() < 1e-9);
    }

    #[test]
    fn billing_items_with_tiered_discount() {
        let items = pricing().billing_items(
            &PricingInput::new()
                .with_base_amount(10.0)
                .with_num_users(15)
                .with_discount_tiers(vec![
                    DiscountTier::new(10, 0.2),
                    DiscountTier::new(5, 0.1),
                ]),
        );
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].kind, LineItemKind::Discount);
        assert!((items[1].amount + 30.0).abs() < 1e-9);

        // Line sum equals the taxed total.
        let sum: f64 = items.iter().map(|i| i.amount).sum();
        let total = pricing().calculate_price(
            &PricingInput::new()
                .with_base_amount(10.0)
                .with_num_users(15)
                .with_discount_tiers(vec![
                    DiscountTier::new(10, 0.2),
                    DiscountTier::new(5, 0.1),
                ]),
        );
        assert!((sum - total).abs() < 1e-9);
    }

    #[test]
    fn zero_users_with_zero_minimum_charges_nothing() {
        let p = PerUserPricing::new(10.0, 0, 0.1);
        assert_eq!(p.calculate_price(&PricingInput::new()), 0.0);
    }
}
