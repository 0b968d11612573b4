//! Pricing
//!
//! Quantity-discount resolution and total calculation. Pure functions
//! over loaded rules so the purchase transaction can price inside its
//! own snapshot, plus a pool-reading convenience for display paths.

use crate::db::repository::{RepoResult, discount};
use shared::models::DiscountRule;
use sqlx::SqlitePool;

/// Best (largest) percent among rules whose threshold the quantity
/// meets. Ties between thresholds go to the larger percent; the best
/// price wins regardless of which rule granted it.
pub fn best_discount_percent(rules: &[DiscountRule], quantity: i64) -> i64 {
    rules
        .iter()
        .filter(|r| quantity >= r.min_qty)
        .map(|r| r.percent.clamp(0, 100))
        .max()
        .unwrap_or(0)
}

/// Total charge in integer credits, floor-rounded.
pub fn quote_total(unit_price: i64, quantity: i64, discount_percent: i64) -> i64 {
    let pct = discount_percent.clamp(0, 100);
    unit_price * quantity * (100 - pct) / 100
}

/// Price a prospective purchase against the current rule set.
pub async fn quote(
    pool: &SqlitePool,
    product_id: i64,
    unit_price: i64,
    quantity: i64,
) -> RepoResult<i64> {
    let rules = discount::rules_for(pool, product_id).await?;
    let pct = best_discount_percent(&rules, quantity);
    Ok(quote_total(unit_price, quantity, pct))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(min_qty: i64, percent: i64) -> DiscountRule {
        DiscountRule {
            id: 0,
            product_id: 1,
            min_qty,
            percent,
            updated_at: 0,
        }
    }

    #[test]
    fn no_rules_means_no_discount() {
        assert_eq!(best_discount_percent(&[], 10), 0);
        assert_eq!(quote_total(40, 2, 0), 80);
    }

    #[test]
    fn best_applicable_rule_wins_not_nearest_threshold() {
        // qty 12 satisfies both; 10% must win even though min_qty 3 is
        // the "closer" threshold.
        let rules = [rule(3, 5), rule(10, 10)];
        assert_eq!(best_discount_percent(&rules, 12), 10);
        assert_eq!(best_discount_percent(&rules, 5), 5);
        assert_eq!(best_discount_percent(&rules, 2), 0);
    }

    #[test]
    fn larger_percent_wins_on_equal_threshold() {
        let rules = [rule(5, 8), rule(5, 12)];
        assert_eq!(best_discount_percent(&rules, 5), 12);
    }

    #[test]
    fn totals_floor_to_integer_credits() {
        // 2 x 40 at 10% off = 72 exactly
        assert_eq!(quote_total(40, 2, 10), 72);
        // 3 x 33 at 7% off = 99 * 0.93 = 92.07 -> 92
        assert_eq!(quote_total(33, 3, 7), 92);
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(quote_total(40, 1, 150), 0);
        assert_eq!(quote_total(40, 1, -5), 40);
    }
}
