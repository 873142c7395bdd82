//! # Pricing & Discount Engine
//!
//! Unit prices, mutually-exclusive percentage discounts, and loyalty points.
//!
//! ## Total Calculation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  subtotal = Σ unit_price × qty                                          │
//! │                                                                         │
//! │  tier%  = customer's membership tier (0 if none)                        │
//! │  bulk%  = first active rule, by min_qty DESC, with min_qty <= cart qty  │
//! │                                                                         │
//! │  bulk% > tier%  ?  bulk_discount = subtotal × bulk%                     │
//! │                 :  tier_discount = subtotal × tier%                     │
//! │                                                                         │
//! │  point_discount = redeem_points × value_per_point                       │
//! │                   (capped at what is left after the % discount)         │
//! │                                                                         │
//! │  total = max(0, subtotal − tier − bulk − points)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one percentage discount ever applies. Ties go to the tier, so the
//! zero/zero case reports a zero tier discount.
//!
//! Missing configuration never errors: no customer, no tier or no rules all
//! mean 0%.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::Cart;
use crate::catalog::Product;
use crate::error::CoreResult;
use crate::money::{Money, Percent};
use crate::types::{BulkDiscountRule, Customer, LoyaltyConfig};
use crate::validation::{validate_percent, validate_redeem_points};

/// Which percentage discount was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AppliedDiscount {
    Tier,
    Bulk,
}

/// Price breakdown for display and for the sale record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub tier_percent: Percent,
    pub bulk_percent: Percent,
    pub applied: AppliedDiscount,
    pub tier_discount: Money,
    pub bulk_discount: Money,
    pub points_redeemed: i64,
    pub point_discount: Money,
    pub total: Money,
}

/// Unit price of `product` at `outlet_id`: outlet override, else base price.
pub fn price_line(product: &Product, outlet_id: &str) -> Money {
    product
        .outlet_settings
        .get(outlet_id)
        .map(|s| s.price)
        .unwrap_or(product.price)
}

/// Picks the bulk rule for a cart quantity.
///
/// Active rules are sorted by `min_qty` descending (stable, so equal
/// thresholds keep their input order) and the first qualifying rule wins.
pub fn select_bulk_rule(rules: &[BulkDiscountRule], total_quantity: i64) -> Option<&BulkDiscountRule> {
    let mut active: Vec<&BulkDiscountRule> = rules.iter().filter(|r| r.is_active).collect();
    active.sort_by(|a, b| b.min_qty.cmp(&a.min_qty));
    active.into_iter().find(|r| r.min_qty <= total_quantity)
}

/// Computes the price breakdown for a cart.
///
/// ## Errors
/// Redeem-point validation (negative points, redeeming without a customer,
/// redeeming more than the customer holds) and a tier or bulk rate above
/// 100%.
pub fn compute_total(
    cart: &Cart,
    customer: Option<&Customer>,
    bulk_rules: &[BulkDiscountRule],
    loyalty: &LoyaltyConfig,
    redeem_points: i64,
) -> CoreResult<PriceBreakdown> {
    validate_redeem_points(redeem_points, customer)?;

    let subtotal = cart.subtotal();
    let tier_percent = customer.map(Customer::tier_discount).unwrap_or_default();
    let bulk_percent = select_bulk_rule(bulk_rules, cart.total_quantity())
        .map(|r| r.discount)
        .unwrap_or_default();
    validate_percent("tier discount", tier_percent)?;
    validate_percent("bulk discount", bulk_percent)?;

    let (applied, tier_discount, bulk_discount) = if bulk_percent > tier_percent {
        (AppliedDiscount::Bulk, Money::zero(), subtotal.percentage(bulk_percent))
    } else {
        (AppliedDiscount::Tier, subtotal.percentage(tier_percent), Money::zero())
    };

    let remaining = (subtotal - tier_discount - bulk_discount).floor_zero();
    let point_value = loyalty.redemption_value_per_point * redeem_points;
    let point_discount = point_value.min(remaining).floor_zero();

    let total = (subtotal - tier_discount - bulk_discount - point_discount).floor_zero();

    Ok(PriceBreakdown {
        subtotal,
        tier_percent,
        bulk_percent,
        applied,
        tier_discount,
        bulk_discount,
        points_redeemed: redeem_points,
        point_discount,
        total,
    })
}

/// Points earned on `total`: one point per `spend_per_point`, rounded down.
///
/// Zero when no customer is attached or earning is not configured.
pub fn points_earned(total: Money, loyalty: &LoyaltyConfig, has_customer: bool) -> i64 {
    match loyalty.spend_per_point {
        Some(spend) if has_customer && spend.is_positive() && total.is_positive() => {
            total.minor() / spend.minor()
        }
        _ => 0,
    }
}
