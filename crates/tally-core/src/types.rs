//! # Domain Types
//!
//! Outlet-scoped records and event logs used throughout Tally POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  STOCK                     EVENTS                    PEOPLE             │
//! │  ─────                     ──────                    ──────             │
//! │  OutletInventoryItem       Transaction (sale)        Customer           │
//! │   outlet_id + NAME         Purchase                  MembershipTier     │
//! │   quantity (Decimal)       StockTransfer             Operator / Role    │
//! │   min_stock                ProductionRecord          ShiftStatus        │
//! │                                                                         │
//! │  PRICING CONFIG            DURABILITY                                   │
//! │  ──────────────            ──────────                                   │
//! │  BulkDiscountRule          CommitPayload ──► sync outbox ──► store      │
//! │  LoyaltyConfig             SyncOutboxEntry                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Sales carry a client-generated UUID v4. That id is also the dedup key the
//! durable store uses when a queued commit is replayed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, Percent};

// =============================================================================
// Outlet Inventory
// =============================================================================

/// Stock row for one material at one outlet.
///
/// Rows are matched by `material_name`, never by catalog id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OutletInventoryItem {
    pub id: String,
    pub outlet_id: String,
    pub material_name: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
    #[ts(as = "String")]
    pub min_stock: Decimal,
    pub cost_per_unit: Money,
    /// Whether a cashier may record restocks for this row.
    pub is_cashier_operated: bool,
}

impl OutletInventoryItem {
    /// Creates an empty row. Quantity starts at zero and only moves through
    /// journaled adjustments.
    pub fn new(outlet_id: impl Into<String>, material_name: impl Into<String>) -> Self {
        OutletInventoryItem {
            id: uuid::Uuid::new_v4().to_string(),
            outlet_id: outlet_id.into(),
            material_name: material_name.into(),
            quantity: Decimal::ZERO,
            min_stock: Decimal::ZERO,
            cost_per_unit: Money::zero(),
            is_cashier_operated: false,
        }
    }

    /// At or below the configured minimum.
    pub fn is_low(&self) -> bool {
        self.quantity <= self.min_stock
    }
}

/// Normalizes a material name for outlet-row matching.
pub fn material_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// =============================================================================
// Customers & Pricing Configuration
// =============================================================================

/// Membership level granting a percentage discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MembershipTier {
    pub name: String,
    pub discount: Percent,
}

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub tier: Option<MembershipTier>,
    /// Loyalty point balance.
    pub points: i64,
}

impl Customer {
    /// Tier discount, 0% when the customer has no tier.
    pub fn tier_discount(&self) -> Percent {
        self.tier.as_ref().map(|t| t.discount).unwrap_or_default()
    }
}

/// Quantity-threshold discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BulkDiscountRule {
    pub id: String,
    pub min_qty: i64,
    pub discount: Percent,
    pub is_active: bool,
}

/// Loyalty program settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyConfig {
    /// Money value of one redeemed point.
    pub redemption_value_per_point: Money,
    /// Spend required to earn one point. `None` disables earning.
    pub spend_per_point: Option<Money>,
}

// =============================================================================
// Transaction Status
// =============================================================================

/// Settlement status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    /// Cash drawer not yet settled.
    #[default]
    Open,
    /// Finalized. Immutable from here on.
    Closed,
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// QR / e-wallet payment.
    EWallet,
    /// Direct bank transfer.
    BankTransfer,
}

// =============================================================================
// Transaction
// =============================================================================

/// A cart line frozen into a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLine {
    pub product_id: String,
    /// Product name at time of sale.
    pub name_snapshot: String,
    /// Unit price at time of sale, after outlet override.
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

/// A sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Client-generated UUID v4; the replay dedup key.
    pub id: String,
    pub outlet_id: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub cashier_id: String,
    pub cashier_name: String,
    pub lines: Vec<TransactionLine>,
    pub subtotal: Money,
    pub tier_discount: Money,
    pub bulk_discount: Money,
    pub point_discount: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub customer_id: Option<String>,
    pub points_earned: i64,
    pub points_redeemed: i64,
}

impl Transaction {
    /// Sum of all discounts applied.
    pub fn discount_total(&self) -> Money {
        self.tier_discount + self.bulk_discount + self.point_discount
    }

    pub fn is_closed(&self) -> bool {
        self.status == TransactionStatus::Closed
    }
}

// =============================================================================
// Stock Event Logs
// =============================================================================

/// Stock received at one outlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub outlet_id: String,
    pub material_name: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
    /// Total paid for the delivery.
    pub total_cost: Money,
    pub supplier: Option<String>,
    pub staff: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

/// Quantity moved between two outlets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockTransfer {
    pub id: String,
    pub from_outlet_id: String,
    pub to_outlet_id: String,
    pub material_name: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
    pub staff: String,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

/// One consumed input of a production run, by catalog material id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductionComponent {
    pub material_id: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
}

/// A production run: N components in, one WIP/result material out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductionRecord {
    pub id: String,
    pub outlet_id: String,
    pub result_material_name: String,
    #[ts(as = "String")]
    pub result_quantity: Decimal,
    pub components: Vec<ProductionComponent>,
    pub staff: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Operators
// =============================================================================

/// Staff role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Manager,
    Cashier,
}

impl Role {
    /// Owners and managers are exempt from attendance and restock gates.
    pub const fn is_supervisor(&self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }
}

/// The person operating a terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: String,
    pub name: String,
    pub role: Role,
}

/// Today's attendance records for an operator at an outlet.
///
/// Supplied by the staff collaborator; the core only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ShiftStatus {
    #[ts(as = "Option<String>")]
    pub clocked_in_at: Option<DateTime<Utc>>,
    /// Set once the shift-closing report is finalized.
    #[ts(as = "Option<String>")]
    pub closing_finalized_at: Option<DateTime<Utc>>,
}

impl ShiftStatus {
    pub fn is_clocked_in(&self) -> bool {
        self.clocked_in_at.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closing_finalized_at.is_some()
    }
}

/// Which outlet the terminal is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "kind", content = "outletId")]
pub enum OutletSelection {
    /// Aggregate "all outlets" view; read-only.
    All,
    Outlet(String),
}

impl OutletSelection {
    /// Concrete outlet id, `None` for the aggregate view.
    pub fn outlet_id(&self) -> Option<&str> {
        match self {
            OutletSelection::All => None,
            OutletSelection::Outlet(id) => Some(id),
        }
    }
}

// =============================================================================
// Commit Payload
// =============================================================================

/// One raw-material deduction, already rounded to the unit's precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockDeduction {
    pub material_id: String,
    /// Name used to find the outlet row. `None` when the catalog material
    /// is unknown; the deduction is then a no-op everywhere.
    pub material_name: Option<String>,
    #[ts(as = "String")]
    pub quantity: Decimal,
}

/// Everything the durable store needs to replay one committed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CommitPayload {
    pub transaction: Transaction,
    pub deductions: Vec<StockDeduction>,
    /// Net change to the customer's point balance (earned minus redeemed).
    pub customer_points_delta: i64,
}

impl CommitPayload {
    /// Dedup key for idempotent replay.
    pub fn commit_id(&self) -> &str {
        &self.transaction.id
    }
}

// =============================================================================
// Sync Outbox
// =============================================================================

/// An entry in the local write-ahead sync outbox.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncOutboxEntry {
    pub id: String,
    /// Type of entity being synced, e.g. "COMMIT".
    pub entity_type: String,
    /// ID of the entity being synced.
    pub entity_id: String,
    /// The full payload as JSON.
    pub payload: String,
    /// Number of sync attempts.
    pub attempts: i64,
    /// Last error message if sync failed.
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub synced_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default_is_open() {
        assert_eq!(TransactionStatus::default(), TransactionStatus::Open);
    }

    #[test]
    fn test_customer_without_tier_gets_zero_percent() {
        let customer = Customer {
            id: "c1".into(),
            name: "Sari".into(),
            tier: None,
            points: 0,
        };
        assert!(customer.tier_discount().is_zero());
    }

    #[test]
    fn test_material_key_is_trimmed_and_case_insensitive() {
        assert_eq!(material_key("  Flour "), material_key("flour"));
    }

    #[test]
    fn test_outlet_selection() {
        assert_eq!(OutletSelection::All.outlet_id(), None);
        assert_eq!(OutletSelection::Outlet("o1".into()).outlet_id(), Some("o1"));
    }

    #[test]
    fn test_discount_total_sums_every_discount() {
        let sale = Transaction {
            id: "t1".into(),
            outlet_id: "o1".into(),
            timestamp: Utc::now(),
            cashier_id: "u1".into(),
            cashier_name: "Sari".into(),
            lines: Vec::new(),
            subtotal: Money::from_minor(100_000),
            tier_discount: Money::zero(),
            bulk_discount: Money::from_minor(15_000),
            point_discount: Money::from_minor(5_000),
            total: Money::from_minor(80_000),
            payment_method: PaymentMethod::Cash,
            status: TransactionStatus::Closed,
            customer_id: Some("c1".into()),
            points_earned: 0,
            points_redeemed: 50,
        };
        assert_eq!(sale.discount_total(), Money::from_minor(20_000));
        assert_eq!(sale.subtotal - sale.discount_total(), sale.total);
        assert!(sale.is_closed());
    }

    #[test]
    fn test_roles() {
        assert!(Role::Owner.is_supervisor());
        assert!(Role::Manager.is_supervisor());
        assert!(!Role::Cashier.is_supervisor());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&TransactionStatus::Closed).unwrap();
        assert_eq!(json, "\"CLOSED\"");
    }
}
