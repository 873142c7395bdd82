//! # Transaction Processor
//!
//! Checkout state machine for one terminal session.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌───────────┐  checkout()  ┌────────────────────┐                     │
//! │   │ CART_OPEN │─────────────►│ CHECKOUT_REQUESTED │                     │
//! │   └───────────┘              └─────────┬──────────┘                     │
//! │      ▲     ▲    precondition / pricing │                                │
//! │      │     └──── failure (no change) ──┤                                │
//! │      │                                 ▼                                │
//! │      │ reset()                   ┌───────────┐ durable write ┌────────┐  │
//! │      └───────────────────────────│ COMMITTED │──── failed ──►│ FAILED │  │
//! │      └───────────────────────────└───────────┘               └────────┘  │
//! │                                                                         │
//! │  COMMITTED is reached synchronously: local inventory is already         │
//! │  decremented when checkout() returns. Durability happens afterwards     │
//! │  through the sync queue; FAILED only tells the queue to keep retrying.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! One session per terminal and no cross-outlet locking. Two terminals may
//! both sell the last unit of a material; the resulting negative stock is an
//! accepted accuracy trade-off of the optimistic model.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::bom::{BomResolver, MaterialUsage};
use crate::cart::Cart;
use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult, PreconditionError, ValidationError};
use crate::inventory::{deductions_for, AvailabilityWarning, InventoryStore};
use crate::pricing::{compute_total, points_earned, PriceBreakdown};
use crate::types::{
    BulkDiscountRule, CommitPayload, Customer, LoyaltyConfig, Operator, OutletSelection,
    PaymentMethod, ShiftStatus, Transaction, TransactionStatus,
};
use crate::validation::require_outlet;

// =============================================================================
// State & Policy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutState {
    #[default]
    CartOpen,
    CheckoutRequested,
    Committed,
    Failed,
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckoutState::CartOpen => "cart open",
            CheckoutState::CheckoutRequested => "checkout requested",
            CheckoutState::Committed => "committed",
            CheckoutState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Whether stock shortages block checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Shortages are reported as warnings; the sale goes through.
    #[default]
    Advisory,
    /// Any shortage fails checkout with `InsufficientStock`.
    Strict,
}

// =============================================================================
// Request & Outcome
// =============================================================================

/// Everything checkout needs besides the cart.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutRequest<'a> {
    pub selection: &'a OutletSelection,
    pub operator: &'a Operator,
    pub shift: &'a ShiftStatus,
    pub customer: Option<&'a Customer>,
    pub bulk_rules: &'a [BulkDiscountRule],
    pub loyalty: &'a LoyaltyConfig,
    pub redeem_points: i64,
    pub payment_method: PaymentMethod,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub breakdown: PriceBreakdown,
    /// Ready to enqueue for durable persistence.
    pub payload: CommitPayload,
    /// Shortages seen under the advisory policy.
    pub warnings: Vec<AvailabilityWarning>,
}

impl CommitOutcome {
    pub fn transaction(&self) -> &Transaction {
        &self.payload.transaction
    }
}

// =============================================================================
// Session
// =============================================================================

/// A terminal's cart plus its checkout state.
#[derive(Debug, Clone, Default)]
pub struct CheckoutSession {
    cart: Cart,
    state: CheckoutState,
    last_transaction_id: Option<String>,
}

impl CheckoutSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    /// Id of the most recently committed sale.
    pub fn last_transaction_id(&self) -> Option<&str> {
        self.last_transaction_id.as_deref()
    }

    fn require(&self, expected: CheckoutState, operation: &str) -> CoreResult<()> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                operation: operation.to_string(),
                state: self.state().to_string(),
            })
        }
    }

    /// Adds a product to the cart. Returns advisory shortages for the
    /// resulting cart at `outlet_id`.
    pub fn add_item<S: InventoryStore + ?Sized>(
        &mut self,
        catalog: &Catalog,
        inventory: &S,
        outlet_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> CoreResult<Vec<AvailabilityWarning>> {
        self.require(CheckoutState::CartOpen, "add items")?;
        let product = catalog.require_product(product_id)?;
        self.cart.add_item(product, outlet_id, quantity)?;
        Ok(self.availability(catalog, inventory, outlet_id))
    }

    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        self.require(CheckoutState::CartOpen, "change quantities")?;
        self.cart.update_quantity(product_id, quantity)
    }

    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        self.require(CheckoutState::CartOpen, "remove items")?;
        self.cart.remove_item(product_id)
    }

    /// Advisory shortages for the whole cart. Empty when the cart does not
    /// resolve; checkout reports that error itself.
    pub fn availability<S: InventoryStore + ?Sized>(
        &self,
        catalog: &Catalog,
        inventory: &S,
        outlet_id: &str,
    ) -> Vec<AvailabilityWarning> {
        BomResolver::new(catalog)
            .resolve_cart(self.cart.resolution_input())
            .map(|usages| inventory.check_availability(catalog, outlet_id, &usages))
            .unwrap_or_default()
    }

    /// Abandons the cart. Only possible before commit.
    pub fn cancel(&mut self) -> CoreResult<()> {
        match self.state() {
            CheckoutState::CartOpen | CheckoutState::CheckoutRequested => {
                self.cart.clear();
                self.state = CheckoutState::CartOpen;
                Ok(())
            }
            state => Err(CoreError::InvalidTransition {
                operation: "cancel".to_string(),
                state: state.to_string(),
            }),
        }
    }

    /// Records whether the durable write of the last commit succeeded.
    pub fn record_durability(&mut self, persisted: bool) -> CoreResult<()> {
        match self.state() {
            CheckoutState::Committed | CheckoutState::Failed => {
                if !persisted {
                    self.state = CheckoutState::Failed;
                }
                Ok(())
            }
            state => Err(CoreError::InvalidTransition {
                operation: "record durability".to_string(),
                state: state.to_string(),
            }),
        }
    }

    /// Starts a fresh cart after a commit.
    pub fn reset(&mut self) {
        self.cart.clear();
        self.state = CheckoutState::CartOpen;
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Runs checkout against a catalog snapshot and the terminal's local
/// inventory.
pub struct TransactionProcessor<'a, S: InventoryStore + ?Sized> {
    catalog: &'a Catalog,
    inventory: &'a mut S,
    policy: StockPolicy,
}

impl<'a, S: InventoryStore + ?Sized> TransactionProcessor<'a, S> {
    pub fn new(catalog: &'a Catalog, inventory: &'a mut S) -> Self {
        TransactionProcessor {
            catalog,
            inventory,
            policy: StockPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StockPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Commits the session's cart.
    ///
    /// ## Steps
    /// 1. Validate: concrete outlet, non-empty cart
    /// 2. CHECKOUT_REQUESTED: operator preconditions
    /// 3. Price, resolve BOM, check stock (strict policy may refuse)
    /// 4. COMMITTED: CLOSED transaction, local deduction, payload built
    ///
    /// Any failure before step 4 leaves the session in CART_OPEN with the
    /// cart intact.
    pub fn checkout(
        &mut self,
        session: &mut CheckoutSession,
        request: &CheckoutRequest<'_>,
    ) -> CoreResult<CommitOutcome> {
        session.require(CheckoutState::CartOpen, "check out")?;
        let outlet_id = require_outlet(request.selection)?.to_string();
        if session.cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        session.state = CheckoutState::CheckoutRequested;
        match self.commit(session, request, &outlet_id) {
            Ok(outcome) => {
                session.state = CheckoutState::Committed;
                session.last_transaction_id = Some(outcome.payload.transaction.id.clone());
                session.cart.clear();
                Ok(outcome)
            }
            Err(err) => {
                session.state = CheckoutState::CartOpen;
                Err(err)
            }
        }
    }

    fn commit(
        &mut self,
        session: &CheckoutSession,
        request: &CheckoutRequest<'_>,
        outlet_id: &str,
    ) -> CoreResult<CommitOutcome> {
        check_preconditions(request.operator, request.shift, outlet_id)?;

        let breakdown = compute_total(
            &session.cart,
            request.customer,
            request.bulk_rules,
            request.loyalty,
            request.redeem_points,
        )?;

        let usages = BomResolver::new(self.catalog).resolve_cart(session.cart.resolution_input())?;
        let warnings = self.inventory.check_availability(self.catalog, outlet_id, &usages);
        if self.policy == StockPolicy::Strict {
            if let Some(first) = warnings.first() {
                return Err(first.clone().into_error());
            }
        }
        self.finish(session, request, outlet_id, breakdown, &usages, warnings)
    }

    fn finish(
        &mut self,
        session: &CheckoutSession,
        request: &CheckoutRequest<'_>,
        outlet_id: &str,
        breakdown: PriceBreakdown,
        usages: &[MaterialUsage],
        warnings: Vec<AvailabilityWarning>,
    ) -> CoreResult<CommitOutcome> {
        let earned = points_earned(breakdown.total, request.loyalty, request.customer.is_some());

        let transaction = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            outlet_id: outlet_id.to_string(),
            timestamp: Utc::now(),
            cashier_id: request.operator.id.clone(),
            cashier_name: request.operator.name.clone(),
            lines: session.cart.lines.iter().map(|l| l.to_transaction_line()).collect(),
            subtotal: breakdown.subtotal,
            tier_discount: breakdown.tier_discount,
            bulk_discount: breakdown.bulk_discount,
            point_discount: breakdown.point_discount,
            total: breakdown.total,
            payment_method: request.payment_method,
            status: TransactionStatus::Closed,
            customer_id: request.customer.map(|c| c.id.clone()),
            points_earned: earned,
            points_redeemed: breakdown.points_redeemed,
        };

        let deductions = deductions_for(self.catalog, usages);
        self.inventory
            .apply_deductions(outlet_id, &deductions, &transaction.id);

        let customer_points_delta = if transaction.customer_id.is_some() {
            earned - breakdown.points_redeemed
        } else {
            0
        };

        Ok(CommitOutcome {
            breakdown,
            payload: CommitPayload {
                transaction,
                deductions,
                customer_points_delta,
            },
            warnings,
        })
    }
}

/// Operator checks made at CHECKOUT_REQUESTED.
///
/// Owners and managers skip the clock-in check. Nobody may sell after
/// finalizing today's shift closing at this outlet.
pub fn check_preconditions(operator: &Operator, shift: &ShiftStatus, outlet_id: &str) -> Result<(), PreconditionError> {
    if shift.is_closed() {
        return Err(PreconditionError::ShiftAlreadyClosed {
            operator: operator.name.clone(),
            outlet_id: outlet_id.to_string(),
        });
    }
    if !operator.role.is_supervisor() && !shift.is_clocked_in() {
        return Err(PreconditionError::NotClockedIn {
            operator: operator.name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BomLine, ComboItem, Material, Product, Unit};
    use crate::inventory::OutletInventory;
    use crate::money::{Money, Percent};
    use crate::types::{MembershipTier, OutletInventoryItem, Role};
    use rust_decimal_macros::dec;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for (id, name) in [("mat-flour", "Flour"), ("mat-cheese", "Cheese")] {
            catalog.insert_material(Material {
                id: id.into(),
                name: name.into(),
                unit: Unit::Gram,
                default_cost: Money::zero(),
            });
        }
        catalog.insert_product(Product::simple(
            "B",
            "Bread",
            Money::from_minor(10_000),
            vec![BomLine { material_id: "mat-flour".into(), qty: dec!(100) }],
        ));
        catalog.insert_product(Product::simple(
            "C",
            "Cheese Stick",
            Money::from_minor(8_000),
            vec![BomLine { material_id: "mat-cheese".into(), qty: dec!(50) }],
        ));
        catalog.insert_product(Product::combo(
            "A",
            "Combo A",
            Money::from_minor(25_000),
            vec![
                ComboItem { product_id: "B".into(), qty: dec!(2) },
                ComboItem { product_id: "C".into(), qty: dec!(1) },
            ],
        ));
        catalog
    }

    fn inventory(flour: rust_decimal::Decimal) -> OutletInventory {
        let mut row = OutletInventoryItem::new("o1", "Flour");
        row.quantity = flour;
        OutletInventory::from_rows([row])
    }

    struct Ctx {
        selection: OutletSelection,
        operator: Operator,
        shift: ShiftStatus,
        customer: Customer,
        loyalty: LoyaltyConfig,
    }

    impl Ctx {
        fn new() -> Self {
            Ctx {
                selection: OutletSelection::Outlet("o1".into()),
                operator: Operator { id: "u1".into(), name: "Dewi".into(), role: Role::Cashier },
                shift: ShiftStatus { clocked_in_at: Some(Utc::now()), closing_finalized_at: None },
                customer: Customer {
                    id: "cust-1".into(),
                    name: "Budi".into(),
                    tier: Some(MembershipTier { name: "Silver".into(), discount: Percent::from_percent(10) }),
                    points: 40,
                },
                loyalty: LoyaltyConfig {
                    redemption_value_per_point: Money::from_minor(100),
                    spend_per_point: Some(Money::from_minor(10_000)),
                },
            }
        }

        fn request(&self) -> CheckoutRequest<'_> {
            CheckoutRequest {
                selection: &self.selection,
                operator: &self.operator,
                shift: &self.shift,
                customer: None,
                bulk_rules: &[],
                loyalty: &self.loyalty,
                redeem_points: 0,
                payment_method: PaymentMethod::Cash,
            }
        }
    }

    #[test]
    fn test_checkout_commits_and_deducts() {
        let catalog = catalog();
        let mut inv = inventory(dec!(1000));
        let ctx = Ctx::new();
        let mut session = CheckoutSession::new();
        session.add_item(&catalog, &inv, "o1", "A", 1).unwrap();

        let outcome = TransactionProcessor::new(&catalog, &mut inv)
            .checkout(&mut session, &ctx.request())
            .unwrap();

        assert_eq!(session.state(), CheckoutState::Committed);
        assert!(session.cart().is_empty());
        assert_eq!(outcome.transaction().status, TransactionStatus::Closed);
        assert_eq!(outcome.transaction().total.minor(), 25_000);
        assert_eq!(session.last_transaction_id(), Some(outcome.transaction().id.as_str()));
        // Flour row exists, cheese row does not (fail-open, no-op deduction).
        assert_eq!(inv.quantity_of("o1", "Flour"), Some(dec!(800)));
        assert_eq!(outcome.payload.deductions.len(), 2);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_customer_points_are_credited() {
        let catalog = catalog();
        let mut inv = inventory(dec!(1000));
        let ctx = Ctx::new();
        let mut session = CheckoutSession::new();
        session.add_item(&catalog, &inv, "o1", "B", 10).unwrap();

        let mut request = ctx.request();
        request.customer = Some(&ctx.customer);
        request.redeem_points = 10;

        let outcome = TransactionProcessor::new(&catalog, &mut inv)
            .checkout(&mut session, &request)
            .unwrap();

        // 100,000 − 10% tier − 1,000 points = 89,000 → 8 points earned
        assert_eq!(outcome.transaction().total.minor(), 89_000);
        assert_eq!(outcome.transaction().points_earned, 8);
        assert_eq!(outcome.payload.customer_points_delta, 8 - 10);
    }

    #[test]
    fn test_all_outlets_view_cannot_check_out() {
        let catalog = catalog();
        let mut inv = inventory(dec!(1000));
        let mut ctx = Ctx::new();
        let mut session = CheckoutSession::new();
        session.add_item(&catalog, &inv, "o1", "B", 1).unwrap();

        ctx.selection = OutletSelection::All;
        let err = TransactionProcessor::new(&catalog, &mut inv)
            .checkout(&mut session, &ctx.request())
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation(ValidationError::OutletNotSelected)));
        assert_eq!(session.state(), CheckoutState::CartOpen);
    }

    #[test]
    fn test_empty_cart_is_rejected() {
        let catalog = catalog();
        let mut inv = inventory(dec!(1000));
        let ctx = Ctx::new();
        let mut session = CheckoutSession::new();

        let err = TransactionProcessor::new(&catalog, &mut inv)
            .checkout(&mut session, &ctx.request())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::EmptyCart)));
    }

    #[test]
    fn test_precondition_failure_leaves_cart_and_stock_untouched() {
        let catalog = catalog();
        let mut inv = inventory(dec!(1000));
        let mut ctx = Ctx::new();
        ctx.shift.clocked_in_at = None;
        let mut session = CheckoutSession::new();
        session.add_item(&catalog, &inv, "o1", "B", 1).unwrap();

        let err = TransactionProcessor::new(&catalog, &mut inv)
            .checkout(&mut session, &ctx.request())
            .unwrap_err();

        assert!(matches!(err, CoreError::Precondition(PreconditionError::NotClockedIn { .. })));
        assert_eq!(session.state(), CheckoutState::CartOpen);
        assert_eq!(session.cart().line_count(), 1);
        assert_eq!(inv.quantity_of("o1", "Flour"), Some(dec!(1000)));
    }

    #[test]
    fn test_preconditions_by_role() {
        let manager = Operator { id: "m".into(), name: "Made".into(), role: Role::Manager };
        let no_shift = ShiftStatus::default();
        assert!(check_preconditions(&manager, &no_shift, "o1").is_ok());

        let closed = ShiftStatus {
            clocked_in_at: Some(Utc::now()),
            closing_finalized_at: Some(Utc::now()),
        };
        assert!(matches!(
            check_preconditions(&manager, &closed, "o1"),
            Err(PreconditionError::ShiftAlreadyClosed { .. })
        ));
    }

    #[test]
    fn test_advisory_policy_warns_but_commits() {
        let catalog = catalog();
        let mut inv = inventory(dec!(150));
        let ctx = Ctx::new();
        let mut session = CheckoutSession::new();
        let warnings = session.add_item(&catalog, &inv, "o1", "B", 2).unwrap();
        assert_eq!(warnings.len(), 1);

        let outcome = TransactionProcessor::new(&catalog, &mut inv)
            .checkout(&mut session, &ctx.request())
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(inv.quantity_of("o1", "Flour"), Some(dec!(-50)));
    }

    #[test]
    fn test_strict_policy_blocks_shortage() {
        let catalog = catalog();
        let mut inv = inventory(dec!(150));
        let ctx = Ctx::new();
        let mut session = CheckoutSession::new();
        session.add_item(&catalog, &inv, "o1", "B", 2).unwrap();

        let err = TransactionProcessor::new(&catalog, &mut inv)
            .with_policy(StockPolicy::Strict)
            .checkout(&mut session, &ctx.request())
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));
        assert_eq!(session.state(), CheckoutState::CartOpen);
        assert_eq!(inv.quantity_of("o1", "Flour"), Some(dec!(150)));
    }

    #[test]
    fn test_cancel_only_before_commit() {
        let catalog = catalog();
        let mut inv = inventory(dec!(1000));
        let ctx = Ctx::new();
        let mut session = CheckoutSession::new();
        session.add_item(&catalog, &inv, "o1", "B", 1).unwrap();
        session.cancel().unwrap();
        assert!(session.cart().is_empty());

        session.add_item(&catalog, &inv, "o1", "B", 1).unwrap();
        TransactionProcessor::new(&catalog, &mut inv)
            .checkout(&mut session, &ctx.request())
            .unwrap();
        assert!(matches!(session.cancel(), Err(CoreError::InvalidTransition { .. })));
        assert!(session.add_item(&catalog, &inv, "o1", "B", 1).is_err());

        session.record_durability(false).unwrap();
        assert_eq!(session.state(), CheckoutState::Failed);
        session.reset();
        assert_eq!(session.state(), CheckoutState::CartOpen);
    }
}
