//! # Terminal
//!
//! One cashier station: its checkout session, its view of outlet stock and
//! the write-ahead queue behind every commit.
//!
//! ## Commit Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Terminal::checkout                                                     │
//! │       │                                                                 │
//! │       ├── lock session + inventory (tokio Mutex, one actor per till)    │
//! │       ├── TransactionProcessor::checkout   (in memory, optimistic)      │
//! │       │        CART_OPEN → CHECKOUT_REQUESTED → COMMITTED               │
//! │       ├── SyncQueue::enqueue(Commit)       (write-ahead outbox)         │
//! │       │        ok   → stays COMMITTED, agent triggered                  │
//! │       │        err  → FAILED, payload kept in memory for retry          │
//! │       └── return CommitOutcome             (sale never rolled back)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use tally_core::cart::Cart;
use tally_core::catalog::Catalog;
use tally_core::checkout::{
    CheckoutRequest, CheckoutSession, CheckoutState, CommitOutcome, StockPolicy, TransactionProcessor,
};
use tally_core::inventory::{production_deductions, AvailabilityWarning, InventoryStore, OutletInventory};
use tally_core::{Operator, OutletInventoryItem, ProductionRecord, Purchase, StockTransfer};
use tally_db::Database;

use crate::error::{SyncError, SyncResult};
use crate::queue::SyncQueue;
use crate::store::SyncPayload;

struct TerminalState {
    catalog: Catalog,
    session: CheckoutSession,
    inventory: OutletInventory,
    /// Payloads whose outbox write failed, oldest first.
    unsent: Vec<SyncPayload>,
}

/// A cashier station bound to one outlet.
pub struct Terminal {
    outlet_id: String,
    policy: StockPolicy,
    queue: SyncQueue,
    trigger: Option<Arc<Notify>>,
    state: Mutex<TerminalState>,
}

impl Terminal {
    pub fn new(
        outlet_id: impl Into<String>,
        catalog: Catalog,
        inventory: OutletInventory,
        queue: SyncQueue,
    ) -> Self {
        Terminal {
            outlet_id: outlet_id.into(),
            policy: StockPolicy::default(),
            queue,
            trigger: None,
            state: Mutex::new(TerminalState {
                catalog,
                session: CheckoutSession::new(),
                inventory,
                unsent: Vec::new(),
            }),
        }
    }

    /// Builds a terminal from the catalog and stock snapshot in `db`.
    pub async fn load(db: &Database, queue: SyncQueue, outlet_id: impl Into<String>) -> SyncResult<Self> {
        let catalog = db.catalog().load_catalog().await?;
        catalog.validate()?;
        let inventory = db.inventory().load_snapshot().await?;

        let terminal = Self::new(outlet_id, catalog, inventory, queue);
        info!(outlet_id = %terminal.outlet_id, "Terminal loaded");
        Ok(terminal)
    }

    pub fn with_policy(mut self, policy: StockPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Notifies `trigger` after every successful enqueue, typically the
    /// running agent's [`SyncAgentHandle::trigger_handle`](crate::SyncAgentHandle::trigger_handle).
    pub fn with_trigger(mut self, trigger: Arc<Notify>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn outlet_id(&self) -> &str {
        &self.outlet_id
    }

    // =========================================================================
    // Cart
    // =========================================================================

    pub async fn state(&self) -> CheckoutState {
        self.state.lock().await.session.state()
    }

    pub async fn cart(&self) -> Cart {
        self.state.lock().await.session.cart().clone()
    }

    /// Adds a product at this outlet's price. Returns advisory shortages.
    pub async fn add_item(&self, product_id: &str, quantity: i64) -> SyncResult<Vec<AvailabilityWarning>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let warnings = state.session.add_item(
            &state.catalog,
            &state.inventory,
            &self.outlet_id,
            product_id,
            quantity,
        )?;
        Ok(warnings)
    }

    pub async fn update_quantity(&self, product_id: &str, quantity: i64) -> SyncResult<()> {
        self.state.lock().await.session.update_quantity(product_id, quantity)?;
        Ok(())
    }

    pub async fn remove_item(&self, product_id: &str) -> SyncResult<()> {
        self.state.lock().await.session.remove_item(product_id)?;
        Ok(())
    }

    pub async fn cancel(&self) -> SyncResult<()> {
        self.state.lock().await.session.cancel()?;
        Ok(())
    }

    /// Clears the finished sale and opens a new cart.
    pub async fn new_sale(&self) {
        self.state.lock().await.session.reset();
    }

    /// Availability boolean per product at this outlet.
    pub async fn product_availability(&self) -> BTreeMap<String, bool> {
        let state = self.state.lock().await;
        state.inventory.product_availability(&state.catalog, &self.outlet_id)
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Commits the cart and writes the sale ahead to the outbox.
    ///
    /// Returns as soon as the sale is committed in memory. A failed outbox
    /// write moves the session to FAILED and keeps the payload for
    /// [`retry_unsent`](Self::retry_unsent); it is never reported as a
    /// checkout failure.
    pub async fn checkout(&self, request: &CheckoutRequest<'_>) -> SyncResult<CommitOutcome> {
        if let Some(selected) = request.selection.outlet_id() {
            if selected != self.outlet_id {
                return Err(SyncError::InvalidConfig(format!(
                    "terminal is bound to outlet {}, not {}",
                    self.outlet_id, selected
                )));
            }
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let outcome = TransactionProcessor::new(&state.catalog, &mut state.inventory)
            .with_policy(self.policy)
            .checkout(&mut state.session, request)?;

        for warning in &outcome.warnings {
            warn!(
                outlet_id = %warning.outlet_id,
                material = %warning.material_name,
                available = %warning.available,
                required = %warning.required,
                "Sold past available stock"
            );
        }

        let persisted = self
            .persist(state, SyncPayload::Commit(outcome.payload.clone()))
            .await;
        state.session.record_durability(persisted)?;

        info!(
            transaction_id = %outcome.transaction().id,
            total = %outcome.transaction().total,
            persisted,
            "Checkout committed"
        );
        Ok(outcome)
    }

    // =========================================================================
    // Stock Events
    // =========================================================================

    /// Records a purchase locally and queues it. Returns the new quantity.
    pub async fn record_purchase(&self, operator: &Operator, purchase: &Purchase) -> SyncResult<Decimal> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let quantity = state.inventory.record_purchase(operator, purchase)?;
        self.persist(state, SyncPayload::Purchase(purchase.clone())).await;
        Ok(quantity)
    }

    pub async fn record_transfer(&self, transfer: &StockTransfer) -> SyncResult<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.inventory.record_transfer(transfer)?;
        self.persist(state, SyncPayload::Transfer(transfer.clone())).await;
        Ok(())
    }

    /// Records a production run. Component deductions are resolved here so
    /// the durable store applies exactly what the terminal applied.
    pub async fn record_production(&self, record: &ProductionRecord) -> SyncResult<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.inventory.record_production(&state.catalog, record)?;
        let deductions = production_deductions(&state.catalog, record);
        self.persist(
            state,
            SyncPayload::Production {
                record: record.clone(),
                deductions,
            },
        )
        .await;
        Ok(())
    }

    // =========================================================================
    // Stock Queries
    // =========================================================================

    pub async fn quantity_of(&self, material_name: &str) -> Option<Decimal> {
        self.state.lock().await.inventory.quantity_of(&self.outlet_id, material_name)
    }

    pub async fn low_stock(&self) -> Vec<OutletInventoryItem> {
        let state = self.state.lock().await;
        state.inventory.low_stock(&self.outlet_id).into_iter().cloned().collect()
    }

    /// Swaps in a fresh catalog snapshot. The open cart keeps its prices.
    pub async fn replace_catalog(&self, catalog: Catalog) -> SyncResult<()> {
        catalog.validate()?;
        self.state.lock().await.catalog = catalog;
        Ok(())
    }

    // =========================================================================
    // Unsent Payloads
    // =========================================================================

    pub async fn unsent_count(&self) -> usize {
        self.state.lock().await.unsent.len()
    }

    /// Retries outbox writes that failed earlier. Returns how many remain.
    pub async fn retry_unsent(&self) -> usize {
        let mut guard = self.state.lock().await;
        self.flush_unsent(&mut guard).await;
        guard.unsent.len()
    }

    /// Queues `payload` behind any earlier unsent ones. True when the
    /// payload itself reached the outbox.
    async fn persist(&self, state: &mut TerminalState, payload: SyncPayload) -> bool {
        state.unsent.push(payload);
        self.flush_unsent(state).await;
        let persisted = state.unsent.is_empty();
        if persisted {
            if let Some(trigger) = &self.trigger {
                trigger.notify_one();
            }
        }
        persisted
    }

    /// Writes unsent payloads in order, stopping at the first failure.
    async fn flush_unsent(&self, state: &mut TerminalState) {
        while let Some(payload) = state.unsent.first() {
            match self.queue.enqueue(payload).await {
                Ok(entry) => {
                    debug!(entry_id = %entry.id, "Unsent payload queued");
                    state.unsent.remove(0);
                }
                Err(e) => {
                    warn!(
                        ?e,
                        entity_id = %payload.entity_id(),
                        unsent = state.unsent.len(),
                        "Outbox write failed, keeping payload in memory"
                    );
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tally_core::catalog::{BomLine, Material, Product, Unit};
    use tally_core::{
        CoreError, LoyaltyConfig, Money, OutletSelection, PaymentMethod, ProductionComponent, Role, ShiftStatus,
    };
    use tally_db::DbConfig;

    async fn bakery() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        for (id, name) in [("flour", "Flour"), ("butter", "Butter")] {
            catalog
                .upsert_material(&Material {
                    id: id.into(),
                    name: name.into(),
                    unit: Unit::Gram,
                    default_cost: Money::from_minor(10),
                })
                .await
                .unwrap();
        }
        catalog
            .upsert_product(&Product::simple(
                "croissant",
                "Croissant",
                Money::from_minor(18_000),
                vec![
                    BomLine { material_id: "flour".into(), qty: dec!(60) },
                    BomLine { material_id: "butter".into(), qty: dec!(30) },
                ],
            ))
            .await
            .unwrap();

        let inventory = db.inventory();
        inventory
            .upsert_row(&OutletInventoryItem { quantity: dec!(1000), ..OutletInventoryItem::new("o1", "Flour") })
            .await
            .unwrap();
        inventory
            .upsert_row(&OutletInventoryItem {
                quantity: dec!(500),
                is_cashier_operated: true,
                ..OutletInventoryItem::new("o1", "Butter")
            })
            .await
            .unwrap();
        db
    }

    async fn terminal(db: &Database) -> Terminal {
        let queue = SyncQueue::local(db, &SyncSettings::default());
        Terminal::load(db, queue, "o1").await.unwrap()
    }

    fn cashier() -> Operator {
        Operator { id: "u1".into(), name: "Sari".into(), role: Role::Cashier }
    }

    fn on_shift() -> ShiftStatus {
        ShiftStatus { clocked_in_at: Some(Utc::now()), closing_finalized_at: None }
    }

    fn request<'a>(
        selection: &'a OutletSelection,
        operator: &'a Operator,
        shift: &'a ShiftStatus,
        loyalty: &'a LoyaltyConfig,
    ) -> CheckoutRequest<'a> {
        CheckoutRequest {
            selection,
            operator,
            shift,
            customer: None,
            bulk_rules: &[],
            loyalty,
            redeem_points: 0,
            payment_method: PaymentMethod::Cash,
        }
    }

    #[tokio::test]
    async fn test_checkout_deducts_locally_and_queues() {
        let db = bakery().await;
        let terminal = terminal(&db).await;
        let (selection, operator, shift, loyalty) =
            (OutletSelection::Outlet("o1".into()), cashier(), on_shift(), LoyaltyConfig::default());

        terminal.add_item("croissant", 2).await.unwrap();
        let outcome = terminal.checkout(&request(&selection, &operator, &shift, &loyalty)).await.unwrap();

        assert_eq!(outcome.transaction().total, Money::from_minor(36_000));
        assert_eq!(terminal.state().await, CheckoutState::Committed);
        assert_eq!(terminal.quantity_of("flour").await, Some(dec!(880)));
        assert_eq!(terminal.unsent_count().await, 0);

        let queue = SyncQueue::local(&db, &SyncSettings::default());
        assert_eq!(queue.pending_count().await.unwrap(), 1);
        queue.drain().await.unwrap();

        // Durable store converges on the terminal's view.
        assert_eq!(db.inventory().quantity_of("o1", "flour").await.unwrap(), Some(dec!(880)));
        assert_eq!(db.inventory().quantity_of("o1", "butter").await.unwrap(), Some(dec!(440)));
    }

    #[tokio::test]
    async fn test_failed_outbox_write_keeps_the_sale() {
        let db = bakery().await;
        let terminal = terminal(&db).await;
        let (selection, operator, shift, loyalty) =
            (OutletSelection::Outlet("o1".into()), cashier(), on_shift(), LoyaltyConfig::default());

        terminal.add_item("croissant", 1).await.unwrap();
        db.close().await;

        let outcome = terminal.checkout(&request(&selection, &operator, &shift, &loyalty)).await;
        assert!(outcome.is_ok());
        assert_eq!(terminal.state().await, CheckoutState::Failed);
        assert_eq!(terminal.unsent_count().await, 1);
        assert_eq!(terminal.quantity_of("flour").await, Some(dec!(940)));
        assert_eq!(terminal.retry_unsent().await, 1);

        terminal.new_sale().await;
        assert_eq!(terminal.state().await, CheckoutState::CartOpen);
    }

    #[tokio::test]
    async fn test_wrong_outlet_leaves_cart_intact() {
        let db = bakery().await;
        let terminal = terminal(&db).await;
        let (selection, operator, shift, loyalty) =
            (OutletSelection::Outlet("o2".into()), cashier(), on_shift(), LoyaltyConfig::default());

        terminal.add_item("croissant", 1).await.unwrap();
        let err = terminal.checkout(&request(&selection, &operator, &shift, &loyalty)).await.unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(terminal.cart().await.line_count(), 1);
        assert_eq!(terminal.state().await, CheckoutState::CartOpen);
    }

    #[tokio::test]
    async fn test_precondition_failure_surfaces_core_error() {
        let db = bakery().await;
        let terminal = terminal(&db).await;
        let (selection, operator, shift, loyalty) =
            (OutletSelection::Outlet("o1".into()), cashier(), ShiftStatus::default(), LoyaltyConfig::default());

        terminal.add_item("croissant", 1).await.unwrap();
        let err = terminal.checkout(&request(&selection, &operator, &shift, &loyalty)).await.unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::Precondition(_))));
        assert_eq!(terminal.quantity_of("flour").await, Some(dec!(1000)));
    }

    #[tokio::test]
    async fn test_cashier_restock_only_on_cashier_rows() {
        let db = bakery().await;
        let terminal = terminal(&db).await;
        let purchase = |material: &str| Purchase {
            id: format!("p-{}", material),
            outlet_id: "o1".into(),
            material_name: material.into(),
            quantity: dec!(250),
            total_cost: Money::from_minor(25_000),
            supplier: None,
            staff: "Sari".into(),
            timestamp: Utc::now(),
        };

        let err = terminal.record_purchase(&cashier(), &purchase("Flour")).await.unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::RestockNotPermitted { .. })));

        let quantity = terminal.record_purchase(&cashier(), &purchase("Butter")).await.unwrap();
        assert_eq!(quantity, dec!(750));
        assert_eq!(SyncQueue::local(&db, &SyncSettings::default()).pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_production_is_mirrored_in_durable_store() {
        let db = bakery().await;
        let terminal = terminal(&db).await;
        let record = ProductionRecord {
            id: "r1".into(),
            outlet_id: "o1".into(),
            result_material_name: "Dough".into(),
            result_quantity: dec!(2),
            components: vec![
                ProductionComponent { material_id: "flour".into(), quantity: dec!(300) },
                ProductionComponent { material_id: "butter".into(), quantity: dec!(100) },
            ],
            staff: "Ayu".into(),
            timestamp: Utc::now(),
        };

        terminal.record_production(&record).await.unwrap();
        assert_eq!(terminal.quantity_of("flour").await, Some(dec!(700)));
        assert_eq!(terminal.quantity_of("dough").await, Some(dec!(2)));

        SyncQueue::local(&db, &SyncSettings::default()).drain().await.unwrap();
        let inventory = db.inventory();
        assert_eq!(inventory.quantity_of("o1", "flour").await.unwrap(), Some(dec!(700)));
        assert_eq!(inventory.quantity_of("o1", "butter").await.unwrap(), Some(dec!(400)));
        assert_eq!(inventory.quantity_of("o1", "dough").await.unwrap(), Some(dec!(2)));
    }

    #[tokio::test]
    async fn test_enqueue_notifies_trigger() {
        let db = bakery().await;
        let trigger = Arc::new(Notify::new());
        let terminal = terminal(&db).await.with_trigger(trigger.clone());
        let transfer = StockTransfer {
            id: "x1".into(),
            from_outlet_id: "o1".into(),
            to_outlet_id: "o2".into(),
            material_name: "Flour".into(),
            quantity: dec!(100),
            staff: "Budi".into(),
            note: None,
            timestamp: Utc::now(),
        };

        terminal.record_transfer(&transfer).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), trigger.notified())
            .await
            .expect("trigger was not notified");
        assert_eq!(terminal.quantity_of("flour").await, Some(dec!(900)));
    }
}
