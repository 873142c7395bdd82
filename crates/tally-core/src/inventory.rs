//! # Outlet Inventory Store
//!
//! Per-outlet stock counts, keyed by outlet + material NAME.
//!
//! ## Two-Step Lookup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BOM line: { material_id: "mat-7", qty: 100 }                           │
//! │       │                                                                 │
//! │       ▼  Catalog::material_name("mat-7")                                │
//! │  "Flour"                                                                │
//! │       │                                                                 │
//! │       ▼  row(outlet, "flour")   (trimmed, case-insensitive)             │
//! │  OutletInventoryItem { quantity: 4200, ... }                            │
//! │                                                                         │
//! │  Either step may miss. A miss never blocks a sale (fail-open) and a     │
//! │  deduction against a missing row is a no-op.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The fail-open policy lets one recipe serve outlets that never stocked a
//! material. The cost is that such consumption goes untracked.
//!
//! ## Journal
//! Rows are created at zero. Every change goes through [`InventoryStore::adjust`]
//! and is journaled, so the journal for a row always sums to its quantity.
//! Negative quantities are allowed; oversell is reported, not prevented.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::bom::{BomResolver, MaterialUsage};
use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::types::{
    material_key, Operator, OutletInventoryItem, ProductionRecord, Purchase, StockDeduction,
    StockTransfer,
};
use crate::validation::{validate_production, validate_purchase, validate_transfer};

// =============================================================================
// Adjustments
// =============================================================================

/// Why a stock row moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Balance carried in when loading a snapshot.
    Opening,
    Purchase,
    TransferIn,
    TransferOut,
    ProductionIn,
    ProductionOut,
    Sale,
    Correction,
}

impl AdjustmentReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Opening => "opening",
            AdjustmentReason::Purchase => "purchase",
            AdjustmentReason::TransferIn => "transfer_in",
            AdjustmentReason::TransferOut => "transfer_out",
            AdjustmentReason::ProductionIn => "production_in",
            AdjustmentReason::ProductionOut => "production_out",
            AdjustmentReason::Sale => "sale",
            AdjustmentReason::Correction => "correction",
        }
    }
}

/// One journaled stock movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAdjustment {
    pub outlet_id: String,
    pub material_name: String,
    #[ts(as = "String")]
    pub delta: Decimal,
    pub reason: AdjustmentReason,
    /// Id of the event that caused the movement.
    pub reference: String,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// A raw-material shortfall found while checking a cart. Advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityWarning {
    pub outlet_id: String,
    pub material_name: String,
    #[ts(as = "String")]
    pub available: Decimal,
    #[ts(as = "String")]
    pub required: Decimal,
}

impl AvailabilityWarning {
    /// Converts the warning into the strict-mode error.
    pub fn into_error(self) -> CoreError {
        CoreError::InsufficientStock {
            outlet_id: self.outlet_id,
            material: self.material_name,
            available: self.available,
            required: self.required,
        }
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Outlet-scoped stock keyed by material name.
///
/// Implementors supply row lookup and journaled adjustment; everything else
/// is derived.
pub trait InventoryStore {
    /// Row for `material_name` at `outlet_id`, matched case-insensitively.
    fn row(&self, outlet_id: &str, material_name: &str) -> Option<&OutletInventoryItem>;

    /// Creates an empty row if none exists.
    fn ensure_row(&mut self, outlet_id: &str, material_name: &str);

    /// Applies `delta` and journals it. Returns the new quantity, or `None`
    /// (and changes nothing) when the row does not exist.
    fn adjust(
        &mut self,
        outlet_id: &str,
        material_name: &str,
        delta: Decimal,
        reason: AdjustmentReason,
        reference: &str,
    ) -> Option<Decimal>;

    fn quantity_of(&self, outlet_id: &str, material_name: &str) -> Option<Decimal> {
        self.row(outlet_id, material_name).map(|r| r.quantity)
    }

    /// Catalog material id → name → outlet row.
    fn locate(&self, catalog: &Catalog, outlet_id: &str, material_id: &str) -> Option<&OutletInventoryItem> {
        let name = catalog.material_name(material_id)?;
        self.row(outlet_id, name)
    }

    /// Compares resolved usages against outlet stock.
    ///
    /// Usages whose material or row cannot be found are skipped (treated as
    /// available). Required quantities are rounded to the unit's precision.
    fn check_availability(
        &self,
        catalog: &Catalog,
        outlet_id: &str,
        usages: &[MaterialUsage],
    ) -> Vec<AvailabilityWarning> {
        usages
            .iter()
            .filter_map(|usage| {
                let material = catalog.material(&usage.material_id)?;
                let row = self.row(outlet_id, &material.name)?;
                let required = material.unit.round(usage.quantity);
                (row.quantity < required).then(|| AvailabilityWarning {
                    outlet_id: outlet_id.to_string(),
                    material_name: row.material_name.clone(),
                    available: row.quantity,
                    required,
                })
            })
            .collect()
    }

    /// Adds `quantity` to a row, creating it at zero on first receipt.
    /// Returns the new quantity.
    fn receive(
        &mut self,
        outlet_id: &str,
        material_name: &str,
        quantity: Decimal,
        reason: AdjustmentReason,
        reference: &str,
    ) -> Decimal {
        self.ensure_row(outlet_id, material_name);
        self.adjust(outlet_id, material_name, quantity, reason, reference)
            .unwrap_or(quantity)
    }

    /// Applies final sale deductions. Missing rows are skipped.
    ///
    /// Returns the deductions that actually touched a row.
    fn apply_deductions(
        &mut self,
        outlet_id: &str,
        deductions: &[StockDeduction],
        reference: &str,
    ) -> Vec<StockDeduction> {
        let mut applied = Vec::new();
        for deduction in deductions {
            let Some(name) = deduction.material_name.as_deref() else {
                continue;
            };
            if self
                .adjust(outlet_id, name, -deduction.quantity, AdjustmentReason::Sale, reference)
                .is_some()
            {
                applied.push(deduction.clone());
            }
        }
        applied
    }

    /// Records a purchase, creating the row on first receipt.
    ///
    /// Cashiers may only restock rows flagged `is_cashier_operated`; owners
    /// and managers are unrestricted.
    fn record_purchase(&mut self, operator: &Operator, purchase: &Purchase) -> CoreResult<Decimal> {
        validate_purchase(purchase)?;

        if !operator.role.is_supervisor() {
            let permitted = self
                .row(&purchase.outlet_id, &purchase.material_name)
                .map(|r| r.is_cashier_operated)
                .unwrap_or(false);
            if !permitted {
                return Err(CoreError::RestockNotPermitted {
                    operator: operator.name.clone(),
                    material: purchase.material_name.clone(),
                });
            }
        }

        Ok(self.receive(
            &purchase.outlet_id,
            &purchase.material_name,
            purchase.quantity,
            AdjustmentReason::Purchase,
            &purchase.id,
        ))
    }

    /// Moves stock between outlets. Both rows are created if needed so the
    /// two legs always net to zero.
    fn record_transfer(&mut self, transfer: &StockTransfer) -> CoreResult<()> {
        validate_transfer(transfer)?;

        self.ensure_row(&transfer.from_outlet_id, &transfer.material_name);
        self.adjust(
            &transfer.from_outlet_id,
            &transfer.material_name,
            -transfer.quantity,
            AdjustmentReason::TransferOut,
            &transfer.id,
        );
        self.receive(
            &transfer.to_outlet_id,
            &transfer.material_name,
            transfer.quantity,
            AdjustmentReason::TransferIn,
            &transfer.id,
        );
        Ok(())
    }

    /// Consumes production components (catalog ids, direct, fail-open) and
    /// receives the result material.
    fn record_production(&mut self, catalog: &Catalog, record: &ProductionRecord) -> CoreResult<()> {
        validate_production(record)?;

        for deduction in production_deductions(catalog, record) {
            let Some(name) = deduction.material_name.as_deref() else {
                continue;
            };
            self.adjust(
                &record.outlet_id,
                name,
                -deduction.quantity,
                AdjustmentReason::ProductionOut,
                &record.id,
            );
        }

        self.receive(
            &record.outlet_id,
            &record.result_material_name,
            record.result_quantity,
            AdjustmentReason::ProductionIn,
            &record.id,
        );
        Ok(())
    }

    /// Availability boolean per product at `outlet_id`, for catalog tiles.
    ///
    /// A product is unavailable when switched off for the outlet, when it
    /// cannot be resolved, or when one unit would exceed known stock.
    fn product_availability(&self, catalog: &Catalog, outlet_id: &str) -> BTreeMap<String, bool> {
        let resolver = BomResolver::new(catalog);
        catalog
            .products()
            .map(|product| {
                let available = product.is_available_at(outlet_id)
                    && resolver
                        .resolve_merged(product, Decimal::ONE)
                        .map(|usages| self.check_availability(catalog, outlet_id, &usages).is_empty())
                        .unwrap_or(false);
                (product.id.clone(), available)
            })
            .collect()
    }
}

/// Turns resolved usages into final deductions: merged, named, and rounded
/// to each material's native precision.
pub fn deductions_for(catalog: &Catalog, usages: &[MaterialUsage]) -> Vec<StockDeduction> {
    usages
        .iter()
        .map(|usage| {
            let material = catalog.material(&usage.material_id);
            StockDeduction {
                material_id: usage.material_id.clone(),
                material_name: material.map(|m| m.name.clone()),
                quantity: material
                    .map(|m| m.unit.round(usage.quantity))
                    .unwrap_or(usage.quantity),
            }
        })
        .collect()
}

/// Component consumption of a production run, named and rounded. Components
/// are direct materials; no BOM expansion happens here.
pub fn production_deductions(catalog: &Catalog, record: &ProductionRecord) -> Vec<StockDeduction> {
    let usages: Vec<MaterialUsage> = record
        .components
        .iter()
        .map(|c| MaterialUsage {
            material_id: c.material_id.clone(),
            quantity: c.quantity,
        })
        .collect();
    deductions_for(catalog, &usages)
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory [`InventoryStore`]; the terminal's authoritative local state.
#[derive(Debug, Clone, Default)]
pub struct OutletInventory {
    rows: BTreeMap<(String, String), OutletInventoryItem>,
    journal: Vec<InventoryAdjustment>,
}

impl OutletInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads snapshot rows. Each non-zero balance is journaled as
    /// [`AdjustmentReason::Opening`].
    pub fn from_rows(rows: impl IntoIterator<Item = OutletInventoryItem>) -> Self {
        let mut store = Self::new();
        for row in rows {
            let opening = row.quantity;
            let outlet_id = row.outlet_id.clone();
            let name = row.material_name.trim().to_string();
            store.rows.insert(
                (outlet_id.clone(), material_key(&name)),
                OutletInventoryItem {
                    material_name: name.clone(),
                    quantity: Decimal::ZERO,
                    ..row
                },
            );
            if !opening.is_zero() {
                store.adjust(&outlet_id, &name, opening, AdjustmentReason::Opening, "snapshot");
            }
        }
        store
    }

    /// Replaces the static settings of an existing row.
    pub fn configure(
        &mut self,
        outlet_id: &str,
        material_name: &str,
        min_stock: Decimal,
        is_cashier_operated: bool,
    ) -> bool {
        match self.rows.get_mut(&(outlet_id.to_string(), material_key(material_name))) {
            Some(row) => {
                row.min_stock = min_stock;
                row.is_cashier_operated = is_cashier_operated;
                true
            }
            None => false,
        }
    }

    /// All rows for an outlet, ordered by normalized name.
    pub fn rows_for(&self, outlet_id: &str) -> Vec<&OutletInventoryItem> {
        self.rows.values().filter(|r| r.outlet_id == outlet_id).collect()
    }

    /// Rows at or below their minimum.
    pub fn low_stock(&self, outlet_id: &str) -> Vec<&OutletInventoryItem> {
        self.rows_for(outlet_id).into_iter().filter(|r| r.is_low()).collect()
    }

    pub fn journal(&self) -> &[InventoryAdjustment] {
        &self.journal
    }

    /// Sum of journaled deltas for one row.
    pub fn journaled_total(&self, outlet_id: &str, material_name: &str) -> Decimal {
        let key = material_key(material_name);
        self.journal
            .iter()
            .filter(|a| a.outlet_id == outlet_id && material_key(&a.material_name) == key)
            .map(|a| a.delta)
            .sum()
    }
}

impl InventoryStore for OutletInventory {
    fn row(&self, outlet_id: &str, material_name: &str) -> Option<&OutletInventoryItem> {
        self.rows
            .get(&(outlet_id.to_string(), material_key(material_name)))
    }

    fn ensure_row(&mut self, outlet_id: &str, material_name: &str) {
        self.rows
            .entry((outlet_id.to_string(), material_key(material_name)))
            .or_insert_with(|| OutletInventoryItem::new(outlet_id, material_name.trim()));
    }

    fn adjust(
        &mut self,
        outlet_id: &str,
        material_name: &str,
        delta: Decimal,
        reason: AdjustmentReason,
        reference: &str,
    ) -> Option<Decimal> {
        let row = self
            .rows
            .get_mut(&(outlet_id.to_string(), material_key(material_name)))?;
        row.quantity += delta;
        let quantity = row.quantity;

        self.journal.push(InventoryAdjustment {
            outlet_id: outlet_id.to_string(),
            material_name: row.material_name.clone(),
            delta,
            reason,
            reference: reference.to_string(),
            recorded_at: Utc::now(),
        });
        Some(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BomLine, Material, Product, Unit};
    use crate::money::Money;
    use crate::types::{ProductionComponent, Role};
    use rust_decimal_macros::dec;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert_material(Material {
            id: "mat-flour".into(),
            name: "Flour".into(),
            unit: Unit::Gram,
            default_cost: Money::from_minor(20),
        });
        catalog.insert_material(Material {
            id: "mat-basil".into(),
            name: "Basil".into(),
            unit: Unit::Gram,
            default_cost: Money::from_minor(50),
        });
        catalog.insert_product(Product::simple(
            "bread",
            "Bread",
            Money::from_minor(15_000),
            vec![
                BomLine { material_id: "mat-flour".into(), qty: dec!(100) },
                BomLine { material_id: "mat-basil".into(), qty: dec!(2) },
            ],
        ));
        catalog
    }

    fn store_with_flour(qty: Decimal) -> OutletInventory {
        let mut row = OutletInventoryItem::new("o1", " Flour");
        row.quantity = qty;
        OutletInventory::from_rows([row])
    }

    fn operator(role: Role) -> Operator {
        Operator { id: "u1".into(), name: "Rina".into(), role }
    }

    fn purchase(qty: Decimal) -> Purchase {
        Purchase {
            id: "pur-1".into(),
            outlet_id: "o1".into(),
            material_name: "Flour".into(),
            quantity: qty,
            total_cost: Money::from_minor(10_000),
            supplier: None,
            staff: "Rina".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_lookup_is_by_trimmed_case_insensitive_name() {
        let store = store_with_flour(dec!(500));
        assert_eq!(store.quantity_of("o1", "FLOUR"), Some(dec!(500)));
        assert_eq!(store.quantity_of("o2", "Flour"), None);
    }

    #[test]
    fn test_locate_goes_through_catalog_name() {
        let catalog = catalog();
        let store = store_with_flour(dec!(500));
        assert!(store.locate(&catalog, "o1", "mat-flour").is_some());
        assert!(store.locate(&catalog, "o1", "mat-basil").is_none());
        assert!(store.locate(&catalog, "o1", "mat-unknown").is_none());
    }

    #[test]
    fn test_adjust_on_missing_row_is_noop() {
        let mut store = OutletInventory::new();
        assert_eq!(
            store.adjust("o1", "Sugar", dec!(-5), AdjustmentReason::Sale, "tx"),
            None
        );
        assert!(store.journal().is_empty());
    }

    #[test]
    fn test_receive_creates_row_once() {
        let mut store = OutletInventory::new();
        let first = store.receive("o1", "Sugar ", dec!(200), AdjustmentReason::Purchase, "p1");
        let second = store.receive("o1", "sugar", dec!(50), AdjustmentReason::Purchase, "p2");

        assert_eq!(first, dec!(200));
        assert_eq!(second, dec!(250));
        assert_eq!(store.rows_for("o1").len(), 1);
        assert_eq!(store.journaled_total("o1", "SUGAR"), dec!(250));
    }

    #[test]
    fn test_journal_sums_to_quantity() {
        let mut store = store_with_flour(dec!(500));
        store.adjust("o1", "Flour", dec!(-120), AdjustmentReason::Sale, "tx-1");
        store.adjust("o1", "Flour", dec!(-500), AdjustmentReason::Sale, "tx-2");
        store.adjust("o1", "Flour", dec!(30.5), AdjustmentReason::Correction, "fix");

        assert_eq!(store.quantity_of("o1", "Flour"), Some(dec!(-89.5)));
        assert_eq!(store.journaled_total("o1", "Flour"), dec!(-89.5));
    }

    #[test]
    fn test_check_availability_fails_open_on_missing_rows() {
        let catalog = catalog();
        let store = store_with_flour(dec!(150));
        let usages = BomResolver::new(&catalog)
            .resolve_id("bread", dec!(2))
            .unwrap();

        let warnings = store.check_availability(&catalog, "o1", &usages);
        // Flour is short (150 < 200); basil has no row and is skipped.
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].material_name, "Flour");
        assert_eq!(warnings[0].required, dec!(200));
    }

    #[test]
    fn test_product_availability_map() {
        let catalog = catalog();
        let store = store_with_flour(dec!(150));
        let map = store.product_availability(&catalog, "o1");
        assert_eq!(map.get("bread"), Some(&true));

        let store = store_with_flour(dec!(50));
        let map = store.product_availability(&catalog, "o1");
        assert_eq!(map.get("bread"), Some(&false));
    }

    #[test]
    fn test_cashier_restock_gate() {
        let mut store = store_with_flour(dec!(0));

        let err = store
            .record_purchase(&operator(Role::Cashier), &purchase(dec!(1000)))
            .unwrap_err();
        assert!(matches!(err, CoreError::RestockNotPermitted { .. }));

        store.configure("o1", "Flour", dec!(100), true);
        let qty = store
            .record_purchase(&operator(Role::Cashier), &purchase(dec!(1000)))
            .unwrap();
        assert_eq!(qty, dec!(1000));
    }

    #[test]
    fn test_manager_purchase_creates_row() {
        let mut store = OutletInventory::new();
        let qty = store
            .record_purchase(&operator(Role::Manager), &purchase(dec!(250)))
            .unwrap();
        assert_eq!(qty, dec!(250));
        assert_eq!(store.quantity_of("o1", "flour"), Some(dec!(250)));
    }

    #[test]
    fn test_transfer_legs_net_to_zero() {
        let mut store = store_with_flour(dec!(1000));
        let transfer = StockTransfer {
            id: "trf-1".into(),
            from_outlet_id: "o1".into(),
            to_outlet_id: "o2".into(),
            material_name: "Flour".into(),
            quantity: dec!(300),
            staff: "Rina".into(),
            note: None,
            timestamp: Utc::now(),
        };
        store.record_transfer(&transfer).unwrap();

        let before = dec!(1000);
        let after = store.quantity_of("o1", "Flour").unwrap() + store.quantity_of("o2", "Flour").unwrap();
        assert_eq!(before, after);
        assert_eq!(store.quantity_of("o2", "flour"), Some(dec!(300)));
    }

    #[test]
    fn test_production_consumes_components_and_yields_result() {
        let catalog = catalog();
        let mut store = store_with_flour(dec!(1000));
        let record = ProductionRecord {
            id: "prod-1".into(),
            outlet_id: "o1".into(),
            result_material_name: "Dough".into(),
            result_quantity: dec!(900),
            components: vec![
                ProductionComponent { material_id: "mat-flour".into(), quantity: dec!(600) },
                ProductionComponent { material_id: "mat-basil".into(), quantity: dec!(5) },
            ],
            staff: "Rina".into(),
            timestamp: Utc::now(),
        };
        store.record_production(&catalog, &record).unwrap();

        assert_eq!(store.quantity_of("o1", "Flour"), Some(dec!(400)));
        assert_eq!(store.quantity_of("o1", "Dough"), Some(dec!(900)));
        assert_eq!(store.quantity_of("o1", "Basil"), None);
    }

    #[test]
    fn test_low_stock() {
        let mut store = store_with_flour(dec!(80));
        store.configure("o1", "Flour", dec!(100), false);
        assert_eq!(store.low_stock("o1").len(), 1);
        assert!(store.low_stock("o2").is_empty());
    }

    #[test]
    fn test_deductions_are_rounded_and_named() {
        let catalog = catalog();
        let usages = vec![
            MaterialUsage { material_id: "mat-flour".into(), quantity: dec!(33.3333) },
            MaterialUsage { material_id: "mat-ghost".into(), quantity: dec!(1) },
        ];
        let deductions = deductions_for(&catalog, &usages);
        assert_eq!(deductions[0].quantity, dec!(33.33));
        assert_eq!(deductions[0].material_name.as_deref(), Some("Flour"));
        assert_eq!(deductions[1].material_name, None);
    }
}
