//! # Movement Ledger
//!
//! A unified, newest-first audit trail of stock movements at one outlet,
//! derived on demand from the event logs. Never stored.
//!
//! ## Projections
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Source                 Entries                     Category            │
//! │  ──────                 ───────                     ────────            │
//! │  Purchase @outlet   ──► IN  +qty                    RESTOCK             │
//! │  Transfer from      ──► OUT −qty                    MUTATION            │
//! │  Transfer to        ──► IN  +qty                    MUTATION            │
//! │  Production @outlet ──► IN  result, OUT per input   PRODUCTION          │
//! │  CLOSED sale        ──► OUT per resolved material   SALES               │
//! │                         (recursive BOM, combos)                         │
//! │                                                                         │
//! │  concat ──► stable sort by timestamp DESC ──► ledger                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Building is pure: the same sources always yield the same ledger, and the
//! sources are never mutated, so concurrent builds need no locking.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::bom::BomResolver;
use crate::catalog::Catalog;
use crate::inventory::deductions_for;
use crate::types::{material_key, ProductionRecord, Purchase, StockTransfer, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementCategory {
    Restock,
    Mutation,
    Production,
    Sales,
}

/// One derived ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MovementEntry {
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub item_name: String,
    /// Positive for IN, negative for OUT.
    #[ts(as = "String")]
    pub quantity: Decimal,
    pub direction: Direction,
    pub category: MovementCategory,
    /// Human-readable origin, e.g. a supplier or the counterpart outlet.
    pub source: String,
    pub staff: String,
    /// Id of the source event.
    pub reference: String,
}

/// Borrowed event logs for one ledger build.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerSources<'a> {
    pub purchases: &'a [Purchase],
    pub transfers: &'a [StockTransfer],
    pub productions: &'a [ProductionRecord],
    pub transactions: &'a [Transaction],
}

/// Builds the full ledger for `outlet_id`, newest first.
pub fn build_ledger(catalog: &Catalog, sources: &LedgerSources<'_>, outlet_id: &str) -> Vec<MovementEntry> {
    let mut entries = Vec::new();

    for purchase in sources.purchases.iter().filter(|p| p.outlet_id == outlet_id) {
        entries.push(MovementEntry {
            timestamp: purchase.timestamp,
            item_name: purchase.material_name.clone(),
            quantity: purchase.quantity,
            direction: Direction::In,
            category: MovementCategory::Restock,
            source: purchase
                .supplier
                .clone()
                .unwrap_or_else(|| "Purchase".to_string()),
            staff: purchase.staff.clone(),
            reference: purchase.id.clone(),
        });
    }

    for transfer in sources.transfers {
        let [out_leg, in_leg] = transfer_legs(transfer);
        if transfer.from_outlet_id == outlet_id {
            entries.push(out_leg);
        } else if transfer.to_outlet_id == outlet_id {
            entries.push(in_leg);
        }
    }

    for record in sources.productions.iter().filter(|r| r.outlet_id == outlet_id) {
        entries.extend(production_entries(catalog, record));
    }

    for tx in sources
        .transactions
        .iter()
        .filter(|t| t.outlet_id == outlet_id && t.is_closed())
    {
        entries.extend(sale_entries(catalog, tx));
    }

    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

/// Like [`build_ledger`], keeping entries with `from <= timestamp < until`.
/// Either bound may be open.
pub fn build_ledger_between(
    catalog: &Catalog,
    sources: &LedgerSources<'_>,
    outlet_id: &str,
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Vec<MovementEntry> {
    build_ledger(catalog, sources, outlet_id)
        .into_iter()
        .filter(|e| from.map_or(true, |f| e.timestamp >= f))
        .filter(|e| until.map_or(true, |u| e.timestamp < u))
        .collect()
}

/// Both legs of a transfer: `[OUT at sender, IN at receiver]`.
///
/// The two quantities always sum to zero.
pub fn transfer_legs(transfer: &StockTransfer) -> [MovementEntry; 2] {
    let leg = |quantity: Decimal, direction: Direction, counterpart: &str, verb: &str| MovementEntry {
        timestamp: transfer.timestamp,
        item_name: transfer.material_name.clone(),
        quantity,
        direction,
        category: MovementCategory::Mutation,
        source: format!("Transfer {} {}", verb, counterpart),
        staff: transfer.staff.clone(),
        reference: transfer.id.clone(),
    };

    [
        leg(-transfer.quantity, Direction::Out, &transfer.to_outlet_id, "to"),
        leg(transfer.quantity, Direction::In, &transfer.from_outlet_id, "from"),
    ]
}

fn production_entries(catalog: &Catalog, record: &ProductionRecord) -> Vec<MovementEntry> {
    let mut entries = Vec::with_capacity(record.components.len() + 1);

    entries.push(MovementEntry {
        timestamp: record.timestamp,
        item_name: record.result_material_name.clone(),
        quantity: record.result_quantity,
        direction: Direction::In,
        category: MovementCategory::Production,
        source: "Production".to_string(),
        staff: record.staff.clone(),
        reference: record.id.clone(),
    });

    for component in &record.components {
        let (name, quantity) = match catalog.material(&component.material_id) {
            Some(m) => (m.name.clone(), m.unit.round(component.quantity)),
            None => (component.material_id.clone(), component.quantity),
        };
        entries.push(MovementEntry {
            timestamp: record.timestamp,
            item_name: name,
            quantity: -quantity,
            direction: Direction::Out,
            category: MovementCategory::Production,
            source: format!("Production of {}", record.result_material_name),
            staff: record.staff.clone(),
            reference: record.id.clone(),
        });
    }
    entries
}

/// Lines whose product is gone from the catalog, or no longer resolves,
/// contribute nothing.
fn sale_entries(catalog: &Catalog, tx: &Transaction) -> Vec<MovementEntry> {
    let resolver = BomResolver::new(catalog);
    let mut entries = Vec::new();

    for line in &tx.lines {
        let Some(product) = catalog.product(&line.product_id) else {
            continue;
        };
        let Ok(usages) = resolver.resolve_merged(product, Decimal::from(line.quantity)) else {
            continue;
        };

        for deduction in deductions_for(catalog, &usages) {
            entries.push(MovementEntry {
                timestamp: tx.timestamp,
                item_name: deduction
                    .material_name
                    .unwrap_or_else(|| deduction.material_id.clone()),
                quantity: -deduction.quantity,
                direction: Direction::Out,
                category: MovementCategory::Sales,
                source: format!("Sale: {}", line.name_snapshot),
                staff: tx.cashier_name.clone(),
                reference: tx.id.clone(),
            });
        }
    }
    entries
}

// =============================================================================
// Summary
// =============================================================================

/// Net movement of one item over a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemNet {
    pub item_name: String,
    #[ts(as = "String")]
    pub incoming: Decimal,
    #[ts(as = "String")]
    pub outgoing: Decimal,
    #[ts(as = "String")]
    pub net: Decimal,
}

/// Per-item totals, ordered by normalized item name.
pub fn net_by_item(entries: &[MovementEntry]) -> Vec<ItemNet> {
    let mut totals: BTreeMap<String, ItemNet> = BTreeMap::new();

    for entry in entries {
        let item = totals
            .entry(material_key(&entry.item_name))
            .or_insert_with(|| ItemNet {
                item_name: entry.item_name.clone(),
                incoming: Decimal::ZERO,
                outgoing: Decimal::ZERO,
                net: Decimal::ZERO,
            });
        match entry.direction {
            Direction::In => item.incoming += entry.quantity,
            Direction::Out => item.outgoing -= entry.quantity,
        }
        item.net += entry.quantity;
    }
    totals.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BomLine, ComboItem, Material, Product, Unit};
    use crate::money::Money;
    use crate::types::{
        PaymentMethod, ProductionComponent, TransactionLine, TransactionStatus,
    };
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

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

    fn sale(id: &str, at: DateTime<Utc>, status: TransactionStatus, product: &str) -> Transaction {
        Transaction {
            id: id.into(),
            outlet_id: "o1".into(),
            timestamp: at,
            cashier_id: "u1".into(),
            cashier_name: "Dewi".into(),
            lines: vec![TransactionLine {
                product_id: product.into(),
                name_snapshot: product.into(),
                unit_price: Money::from_minor(25_000),
                quantity: 1,
                line_total: Money::from_minor(25_000),
            }],
            subtotal: Money::from_minor(25_000),
            tier_discount: Money::zero(),
            bulk_discount: Money::zero(),
            point_discount: Money::zero(),
            total: Money::from_minor(25_000),
            payment_method: PaymentMethod::Cash,
            status,
            customer_id: None,
            points_earned: 0,
            points_redeemed: 0,
        }
    }

    struct Fixture {
        purchases: Vec<Purchase>,
        transfers: Vec<StockTransfer>,
        productions: Vec<ProductionRecord>,
        transactions: Vec<Transaction>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                purchases: vec![Purchase {
                    id: "pur-1".into(),
                    outlet_id: "o1".into(),
                    material_name: "Flour".into(),
                    quantity: dec!(5000),
                    total_cost: Money::from_minor(100_000),
                    supplier: Some("Mill Co".into()),
                    staff: "Rina".into(),
                    timestamp: t(0),
                }],
                transfers: vec![StockTransfer {
                    id: "trf-1".into(),
                    from_outlet_id: "o1".into(),
                    to_outlet_id: "o2".into(),
                    material_name: "Flour".into(),
                    quantity: dec!(1000),
                    staff: "Rina".into(),
                    note: None,
                    timestamp: t(10),
                }],
                productions: vec![ProductionRecord {
                    id: "prod-1".into(),
                    outlet_id: "o1".into(),
                    result_material_name: "Dough".into(),
                    result_quantity: dec!(800),
                    components: vec![ProductionComponent {
                        material_id: "mat-flour".into(),
                        quantity: dec!(600),
                    }],
                    staff: "Rina".into(),
                    timestamp: t(20),
                }],
                transactions: vec![
                    sale("tx-1", t(30), TransactionStatus::Closed, "A"),
                    sale("tx-open", t(40), TransactionStatus::Open, "A"),
                    sale("tx-gone", t(50), TransactionStatus::Closed, "deleted-product"),
                ],
            }
        }

        fn sources(&self) -> LedgerSources<'_> {
            LedgerSources {
                purchases: &self.purchases,
                transfers: &self.transfers,
                productions: &self.productions,
                transactions: &self.transactions,
            }
        }
    }

    #[test]
    fn test_ledger_unions_all_sources_newest_first() {
        let catalog = catalog();
        let fixture = Fixture::new();
        let ledger = build_ledger(&catalog, &fixture.sources(), "o1");

        let categories: Vec<_> = ledger.iter().map(|e| e.category).collect();
        assert_eq!(
            categories,
            vec![
                MovementCategory::Sales,
                MovementCategory::Sales,
                MovementCategory::Production,
                MovementCategory::Production,
                MovementCategory::Mutation,
                MovementCategory::Restock,
            ]
        );

        assert_eq!(ledger[0].item_name, "Flour");
        assert_eq!(ledger[0].quantity, dec!(-200));
        assert_eq!(ledger[1].item_name, "Cheese");
        assert_eq!(ledger[1].quantity, dec!(-50));
        assert_eq!(ledger[4].direction, Direction::Out);
        assert_eq!(ledger[4].quantity, dec!(-1000));
        assert!(ledger.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn test_receiving_outlet_sees_in_leg() {
        let catalog = catalog();
        let fixture = Fixture::new();
        let ledger = build_ledger(&catalog, &fixture.sources(), "o2");

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].direction, Direction::In);
        assert_eq!(ledger[0].quantity, dec!(1000));
        assert_eq!(ledger[0].source, "Transfer from o1");
    }

    #[test]
    fn test_rebuild_is_identical() {
        let catalog = catalog();
        let fixture = Fixture::new();

        let first = serde_json::to_string(&build_ledger(&catalog, &fixture.sources(), "o1")).unwrap();
        let second = serde_json::to_string(&build_ledger(&catalog, &fixture.sources(), "o1")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_transfer_legs_sum_to_zero() {
        let fixture = Fixture::new();
        let [out_leg, in_leg] = transfer_legs(&fixture.transfers[0]);
        assert_eq!(out_leg.quantity + in_leg.quantity, Decimal::ZERO);
        assert_eq!(out_leg.direction, Direction::Out);
        assert_eq!(in_leg.direction, Direction::In);
    }

    #[test]
    fn test_window_filter() {
        let catalog = catalog();
        let fixture = Fixture::new();
        let ledger = build_ledger_between(&catalog, &fixture.sources(), "o1", Some(t(10)), Some(t(30)));

        assert_eq!(ledger.len(), 3);
        assert!(ledger.iter().all(|e| e.category != MovementCategory::Sales));
    }

    #[test]
    fn test_net_by_item() {
        let catalog = catalog();
        let fixture = Fixture::new();
        let ledger = build_ledger(&catalog, &fixture.sources(), "o1");
        let summary = net_by_item(&ledger);

        let flour = summary.iter().find(|i| i.item_name == "Flour").unwrap();
        assert_eq!(flour.incoming, dec!(5000));
        assert_eq!(flour.outgoing, dec!(1800));
        assert_eq!(flour.net, dec!(3200));
    }
}
