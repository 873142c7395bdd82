//! # Catalog Model
//!
//! Static definitions shared by every outlet: products, combos, bill-of-
//! materials templates, materials and categories.
//!
//! ## Product Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Product Shapes                                  │
//! │                                                                         │
//! │  SIMPLE                              COMBO                              │
//! │  ───────                             ─────                              │
//! │  is_combo = false                    is_combo = true                    │
//! │  bom = [flour 100g, cheese 50g]      bom = []                           │
//! │  combo_items = []                    combo_items = [2× Pizza, 1× Cola]  │
//! │                                                                         │
//! │  BOM lines point at CATALOG material ids. Outlets hold stock rows by    │
//! │  material NAME, so one recipe serves every outlet.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashSet};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation::{validate_price, validate_product_name};

// =============================================================================
// Units
// =============================================================================

/// Unit of measure for a catalog material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Unit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "ml")]
    Milliliter,
    #[serde(rename = "l")]
    Liter,
    #[serde(rename = "pcs")]
    Piece,
    #[serde(rename = "pack")]
    Pack,
}

impl Unit {
    /// Number of decimal places a stock quantity keeps in this unit.
    pub const fn precision(&self) -> u32 {
        match self {
            Unit::Gram | Unit::Milliliter => 2,
            Unit::Kilogram | Unit::Liter => 3,
            Unit::Piece | Unit::Pack => 2,
        }
    }

    /// Rounds a final deduction quantity to the unit's native precision.
    ///
    /// Only applied once, after the full BOM multiplication.
    pub fn round(&self, quantity: Decimal) -> Decimal {
        quantity.round_dp_with_strategy(self.precision(), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Short code used in storage and on screens.
    pub const fn code(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Milliliter => "ml",
            Unit::Liter => "l",
            Unit::Piece => "pcs",
            Unit::Pack => "pack",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Unit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "g" | "gram" | "grams" => Ok(Unit::Gram),
            "kg" | "kilogram" => Ok(Unit::Kilogram),
            "ml" | "milliliter" => Ok(Unit::Milliliter),
            "l" | "liter" | "litre" => Ok(Unit::Liter),
            "pcs" | "pc" | "piece" => Ok(Unit::Piece),
            "pack" => Ok(Unit::Pack),
            other => Err(CoreError::Validation(
                crate::error::ValidationError::InvalidFormat {
                    field: "unit".to_string(),
                    reason: format!("unknown unit '{}'", other),
                },
            )),
        }
    }
}

// =============================================================================
// Material
// =============================================================================

/// Catalog-level raw material template. Carries no quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub name: String,
    pub unit: Unit,
    /// Default cost per unit, used when an outlet row has none.
    pub default_cost: Money,
}

/// Product grouping, used by catalog screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
}

// =============================================================================
// Product
// =============================================================================

/// One raw material consumed by one unit of a simple product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BomLine {
    pub material_id: String,
    #[ts(as = "String")]
    pub qty: Decimal,
}

/// One component product inside a combo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ComboItem {
    pub product_id: String,
    #[ts(as = "String")]
    pub qty: Decimal,
}

/// Per-outlet override of price and availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OutletSetting {
    pub price: Money,
    pub is_available: bool,
}

/// A sellable product, either simple (with a BOM) or a combo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Base price, used wherever no outlet override exists.
    pub price: Money,
    pub category_id: Option<String>,
    pub is_combo: bool,
    #[serde(default)]
    pub bom: Vec<BomLine>,
    #[serde(default)]
    pub combo_items: Vec<ComboItem>,
    #[serde(default)]
    pub outlet_settings: BTreeMap<String, OutletSetting>,
}

impl Product {
    /// Creates a simple product with the given BOM.
    pub fn simple(id: impl Into<String>, name: impl Into<String>, price: Money, bom: Vec<BomLine>) -> Self {
        Product {
            id: id.into(),
            name: name.into(),
            price,
            category_id: None,
            is_combo: false,
            bom,
            combo_items: Vec::new(),
            outlet_settings: BTreeMap::new(),
        }
    }

    /// Creates a combo product from component products.
    pub fn combo(
        id: impl Into<String>,
        name: impl Into<String>,
        price: Money,
        combo_items: Vec<ComboItem>,
    ) -> Self {
        Product {
            id: id.into(),
            name: name.into(),
            price,
            category_id: None,
            is_combo: true,
            bom: Vec::new(),
            combo_items,
            outlet_settings: BTreeMap::new(),
        }
    }

    /// Sets an outlet override (builder style, mostly for seeding and tests).
    pub fn with_outlet_setting(mut self, outlet_id: impl Into<String>, setting: OutletSetting) -> Self {
        self.outlet_settings.insert(outlet_id.into(), setting);
        self
    }

    /// Whether the product may be sold at `outlet_id`.
    ///
    /// Products without an override are available everywhere.
    pub fn is_available_at(&self, outlet_id: &str) -> bool {
        self.outlet_settings
            .get(outlet_id)
            .map(|s| s.is_available)
            .unwrap_or(true)
    }

    /// Checks the combo/simple structural invariant for this product alone.
    pub fn check_shape(&self) -> CoreResult<()> {
        let malformed = |reason: &str| CoreError::MalformedProduct {
            product_id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.is_combo {
            if self.combo_items.is_empty() {
                return Err(malformed("combo has no components"));
            }
            if !self.bom.is_empty() {
                return Err(malformed("combo must not carry its own BOM"));
            }
        } else if !self.combo_items.is_empty() {
            return Err(malformed("simple product must not list combo components"));
        }

        if self.bom.iter().any(|l| l.qty <= Decimal::ZERO) {
            return Err(malformed("BOM quantities must be positive"));
        }
        if self.combo_items.iter().any(|c| c.qty <= Decimal::ZERO) {
            return Err(malformed("combo quantities must be positive"));
        }
        Ok(())
    }
}

// =============================================================================
// Catalog Snapshot
// =============================================================================

/// Immutable-by-convention snapshot of the shared catalog.
///
/// Services borrow a `Catalog` per call instead of reading global state, so
/// two terminals can hold different snapshots without interfering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    products: BTreeMap<String, Product>,
    materials: BTreeMap<String, Material>,
    categories: BTreeMap<String, Category>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from loaded rows.
    pub fn from_parts(
        products: impl IntoIterator<Item = Product>,
        materials: impl IntoIterator<Item = Material>,
        categories: impl IntoIterator<Item = Category>,
    ) -> Self {
        Catalog {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            materials: materials.into_iter().map(|m| (m.id.clone(), m)).collect(),
            categories: categories.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn insert_material(&mut self, material: Material) {
        self.materials.insert(material.id.clone(), material);
    }

    pub fn insert_category(&mut self, category: Category) {
        self.categories.insert(category.id.clone(), category);
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    /// Like [`Catalog::product`] but fails with `ProductNotFound`.
    pub fn require_product(&self, id: &str) -> CoreResult<&Product> {
        self.products
            .get(id)
            .ok_or_else(|| CoreError::ProductNotFound(id.to_string()))
    }

    pub fn material(&self, id: &str) -> Option<&Material> {
        self.materials.get(id)
    }

    /// First half of the catalog-id → name → outlet-row lookup.
    pub fn material_name(&self, id: &str) -> Option<&str> {
        self.materials.get(id).map(|m| m.name.as_str())
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.materials.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// Validates every product against the catalog.
    ///
    /// ## Checks
    /// - non-empty name, non-negative base and outlet prices
    /// - combo/simple shape (see [`Product::check_shape`])
    /// - combo components and BOM materials exist
    /// - categories exist, when categories are loaded
    /// - no combo reaches itself (nested combos are otherwise allowed)
    pub fn validate(&self) -> CoreResult<()> {
        for product in self.products.values() {
            validate_product_name(&product.name)?;
            validate_price(product.price)?;
            for setting in product.outlet_settings.values() {
                validate_price(setting.price)?;
            }
            product.check_shape()?;

            for item in &product.combo_items {
                if !self.products.contains_key(&item.product_id) {
                    return Err(CoreError::ProductNotFound(item.product_id.clone()));
                }
            }
            for line in &product.bom {
                if !self.materials.contains_key(&line.material_id) {
                    return Err(CoreError::MaterialNotFound(line.material_id.clone()));
                }
            }
            if let Some(category_id) = &product.category_id {
                if !self.categories.is_empty() && !self.categories.contains_key(category_id) {
                    return Err(CoreError::MalformedProduct {
                        product_id: product.id.clone(),
                        reason: format!("unknown category '{}'", category_id),
                    });
                }
            }
        }

        let mut cleared = HashSet::new();
        for product in self.products.values().filter(|p| p.is_combo) {
            let mut path = Vec::new();
            self.walk_combo(product, &mut path, &mut cleared)?;
        }
        Ok(())
    }

    fn walk_combo<'a>(
        &'a self,
        product: &'a Product,
        path: &mut Vec<&'a str>,
        cleared: &mut HashSet<&'a str>,
    ) -> CoreResult<()> {
        if cleared.contains(product.id.as_str()) {
            return Ok(());
        }
        if path.contains(&product.id.as_str()) {
            let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            cycle.push(product.id.clone());
            return Err(CoreError::ComboCycle { path: cycle });
        }

        path.push(&product.id);
        for item in &product.combo_items {
            let component = self.require_product(&item.product_id)?;
            if component.is_combo {
                self.walk_combo(component, path, cleared)?;
            }
        }
        path.pop();
        cleared.insert(&product.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use rust_decimal_macros::dec;

    fn flour() -> Material {
        Material {
            id: "mat-flour".into(),
            name: "Flour".into(),
            unit: Unit::Gram,
            default_cost: Money::from_minor(20),
        }
    }

    fn bread() -> Product {
        Product::simple(
            "bread",
            "Bread",
            Money::from_minor(15_000),
            vec![BomLine {
                material_id: "mat-flour".into(),
                qty: dec!(100),
            }],
        )
    }

    #[test]
    fn test_unit_rounding_applies_native_precision() {
        assert_eq!(Unit::Gram.round(dec!(33.3333)), dec!(33.33));
        assert_eq!(Unit::Kilogram.round(dec!(0.12345)), dec!(0.123));
        assert_eq!(Unit::Piece.round(dec!(0.125)), dec!(0.13));
        assert_eq!("KG".parse::<Unit>().unwrap(), Unit::Kilogram);
        assert!("bushel".parse::<Unit>().is_err());
    }

    #[test]
    fn test_shape_rules() {
        let mut combo = Product::combo("c", "Combo", Money::zero(), vec![]);
        assert!(combo.check_shape().is_err());

        combo.combo_items.push(ComboItem {
            product_id: "bread".into(),
            qty: dec!(1),
        });
        assert!(combo.check_shape().is_ok());

        combo.bom.push(BomLine {
            material_id: "mat-flour".into(),
            qty: dec!(1),
        });
        assert!(combo.check_shape().is_err());

        let mut simple = bread();
        simple.bom[0].qty = dec!(0);
        assert!(simple.check_shape().is_err());
    }

    #[test]
    fn test_validate_accepts_nested_combos() {
        let mut catalog = Catalog::new();
        catalog.insert_material(flour());
        catalog.insert_product(bread());
        catalog.insert_product(Product::combo(
            "duo",
            "Bread Duo",
            Money::from_minor(28_000),
            vec![ComboItem { product_id: "bread".into(), qty: dec!(2) }],
        ));
        catalog.insert_product(Product::combo(
            "party",
            "Party Pack",
            Money::from_minor(50_000),
            vec![ComboItem { product_id: "duo".into(), qty: dec!(2) }],
        ));

        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_cycles() {
        let mut catalog = Catalog::new();
        catalog.insert_material(flour());
        catalog.insert_product(bread());
        catalog.insert_product(Product::combo(
            "a",
            "A",
            Money::zero(),
            vec![ComboItem { product_id: "b".into(), qty: dec!(1) }],
        ));
        catalog.insert_product(Product::combo(
            "b",
            "B",
            Money::zero(),
            vec![
                ComboItem { product_id: "bread".into(), qty: dec!(1) },
                ComboItem { product_id: "a".into(), qty: dec!(1) },
            ],
        ));

        let err = catalog.validate().unwrap_err();
        assert!(matches!(err, CoreError::ComboCycle { .. }));
    }

    #[test]
    fn test_validate_rejects_unknown_references() {
        let mut catalog = Catalog::new();
        catalog.insert_product(bread());
        assert!(matches!(
            catalog.validate(),
            Err(CoreError::MaterialNotFound(id)) if id == "mat-flour"
        ));

        catalog.insert_material(flour());
        catalog.insert_product(Product::combo(
            "ghost-combo",
            "Ghost",
            Money::zero(),
            vec![ComboItem { product_id: "ghost".into(), qty: dec!(1) }],
        ));
        assert!(matches!(
            catalog.validate(),
            Err(CoreError::ProductNotFound(id)) if id == "ghost"
        ));
    }

    #[test]
    fn test_validate_rejects_blank_names_and_negative_prices() {
        let mut catalog = Catalog::new();
        catalog.insert_material(flour());
        let mut nameless = bread();
        nameless.name = "   ".into();
        catalog.insert_product(nameless);
        assert!(matches!(
            catalog.validate(),
            Err(CoreError::Validation(ValidationError::Required { field })) if field == "name"
        ));

        catalog.insert_product(bread().with_outlet_setting(
            "outlet-2",
            OutletSetting {
                price: Money::from_minor(-500),
                is_available: true,
            },
        ));
        assert!(matches!(
            catalog.validate(),
            Err(CoreError::Validation(ValidationError::MustNotBeNegative { .. }))
        ));

        catalog.insert_product(bread());
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_outlet_availability_defaults_to_true() {
        let product = bread().with_outlet_setting(
            "outlet-2",
            OutletSetting {
                price: Money::from_minor(16_000),
                is_available: false,
            },
        );
        assert!(product.is_available_at("outlet-1"));
        assert!(!product.is_available_at("outlet-2"));
    }
}
