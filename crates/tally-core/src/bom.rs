//! # BOM Resolver
//!
//! Expands a sold or produced product into the flat list of raw materials it
//! consumes.
//!
//! ## Resolution
//! ```text
//! resolve(Family Pack, 1)
//!   │
//!   ├── 2× Pizza  ──► resolve(Pizza, 2)  ──► [flour 200, cheese 100]
//!   ├── 1× Cola   ──► resolve(Cola, 1)   ──► [cola syrup 30]
//!   └── 1× Kids Meal (combo) ──► resolve(Kids Meal, 1) ──► ...
//!
//! multiplier is carried down exactly (Decimal); nothing is rounded here.
//! ```
//!
//! Nested combos are flattened. A combo that reaches itself is rejected with
//! [`CoreError::ComboCycle`] instead of recursing forever.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::catalog::{Catalog, Product};
use crate::error::{CoreError, CoreResult, ValidationError};

/// Raw consumption of one catalog material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MaterialUsage {
    pub material_id: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
}

/// Stateless resolver over a catalog snapshot.
#[derive(Debug, Clone, Copy)]
pub struct BomResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> BomResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        BomResolver { catalog }
    }

    /// Resolves `product` scaled by `multiplier` into raw material usages.
    ///
    /// Results are concatenated in BOM/component order; the same material may
    /// appear more than once. See [`BomResolver::resolve_merged`].
    pub fn resolve(&self, product: &Product, multiplier: Decimal) -> CoreResult<Vec<MaterialUsage>> {
        if multiplier <= Decimal::ZERO {
            return Err(ValidationError::MustBePositive {
                field: "multiplier".to_string(),
            }
            .into());
        }

        let mut out = Vec::new();
        let mut path = Vec::new();
        self.expand(product, multiplier, &mut path, &mut out)?;
        Ok(out)
    }

    /// Looks the product up by id, then resolves it.
    pub fn resolve_id(&self, product_id: &str, multiplier: Decimal) -> CoreResult<Vec<MaterialUsage>> {
        let product = self.catalog.require_product(product_id)?;
        self.resolve(product, multiplier)
    }

    /// Like [`BomResolver::resolve`] but sums repeated materials, keeping the
    /// order in which each material first appeared.
    pub fn resolve_merged(&self, product: &Product, multiplier: Decimal) -> CoreResult<Vec<MaterialUsage>> {
        Ok(merge(self.resolve(product, multiplier)?))
    }

    /// Resolves a whole cart, given as `(product_id, quantity)` pairs, into
    /// merged usages.
    pub fn resolve_cart<'l, I>(&self, lines: I) -> CoreResult<Vec<MaterialUsage>>
    where
        I: IntoIterator<Item = (&'l str, Decimal)>,
    {
        let mut all = Vec::new();
        for (product_id, qty) in lines {
            all.extend(self.resolve_id(product_id, qty)?);
        }
        Ok(merge(all))
    }

    fn expand<'p>(
        &self,
        product: &'p Product,
        multiplier: Decimal,
        path: &mut Vec<&'p str>,
        out: &mut Vec<MaterialUsage>,
    ) -> CoreResult<()>
    where
        'a: 'p,
    {
        if !product.is_combo {
            out.extend(product.bom.iter().map(|line| MaterialUsage {
                material_id: line.material_id.clone(),
                quantity: line.qty * multiplier,
            }));
            return Ok(());
        }

        if path.contains(&product.id.as_str()) {
            let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            cycle.push(product.id.clone());
            return Err(CoreError::ComboCycle { path: cycle });
        }

        path.push(&product.id);
        for item in &product.combo_items {
            let component = self.catalog.require_product(&item.product_id)?;
            self.expand(component, multiplier * item.qty, path, out)?;
        }
        path.pop();
        Ok(())
    }
}

fn merge(usages: Vec<MaterialUsage>) -> Vec<MaterialUsage> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<MaterialUsage> = Vec::with_capacity(usages.len());

    for usage in usages {
        match index.get(&usage.material_id) {
            Some(&i) => merged[i].quantity += usage.quantity,
            None => {
                index.insert(usage.material_id.clone(), merged.len());
                merged.push(usage);
            }
        }
    }
    merged
}
