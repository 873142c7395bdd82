//! # Catalog Repository
//!
//! Products, material templates and categories.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products                                                               │
//! │  ├── id, name, price, category_id, is_combo                             │
//! │  ├── bom              TEXT  [{"materialId":"m1","qty":"100"}]           │
//! │  ├── combo_items      TEXT  [{"productId":"p2","qty":"2"}]              │
//! │  └── outlet_settings  TEXT  {"o1":{"price":12000,"isAvailable":true}}   │
//! │                                                                         │
//! │  The nested lists are only ever read whole, so they stay JSON.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Products are shape-checked before every write; a combo with a BOM or a
//! simple item with combo lines never reaches the table.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::decode_json;
use tally_core::catalog::{BomLine, Catalog, Category, ComboItem, Material, OutletSetting, Product, Unit};
use tally_core::Money;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price: i64,
    category_id: Option<String>,
    is_combo: bool,
    bom: String,
    combo_items: String,
    outlet_settings: String,
}

impl ProductRow {
    fn into_product(self) -> DbResult<Product> {
        let bom: Vec<BomLine> = decode_json("products.bom", &self.bom)?;
        let combo_items: Vec<ComboItem> = decode_json("products.combo_items", &self.combo_items)?;
        let outlet_settings: BTreeMap<String, OutletSetting> =
            decode_json("products.outlet_settings", &self.outlet_settings)?;

        Ok(Product {
            id: self.id,
            name: self.name,
            price: Money::from_minor(self.price),
            category_id: self.category_id,
            is_combo: self.is_combo,
            bom,
            combo_items,
            outlet_settings,
        })
    }
}

#[derive(Debug, FromRow)]
struct MaterialRow {
    id: String,
    name: String,
    unit: String,
    default_cost: i64,
}

impl MaterialRow {
    fn into_material(self) -> DbResult<Material> {
        let unit = Unit::from_str(&self.unit).map_err(|e| DbError::payload("materials.unit", e))?;
        Ok(Material {
            id: self.id,
            name: self.name,
            unit,
            default_cost: Money::from_minor(self.default_cost),
        })
    }
}

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    pub async fn upsert_category(&self, category: &Category) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_categories(&self) -> DbResult<Vec<Category>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, name FROM categories ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id, name)| Category { id, name }).collect())
    }

    // -------------------------------------------------------------------------
    // Materials
    // -------------------------------------------------------------------------

    pub async fn upsert_material(&self, material: &Material) -> DbResult<()> {
        debug!(id = %material.id, name = %material.name, "Upserting material");

        sqlx::query(
            r#"
            INSERT INTO materials (id, name, unit, default_cost) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                unit = excluded.unit,
                default_cost = excluded.default_cost
            "#,
        )
        .bind(&material.id)
        .bind(&material.name)
        .bind(material.unit.code())
        .bind(material.default_cost.minor())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_materials(&self) -> DbResult<Vec<Material>> {
        let rows: Vec<MaterialRow> =
            sqlx::query_as("SELECT id, name, unit, default_cost FROM materials ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(MaterialRow::into_material).collect()
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Inserts or replaces a product.
    ///
    /// ## Errors
    /// `DbError::Payload` when the product breaks the combo/simple shape.
    pub async fn upsert_product(&self, product: &Product) -> DbResult<()> {
        product
            .check_shape()
            .map_err(|e| DbError::payload("products", e))?;

        debug!(id = %product.id, is_combo = product.is_combo, "Upserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, price, category_id, is_combo,
                bom, combo_items, outlet_settings, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                category_id = excluded.category_id,
                is_combo = excluded.is_combo,
                bom = excluded.bom,
                combo_items = excluded.combo_items,
                outlet_settings = excluded.outlet_settings,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price.minor())
        .bind(&product.category_id)
        .bind(product.is_combo)
        .bind(serde_json::to_string(&product.bom)?)
        .bind(serde_json::to_string(&product.combo_items)?)
        .bind(serde_json::to_string(&product.outlet_settings)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, price, category_id, is_combo, bom, combo_items, outlet_settings
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProductRow::into_product).transpose()
    }

    pub async fn list_products(&self) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, price, category_id, is_combo, bom, combo_items, outlet_settings
            FROM products
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProductRow::into_product).collect()
    }

    /// Deletes a product. Returns false when it did not exist.
    pub async fn delete_product(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_products(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Loads the full catalog snapshot used by checkout and the ledger.
    pub async fn load_catalog(&self) -> DbResult<Catalog> {
        let products = self.list_products().await?;
        let materials = self.list_materials().await?;
        let categories = self.list_categories().await?;

        debug!(
            products = products.len(),
            materials = materials.len(),
            categories = categories.len(),
            "Catalog loaded"
        );

        Ok(Catalog::from_parts(products, materials, categories))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use rust_decimal_macros::dec;

    async fn repo() -> CatalogRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().catalog()
    }

    fn bread() -> Product {
        Product::simple(
            "bread",
            "Bread",
            Money::from_minor(10_000),
            vec![BomLine { material_id: "flour".into(), qty: dec!(100.5) }],
        )
        .with_outlet_setting(
            "o2",
            OutletSetting { price: Money::from_minor(12_000), is_available: false },
        )
    }

    #[tokio::test]
    async fn test_product_round_trip_keeps_nested_columns() {
        let repo = repo().await;
        repo.upsert_product(&bread()).await.unwrap();

        let loaded = repo.get_product("bread").await.unwrap().unwrap();
        assert_eq!(loaded, bread());
        assert!(!loaded.is_available_at("o2"));
        assert!(repo.get_product("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_product_is_refused() {
        let repo = repo().await;
        let mut broken = bread();
        broken.is_combo = true;

        assert!(matches!(
            repo.upsert_product(&broken).await,
            Err(DbError::Payload { .. })
        ));
        assert_eq!(repo.count_products().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_catalog_resolves_material_names() {
        let repo = repo().await;
        repo.upsert_category(&Category { id: "bakery".into(), name: "Bakery".into() })
            .await
            .unwrap();
        repo.upsert_material(&Material {
            id: "flour".into(),
            name: "Flour".into(),
            unit: Unit::Gram,
            default_cost: Money::from_minor(15),
        })
        .await
        .unwrap();
        repo.upsert_product(&bread()).await.unwrap();
        repo.upsert_product(&Product::combo(
            "duo",
            "Bread Duo",
            Money::from_minor(18_000),
            vec![ComboItem { product_id: "bread".into(), qty: dec!(2) }],
        ))
        .await
        .unwrap();

        let catalog = repo.load_catalog().await.unwrap();
        assert_eq!(catalog.material_name("flour"), Some("Flour"));
        assert!(catalog.category("bakery").is_some());
        assert!(catalog.validate().is_ok());

        assert!(repo.delete_product("duo").await.unwrap());
        assert!(!repo.delete_product("duo").await.unwrap());
    }
}
