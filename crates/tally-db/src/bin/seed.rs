//! # Seed Data Generator
//!
//! Populates the database with a small two-outlet bakery for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! ## Generated Data
//! - Categories: Bread, Drinks, Bundles
//! - Materials with units (flour in grams, milk in millilitres, ...)
//! - Simple products with BOMs, plus one combo
//! - Stock rows for both outlets and one Gold-tier customer

use std::env;

use rust_decimal::Decimal;
use tally_core::catalog::{BomLine, Category, ComboItem, Material, OutletSetting, Product, Unit};
use tally_core::{Customer, MembershipTier, Money, OutletInventoryItem, Percent};
use tally_db::{Database, DbConfig};
use tracing_subscriber::EnvFilter;

const OUTLETS: &[&str] = &["outlet-central", "outlet-harbour"];

/// (id, name, unit, default cost per unit in minor units)
const MATERIALS: &[(&str, &str, Unit, i64)] = &[
    ("flour", "Flour", Unit::Gram, 12),
    ("sugar", "Sugar", Unit::Gram, 15),
    ("butter", "Butter", Unit::Gram, 90),
    ("egg", "Egg", Unit::Piece, 2_000),
    ("milk", "Milk", Unit::Milliliter, 20),
    ("coffee", "Coffee Beans", Unit::Gram, 250),
    ("cup", "Paper Cup", Unit::Piece, 700),
];

/// (material id, starting quantity, low-stock threshold)
const STOCK: &[(&str, i64, i64)] = &[
    ("flour", 25_000, 5_000),
    ("sugar", 10_000, 2_000),
    ("butter", 5_000, 1_000),
    ("egg", 120, 24),
    ("milk", 20_000, 4_000),
    ("coffee", 3_000, 500),
    ("cup", 300, 50),
];

fn line(material_id: &str, qty: i64) -> BomLine {
    BomLine {
        material_id: material_id.to_string(),
        qty: Decimal::from(qty),
    }
}

fn products() -> Vec<Product> {
    let mut croissant = Product::simple(
        "croissant",
        "Butter Croissant",
        Money::from_minor(18_000),
        vec![line("flour", 60), line("butter", 30), line("egg", 1)],
    );
    croissant.category_id = Some("bread".into());

    let mut loaf = Product::simple(
        "sweet-loaf",
        "Sweet Loaf",
        Money::from_minor(32_000),
        vec![line("flour", 250), line("sugar", 40), line("milk", 120), line("egg", 2)],
    );
    loaf.category_id = Some("bread".into());

    let mut latte = Product::simple(
        "latte",
        "Caffe Latte",
        Money::from_minor(28_000),
        vec![line("coffee", 18), line("milk", 180), line("cup", 1)],
    )
    // Harbour outlet sells the latte at a premium.
    .with_outlet_setting(
        "outlet-harbour",
        OutletSetting {
            price: Money::from_minor(30_000),
            is_available: true,
        },
    );
    latte.category_id = Some("drinks".into());

    let mut breakfast = Product::combo(
        "breakfast-set",
        "Breakfast Set",
        Money::from_minor(42_000),
        vec![
            ComboItem {
                product_id: "croissant".into(),
                qty: Decimal::ONE,
            },
            ComboItem {
                product_id: "latte".into(),
                qty: Decimal::ONE,
            },
        ],
    );
    breakfast.category_id = Some("bundles".into());

    vec![croissant, loaf, latte, breakfast]
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path = "./tally_dev.db".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tally POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!("Outlets:  {}", OUTLETS.join(", "));
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.catalog().count_products().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let catalog = db.catalog();
    for (id, name) in [("bread", "Bread"), ("drinks", "Drinks"), ("bundles", "Bundles")] {
        catalog
            .upsert_category(&Category {
                id: id.into(),
                name: name.into(),
            })
            .await?;
    }

    for (id, name, unit, cost) in MATERIALS {
        catalog
            .upsert_material(&Material {
                id: (*id).into(),
                name: (*name).into(),
                unit: *unit,
                default_cost: Money::from_minor(*cost),
            })
            .await?;
    }
    println!("✓ {} materials", MATERIALS.len());

    let products = products();
    for product in &products {
        catalog.upsert_product(product).await?;
    }
    println!("✓ {} products", products.len());

    // Verify the catalog loads and has no dangling references
    catalog.load_catalog().await?.validate()?;
    println!("✓ Catalog validated");

    let inventory = db.inventory();
    for outlet_id in OUTLETS {
        for (material_id, quantity, min_stock) in STOCK {
            let Some((_, name, _, cost)) = MATERIALS.iter().find(|m| m.0 == *material_id) else {
                continue;
            };
            inventory
                .upsert_row(&OutletInventoryItem {
                    quantity: Decimal::from(*quantity),
                    min_stock: Decimal::from(*min_stock),
                    cost_per_unit: Money::from_minor(*cost),
                    is_cashier_operated: *material_id == "cup",
                    ..OutletInventoryItem::new(*outlet_id, *name)
                })
                .await?;
        }
    }
    println!("✓ {} stock rows", OUTLETS.len() * STOCK.len());

    db.customers()
        .upsert(&Customer {
            id: "cust-001".into(),
            name: "Wulan Sari".into(),
            tier: Some(MembershipTier {
                name: "Gold".into(),
                discount: Percent::from_percent(10),
            }),
            points: 250,
        })
        .await?;
    println!("✓ 1 customer");

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
