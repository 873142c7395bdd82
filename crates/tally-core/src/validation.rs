//! # Validation Module
//!
//! Input validation for Tally POS. Every check here runs before any state is
//! touched, so a `ValidationError` always means "nothing happened".
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI collaborator                                               │
//! │  └── Basic format checks, immediate feedback                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: tally-core (THIS MODULE)                                      │
//! │  ├── Cart quantities, redeem points, outlet selection                   │
//! │  ├── Product names and discount rates                                   │
//! │  └── Stock event inputs (purchases, transfers, production)              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  └── NOT NULL / UNIQUE / FOREIGN KEY / CHECK constraints                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_line_quantity, validate_product_name};
//!
//! validate_product_name("Margherita").unwrap();
//! validate_line_quantity(5).unwrap();
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::money::{Money, Percent};
use crate::types::{Customer, OutletSelection, ProductionRecord, Purchase, StockTransfer};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn validate_name(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Family Pack").is_ok());
/// assert!(validate_product_name("   ").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_name("name", name, 200)
}

/// Validates a material name. Names are the outlet-row join key, so an
/// empty one would silently match nothing.
pub fn validate_material_name(name: &str) -> ValidationResult<()> {
    validate_name("material", name, 120)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart: Add Item                                                         │
/// │                                                                         │
/// │  Cashier enters quantity: 5                                             │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_line_quantity(5) ← THIS FUNCTION                              │
/// │       │                                                                 │
/// │       ├── qty <= 0?  → "quantity must be positive"                      │
/// │       ├── qty > 999? → "quantity must be between 1 and 999"             │
/// │       └── OK → line added                                               │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_line_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a material quantity on a stock event (purchase, transfer,
/// production input or output).
pub fn validate_stock_quantity(field: &str, qty: Decimal) -> ValidationResult<()> {
    if qty <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a price. Zero is allowed (free items).
///
/// ## Example
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::validation::validate_price;
///
/// assert!(validate_price(Money::from_minor(15_000)).is_ok());
/// assert!(validate_price(Money::zero()).is_ok());
/// assert!(validate_price(Money::from_minor(-1)).is_err());
/// ```
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }
    Ok(())
}

/// Validates a discount rate: 0% to 100%.
pub fn validate_percent(field: &str, rate: Percent) -> ValidationResult<()> {
    if rate.bps() > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

/// Validates a loyalty redemption request.
///
/// ## Rules
/// - Zero points is always fine (no redemption)
/// - Negative points are rejected
/// - Redeeming requires a customer
/// - A customer cannot redeem more than their balance
pub fn validate_redeem_points(points: i64, customer: Option<&Customer>) -> ValidationResult<()> {
    if points < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "redeem points".to_string(),
        });
    }
    if points == 0 {
        return Ok(());
    }

    let customer = customer.ok_or(ValidationError::RedeemWithoutCustomer)?;
    if points > customer.points {
        return Err(ValidationError::InsufficientPoints {
            requested: points,
            available: customer.points,
        });
    }
    Ok(())
}

// =============================================================================
// Checkout Validators
// =============================================================================

/// Validates cart size (number of distinct lines) before adding a new line.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 0,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

/// Requires a concrete outlet. The aggregate view cannot sell or move stock.
pub fn require_outlet(selection: &OutletSelection) -> ValidationResult<&str> {
    selection.outlet_id().ok_or(ValidationError::OutletNotSelected)
}

// =============================================================================
// Stock Event Validators
// =============================================================================

pub fn validate_purchase(purchase: &Purchase) -> ValidationResult<()> {
    validate_material_name(&purchase.material_name)?;
    validate_stock_quantity("quantity", purchase.quantity)?;
    validate_price(purchase.total_cost)
}

/// Transfers need two distinct outlets and a positive quantity.
pub fn validate_transfer(transfer: &StockTransfer) -> ValidationResult<()> {
    validate_material_name(&transfer.material_name)?;
    validate_stock_quantity("quantity", transfer.quantity)?;

    if transfer.from_outlet_id == transfer.to_outlet_id {
        return Err(ValidationError::InvalidFormat {
            field: "to_outlet_id".to_string(),
            reason: "must differ from the sending outlet".to_string(),
        });
    }
    Ok(())
}

pub fn validate_production(record: &ProductionRecord) -> ValidationResult<()> {
    validate_material_name(&record.result_material_name)?;
    validate_stock_quantity("result quantity", record.result_quantity)?;

    if record.components.is_empty() {
        return Err(ValidationError::Required {
            field: "components".to_string(),
        });
    }
    for component in &record.components {
        validate_stock_quantity("component quantity", component.quantity)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
