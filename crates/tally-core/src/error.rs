//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError          - General domain errors                        │
//! │  ├── ValidationError    - Bad input, rejected before any mutation      │
//! │  └── PreconditionError  - Operator/shift state blocks checkout         │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError            - Database operation failures                  │
//! │                                                                         │
//! │  tally-sync errors (separate crate)                                    │
//! │  └── SyncError          - Durability failures, absorbed by the queue   │
//! │                                                                         │
//! │  Availability shortages are NOT errors: see                            │
//! │  [`crate::inventory::AvailabilityWarning`].                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found in the catalog snapshot.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Catalog material cannot be found.
    #[error("Material not found: {0}")]
    MaterialNotFound(String),

    /// A combo reaches itself through its components.
    ///
    /// ## Example
    /// ```text
    /// Family Pack ──► Kids Meal ──► Family Pack   ✗ rejected
    /// ```
    #[error("Combo cycle detected: {}", path.join(" -> "))]
    ComboCycle { path: Vec<String> },

    /// Product violates the combo/simple structural invariant.
    #[error("Product {product_id} is malformed: {reason}")]
    MalformedProduct { product_id: String, reason: String },

    /// Strict stock policy refused the sale.
    #[error("Insufficient stock for {material} at {outlet_id}: available {available}, required {required}")]
    InsufficientStock {
        outlet_id: String,
        material: String,
        available: Decimal,
        required: Decimal,
    },

    /// Product is switched off for the selected outlet.
    #[error("Product {product_id} is not available at outlet {outlet_id}")]
    ProductUnavailable {
        product_id: String,
        outlet_id: String,
    },

    /// Cashier tried to restock a row not flagged `is_cashier_operated`.
    #[error("{operator} may not record restocks of {material}")]
    RestockNotPermitted { operator: String, material: String },

    /// Checkout session is in a state that does not allow the operation.
    #[error("Cannot {operation} while checkout is {state}")]
    InvalidTransition { operation: String, state: String },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Checkout precondition failed (wraps PreconditionError).
    #[error("Checkout blocked: {0}")]
    Precondition(#[from] PreconditionError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before business logic runs; nothing has been mutated when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// No concrete outlet is selected (the aggregate view is active).
    #[error("Select an outlet before checking out")]
    OutletNotSelected,

    /// Checkout attempted with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Points were redeemed without an attached customer.
    #[error("Points can only be redeemed for a registered customer")]
    RedeemWithoutCustomer,

    /// More points redeemed than the customer holds.
    #[error("Cannot redeem {requested} points, customer has {available}")]
    InsufficientPoints { requested: i64, available: i64 },
}

// =============================================================================
// Precondition Error
// =============================================================================

/// Operator-state preconditions checked at `CHECKOUT_REQUESTED`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// Cashier has not clocked in for today.
    #[error("{operator} has not clocked in today")]
    NotClockedIn { operator: String },

    /// Cashier already submitted today's shift closing at this outlet.
    #[error("{operator} already closed the shift today at {outlet_id}")]
    ShiftAlreadyClosed { operator: String, outlet_id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = CoreError::ComboCycle {
            path: vec!["family".into(), "kids".into(), "family".into()],
        };
        assert_eq!(
            err.to_string(),
            "Combo cycle detected: family -> kids -> family"
        );
    }

    #[test]
    fn test_precondition_converts_to_core_error() {
        let err: CoreError = PreconditionError::NotClockedIn {
            operator: "Dewi".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Precondition(_)));
        assert_eq!(err.to_string(), "Checkout blocked: Dewi has not clocked in today");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::EmptyCart.into();
        assert!(matches!(core_err, CoreError::Validation(ValidationError::EmptyCart)));
    }
}
