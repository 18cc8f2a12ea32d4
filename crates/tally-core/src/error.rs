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
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Store failures (incl. ConcurrentModification)  │
//! │  └── LedgerError      - What Ledger operations return                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → CLI / caller        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Carry the numbers (amount, limit, ids) the UI needs to explain a refusal
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::money::Money;
use crate::types::{OrderStatus, OrderType};

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure ledger functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A return or review quantity is negative or above what is available.
    ///
    /// ## When This Occurs
    /// ```text
    /// Original sale line: 3 × Brigadeiro
    ///      │
    ///      ▼
    /// Return request: 5 × Brigadeiro
    ///      │
    ///      ▼
    /// InvalidQuantity { product_id, requested: 5, available: 3 }
    /// ```
    #[error("Invalid quantity for product {product_id}: requested {requested}, available {available}")]
    InvalidQuantity {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Payment attempted on an order that is not an approved sale.
    #[error("Order {order_id} is a {order_type} in {status} status and cannot receive payments")]
    PaymentNotAllowed {
        order_id: String,
        status: OrderStatus,
        order_type: OrderType,
    },

    /// Requested payment amount is larger than the selected debt.
    #[error("Payment of {requested} exceeds outstanding debt of {available}")]
    AllocationExceedsDebt { requested: Money, available: Money },

    /// A return must reference an approved sale.
    #[error("Order {order_id} cannot be returned: {reason}")]
    InvalidReturn { order_id: String, reason: String },

    /// Operation attempted on an order/payment in the wrong state.
    ///
    /// ## When This Occurs
    /// - Approving an order that is already approved or rejected
    /// - Approving a payment that is already approved
    #[error("{entity} {id} is {current}, cannot {action}")]
    InvalidTransition {
        entity: String,
        id: String,
        current: String,
        action: String,
    },

    /// An order needs at least one line with quantity > 0.
    #[error("Order has no items")]
    EmptyOrder,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidTransition error.
    pub fn transition(
        entity: impl Into<String>,
        id: impl Into<String>,
        current: impl ToString,
        action: impl Into<String>,
    ) -> Self {
        CoreError::InvalidTransition {
            entity: entity.into(),
            id: id.into(),
            current: current.to_string(),
            action: action.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
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

    /// Invalid format (e.g., invalid UUID, invalid month).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// The same product appears twice in one request.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidQuantity {
            product_id: "p1".to_string(),
            requested: 5,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Invalid quantity for product p1: requested 5, available 3"
        );

        let err = CoreError::AllocationExceedsDebt {
            requested: Money::from_cents(10002),
            available: Money::from_cents(10000),
        };
        assert_eq!(
            err.to_string(),
            "Payment of 100.02 exceeds outstanding debt of 100.00"
        );

        let err = CoreError::PaymentNotAllowed {
            order_id: "o1".to_string(),
            status: OrderStatus::Pending,
            order_type: OrderType::Sale,
        };
        assert_eq!(
            err.to_string(),
            "Order o1 is a sale in pending status and cannot receive payments"
        );
    }

    #[test]
    fn test_transition_helper() {
        let err = CoreError::transition("Order", "o1", OrderStatus::Rejected, "approve");
        assert_eq!(err.to_string(), "Order o1 is rejected, cannot approve");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
