//! # tally-core: Pure Ledger Logic for Tally
//!
//! This crate holds the settlement rules of Tally as pure functions: how an
//! order's debt is computed and reduced, how one payment is spread across
//! several orders, how a customer's balance is amortized month by month, and
//! how a seller's commission is derived. Nothing here reads a clock, a file
//! or a database; callers pass timestamps and records in.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    tally-cli (admin tool)                       │   │
//! │  │    pending, commission, statement, report, approve-payment     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              tally-db (Ledger service + SQLite)                 │   │
//! │  │      one transaction per operation, guarded updates            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐ │   │
//! │  │   │ lifecycle │  │allocation │  │amortization│  │commission │ │   │
//! │  │   │  orders   │  │  oldest-  │  │  FIFO pool │  │  payout   │ │   │
//! │  │   │  returns  │  │  first    │  │  by month  │  │  by month │ │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Seller, Order, Payment, CustomerTransaction, ...)
//! - [`money`] - Money type with integer arithmetic (cents, no floating point)
//! - [`error`] - Domain error types
//! - [`validation`] - Field rules
//! - [`lifecycle`] - Order and payment state transitions
//! - [`allocation`] - Payment Allocator
//! - [`amortization`] - Debt Amortization Engine
//! - [`commission`] - Commission Engine
//! - [`report`] - Read-only snapshots for reporting and notification
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::types::CommissionRate;
//!
//! let received = Money::from_cents(100_000); // 1000.00
//! let commission = received.apply_rate(CommissionRate::from_percent(20));
//! assert_eq!(commission.cents(), 20_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod amortization;
pub mod commission;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod report;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use allocation::{Allocation, AllocationPlan};
pub use amortization::{AmortizationSchedule, MonthBalance};
pub use commission::CommissionStatement;
pub use error::{CoreError, CoreResult, ValidationError};
pub use lifecycle::{CartLine, ItemAdjustment, LineRequest, ReviewPlan};
pub use money::Money;
pub use report::{LedgerSnapshot, PendingCounts, ReportFilter};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Rounding tolerance (0.01 currency units) for debt bound checks.
///
/// `paid <= total + MONEY_TOLERANCE` always holds for every order.
pub const MONEY_TOLERANCE: Money = Money::from_cents(1);

/// Commission rate given to sellers without an override (20%).
pub const DEFAULT_COMMISSION_RATE_BPS: u32 = 2000;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Generates a new entity id (UUID v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
