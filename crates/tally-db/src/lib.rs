//! # tally-db: Persistence and Transactions for the Tally Ledger
//!
//! SQLite storage for sellers, products, orders, payments and customer
//! ledgers, plus the [`Ledger`] service that runs every lifecycle operation
//! as one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  tally-cli / seed / embedding application                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    Ledger     │───►│  Repositories │    │  Migrations  │  │   │
//! │  │   │  (ledger.rs)  │    │ order.rs      │    │  (embedded)  │  │   │
//! │  │   │               │    │ payment.rs    │    │              │  │   │
//! │  │   │ tally-core    │    │ product.rs    │    │ 001_initial  │  │   │
//! │  │   │ decisions     │    │ ...           │    │ _schema.sql  │  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │           └────────┬───────────┘                               │   │
//! │  │                    ▼                                           │   │
//! │  │           Database (pool.rs, SqlitePool)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Store and ledger error types
//! - [`repository`] - SQL per table
//! - [`ledger`] - Transactional lifecycle operations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_core::{Actor, LedgerPolicy};
//! use tally_db::{Database, DbConfig, Ledger};
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//! let ledger = Ledger::new(db, LedgerPolicy::default()).await?;
//!
//! let admin = Actor::admin("admin-1");
//! let pending = ledger.pending_review(&admin).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use ledger::{AllocationOutcome, AllocationTarget, Ledger, PendingReview};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::customer::CustomerRepository;
pub use repository::order::OrderRepository;
pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;
pub use repository::seller::SellerRepository;
