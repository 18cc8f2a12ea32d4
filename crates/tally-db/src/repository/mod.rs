//! # Repository Module
//!
//! SQL for each ledger table.
//!
//! ## Two Entry Points
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CLI / seed / tests                    Ledger service                   │
//! │       │                                     │                           │
//! │       │  db.orders().get_detail(id)         │  pool.begin()             │
//! │       ▼                                     ▼                           │
//! │  OrderRepository { pool }            order::approve(&mut tx, ...)      │
//! │  (acquires a connection,             order::add_paid(&mut tx, ...)     │
//! │   delegates to the functions)        tx.commit()                       │
//! │       │                                     │                           │
//! │       └──────────────┬──────────────────────┘                           │
//! │                      ▼                                                  │
//! │     module functions taking `&mut SqliteConnection`                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Module functions take a connection so the Ledger can run several of
//! them inside one transaction. Guarded updates return
//! `DbError::ConcurrentModification` when their predicate matches no row.
//!
//! ## Available Repositories
//!
//! - [`seller::SellerRepository`]
//! - [`product::ProductRepository`]
//! - [`order::OrderRepository`] - orders and their lines
//! - [`payment::PaymentRepository`]
//! - [`customer::CustomerRepository`] - customers and their transactions

pub mod customer;
pub mod order;
pub mod payment;
pub mod product;
pub mod seller;

use sqlx::sqlite::SqliteQueryResult;
use tracing::warn;

use crate::error::{DbError, DbResult};

/// Maps a guarded update that touched no row to `ConcurrentModification`.
pub(crate) fn expect_one_row(result: SqliteQueryResult, entity: &str, id: &str) -> DbResult<()> {
    if result.rows_affected() == 0 {
        warn!(entity, id, "Guarded update matched no row");
        return Err(DbError::concurrent(entity, id));
    }
    Ok(())
}
