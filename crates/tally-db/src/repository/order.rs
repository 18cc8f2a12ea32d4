//! # Order Repository
//!
//! Orders and their lines.
//!
//! ## Guarded Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  approve     WHERE id = ? AND status = 'pending' AND version = ?       │
//! │  reject      WHERE id = ? AND status = 'pending'                       │
//! │  set_total   WHERE id = ? AND version = ? AND paid_cents <= new + 1    │
//! │  add_paid    WHERE id = ? AND status = 'approved' AND type = 'sale'    │
//! │                AND paid_cents + amount <= total_cents + 1              │
//! │                                                                         │
//! │  every guarded update bumps `version`; 0 rows → ConcurrentModification │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::expect_one_row;
use crate::error::DbResult;
use tally_core::{Money, Order, OrderDetail, OrderItem, OrderStatus};

const ORDER_COLUMNS: &str = r#"
    id, seller_id, seller_name, total_cents, paid_cents, status, order_type,
    original_order_id, created_at, updated_at, version
"#;

/// Read access to orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn get_detail(&self, id: &str) -> DbResult<Option<OrderDetail>> {
        let mut conn = self.pool.acquire().await?;
        fetch_detail(&mut conn, id).await
    }

    pub async fn list_by_seller(&self, seller_id: &str) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        list_by_seller(&mut conn, seller_id).await
    }

    pub async fn list_pending(&self) -> DbResult<Vec<OrderDetail>> {
        let mut conn = self.pool.acquire().await?;
        list_pending(&mut conn).await
    }
}

// =============================================================================
// Inserts and reads
// =============================================================================

/// Inserts an order with all its lines.
pub async fn insert_detail(conn: &mut SqliteConnection, detail: &OrderDetail) -> DbResult<()> {
    let order = &detail.order;
    debug!(
        id = %order.id,
        seller_id = %order.seller_id,
        order_type = %order.order_type,
        total = %order.total(),
        "Inserting order"
    );

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, seller_id, seller_name, total_cents, paid_cents, status, order_type,
            original_order_id, created_at, updated_at, version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&order.id)
    .bind(&order.seller_id)
    .bind(&order.seller_name)
    .bind(order.total_cents)
    .bind(order.paid_cents)
    .bind(order.status)
    .bind(order.order_type)
    .bind(&order.original_order_id)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.version)
    .execute(&mut *conn)
    .await?;

    for item in &detail.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, name, quantity, unit_price_cents)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(order)
}

/// Lines of an order, including quantity-0 history rows.
pub async fn fetch_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT id, order_id, product_id, name, quantity, unit_price_cents
        FROM order_items
        WHERE order_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;

    Ok(items)
}

pub async fn fetch_detail(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<OrderDetail>> {
    let Some(order) = fetch(&mut *conn, id).await? else {
        return Ok(None);
    };
    let items = fetch_items(&mut *conn, id).await?;
    Ok(Some(OrderDetail { order, items }))
}

async fn attach_items(conn: &mut SqliteConnection, orders: Vec<Order>) -> DbResult<Vec<OrderDetail>> {
    let mut details = Vec::with_capacity(orders.len());
    for order in orders {
        let items = fetch_items(&mut *conn, &order.id).await?;
        details.push(OrderDetail { order, items });
    }
    Ok(details)
}

pub async fn list_by_seller(conn: &mut SqliteConnection, seller_id: &str) -> DbResult<Vec<Order>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE seller_id = ?1 ORDER BY created_at, id",
        ORDER_COLUMNS
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
        .bind(seller_id)
        .fetch_all(conn)
        .await?;

    Ok(orders)
}

/// Orders waiting for review, oldest first.
pub async fn list_pending(conn: &mut SqliteConnection) -> DbResult<Vec<OrderDetail>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE status = 'pending' ORDER BY created_at, id",
        ORDER_COLUMNS
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
        .fetch_all(&mut *conn)
        .await?;

    attach_items(conn, orders).await
}

/// Pending returns against `original_order_id`.
pub async fn list_pending_returns(
    conn: &mut SqliteConnection,
    original_order_id: &str,
) -> DbResult<Vec<OrderDetail>> {
    let sql = format!(
        r#"
        SELECT {} FROM orders
        WHERE original_order_id = ?1 AND status = 'pending' AND order_type = 'return'
        ORDER BY created_at, id
        "#,
        ORDER_COLUMNS
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
        .bind(original_order_id)
        .fetch_all(&mut *conn)
        .await?;

    attach_items(conn, orders).await
}

/// Orders created on days `from..=to`, optionally for one seller.
pub async fn list_created_between(
    conn: &mut SqliteConnection,
    from: NaiveDate,
    to: NaiveDate,
    seller_id: Option<&str>,
) -> DbResult<Vec<OrderDetail>> {
    // Timestamps are stored as text starting with YYYY-MM-DD
    let until = to.succ_opt().unwrap_or(to);
    let sql = format!(
        r#"
        SELECT {} FROM orders
        WHERE created_at >= ?1 AND created_at < ?2
          AND (?3 IS NULL OR seller_id = ?3)
        ORDER BY created_at, id
        "#,
        ORDER_COLUMNS
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
        .bind(from.to_string())
        .bind(until.to_string())
        .bind(seller_id)
        .fetch_all(&mut *conn)
        .await?;

    attach_items(conn, orders).await
}

pub async fn count_pending(conn: &mut SqliteConnection) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = 'pending'")
        .fetch_one(conn)
        .await?;
    Ok(count)
}

// =============================================================================
// Guarded updates
// =============================================================================

/// Moves a pending order at `expected_version` to approved with `total`.
pub async fn approve(
    conn: &mut SqliteConnection,
    id: &str,
    expected_version: i64,
    total: Money,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = ?2,
            total_cents = ?3,
            updated_at = ?4,
            version = version + 1
        WHERE id = ?1 AND status = 'pending' AND version = ?5
        "#,
    )
    .bind(id)
    .bind(OrderStatus::Approved)
    .bind(total.cents())
    .bind(now)
    .bind(expected_version)
    .execute(conn)
    .await?;

    expect_one_row(result, "Order", id)
}

pub async fn reject(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(OrderStatus::Rejected)
    .bind(now)
    .execute(conn)
    .await?;

    expect_one_row(result, "Order", id)
}

/// Rewrites an order's total (return reversal), never below what was paid.
pub async fn set_total(
    conn: &mut SqliteConnection,
    id: &str,
    expected_version: i64,
    total: Money,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            total_cents = ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?1 AND version = ?4 AND paid_cents <= ?2 + 1
        "#,
    )
    .bind(id)
    .bind(total.cents())
    .bind(now)
    .bind(expected_version)
    .execute(conn)
    .await?;

    expect_one_row(result, "Order", id)
}

/// Adds an approved payment's amount to `paid_cents`.
///
/// The debt bound is part of the predicate, so two racing increments can
/// never push `paid` past `total + 0.01`.
pub async fn add_paid(
    conn: &mut SqliteConnection,
    id: &str,
    amount: Money,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            paid_cents = paid_cents + ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?1
          AND status = 'approved'
          AND order_type = 'sale'
          AND paid_cents + ?2 <= total_cents + 1
        "#,
    )
    .bind(id)
    .bind(amount.cents())
    .bind(now)
    .execute(conn)
    .await?;

    debug!(order_id = %id, amount = %amount, "Paid amount incremented");
    expect_one_row(result, "Order", id)
}

pub async fn update_item_quantity(
    conn: &mut SqliteConnection,
    item_id: &str,
    quantity: i64,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE order_items SET quantity = ?2 WHERE id = ?1")
        .bind(item_id)
        .bind(quantity)
        .execute(conn)
        .await?;

    expect_one_row(result, "OrderItem", item_id)
}

pub async fn delete_item(conn: &mut SqliteConnection, item_id: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM order_items WHERE id = ?1")
        .bind(item_id)
        .execute(conn)
        .await?;

    expect_one_row(result, "OrderItem", item_id)
}
