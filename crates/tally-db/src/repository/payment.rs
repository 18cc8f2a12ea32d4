//! # Payment Repository
//!
//! Payments are inserted once, approved at most once (cash), or deleted
//! while still pending.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::expect_one_row;
use crate::error::DbResult;
use tally_core::{Payment, PaymentStatus};

const PAYMENT_COLUMNS: &str = r#"
    id, order_id, seller_id, amount_cents, date, method, status,
    proof_ref, description, allocation_id, created_at
"#;

/// Read access to payments.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn list_by_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        list_by_order(&mut conn, order_id).await
    }

    pub async fn list_pending(&self) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        list_pending(&mut conn).await
    }

    /// Sum of the approved payments of an order.
    pub async fn approved_total(&self, order_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)
            FROM payments
            WHERE order_id = ?1 AND status = 'approved'
            "#,
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

pub async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(
        id = %payment.id,
        order_id = %payment.order_id,
        amount = %payment.amount(),
        method = %payment.method,
        "Recording payment"
    );

    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, seller_id, amount_cents, date, method, status,
            proof_ref, description, allocation_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.order_id)
    .bind(&payment.seller_id)
    .bind(payment.amount_cents)
    .bind(payment.date)
    .bind(payment.method)
    .bind(payment.status)
    .bind(&payment.proof_ref)
    .bind(&payment.description)
    .bind(&payment.allocation_id)
    .bind(payment.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
    let sql = format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS);
    let payment = sqlx::query_as::<_, Payment>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(payment)
}

pub async fn list_by_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<Payment>> {
    let sql = format!(
        "SELECT {} FROM payments WHERE order_id = ?1 ORDER BY date, created_at",
        PAYMENT_COLUMNS
    );
    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(order_id)
        .fetch_all(conn)
        .await?;

    Ok(payments)
}

/// Cash payments waiting for an admin, oldest first.
pub async fn list_pending(conn: &mut SqliteConnection) -> DbResult<Vec<Payment>> {
    let sql = format!(
        "SELECT {} FROM payments WHERE status = 'pending' ORDER BY created_at, id",
        PAYMENT_COLUMNS
    );
    let payments = sqlx::query_as::<_, Payment>(&sql).fetch_all(conn).await?;

    Ok(payments)
}

/// A seller's payments dated `from..=to` (calendar dates).
pub async fn list_by_seller_dated(
    conn: &mut SqliteConnection,
    seller_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> DbResult<Vec<Payment>> {
    let sql = format!(
        r#"
        SELECT {} FROM payments
        WHERE seller_id = ?1 AND date >= ?2 AND date <= ?3
        ORDER BY date, created_at
        "#,
        PAYMENT_COLUMNS
    );
    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(seller_id)
        .bind(from)
        .bind(to)
        .fetch_all(conn)
        .await?;

    Ok(payments)
}

/// Payments on orders created on days `from..=to`, optionally for one seller.
pub async fn list_for_orders_created_between(
    conn: &mut SqliteConnection,
    from: NaiveDate,
    to: NaiveDate,
    seller_id: Option<&str>,
) -> DbResult<Vec<Payment>> {
    let until = to.succ_opt().unwrap_or(to);
    let payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT p.id, p.order_id, p.seller_id, p.amount_cents, p.date, p.method, p.status,
               p.proof_ref, p.description, p.allocation_id, p.created_at
        FROM payments p
        JOIN orders o ON o.id = p.order_id
        WHERE o.created_at >= ?1 AND o.created_at < ?2
          AND (?3 IS NULL OR o.seller_id = ?3)
        ORDER BY p.date, p.created_at
        "#,
    )
    .bind(from.to_string())
    .bind(until.to_string())
    .bind(seller_id)
    .fetch_all(conn)
    .await?;

    Ok(payments)
}

pub async fn count_pending(conn: &mut SqliteConnection) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE status = 'pending'")
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// pending → approved. Fails if someone else already decided.
pub async fn mark_approved(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("UPDATE payments SET status = ?2 WHERE id = ?1 AND status = 'pending'")
        .bind(id)
        .bind(PaymentStatus::Approved)
        .execute(conn)
        .await?;

    expect_one_row(result, "Payment", id)
}

/// Deletes a payment that is still pending.
pub async fn delete_pending(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM payments WHERE id = ?1 AND status = 'pending'")
        .bind(id)
        .execute(conn)
        .await?;

    expect_one_row(result, "Payment", id)
}
