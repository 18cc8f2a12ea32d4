//! # Customer Repository
//!
//! A seller's own customers and the informal credit ledger kept with each.
//! Independent of orders and payments.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{Customer, CustomerTransaction};

/// Read access to customers and their transactions.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn list_by_seller(&self, seller_id: &str) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, seller_id, name, phone, created_at
            FROM customers
            WHERE seller_id = ?1
            ORDER BY name
            "#,
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    pub async fn transactions(&self, customer_id: &str) -> DbResult<Vec<CustomerTransaction>> {
        let mut conn = self.pool.acquire().await?;
        list_transactions(&mut conn, customer_id).await
    }
}

pub async fn insert(conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
    debug!(id = %customer.id, seller_id = %customer.seller_id, "Inserting customer");

    sqlx::query(
        r#"
        INSERT INTO customers (id, seller_id, name, phone, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&customer.id)
    .bind(&customer.seller_id)
    .bind(&customer.name)
    .bind(&customer.phone)
    .bind(customer.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(
        "SELECT id, seller_id, name, phone, created_at FROM customers WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(customer)
}

pub async fn insert_transaction(conn: &mut SqliteConnection, tx: &CustomerTransaction) -> DbResult<()> {
    debug!(
        id = %tx.id,
        customer_id = %tx.customer_id,
        amount = %tx.amount(),
        "Recording customer transaction"
    );

    sqlx::query(
        r#"
        INSERT INTO customer_transactions (id, customer_id, tx_type, amount_cents, date, description, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&tx.id)
    .bind(&tx.customer_id)
    .bind(tx.tx_type)
    .bind(tx.amount_cents)
    .bind(tx.date)
    .bind(&tx.description)
    .bind(tx.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_transaction(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<CustomerTransaction>> {
    let tx = sqlx::query_as::<_, CustomerTransaction>(
        r#"
        SELECT id, customer_id, tx_type, amount_cents, date, description, created_at
        FROM customer_transactions
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(tx)
}

pub async fn list_transactions(
    conn: &mut SqliteConnection,
    customer_id: &str,
) -> DbResult<Vec<CustomerTransaction>> {
    let txs = sqlx::query_as::<_, CustomerTransaction>(
        r#"
        SELECT id, customer_id, tx_type, amount_cents, date, description, created_at
        FROM customer_transactions
        WHERE customer_id = ?1
        ORDER BY date, created_at
        "#,
    )
    .bind(customer_id)
    .fetch_all(conn)
    .await?;

    Ok(txs)
}

pub async fn delete_transaction(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM customer_transactions WHERE id = ?1")
        .bind(id)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("CustomerTransaction", id));
    }
    Ok(())
}
