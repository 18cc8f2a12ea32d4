//! # Product Repository
//!
//! Products and their stock counter. Stock only moves through
//! [`adjust_stock`], called by order approval.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use tally_core::Product;

/// Read access to products.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, unit_price_cents, stock_quantity, created_at, updated_at
            FROM products
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, name = %product.name, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (id, name, unit_price_cents, stock_quantity, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(product.unit_price_cents)
    .bind(product.stock_quantity)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, unit_price_cents, stock_quantity, created_at, updated_at
        FROM products
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(product)
}

/// Adds `delta` to a product's stock in one statement.
///
/// The increment happens inside SQLite, so concurrent approvals never
/// overwrite each other's movement.
pub async fn adjust_stock(conn: &mut SqliteConnection, id: &str, delta: i64) -> DbResult<i64> {
    let new_stock: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products SET
            stock_quantity = stock_quantity + ?2,
            updated_at = ?3
        WHERE id = ?1
        RETURNING stock_quantity
        "#,
    )
    .bind(id)
    .bind(delta)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;

    let new_stock = new_stock.ok_or_else(|| DbError::not_found("Product", id))?;
    if new_stock < 0 {
        warn!(product_id = %id, stock = new_stock, "Stock went negative");
    }
    debug!(product_id = %id, delta, stock = new_stock, "Stock adjusted");

    Ok(new_stock)
}
