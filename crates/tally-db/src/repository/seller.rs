//! # Seller Repository

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{CommissionRate, Seller};

/// Read access to sellers.
#[derive(Debug, Clone)]
pub struct SellerRepository {
    pool: SqlitePool,
}

impl SellerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SellerRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Seller>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn list(&self) -> DbResult<Vec<Seller>> {
        let mut conn = self.pool.acquire().await?;
        list(&mut conn).await
    }
}

pub async fn insert(conn: &mut SqliteConnection, seller: &Seller) -> DbResult<()> {
    debug!(id = %seller.id, name = %seller.name, "Inserting seller");

    sqlx::query(
        r#"
        INSERT INTO sellers (id, name, commission_rate_bps, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&seller.id)
    .bind(&seller.name)
    .bind(seller.commission_rate_bps)
    .bind(seller.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Seller>> {
    let seller = sqlx::query_as::<_, Seller>(
        r#"
        SELECT id, name, commission_rate_bps, created_at
        FROM sellers
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(seller)
}

pub async fn list(conn: &mut SqliteConnection) -> DbResult<Vec<Seller>> {
    let sellers = sqlx::query_as::<_, Seller>(
        "SELECT id, name, commission_rate_bps, created_at FROM sellers ORDER BY name",
    )
    .fetch_all(conn)
    .await?;

    Ok(sellers)
}

pub async fn set_commission_rate(
    conn: &mut SqliteConnection,
    id: &str,
    rate: CommissionRate,
) -> DbResult<()> {
    debug!(id = %id, bps = rate.bps(), "Updating commission rate");

    let result = sqlx::query("UPDATE sellers SET commission_rate_bps = ?2 WHERE id = ?1")
        .bind(id)
        .bind(rate.bps())
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Seller", id));
    }
    Ok(())
}
