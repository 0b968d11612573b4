//! Stock Item Repository
//!
//! Loading and editing live here. The available→sold transition does
//! not; that is owned exclusively by the purchase transaction.

use super::{RepoError, RepoResult};
use shared::models::StockItem;
use sqlx::SqlitePool;

const STOCK_SELECT: &str =
    "SELECT id, product_id, email, password, status, buyer_id, sold_at, created_at FROM stock_item";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<StockItem>> {
    let sql = format!("{STOCK_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, StockItem>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn insert(
    pool: &SqlitePool,
    product_id: i64,
    email: &str,
    password: &str,
) -> RepoResult<StockItem> {
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO stock_item (id, product_id, email, password, status, created_at) \
         VALUES (?1, ?2, ?3, ?4, 'available', ?5)",
    )
    .bind(id)
    .bind(product_id)
    .bind(email)
    .bind(password)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to insert stock item".into()))
}

pub async fn update_email(pool: &SqlitePool, id: i64, email: &str) -> RepoResult<()> {
    let rows = sqlx::query("UPDATE stock_item SET email = ?1 WHERE id = ?2")
        .bind(email)
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Stock item {id} not found")));
    }
    Ok(())
}

pub async fn update_password(pool: &SqlitePool, id: i64, password: &str) -> RepoResult<()> {
    let rows = sqlx::query("UPDATE stock_item SET password = ?1 WHERE id = ?2")
        .bind(password)
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Stock item {id} not found")));
    }
    Ok(())
}

pub async fn count_available(pool: &SqlitePool, product_id: i64) -> RepoResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM stock_item WHERE product_id = ? AND status = 'available'",
    )
    .bind(product_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
