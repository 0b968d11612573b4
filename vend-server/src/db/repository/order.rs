//! Order Repository
//!
//! Read-only: orders are inserted by the purchase transaction and
//! immutable afterwards.

use super::RepoResult;
use shared::models::Order;
use sqlx::SqlitePool;

const ORDER_SELECT: &str =
    "SELECT id, user_id, product_id, product_name, quantity, total, delivered, created_at FROM orders";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Order>> {
    let sql = format!("{ORDER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_user(pool: &SqlitePool, user_id: i64) -> RepoResult<Vec<Order>> {
    let sql = format!("{ORDER_SELECT} WHERE user_id = ? ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, Order>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
