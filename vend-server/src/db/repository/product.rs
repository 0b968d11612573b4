//! Product Repository

use super::{RepoError, RepoResult};
use shared::models::Product;
use sqlx::SqlitePool;

const PRODUCT_SELECT: &str =
    "SELECT id, category_id, name, unit_price, enabled, created_at, updated_at FROM product";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Product>> {
    let sql = format!("{PRODUCT_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create(
    pool: &SqlitePool,
    category_id: i64,
    name: &str,
    unit_price: i64,
) -> RepoResult<Product> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM category WHERE id = ?")
        .bind(category_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(RepoError::NotFound(format!("Category {category_id} not found")));
    }

    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO product (id, category_id, name, unit_price, enabled, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
    )
    .bind(id)
    .bind(category_id)
    .bind(name)
    .bind(unit_price)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create product".into()))
}

pub async fn rename(pool: &SqlitePool, id: i64, name: &str) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query("UPDATE product SET name = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(name)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id} not found")));
    }
    Ok(())
}

pub async fn set_price(pool: &SqlitePool, id: i64, unit_price: i64) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query("UPDATE product SET unit_price = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(unit_price)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id} not found")));
    }
    Ok(())
}

pub async fn set_enabled(pool: &SqlitePool, id: i64, enabled: bool) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query("UPDATE product SET enabled = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(enabled)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id} not found")));
    }
    Ok(())
}
