//! Discount Rule Repository

use super::RepoResult;
use shared::models::DiscountRule;
use sqlx::SqlitePool;

pub async fn rules_for(pool: &SqlitePool, product_id: i64) -> RepoResult<Vec<DiscountRule>> {
    let rows = sqlx::query_as::<_, DiscountRule>(
        "SELECT id, product_id, min_qty, percent, updated_at FROM discount_rule \
         WHERE product_id = ? ORDER BY min_qty ASC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replace the full rule set for a product. `(min_qty, percent)` pairs;
/// percent is clamped to 0..=100 and min_qty floored at 1, matching
/// the admin paste format.
pub async fn replace_rules(
    pool: &SqlitePool,
    product_id: i64,
    rules: &[(i64, i64)],
) -> RepoResult<usize> {
    let now = shared::util::now_millis();
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM discount_rule WHERE product_id = ?")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    let mut written = 0;
    for (min_qty, percent) in rules {
        let min_qty = (*min_qty).max(1);
        let percent = (*percent).clamp(0, 100);
        sqlx::query(
            "INSERT INTO discount_rule (id, product_id, min_qty, percent, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(shared::util::snowflake_id())
        .bind(product_id)
        .bind(min_qty)
        .bind(percent)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        written += 1;
    }
    tx.commit().await?;
    Ok(written)
}
