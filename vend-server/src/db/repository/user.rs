//! User Repository

use super::{RepoError, RepoResult};
use shared::models::{FlowState, User};
use sqlx::SqlitePool;

const USER_SELECT: &str =
    "SELECT id, username, first_name, balance, banned, flow_state, created_at, updated_at FROM user";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<User>> {
    let sql = format!("{USER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Idempotent first-contact registration. Creates the wallet with a
/// zero balance on first sight, refreshes profile fields after.
pub async fn upsert(
    pool: &SqlitePool,
    id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
) -> RepoResult<User> {
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO user (id, username, first_name, balance, banned, created_at, updated_at) \
         VALUES (?1, ?2, ?3, 0, 0, ?4, ?4) \
         ON CONFLICT(id) DO UPDATE SET \
             username = excluded.username, \
             first_name = excluded.first_name, \
             updated_at = excluded.updated_at",
    )
    .bind(id)
    .bind(username)
    .bind(first_name)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database(format!("User {id} missing after upsert")))
}

/// Credit a wallet. Unconditional add; callers gate it behind a
/// payment status transition.
pub async fn credit_balance(pool: &SqlitePool, user_id: i64, credits: i64) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query("UPDATE user SET balance = balance + ?1, updated_at = ?2 WHERE id = ?3")
        .bind(credits)
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("User {user_id} not found")));
    }
    Ok(())
}

/// Signed wallet adjustment (admin flow). The predicate keeps the
/// balance non-negative; a deduction below zero changes nothing.
pub async fn adjust_balance(pool: &SqlitePool, user_id: i64, delta: i64) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE user SET balance = balance + ?1, updated_at = ?2 \
         WHERE id = ?3 AND balance + ?1 >= 0",
    )
    .bind(delta)
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

pub async fn set_banned(pool: &SqlitePool, user_id: i64, banned: bool) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query("UPDATE user SET banned = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(banned)
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("User {user_id} not found")));
    }
    Ok(())
}

/// Replace the flow cursor in one atomic write. `None` clears it.
pub async fn set_flow(pool: &SqlitePool, user_id: i64, state: Option<&FlowState>) -> RepoResult<()> {
    let json = match state {
        Some(s) => Some(
            serde_json::to_string(s)
                .map_err(|e| RepoError::Validation(format!("Unencodable flow state: {e}")))?,
        ),
        None => None,
    };
    let now = shared::util::now_millis();
    let rows = sqlx::query("UPDATE user SET flow_state = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(json)
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("User {user_id} not found")));
    }
    Ok(())
}

/// Clear the cursor only if the user is mid-funding. Leaves admin
/// flows untouched so a settlement does not cancel unrelated work.
pub async fn clear_funding_flow(pool: &SqlitePool, user_id: i64) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query(
        "UPDATE user SET flow_state = NULL, updated_at = ?1 \
         WHERE id = ?2 AND json_extract(flow_state, '$.type') IN ('awaiting_amount', 'awaiting_proof')",
    )
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}
