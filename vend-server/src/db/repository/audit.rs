//! Audit Log Repository

use super::RepoResult;
use sqlx::SqlitePool;

/// Actor id recorded for mutations no human triggered (webhooks,
/// expiry sweeps).
pub const SYSTEM_ACTOR: i64 = 0;

pub async fn record(
    pool: &SqlitePool,
    actor_id: i64,
    action: &str,
    data: serde_json::Value,
) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO audit_log (id, actor_id, action, data, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(shared::util::snowflake_id())
    .bind(actor_id)
    .bind(action)
    .bind(data.to_string())
    .bind(shared::util::now_millis())
    .execute(pool)
    .await?;
    Ok(())
}
