//! Payment Repository
//!
//! Every status transition is a conditional update; `rows_affected`
//! tells the caller whether it won the transition. The
//! pending/awaiting_proof → approved gate is the reconciliation
//! dedup authority.

use super::{RepoError, RepoResult};
use shared::models::{Payment, PaymentProvider, PaymentStatus};
use sqlx::SqlitePool;

const PAYMENT_SELECT: &str = "SELECT id, user_id, provider, requested_credits, provider_amount, \
     provider_ref, pay_url, display_message_ref, proof_ref, status, created_at, expires_at, \
     approved_at, reviewed_by FROM payment";

/// Fields for a new funding attempt.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: i64,
    pub provider: PaymentProvider,
    pub requested_credits: i64,
    pub provider_amount: f64,
    pub provider_ref: Option<String>,
    pub pay_url: Option<String>,
    pub status: PaymentStatus,
    pub expires_at: Option<i64>,
}

pub async fn insert(pool: &SqlitePool, data: NewPayment) -> RepoResult<Payment> {
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO payment (id, user_id, provider, requested_credits, provider_amount, \
         provider_ref, pay_url, status, created_at, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(id)
    .bind(data.user_id)
    .bind(data.provider)
    .bind(data.requested_credits)
    .bind(data.provider_amount)
    .bind(&data.provider_ref)
    .bind(&data.pay_url)
    .bind(data.status)
    .bind(now)
    .bind(data.expires_at)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to insert payment".into()))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Payment>> {
    let sql = format!("{PAYMENT_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Payment>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Look up by the gateway's reference id alone. The caller compares
/// the stored provider against the adapter that delivered the event.
pub async fn find_by_ref(pool: &SqlitePool, provider_ref: &str) -> RepoResult<Option<Payment>> {
    let sql = format!("{PAYMENT_SELECT} WHERE provider_ref = ?");
    let row = sqlx::query_as::<_, Payment>(&sql)
        .bind(provider_ref)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn status_of(pool: &SqlitePool, id: i64) -> RepoResult<Option<PaymentStatus>> {
    let row: Option<(PaymentStatus,)> = sqlx::query_as("SELECT status FROM payment WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(s,)| s))
}

/// The dedup gate: flip to approved only while the payment is still
/// open. Returns whether this call won the transition, the sole
/// license to credit the wallet.
pub async fn approve_if_open(
    pool: &SqlitePool,
    id: i64,
    reviewed_by: Option<i64>,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE payment SET status = 'approved', approved_at = ?1, reviewed_by = ?2 \
         WHERE id = ?3 AND status IN ('pending', 'awaiting_proof')",
    )
    .bind(now)
    .bind(reviewed_by)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Manual flow: attach the proof and move awaiting_proof → pending.
pub async fn submit_proof(pool: &SqlitePool, id: i64, proof_ref: &str) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE payment SET status = 'pending', proof_ref = ?1 \
         WHERE id = ?2 AND status = 'awaiting_proof'",
    )
    .bind(proof_ref)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

pub async fn reject_if_pending(pool: &SqlitePool, id: i64, reviewed_by: i64) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE payment SET status = 'rejected', reviewed_by = ?1 \
         WHERE id = ?2 AND status = 'pending'",
    )
    .bind(reviewed_by)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

pub async fn cancel_if_open(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE payment SET status = 'cancelled' \
         WHERE id = ?1 AND status IN ('pending', 'awaiting_proof')",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Expiry transition. Loses against any concurrent approval or cancel
/// by construction.
pub async fn expire_if_pending(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let rows = sqlx::query("UPDATE payment SET status = 'expired' WHERE id = ?1 AND status = 'pending'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}

pub async fn set_display_message_ref(pool: &SqlitePool, id: i64, message_ref: &str) -> RepoResult<()> {
    let rows = sqlx::query("UPDATE payment SET display_message_ref = ?1 WHERE id = ?2")
        .bind(message_ref)
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Payment {id} not found")));
    }
    Ok(())
}

/// Payments a restarted process must re-arm timers for.
pub async fn find_pending_with_deadline(pool: &SqlitePool) -> RepoResult<Vec<Payment>> {
    let sql = format!("{PAYMENT_SELECT} WHERE status = 'pending' AND expires_at IS NOT NULL");
    let rows = sqlx::query_as::<_, Payment>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Pending payments whose deadline already passed (sweep safety net).
pub async fn find_overdue_pending(pool: &SqlitePool, now: i64) -> RepoResult<Vec<Payment>> {
    let sql = format!("{PAYMENT_SELECT} WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= ?");
    let rows = sqlx::query_as::<_, Payment>(&sql)
        .bind(now)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Queue a late settlement for human review.
pub async fn insert_review(pool: &SqlitePool, payment_id: i64, event_json: &str) -> RepoResult<i64> {
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO reconcile_review (id, payment_id, event_json, resolved, created_at) \
         VALUES (?1, ?2, ?3, 0, ?4)",
    )
    .bind(id)
    .bind(payment_id)
    .bind(event_json)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn count_unresolved_reviews(pool: &SqlitePool) -> RepoResult<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM reconcile_review WHERE resolved = 0")
            .fetch_one(pool)
            .await?;
    Ok(count)
}
