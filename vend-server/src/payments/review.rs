//! Manual payment review.
//!
//! Admin approve/reject of proof-backed payments. Approval rides the
//! same open→approved gate as webhook settlement, so an admin click
//! and a gateway webhook racing on one payment still credit once.

use std::sync::Arc;

use thiserror::Error;

use crate::db::DbService;
use crate::db::repository::{RepoError, audit, payment, user};
use crate::notify::Notifier;
use shared::models::PaymentStatus;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Payment not found")]
    NotFound,

    #[error("Payment already {0}")]
    AlreadyProcessed(PaymentStatus),

    #[error(transparent)]
    Store(#[from] RepoError),
}

pub struct ReviewService {
    db: DbService,
    notifier: Arc<dyn Notifier>,
}

impl ReviewService {
    pub fn new(db: DbService, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Approve and credit the requested amount.
    pub async fn approve(&self, payment_id: i64, admin_id: i64) -> Result<i64, ReviewError> {
        let pool = &self.db.pool;
        let p = payment::find_by_id(pool, payment_id)
            .await?
            .ok_or(ReviewError::NotFound)?;

        if !payment::approve_if_open(pool, payment_id, Some(admin_id)).await? {
            let status = payment::status_of(pool, payment_id)
                .await?
                .unwrap_or(p.status);
            return Err(ReviewError::AlreadyProcessed(status));
        }

        let credited = p.requested_credits;
        user::credit_balance(pool, p.user_id, credited).await?;
        user::clear_funding_flow(pool, p.user_id).await?;

        self.notifier
            .notify_user(
                p.user_id,
                &format!("Payment approved! {credited} credits added to your wallet."),
            )
            .await;
        let _ = audit::record(
            pool,
            admin_id,
            "payment_approved",
            serde_json::json!({ "payment_id": payment_id, "user_id": p.user_id, "credited": credited }),
        )
        .await;
        tracing::info!(payment_id, admin_id, credited, "Payment approved by review");
        Ok(credited)
    }

    /// Reject a pending payment. No wallet effect.
    pub async fn reject(&self, payment_id: i64, admin_id: i64) -> Result<(), ReviewError> {
        let pool = &self.db.pool;
        let p = payment::find_by_id(pool, payment_id)
            .await?
            .ok_or(ReviewError::NotFound)?;

        if !payment::reject_if_pending(pool, payment_id, admin_id).await? {
            let status = payment::status_of(pool, payment_id)
                .await?
                .unwrap_or(p.status);
            return Err(ReviewError::AlreadyProcessed(status));
        }

        user::clear_funding_flow(pool, p.user_id).await?;
        self.notifier
            .notify_user(p.user_id, "Payment rejected. Contact support if this is a mistake.")
            .await;
        let _ = audit::record(
            pool,
            admin_id,
            "payment_rejected",
            serde_json::json!({ "payment_id": payment_id, "user_id": p.user_id }),
        )
        .await;
        tracing::info!(payment_id, admin_id, "Payment rejected by review");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
