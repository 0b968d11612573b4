//! Payment Reconciliation Engine
//!
//! Single settlement path for every provider. Adapters normalize a
//! delivery into a [`SettlementEvent`]; this engine correlates it to a
//! stored payment and applies the credit exactly once. Winning the
//! conditional open→approved transition is the only license to credit
//! the wallet, so duplicate deliveries and races with expiry or
//! cancellation all collapse to a no-op acknowledgement.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::db::DbService;
use crate::db::repository::{RepoError, audit, payment, user};
use crate::expiry::ExpiryScheduler;
use crate::notify::Notifier;
use shared::models::{Payment, PaymentProvider, PaymentStatus};

#[derive(Debug, Clone)]
pub enum EventKind {
    /// Funds are final; credit the wallet.
    Settled,
    /// Progress notification. Acknowledged, never credited.
    Intermediate { event: String },
}

/// Provider-neutral form of a webhook delivery.
#[derive(Debug, Clone)]
pub struct SettlementEvent {
    pub provider: PaymentProvider,
    pub provider_ref: String,
    pub kind: EventKind,
    /// Settled amount in the provider's native unit (paise for
    /// Razorpay, USD for OxaPay). Zero for intermediates.
    pub amount: f64,
    pub raw: Value,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    #[error("No payment matches reference {0}")]
    UnknownReference(String),

    /// The reference resolved to a payment created for a different
    /// provider. Never credited.
    #[error("Payment {payment_id} belongs to {expected}, event came from {got}")]
    ProviderMismatch {
        payment_id: i64,
        expected: PaymentProvider,
        got: PaymentProvider,
    },

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Store(#[from] RepoError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This delivery won the transition and credited the wallet.
    Applied {
        payment_id: i64,
        user_id: i64,
        credited: i64,
    },
    /// Valid delivery, nothing to do.
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotSettled,
    /// Already approved; duplicate delivery.
    AlreadyApplied,
    /// Money arrived for a payment already expired, cancelled or
    /// rejected. Queued for human review, wallet untouched.
    HeldForReview,
}

pub struct ReconcileEngine {
    db: DbService,
    notifier: Arc<dyn Notifier>,
    expiry: Arc<ExpiryScheduler>,
    usd_to_inr_rate: f64,
}

impl ReconcileEngine {
    pub fn new(
        db: DbService,
        notifier: Arc<dyn Notifier>,
        expiry: Arc<ExpiryScheduler>,
        usd_to_inr_rate: f64,
    ) -> Self {
        Self {
            db,
            notifier,
            expiry,
            usd_to_inr_rate,
        }
    }

    /// Apply one normalized event. Deliveries are processed
    /// independently; calling this twice with the same event credits
    /// once.
    pub async fn reconcile(&self, event: &SettlementEvent) -> Result<ReconcileOutcome, ReconcileError> {
        if let EventKind::Intermediate { event: name } = &event.kind {
            tracing::debug!(provider = %event.provider, event = %name, "Intermediate webhook acknowledged");
            return Ok(ReconcileOutcome::Ignored(IgnoreReason::NotSettled));
        }

        let pool = &self.db.pool;
        let p = payment::find_by_ref(pool, &event.provider_ref)
            .await?
            .ok_or_else(|| ReconcileError::UnknownReference(event.provider_ref.clone()))?;

        if p.provider != event.provider {
            return Err(ReconcileError::ProviderMismatch {
                payment_id: p.id,
                expected: p.provider,
                got: event.provider,
            });
        }

        if !payment::approve_if_open(pool, p.id, None).await? {
            return self.handle_lost_transition(&p, event).await;
        }

        let credited = self.credits_for(event, &p);
        user::credit_balance(pool, p.user_id, credited).await?;
        user::clear_funding_flow(pool, p.user_id).await?;

        self.expiry.cancel(p.id);
        if let Some(msg_ref) = &p.display_message_ref {
            self.notifier.delete_message(p.user_id, msg_ref).await;
        }
        self.notifier
            .notify_user(
                p.user_id,
                &format!("Payment received! {credited} credits added to your wallet."),
            )
            .await;

        let _ = audit::record(
            pool,
            audit::SYSTEM_ACTOR,
            "payment_settled",
            serde_json::json!({
                "payment_id": p.id,
                "user_id": p.user_id,
                "provider": p.provider.as_str(),
                "credited": credited,
            }),
        )
        .await;

        tracing::info!(
            payment_id = p.id,
            user_id = p.user_id,
            provider = %p.provider,
            credited,
            "Payment reconciled"
        );

        Ok(ReconcileOutcome::Applied {
            payment_id: p.id,
            user_id: p.user_id,
            credited,
        })
    }

    /// The open→approved update matched nothing: either a duplicate
    /// delivery, or money landing on a payment that already reached a
    /// dead terminal state.
    async fn handle_lost_transition(
        &self,
        p: &Payment,
        event: &SettlementEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let status = payment::status_of(&self.db.pool, p.id)
            .await?
            .unwrap_or(PaymentStatus::Approved);

        match status {
            PaymentStatus::Approved => {
                tracing::info!(payment_id = p.id, "Duplicate settlement ignored");
                Ok(ReconcileOutcome::Ignored(IgnoreReason::AlreadyApplied))
            }
            PaymentStatus::Cancelled | PaymentStatus::Expired | PaymentStatus::Rejected => {
                let event_json = event.raw.to_string();
                payment::insert_review(&self.db.pool, p.id, &event_json).await?;
                self.notifier
                    .notify_admins(&format!(
                        "Late settlement for payment {} (user {}, status {}). Held for review.",
                        p.id, p.user_id, status
                    ))
                    .await;
                tracing::warn!(payment_id = p.id, %status, "Settlement after terminal state, held for review");
                Ok(ReconcileOutcome::Ignored(IgnoreReason::HeldForReview))
            }
            // Open statuses lose the conditional update only to a
            // concurrent writer; by the time we get here that writer
            // has approved it.
            PaymentStatus::Pending | PaymentStatus::AwaitingProof => {
                Ok(ReconcileOutcome::Ignored(IgnoreReason::AlreadyApplied))
            }
        }
    }

    /// Credits actually granted, derived from what settled rather than
    /// what was requested.
    fn credits_for(&self, event: &SettlementEvent, p: &Payment) -> i64 {
        match p.provider {
            // 1 INR = 1 credit; the event amount is paise.
            PaymentProvider::Razorpay => (event.amount / 100.0).floor() as i64,
            // Invoice was denominated in USD at creation time.
            PaymentProvider::Oxapay => (p.provider_amount * self.usd_to_inr_rate).floor() as i64,
            PaymentProvider::Manual => p.requested_credits,
        }
    }
}
