//! Expiry Scheduler
//!
//! One lightweight timer task per outstanding pending payment, keyed
//! by payment id in a registry so a restart can rebuild the timers
//! from the store. Tasks poll rather than trust in-process state:
//! whether reconciliation or cancellation moved the payment out of
//! `pending`, the next poll observes it and the task exits. Only the
//! conditional pending→expired update at the deadline mutates status
//! from here.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::db::DbService;
use crate::db::repository::{audit, payment};
use crate::notify::Notifier;
use shared::models::{Payment, PaymentStatus};

pub struct ExpiryScheduler {
    db: DbService,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    shutdown: CancellationToken,
    timers: DashMap<i64, CancellationToken>,
}

impl ExpiryScheduler {
    pub fn new(
        db: DbService,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            notifier,
            poll_interval,
            shutdown,
            timers: DashMap::new(),
        }
    }

    /// Arm (or re-arm) the timer for a payment. Replacing an existing
    /// timer cancels the old task first.
    pub fn schedule(self: &Arc<Self>, payment_id: i64, user_id: i64, expires_at: i64) {
        let token = CancellationToken::new();
        if let Some(old) = self.timers.insert(payment_id, token.clone()) {
            old.cancel();
        }
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler
                .run_timer(payment_id, user_id, expires_at, token)
                .await;
            scheduler.timers.remove(&payment_id);
        });
        tracing::debug!(payment_id, expires_at, "Expiry timer armed");
    }

    /// Direct cancellation when the terminal event is known in-process.
    /// An optimization only; polling alone is sufficient.
    pub fn cancel(&self, payment_id: i64) {
        if let Some((_, token)) = self.timers.remove(&payment_id) {
            token.cancel();
        }
    }

    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    /// Startup catch-up: re-arm a timer for every payment still
    /// pending with a deadline. Registered as a Warmup task.
    pub async fn restore(self: &Arc<Self>) {
        match payment::find_pending_with_deadline(&self.db.pool).await {
            Ok(payments) => {
                let count = payments.len();
                for p in payments {
                    if let Some(expires_at) = p.expires_at {
                        self.schedule(p.id, p.user_id, expires_at);
                    }
                }
                if count > 0 {
                    tracing::info!(count, "Restored expiry timers for pending payments");
                }
            }
            Err(e) => tracing::error!(error = %e, "Expiry timer restore failed"),
        }
    }

    /// Safety net for timers lost between restarts: expire anything
    /// pending whose deadline already passed. Registered as a Periodic
    /// task.
    pub async fn sweep(&self) {
        let now = shared::util::now_millis();
        let overdue = match payment::find_overdue_pending(&self.db.pool, now).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Expiry sweep scan failed");
                return;
            }
        };
        for p in overdue {
            self.try_expire(&p).await;
        }
    }

    async fn run_timer(
        &self,
        payment_id: i64,
        user_id: i64,
        expires_at: i64,
        token: CancellationToken,
    ) {
        loop {
            let remaining_ms = expires_at - shared::util::now_millis();
            if remaining_ms <= 0 {
                // Deadline reached. Re-read once more and expire only
                // if still pending.
                match payment::find_by_id(&self.db.pool, payment_id).await {
                    Ok(Some(p)) => self.try_expire(&p).await,
                    Ok(None) => {}
                    Err(e) => tracing::error!(payment_id, error = %e, "Expiry read failed"),
                }
                return;
            }

            let sleep = self.poll_interval.min(Duration::from_millis(remaining_ms as u64));
            tokio::select! {
                _ = token.cancelled() => return,
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(sleep) => {}
            }

            match payment::find_by_id(&self.db.pool, payment_id).await {
                Ok(Some(p)) if p.status == PaymentStatus::Pending => {
                    // Still waiting: refresh the live countdown.
                    if let Some(msg_ref) = &p.display_message_ref {
                        let remaining_secs = (expires_at - shared::util::now_millis()).max(0) / 1000;
                        self.notifier
                            .update_countdown(user_id, msg_ref, remaining_secs)
                            .await;
                    }
                }
                Ok(Some(p)) => {
                    tracing::debug!(payment_id, status = ?p.status, "Expiry timer stopped, payment settled");
                    return;
                }
                Ok(None) => return,
                Err(e) => {
                    // Transient read failure: keep polling.
                    tracing::warn!(payment_id, error = %e, "Expiry poll failed");
                }
            }
        }
    }

    /// Conditional pending→expired; a concurrent approval or cancel
    /// wins and this becomes a no-op.
    async fn try_expire(&self, p: &Payment) {
        match payment::expire_if_pending(&self.db.pool, p.id).await {
            Ok(true) => {
                tracing::info!(payment_id = p.id, user_id = p.user_id, "Payment expired");
                let _ = audit::record(
                    &self.db.pool,
                    audit::SYSTEM_ACTOR,
                    "payment_expired",
                    serde_json::json!({ "payment_id": p.id, "user_id": p.user_id }),
                )
                .await;
                if let Some(msg_ref) = &p.display_message_ref {
                    self.notifier.delete_message(p.user_id, msg_ref).await;
                }
                self.notifier
                    .notify_user(
                        p.user_id,
                        "Payment expired. Please create a new payment request.",
                    )
                    .await;
            }
            Ok(false) => {}
            Err(e) => tracing::error!(payment_id = p.id, error = %e, "Expire transition failed"),
        }
    }
}

#[cfg(test)]
mod tests;
