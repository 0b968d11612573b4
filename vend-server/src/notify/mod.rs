//! Outbound Notifications
//!
//! Seam between the core and the chat transport. The transport crate
//! implements [`Notifier`]; the server falls back to a tracing-backed
//! implementation so the core never depends on a live chat session.
//!
//! Everything here is best-effort and non-transactional: a failed
//! delivery never rolls back a purchase or a credit.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message to one user.
    async fn notify_user(&self, user_id: i64, text: &str);

    /// Fan a message out to every configured admin.
    async fn notify_admins(&self, text: &str);

    /// Remove a previously shown message (QR / invoice prompt).
    async fn delete_message(&self, user_id: i64, message_ref: &str);

    /// Refresh the countdown shown on a live payment prompt.
    async fn update_countdown(&self, user_id: i64, message_ref: &str, remaining_secs: i64) {
        let _ = (user_id, message_ref, remaining_secs);
    }
}

/// Fallback notifier: logs what would have been sent.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user(&self, user_id: i64, text: &str) {
        tracing::info!(user_id, text, "notify user");
    }

    async fn notify_admins(&self, text: &str) {
        tracing::info!(text, "notify admins");
    }

    async fn delete_message(&self, user_id: i64, message_ref: &str) {
        tracing::debug!(user_id, message_ref, "delete message");
    }
}
