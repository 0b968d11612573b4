//! Audit Log Model

use serde::{Deserialize, Serialize};

/// One privileged or money-moving action, kept for replay/debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct AuditEntry {
    pub id: i64,
    /// Acting user (admin id, or the system actor 0 for webhook-driven
    /// mutations).
    pub actor_id: i64,
    pub action: String,
    /// JSON context: ids and amounts, enough to replay.
    pub data: String,
    pub created_at: i64,
}
