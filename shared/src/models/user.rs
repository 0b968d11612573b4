//! User Model

use serde::{Deserialize, Serialize};

use super::flow::FlowState;

/// Wallet holder, keyed by the external chat user id.
///
/// Created on first contact (idempotent upsert) and never deleted.
/// `balance` is mutated only by the purchase coordinator, the
/// reconciliation engine and the admin balance-adjust flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    /// Wallet balance in integer credits. Never negative.
    pub balance: i64,
    pub banned: bool,
    /// Persisted conversation cursor, JSON-encoded [`FlowState`].
    /// `None` means no active flow.
    pub flow_state: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// Decode the persisted flow cursor. A row that fails to decode is
    /// treated as idle (stale states from removed variants clear on the
    /// next transition).
    pub fn flow(&self) -> Option<FlowState> {
        self.flow_state
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}
