//! Order Model

use serde::{Deserialize, Serialize};

/// Completed purchase. Written exactly once by the purchase
/// transaction and immutable thereafter; `product_name` and `total`
/// are snapshots taken at purchase time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    /// Total charged in integer credits, after discount.
    pub total: i64,
    /// JSON array of delivered credential payloads.
    pub delivered: String,
    pub created_at: i64,
}

impl Order {
    pub fn delivered_payloads(&self) -> Vec<String> {
        serde_json::from_str(&self.delivered).unwrap_or_default()
    }
}
