//! Stock Item Model

use serde::{Deserialize, Serialize};

/// Lifecycle of one deliverable unit. `Available -> Sold` happens
/// exactly once, inside the purchase transaction, and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Available,
    Sold,
}

/// One deliverable credential pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct StockItem {
    pub id: i64,
    pub product_id: i64,
    pub email: String,
    pub password: String,
    pub status: StockStatus,
    pub buyer_id: Option<i64>,
    pub sold_at: Option<i64>,
    pub created_at: i64,
}

impl StockItem {
    /// The payload delivered to a buyer.
    pub fn payload(&self) -> String {
        format!("Email: {}\nPassword: {}", self.email, self.password)
    }
}
