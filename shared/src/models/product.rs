//! Product and Catalog Models

use serde::{Deserialize, Serialize};

/// Sellable SKU. Read-only to the core; created and edited by the
/// catalog-management flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    /// Unit price in integer credits.
    pub unit_price: i64,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Catalog category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

/// Quantity-threshold discount rule. The best (largest) percent among
/// rules with `min_qty <= quantity` wins, regardless of threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DiscountRule {
    pub id: i64,
    pub product_id: i64,
    pub min_qty: i64,
    /// Percent off, clamped to 0..=100.
    pub percent: i64,
    pub updated_at: i64,
}
