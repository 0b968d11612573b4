//! Purchase Transaction Coordinator
//!
//! Executes "spend balance for goods" as one SQLite transaction:
//! re-read the wallet, price with the best discount, claim FIFO stock,
//! debit, snapshot the order. Either all of it commits or none of it
//! is visible. The low-stock alert fires after commit, best-effort.

use std::sync::Arc;

use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::DbService;
use crate::db::repository::{RepoError, stock};
use crate::notify::Notifier;
use crate::pricing;
use shared::models::{DiscountRule, StockItem};

#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("User not found")]
    UserNotFound,

    #[error("Access denied")]
    Banned,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Product unavailable")]
    ProductUnavailable,

    #[error("Insufficient wallet balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("Not enough stock available: {available} left")]
    InsufficientStock { available: i64 },

    /// Lost a claim race to a concurrent purchase; nothing committed.
    /// Safe to retry with the same inputs.
    #[error("Stock claim conflict, retry")]
    Conflict,

    #[error(transparent)]
    Store(#[from] RepoError),
}

impl From<sqlx::Error> for PurchaseError {
    fn from(err: sqlx::Error) -> Self {
        PurchaseError::Store(RepoError::from(err))
    }
}

/// Outcome of a successful purchase.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub order_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub total: i64,
    pub delivered: Vec<String>,
}

#[derive(Clone)]
pub struct PurchaseService {
    db: DbService,
    notifier: Arc<dyn Notifier>,
    low_stock_threshold: i64,
}

impl PurchaseService {
    pub fn new(db: DbService, notifier: Arc<dyn Notifier>, low_stock_threshold: i64) -> Self {
        Self {
            db,
            notifier,
            low_stock_threshold,
        }
    }

    /// Execute a purchase. See the module docs for the guarantees.
    ///
    /// Values read before this call (a rendered balance, a shown stock
    /// count) are never trusted; everything is re-read inside the
    /// transaction.
    pub async fn purchase(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        if quantity < 1 {
            return Err(PurchaseError::InvalidQuantity);
        }

        let pool = &self.db.pool;
        let receipt = self.run_transaction(pool, user_id, product_id, quantity).await?;

        // Post-commit, non-transactional: warn admins when inventory
        // runs low. A failure here must not affect the sale.
        match stock::count_available(pool, product_id).await {
            Ok(remaining) if remaining <= self.low_stock_threshold => {
                self.notifier
                    .notify_admins(&format!(
                        "Low stock: {}, {} remaining",
                        receipt.product_name, remaining
                    ))
                    .await;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(product_id, error = %e, "Low-stock check failed"),
        }

        Ok(receipt)
    }

    async fn run_transaction(
        &self,
        pool: &SqlitePool,
        user_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let mut tx = pool.begin().await?;

        let product: Option<(String, i64, bool)> =
            sqlx::query_as("SELECT name, unit_price, enabled FROM product WHERE id = ?")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (product_name, unit_price) = match product {
            Some((name, price, true)) => (name, price),
            _ => return Err(PurchaseError::ProductUnavailable),
        };

        let user: Option<(i64, bool)> =
            sqlx::query_as("SELECT balance, banned FROM user WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let balance = match user {
            None => return Err(PurchaseError::UserNotFound),
            Some((_, true)) => return Err(PurchaseError::Banned),
            Some((balance, false)) => balance,
        };

        let rules = sqlx::query_as::<_, DiscountRule>(
            "SELECT id, product_id, min_qty, percent, updated_at FROM discount_rule WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_all(&mut *tx)
        .await?;
        let percent = pricing::best_discount_percent(&rules, quantity);
        let total = pricing::quote_total(unit_price, quantity, percent);

        if balance < total {
            return Err(PurchaseError::InsufficientBalance {
                balance,
                required: total,
            });
        }

        // Oldest inventory first.
        let items = sqlx::query_as::<_, StockItem>(
            "SELECT id, product_id, email, password, status, buyer_id, sold_at, created_at \
             FROM stock_item WHERE product_id = ? AND status = 'available' \
             ORDER BY created_at ASC, id ASC LIMIT ?",
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_all(&mut *tx)
        .await?;
        if (items.len() as i64) < quantity {
            return Err(PurchaseError::InsufficientStock {
                available: items.len() as i64,
            });
        }

        let now = shared::util::now_millis();
        let placeholders = vec!["?"; items.len()].join(", ");
        let claim_sql = format!(
            "UPDATE stock_item SET status = 'sold', buyer_id = ?, sold_at = ? \
             WHERE status = 'available' AND id IN ({placeholders})"
        );
        let mut claim = sqlx::query(&claim_sql).bind(user_id).bind(now);
        for item in &items {
            claim = claim.bind(item.id);
        }
        let claimed = claim.execute(&mut *tx).await?.rows_affected();
        if claimed != quantity as u64 {
            // Someone else sold one of these items between our read and
            // this write. Roll everything back.
            return Err(PurchaseError::Conflict);
        }

        // Conditional debit re-asserts the balance invariant at write
        // time, independent of the read above.
        let debited = sqlx::query(
            "UPDATE user SET balance = balance - ?1, updated_at = ?2 \
             WHERE id = ?3 AND banned = 0 AND balance >= ?1",
        )
        .bind(total)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if debited == 0 {
            return Err(PurchaseError::InsufficientBalance {
                balance,
                required: total,
            });
        }

        let delivered: Vec<String> = items.iter().map(StockItem::payload).collect();
        let order_id = shared::util::snowflake_id();
        sqlx::query(
            "INSERT INTO orders (id, user_id, product_id, product_name, quantity, total, delivered, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(order_id)
        .bind(user_id)
        .bind(product_id)
        .bind(&product_name)
        .bind(quantity)
        .bind(total)
        .bind(serde_json::to_string(&delivered).unwrap_or_else(|_| "[]".into()))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id, product_id, quantity, total, order_id, "Purchase completed");

        Ok(PurchaseReceipt {
            order_id,
            product_name,
            quantity,
            total,
            delivered,
        })
    }
}

#[cfg(test)]
mod tests;
