//! Shared domain types for the Vend commerce backend.
//!
//! Holds the entity models persisted by the server plus the small
//! utilities (snowflake ids, millisecond timestamps) both the server
//! and any collaborator crates rely on.
//!
//! The `db` feature gates `sqlx::FromRow` derives so UI-side consumers
//! can use the models without pulling in the database stack.

pub mod models;
pub mod util;

pub use models::{
    AuditEntry, BalanceOp, Category, DiscountRule, FlowState, Order, Payment, PaymentProvider,
    PaymentStatus, Product, ProductField, StockItem, StockStatus, User,
};
