//! Domain Models
//!
//! One module per entity, mirroring the tables in
//! `vend-server/migrations`. All money fields are integer credits.

pub mod audit;
pub mod flow;
pub mod order;
pub mod payment;
pub mod product;
pub mod stock_item;
pub mod user;

pub use audit::AuditEntry;
pub use flow::{BalanceOp, FlowInput, FlowOutcome, FlowState, ProductField};
pub use order::Order;
pub use payment::{Payment, PaymentProvider, PaymentStatus};
pub use product::{Category, DiscountRule, Product};
pub use stock_item::{StockItem, StockStatus};
pub use user::User;
