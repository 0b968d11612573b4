//! Payments: funding, reconciliation and manual review.

pub mod funding;
pub mod providers;
pub mod reconcile;
pub mod review;

pub use funding::{FundingError, FundingService};
pub use reconcile::{ReconcileEngine, ReconcileError, ReconcileOutcome, SettlementEvent};
pub use review::{ReviewError, ReviewService};
