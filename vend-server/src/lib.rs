//! Vend Server - conversational commerce backend
//!
//! # Architecture overview
//!
//! The server sells unique digital goods (account credentials) against
//! an internal credit wallet, funded through payment gateways or
//! manually reviewed proof. Core guarantees: atomic purchases,
//! exactly-once settlement crediting, auto-expiring payment requests.
//!
//! # Module layout
//!
//! ```text
//! vend-server/src/
//! ├── core/          # config, state, server, background tasks
//! ├── api/           # HTTP routes (health, webhooks)
//! ├── db/            # SQLite pool + repositories
//! ├── purchase/      # atomic wallet-for-goods transaction
//! ├── payments/      # funding, gateway clients, reconciliation, review
//! ├── flow/          # per-user conversation state machine
//! ├── expiry/        # payment deadline scheduler
//! ├── pricing/       # quantity discount resolution
//! ├── notify/        # outbound notification seam
//! └── utils/         # logging
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod expiry;
pub mod flow;
pub mod notify;
pub mod payments;
pub mod pricing;
pub mod purchase;
pub mod utils;

// Re-export common types
pub use core::{BackgroundTasks, Config, Server, ServerState, TaskKind};
pub use db::DbService;
pub use db::repository::{RepoError, RepoResult};
pub use expiry::ExpiryScheduler;
pub use flow::{FlowEngine, FlowError};
pub use notify::{LogNotifier, Notifier};
pub use payments::{
    FundingError, FundingService, ReconcileEngine, ReconcileError, ReconcileOutcome, ReviewError,
    ReviewService, SettlementEvent,
};
pub use purchase::{PurchaseError, PurchaseReceipt, PurchaseService};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// Load .env and initialize logging. Call once, before anything logs.
pub fn setup_environment() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    init_logger_with_file(log_level.as_deref(), log_dir.as_deref());
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
 _   _  ____  _  _  ____
( )_( )( ___)( \( )(  _ \
 \   /  )__)  )  (  )(_) )
  \_/  (____)(_)\_)(____/
    "#
    );
}
