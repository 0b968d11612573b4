//! Core: configuration, state and lifecycle.

pub mod config;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::{Config, OxapayConfig, RazorpayConfig};
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
