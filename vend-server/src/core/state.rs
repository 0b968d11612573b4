//! Server state: the shared service graph.
//!
//! `ServerState` wires the store, the payment services, the flow
//! engine and the scheduler together once at startup and is cloned
//! (cheaply, everything is behind `Arc`) into HTTP handlers and
//! background tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{BackgroundTasks, Config, TaskKind};
use crate::db::DbService;
use crate::expiry::ExpiryScheduler;
use crate::flow::FlowEngine;
use crate::notify::{LogNotifier, Notifier};
use crate::payments::providers::{OxapayClient, ProviderClient, RazorpayClient};
use crate::payments::{FundingService, ReconcileEngine, ReviewService};
use crate::purchase::PurchaseService;
use shared::models::PaymentProvider;

#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: DbService,
    pub notifier: Arc<dyn Notifier>,
    pub purchase: PurchaseService,
    pub funding: Arc<FundingService>,
    pub flow: Arc<FlowEngine>,
    pub reconcile: Arc<ReconcileEngine>,
    pub review: Arc<ReviewService>,
    pub expiry: Arc<ExpiryScheduler>,
    /// Cancels the per-payment expiry timers on shutdown.
    pub shutdown: CancellationToken,
}

impl ServerState {
    /// Initialize with the default tracing-backed notifier.
    pub async fn initialize(config: &Config) -> anyhow::Result<Self> {
        Self::initialize_with_notifier(config, Arc::new(LogNotifier)).await
    }

    /// Initialize the full service graph. The chat transport (or a
    /// test) supplies the notifier.
    pub async fn initialize_with_notifier(
        config: &Config,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let db = DbService::new(&config.db_path).await?;

        let shutdown = CancellationToken::new();
        let expiry = Arc::new(ExpiryScheduler::new(
            db.clone(),
            notifier.clone(),
            Duration::from_secs(config.expiry_poll_secs),
            shutdown.clone(),
        ));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let mut funding = FundingService::new(
            db.clone(),
            notifier.clone(),
            expiry.clone(),
            config.usd_to_inr_rate,
            config.razorpay.ttl_secs,
            config.oxapay.ttl_secs,
        );
        if config.razorpay.is_configured() {
            let client: Arc<dyn ProviderClient> = Arc::new(RazorpayClient::new(
                http.clone(),
                config.razorpay.key_id.clone(),
                config.razorpay.key_secret.clone(),
                config.razorpay.ttl_secs,
            ));
            funding = funding.with_client(PaymentProvider::Razorpay, client);
            tracing::info!("Razorpay gateway enabled");
        }
        if config.oxapay.is_configured() {
            let client: Arc<dyn ProviderClient> = Arc::new(OxapayClient::new(
                http,
                config.oxapay.api_key.clone(),
                config.oxapay.callback_url.clone(),
                config.oxapay.ttl_secs / 60,
            ));
            funding = funding.with_client(PaymentProvider::Oxapay, client);
            tracing::info!("OxaPay gateway enabled");
        }
        let funding = Arc::new(funding);

        let purchase = PurchaseService::new(db.clone(), notifier.clone(), config.low_stock_threshold);
        let flow = Arc::new(FlowEngine::new(db.clone(), funding.clone(), notifier.clone()));
        let reconcile = Arc::new(ReconcileEngine::new(
            db.clone(),
            notifier.clone(),
            expiry.clone(),
            config.usd_to_inr_rate,
        ));
        let review = Arc::new(ReviewService::new(db.clone(), notifier.clone()));

        Ok(Self {
            config: config.clone(),
            db,
            notifier,
            purchase,
            funding,
            flow,
            reconcile,
            review,
            expiry,
            shutdown,
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.config.is_admin(user_id)
    }

    /// Register the scheduler's warmup and sweep tasks. Must run
    /// before serving traffic so restored timers cover the restart gap.
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let expiry = self.expiry.clone();
        tasks.spawn("expiry_restore", TaskKind::Warmup, async move {
            expiry.restore().await;
        });

        let expiry = self.expiry.clone();
        let sweep_interval = Duration::from_secs(self.config.expiry_sweep_secs);
        let token = tasks.shutdown_token();
        tasks.spawn("expiry_sweep", TaskKind::Periodic, async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => expiry.sweep().await,
                }
            }
        });

        tasks.log_summary();
    }
}
