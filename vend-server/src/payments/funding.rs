//! Funding: opening and cancelling payment attempts.
//!
//! Creates the payment record, asks the gateway for a charge, and arms
//! the expiry timer. Manual payments skip the gateway and the timer;
//! they sit in `awaiting_proof` until the user attaches a screenshot.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::providers::{ChargeRequest, ProviderClient};
use crate::db::DbService;
use crate::db::repository::{RepoError, payment, user};
use crate::db::repository::payment::NewPayment;
use crate::expiry::ExpiryScheduler;
use crate::notify::Notifier;
use shared::models::{Payment, PaymentProvider, PaymentStatus};

#[derive(Debug, Error)]
pub enum FundingError {
    #[error("User not found")]
    UserNotFound,

    #[error("Access denied")]
    Banned,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("No gateway configured for {0}")]
    UnsupportedProvider(PaymentProvider),

    #[error("Gateway request failed: {0}")]
    Gateway(String),

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Payment already {0}")]
    AlreadyFinal(PaymentStatus),

    #[error(transparent)]
    Store(#[from] RepoError),
}

pub struct FundingService {
    db: DbService,
    notifier: Arc<dyn Notifier>,
    expiry: Arc<ExpiryScheduler>,
    clients: HashMap<PaymentProvider, Arc<dyn ProviderClient>>,
    usd_to_inr_rate: f64,
    razorpay_ttl_secs: i64,
    oxapay_ttl_secs: i64,
}

impl FundingService {
    pub fn new(
        db: DbService,
        notifier: Arc<dyn Notifier>,
        expiry: Arc<ExpiryScheduler>,
        usd_to_inr_rate: f64,
        razorpay_ttl_secs: i64,
        oxapay_ttl_secs: i64,
    ) -> Self {
        Self {
            db,
            notifier,
            expiry,
            clients: HashMap::new(),
            usd_to_inr_rate,
            razorpay_ttl_secs,
            oxapay_ttl_secs,
        }
    }

    pub fn with_client(mut self, provider: PaymentProvider, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.insert(provider, client);
        self
    }

    /// Open a funding attempt. `amount` is in the provider's native
    /// currency: INR for Razorpay and manual, USD for OxaPay.
    pub async fn start_funding(
        &self,
        user_id: i64,
        provider: PaymentProvider,
        amount: f64,
    ) -> Result<Payment, FundingError> {
        let pool = &self.db.pool;
        let u = user::find_by_id(pool, user_id)
            .await?
            .ok_or(FundingError::UserNotFound)?;
        if u.banned {
            return Err(FundingError::Banned);
        }

        let requested_credits = self.credits_for(provider, amount)?;

        if provider == PaymentProvider::Manual {
            let p = payment::insert(
                pool,
                NewPayment {
                    user_id,
                    provider,
                    requested_credits,
                    provider_amount: amount,
                    provider_ref: None,
                    pay_url: None,
                    status: PaymentStatus::AwaitingProof,
                    expires_at: None,
                },
            )
            .await?;
            tracing::info!(payment_id = p.id, user_id, requested_credits, "Manual payment opened");
            return Ok(p);
        }

        let client = self
            .clients
            .get(&provider)
            .ok_or(FundingError::UnsupportedProvider(provider))?;
        let charge = client
            .create_charge(&ChargeRequest {
                user_id,
                amount,
                description: format!("Wallet top-up: {requested_credits} credits"),
            })
            .await
            .map_err(|e| FundingError::Gateway(e.to_string()))?;

        let ttl_secs = match provider {
            PaymentProvider::Razorpay => self.razorpay_ttl_secs,
            PaymentProvider::Oxapay => self.oxapay_ttl_secs,
            PaymentProvider::Manual => unreachable!(),
        };
        let expires_at = shared::util::now_millis() + ttl_secs * 1000;

        let p = payment::insert(
            pool,
            NewPayment {
                user_id,
                provider,
                requested_credits,
                provider_amount: amount,
                provider_ref: Some(charge.provider_ref),
                pay_url: charge.pay_url,
                status: PaymentStatus::Pending,
                expires_at: Some(expires_at),
            },
        )
        .await?;
        self.expiry.schedule(p.id, user_id, expires_at);

        tracing::info!(
            payment_id = p.id,
            user_id,
            provider = %provider,
            requested_credits,
            "Funding attempt opened"
        );
        Ok(p)
    }

    /// Record the chat-message handle of the live payment prompt so a
    /// later settlement (possibly in another process) can remove it.
    pub async fn attach_display_message(&self, payment_id: i64, message_ref: &str) -> Result<(), FundingError> {
        payment::set_display_message_ref(&self.db.pool, payment_id, message_ref).await?;
        Ok(())
    }

    /// User-driven cancellation. Only open payments can be cancelled;
    /// a settlement that already won is untouched.
    pub async fn cancel_payment(&self, payment_id: i64) -> Result<(), FundingError> {
        let pool = &self.db.pool;
        let p = payment::find_by_id(pool, payment_id)
            .await?
            .ok_or(FundingError::PaymentNotFound)?;

        if !payment::cancel_if_open(pool, payment_id).await? {
            let status = payment::status_of(pool, payment_id)
                .await?
                .unwrap_or(p.status);
            return Err(FundingError::AlreadyFinal(status));
        }

        self.expiry.cancel(payment_id);
        if let Some(msg_ref) = &p.display_message_ref {
            self.notifier.delete_message(p.user_id, msg_ref).await;
        }
        self.notifier
            .notify_user(p.user_id, "Payment cancelled.")
            .await;
        tracing::info!(payment_id, user_id = p.user_id, "Payment cancelled by user");
        Ok(())
    }

    fn credits_for(&self, provider: PaymentProvider, amount: f64) -> Result<i64, FundingError> {
        if !amount.is_finite() {
            return Err(FundingError::InvalidAmount("amount must be a number".into()));
        }
        match provider {
            PaymentProvider::Razorpay | PaymentProvider::Manual => {
                if amount < 1.0 {
                    return Err(FundingError::InvalidAmount(
                        "minimum top-up is 1 credit".into(),
                    ));
                }
                Ok(amount.floor() as i64)
            }
            PaymentProvider::Oxapay => {
                if amount < 0.1 {
                    return Err(FundingError::InvalidAmount(
                        "minimum top-up is $0.10".into(),
                    ));
                }
                let credits = (amount * self.usd_to_inr_rate).floor() as i64;
                if credits < 1 {
                    return Err(FundingError::InvalidAmount("amount too small".into()));
                }
                Ok(credits)
            }
        }
    }
}
