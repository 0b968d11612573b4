//! Flow State Machine
//!
//! Drives multi-step chat interactions off the persisted per-user
//! cursor. The engine re-reads the cursor on every message, checks the
//! admin capability once at dispatch, and hands the input to the
//! handler for the current step. Handlers replace or clear the cursor
//! atomically; an invalid input leaves it untouched so the same prompt
//! repeats.

use std::sync::Arc;

use thiserror::Error;

use crate::db::DbService;
use crate::db::repository::{RepoError, audit, discount, payment, product, stock, user};
use crate::notify::Notifier;
use crate::payments::{FundingError, FundingService};
use shared::models::{BalanceOp, FlowInput, FlowOutcome, FlowState, PaymentProvider, ProductField};
use shared::util::{parse_credits, parse_usd};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("User not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] RepoError),
}

pub struct FlowEngine {
    db: DbService,
    funding: Arc<FundingService>,
    notifier: Arc<dyn Notifier>,
}

impl FlowEngine {
    pub fn new(db: DbService, funding: Arc<FundingService>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            funding,
            notifier,
        }
    }

    /// Start a flow, replacing whatever was active.
    pub async fn begin(&self, user_id: i64, state: FlowState) -> Result<FlowOutcome, FlowError> {
        let prompt = initial_prompt(&state);
        user::set_flow(&self.db.pool, user_id, Some(&state)).await?;
        Ok(FlowOutcome::Prompt(prompt))
    }

    /// Abandon the active flow, if any.
    pub async fn abort(&self, user_id: i64) -> Result<(), FlowError> {
        user::set_flow(&self.db.pool, user_id, None).await?;
        Ok(())
    }

    /// Feed one inbound message into the active flow.
    pub async fn advance(
        &self,
        user_id: i64,
        is_admin: bool,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let pool = &self.db.pool;
        let u = user::find_by_id(pool, user_id)
            .await?
            .ok_or(FlowError::UserNotFound)?;
        let Some(state) = u.flow() else {
            return Ok(FlowOutcome::Idle);
        };

        // Capability gate, once, before any handler runs.
        if state.requires_admin() && !is_admin {
            user::set_flow(pool, user_id, None).await?;
            tracing::warn!(user_id, "Non-admin input on an admin flow step");
            return Ok(FlowOutcome::Denied);
        }

        match state {
            FlowState::AwaitingAmount { provider } => {
                self.on_amount(user_id, provider, input).await
            }
            FlowState::AwaitingProof { payment_id } => {
                self.on_proof(user_id, payment_id, input).await
            }
            FlowState::AwaitingStockEmail { product_id } => {
                self.on_stock_email(user_id, product_id, input).await
            }
            FlowState::AwaitingStockPassword { product_id, email } => {
                self.on_stock_password(user_id, product_id, &email, input).await
            }
            FlowState::AwaitingStockEditEmail { stock_id } => {
                self.on_stock_edit(user_id, stock_id, true, input).await
            }
            FlowState::AwaitingStockEditPassword { stock_id } => {
                self.on_stock_edit(user_id, stock_id, false, input).await
            }
            FlowState::AwaitingProductField { product_id, field } => {
                self.on_product_field(user_id, product_id, field, input).await
            }
            FlowState::AwaitingProductName { category_id } => {
                self.on_product_name(user_id, category_id, input).await
            }
            FlowState::AwaitingProductPrice { category_id, name } => {
                self.on_product_price(user_id, category_id, &name, input).await
            }
            FlowState::AwaitingDiscountRules { product_id } => {
                self.on_discount_rules(user_id, product_id, input).await
            }
            FlowState::AwaitingBalanceAdjust { target_id, op } => {
                self.on_balance_adjust(user_id, target_id, op, input).await
            }
        }
    }

    async fn clear(&self, user_id: i64) -> Result<(), FlowError> {
        user::set_flow(&self.db.pool, user_id, None).await?;
        Ok(())
    }

    async fn on_amount(
        &self,
        user_id: i64,
        provider: PaymentProvider,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let FlowInput::Text(text) = input else {
            return Ok(FlowOutcome::Invalid("Please send the amount as a number.".into()));
        };

        let amount = match provider {
            PaymentProvider::Oxapay => parse_usd(&text),
            PaymentProvider::Razorpay | PaymentProvider::Manual => {
                parse_credits(&text).map(|c| c as f64)
            }
        };
        let Some(amount) = amount else {
            return Ok(FlowOutcome::Invalid(amount_hint(provider).into()));
        };

        match self.funding.start_funding(user_id, provider, amount).await {
            Ok(p) if provider == PaymentProvider::Manual => {
                user::set_flow(
                    &self.db.pool,
                    user_id,
                    Some(&FlowState::AwaitingProof { payment_id: p.id }),
                )
                .await?;
                Ok(FlowOutcome::Prompt(format!(
                    "Now send a screenshot of your payment of {} credits.",
                    p.requested_credits
                )))
            }
            Ok(p) => {
                self.clear(user_id).await?;
                let where_to = p.pay_url.as_deref().unwrap_or("the payment page");
                Ok(FlowOutcome::Done(format!(
                    "Payment of {} credits created. Complete it here: {}",
                    p.requested_credits, where_to
                )))
            }
            Err(FundingError::InvalidAmount(reason)) => Ok(FlowOutcome::Invalid(reason)),
            Err(FundingError::Banned) => {
                self.clear(user_id).await?;
                Ok(FlowOutcome::Denied)
            }
            Err(FundingError::Store(e)) => Err(e.into()),
            Err(e) => {
                tracing::error!(user_id, provider = %provider, error = %e, "Funding attempt failed");
                self.clear(user_id).await?;
                Ok(FlowOutcome::Done(
                    "Could not create the payment. Please try again later.".into(),
                ))
            }
        }
    }

    async fn on_proof(
        &self,
        user_id: i64,
        payment_id: i64,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let FlowInput::Photo(file_ref) = input else {
            return Ok(FlowOutcome::Invalid(
                "Please send the payment screenshot as a photo.".into(),
            ));
        };

        if !payment::submit_proof(&self.db.pool, payment_id, &file_ref).await? {
            // Payment no longer accepts proof (cancelled, expired,
            // already reviewed, or gone).
            self.clear(user_id).await?;
            return Ok(FlowOutcome::SessionExpired);
        }

        self.clear(user_id).await?;
        let p = payment::find_by_id(&self.db.pool, payment_id).await?;
        let credits = p.map(|p| p.requested_credits).unwrap_or(0);
        self.notifier
            .notify_admins(&format!(
                "Payment {payment_id} from user {user_id} awaits review ({credits} credits)."
            ))
            .await;
        Ok(FlowOutcome::Done(
            "Screenshot received. An admin will review your payment shortly.".into(),
        ))
    }

    async fn on_stock_email(
        &self,
        user_id: i64,
        product_id: i64,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(email) = text_of(input) else {
            return Ok(FlowOutcome::Invalid("Send the account email as text.".into()));
        };
        if product::find_by_id(&self.db.pool, product_id).await?.is_none() {
            self.clear(user_id).await?;
            return Ok(FlowOutcome::SessionExpired);
        }
        user::set_flow(
            &self.db.pool,
            user_id,
            Some(&FlowState::AwaitingStockPassword { product_id, email }),
        )
        .await?;
        Ok(FlowOutcome::Prompt("Now send the password:".into()))
    }

    async fn on_stock_password(
        &self,
        user_id: i64,
        product_id: i64,
        email: &str,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(password) = text_of(input) else {
            return Ok(FlowOutcome::Invalid("Send the password as text.".into()));
        };
        if product::find_by_id(&self.db.pool, product_id).await?.is_none() {
            self.clear(user_id).await?;
            return Ok(FlowOutcome::SessionExpired);
        }
        let item = stock::insert(&self.db.pool, product_id, email, &password).await?;
        self.clear(user_id).await?;
        let _ = audit::record(
            &self.db.pool,
            user_id,
            "stock_added",
            serde_json::json!({ "stock_id": item.id, "product_id": product_id }),
        )
        .await;
        let available = stock::count_available(&self.db.pool, product_id).await?;
        Ok(FlowOutcome::Done(format!(
            "Stock item added. {available} now available."
        )))
    }

    async fn on_stock_edit(
        &self,
        user_id: i64,
        stock_id: i64,
        is_email: bool,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(value) = text_of(input) else {
            return Ok(FlowOutcome::Invalid("Send the new value as text.".into()));
        };
        let result = if is_email {
            stock::update_email(&self.db.pool, stock_id, &value).await
        } else {
            stock::update_password(&self.db.pool, stock_id, &value).await
        };
        match result {
            Ok(()) => {
                self.clear(user_id).await?;
                let _ = audit::record(
                    &self.db.pool,
                    user_id,
                    "stock_updated",
                    serde_json::json!({ "stock_id": stock_id }),
                )
                .await;
                Ok(FlowOutcome::Done("Stock item updated.".into()))
            }
            Err(RepoError::NotFound(_)) => {
                self.clear(user_id).await?;
                Ok(FlowOutcome::SessionExpired)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_product_field(
        &self,
        user_id: i64,
        product_id: i64,
        field: ProductField,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(text) = text_of(input) else {
            return Ok(FlowOutcome::Invalid("Send the new value as text.".into()));
        };
        let result = match field {
            ProductField::Name => product::rename(&self.db.pool, product_id, &text).await,
            ProductField::Price => {
                let Some(price) = parse_credits(&text) else {
                    return Ok(FlowOutcome::Invalid(
                        "Send the price as a whole number of credits.".into(),
                    ));
                };
                product::set_price(&self.db.pool, product_id, price).await
            }
        };
        match result {
            Ok(()) => {
                self.clear(user_id).await?;
                let _ = audit::record(
                    &self.db.pool,
                    user_id,
                    "product_updated",
                    serde_json::json!({ "product_id": product_id }),
                )
                .await;
                Ok(FlowOutcome::Done("Product updated.".into()))
            }
            Err(RepoError::NotFound(_)) => {
                self.clear(user_id).await?;
                Ok(FlowOutcome::SessionExpired)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_product_name(
        &self,
        user_id: i64,
        category_id: i64,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(name) = text_of(input) else {
            return Ok(FlowOutcome::Invalid("Send the product name as text.".into()));
        };
        user::set_flow(
            &self.db.pool,
            user_id,
            Some(&FlowState::AwaitingProductPrice { category_id, name }),
        )
        .await?;
        Ok(FlowOutcome::Prompt("Send the unit price in credits:".into()))
    }

    async fn on_product_price(
        &self,
        user_id: i64,
        category_id: i64,
        name: &str,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(text) = text_of(input) else {
            return Ok(FlowOutcome::Invalid("Send the price as text.".into()));
        };
        let Some(price) = parse_credits(&text) else {
            return Ok(FlowOutcome::Invalid(
                "Send the price as a whole number of credits.".into(),
            ));
        };
        match product::create(&self.db.pool, category_id, name, price).await {
            Ok(p) => {
                self.clear(user_id).await?;
                let _ = audit::record(
                    &self.db.pool,
                    user_id,
                    "product_created",
                    serde_json::json!({ "product_id": p.id, "name": p.name, "unit_price": p.unit_price }),
                )
                .await;
                Ok(FlowOutcome::Done(format!(
                    "Product \"{}\" created at {} credits.",
                    p.name, p.unit_price
                )))
            }
            Err(RepoError::NotFound(_)) => {
                self.clear(user_id).await?;
                Ok(FlowOutcome::SessionExpired)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_discount_rules(
        &self,
        user_id: i64,
        product_id: i64,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(text) = text_of(input) else {
            return Ok(FlowOutcome::Invalid(
                "Send the rules as text, one \"min_qty percent\" pair per line.".into(),
            ));
        };
        let Some(rules) = parse_rule_lines(&text) else {
            return Ok(FlowOutcome::Invalid(
                "Could not parse that. Use one \"min_qty percent\" pair per line, e.g. \"5 10\".".into(),
            ));
        };
        if product::find_by_id(&self.db.pool, product_id).await?.is_none() {
            self.clear(user_id).await?;
            return Ok(FlowOutcome::SessionExpired);
        }
        let written = discount::replace_rules(&self.db.pool, product_id, &rules).await?;
        self.clear(user_id).await?;
        let _ = audit::record(
            &self.db.pool,
            user_id,
            "discounts_updated",
            serde_json::json!({ "product_id": product_id, "rules": written }),
        )
        .await;
        Ok(FlowOutcome::Done(format!("{written} discount rule(s) saved.")))
    }

    async fn on_balance_adjust(
        &self,
        user_id: i64,
        target_id: i64,
        op: BalanceOp,
        input: FlowInput,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(text) = text_of(input) else {
            return Ok(FlowOutcome::Invalid("Send the amount as text.".into()));
        };
        let Some(amount) = parse_credits(&text) else {
            return Ok(FlowOutcome::Invalid(
                "Send the amount as a whole number of credits.".into(),
            ));
        };
        if user::find_by_id(&self.db.pool, target_id).await?.is_none() {
            self.clear(user_id).await?;
            return Ok(FlowOutcome::SessionExpired);
        }
        let delta = match op {
            BalanceOp::Add => amount,
            BalanceOp::Deduct => -amount,
        };
        if !user::adjust_balance(&self.db.pool, target_id, delta).await? {
            return Ok(FlowOutcome::Invalid(
                "That would take the balance below zero.".into(),
            ));
        }
        self.clear(user_id).await?;
        let _ = audit::record(
            &self.db.pool,
            user_id,
            "balance_adjusted",
            serde_json::json!({ "target_id": target_id, "delta": delta }),
        )
        .await;
        self.notifier
            .notify_user(
                target_id,
                &format!(
                    "Your wallet was adjusted by {} credit(s) by an admin.",
                    delta
                ),
            )
            .await;
        Ok(FlowOutcome::Done(format!(
            "Balance of user {target_id} adjusted by {delta}."
        )))
    }
}

fn text_of(input: FlowInput) -> Option<String> {
    match input {
        FlowInput::Text(t) => {
            let t = t.trim().to_string();
            (!t.is_empty()).then_some(t)
        }
        FlowInput::Photo(_) => None,
    }
}

fn amount_hint(provider: PaymentProvider) -> &'static str {
    match provider {
        PaymentProvider::Oxapay => "Send the amount in USD, e.g. 5 or 2.50 (minimum $0.10).",
        PaymentProvider::Razorpay | PaymentProvider::Manual => {
            "Send the amount in credits, e.g. 100 (minimum 1)."
        }
    }
}

fn initial_prompt(state: &FlowState) -> String {
    match state {
        FlowState::AwaitingAmount { provider } => amount_hint(*provider).to_string(),
        FlowState::AwaitingProof { .. } => "Send a screenshot of your payment.".into(),
        FlowState::AwaitingStockEmail { .. } => "Send the account email:".into(),
        FlowState::AwaitingStockPassword { .. } => "Now send the password:".into(),
        FlowState::AwaitingStockEditEmail { .. } => "Send the new email:".into(),
        FlowState::AwaitingStockEditPassword { .. } => "Send the new password:".into(),
        FlowState::AwaitingProductField { field, .. } => match field {
            ProductField::Name => "Send the new product name:".into(),
            ProductField::Price => "Send the new price in credits:".into(),
        },
        FlowState::AwaitingProductName { .. } => "Send the product name:".into(),
        FlowState::AwaitingProductPrice { .. } => "Send the unit price in credits:".into(),
        FlowState::AwaitingDiscountRules { .. } => {
            "Send the discount rules, one \"min_qty percent\" pair per line.".into()
        }
        FlowState::AwaitingBalanceAdjust { op, .. } => match op {
            BalanceOp::Add => "Send the amount of credits to add:".into(),
            BalanceOp::Deduct => "Send the amount of credits to deduct:".into(),
        },
    }
}

/// "min_qty percent" per line; blank lines are skipped, anything else
/// fails the whole paste.
fn parse_rule_lines(text: &str) -> Option<Vec<(i64, i64)>> {
    let mut rules = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let min_qty: i64 = parts.next()?.parse().ok()?;
        let percent: i64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || min_qty < 1 || !(0..=100).contains(&percent) {
            return None;
        }
        rules.push((min_qty, percent));
    }
    (!rules.is_empty()).then_some(rules)
}
