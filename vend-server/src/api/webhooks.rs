//! Webhook endpoints.
//!
//! Gateways retry on non-2xx, so every delivery is answered 200 with a
//! JSON ack; failures are reported in the body and logged. A rejected
//! or failed delivery never makes the gateway hammer an endpoint that
//! will keep failing for the same reason.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Serialize;

use crate::core::ServerState;
use crate::payments::providers::{oxapay, razorpay};
use crate::payments::reconcile::SettlementEvent;
use crate::payments::{ReconcileError, ReconcileOutcome};

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookAck {
    fn ok() -> Json<Self> {
        Json(Self {
            ok: true,
            error: None,
        })
    }

    fn err(msg: impl Into<String>) -> Json<Self> {
        Json(Self {
            ok: false,
            error: Some(msg.into()),
        })
    }
}

pub async fn razorpay(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WebhookAck> {
    let signature = headers
        .get(razorpay::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let event = match razorpay::parse_webhook(&state.config.razorpay.webhook_secret, signature, &body)
    {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected razorpay webhook");
            return WebhookAck::err(e.to_string());
        }
    };
    apply(&state, event).await
}

pub async fn oxapay(
    State(state): State<ServerState>,
    Path(secret): Path<String>,
    body: Bytes,
) -> Json<WebhookAck> {
    if !oxapay::secret_matches(&state.config.oxapay.callback_secret, &secret) {
        tracing::warn!("Rejected oxapay callback with a bad path secret");
        return WebhookAck::err("unauthorized");
    }
    let event = match oxapay::parse_webhook(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected oxapay callback");
            return WebhookAck::err(e.to_string());
        }
    };
    apply(&state, event).await
}

async fn apply(state: &ServerState, event: SettlementEvent) -> Json<WebhookAck> {
    match state.reconcile.reconcile(&event).await {
        Ok(ReconcileOutcome::Applied { payment_id, .. }) => {
            tracing::info!(payment_id, "Webhook settled a payment");
            WebhookAck::ok()
        }
        Ok(ReconcileOutcome::Ignored(reason)) => {
            tracing::debug!(?reason, "Webhook acknowledged without effect");
            WebhookAck::ok()
        }
        Err(e @ ReconcileError::Store(_)) => {
            tracing::error!(error = %e, "Webhook reconciliation failed");
            WebhookAck::err("internal error")
        }
        Err(e) => {
            tracing::warn!(error = %e, "Webhook rejected during reconciliation");
            WebhookAck::err(e.to_string())
        }
    }
}
