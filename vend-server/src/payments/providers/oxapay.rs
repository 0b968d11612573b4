//! OxaPay crypto invoice integration.
//!
//! Funding creates a USD invoice; the gateway's `track_id` is the
//! correlation key. OxaPay sends no signature, so webhook authenticity
//! rests on the secret callback path segment (checked by the HTTP
//! layer) plus the track id resolving to a known payment. Only the
//! final `paid` / `completed` statuses settle; `confirming` and
//! friends are acknowledged without crediting.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use super::{ChargeRequest, ChargeResponse, ProviderClient};
use crate::payments::reconcile::{EventKind, ReconcileError, SettlementEvent};
use shared::models::PaymentProvider;

const INVOICE_API: &str = "https://api.oxapay.com/v1/payment/invoice";

pub struct OxapayClient {
    http: reqwest::Client,
    api_key: String,
    callback_url: String,
    lifetime_mins: i64,
}

impl OxapayClient {
    pub fn new(
        http: reqwest::Client,
        api_key: String,
        callback_url: String,
        lifetime_mins: i64,
    ) -> Self {
        Self {
            http,
            api_key,
            callback_url,
            lifetime_mins,
        }
    }
}

#[async_trait]
impl ProviderClient for OxapayClient {
    async fn create_charge(&self, req: &ChargeRequest) -> anyhow::Result<ChargeResponse> {
        let body = serde_json::json!({
            "amount": req.amount,
            "currency": "USD",
            "lifetime": self.lifetime_mins,
            "mixed_payment": false,
            "callback_url": self.callback_url,
            "description": req.description,
            "order_id": req.user_id.to_string(),
        });

        let resp = self
            .http
            .post(INVOICE_API)
            .header("merchant_api_key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let payload: Value = resp.json().await?;

        let track_id = track_id_from(&payload["data"]["track_id"])
            .ok_or_else(|| anyhow::anyhow!("invoice response missing track_id"))?;
        let pay_url = payload["data"]["payment_url"].as_str().map(str::to_string);

        Ok(ChargeResponse {
            provider_ref: track_id,
            pay_url,
        })
    }
}

// track_id arrives as a number in some payloads, a string in others.
fn track_id_from(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Constant-time check of the callback path secret. Both sides are
/// mapped through HMAC-SHA256 under the configured secret, then the
/// tags are compared with `Mac::verify_slice`, so the comparison never
/// short-circuits on the first differing byte. An unconfigured
/// (empty) secret matches nothing.
pub fn secret_matches(configured: &str, provided: &str) -> bool {
    if configured.is_empty() {
        return false;
    }
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(configured.as_bytes()) else {
        return false;
    };
    mac.update(provided.as_bytes());
    let tag = mac.finalize().into_bytes();

    let Ok(mut expected) = Hmac::<Sha256>::new_from_slice(configured.as_bytes()) else {
        return false;
    };
    expected.update(configured.as_bytes());
    expected.verify_slice(&tag).is_ok()
}

/// Classify a callback delivery. The path secret has already been
/// checked by the HTTP layer.
pub fn parse_webhook(body: &[u8]) -> Result<SettlementEvent, ReconcileError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;

    let track_id = track_id_from(&payload["track_id"])
        .ok_or_else(|| ReconcileError::MalformedPayload("missing track_id".into()))?;
    let status = payload["status"]
        .as_str()
        .ok_or_else(|| ReconcileError::MalformedPayload("missing status".into()))?
        .to_ascii_lowercase();

    let kind = match status.as_str() {
        "paid" | "completed" => EventKind::Settled,
        other => EventKind::Intermediate {
            event: other.to_string(),
        },
    };
    let amount = payload["amount"].as_f64().unwrap_or(0.0);

    Ok(SettlementEvent {
        provider: PaymentProvider::Oxapay,
        provider_ref: track_id,
        kind,
        amount,
        raw: payload,
    })
}
