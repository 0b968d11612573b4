//! Razorpay UPI QR integration.
//!
//! Funding creates a single-use, fixed-amount QR code; the gateway's
//! QR id is the correlation key. Settlement arrives on the webhook as
//! `qr_code.credited`. Webhook authenticity is an HMAC-SHA256 of the
//! raw body under the shared webhook secret, delivered in the
//! `X-Razorpay-Signature` header.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use super::{ChargeRequest, ChargeResponse, ProviderClient};
use crate::payments::reconcile::{EventKind, ReconcileError, SettlementEvent};
use shared::models::PaymentProvider;

const QR_CODE_API: &str = "https://api.razorpay.com/v1/payments/qr_codes";

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Settlement event name. Everything else (`payment.captured`,
/// `qr_code.closed`, ...) is acknowledged without crediting.
const SETTLED_EVENT: &str = "qr_code.credited";

pub struct RazorpayClient {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    qr_ttl_secs: i64,
}

impl RazorpayClient {
    pub fn new(http: reqwest::Client, key_id: String, key_secret: String, qr_ttl_secs: i64) -> Self {
        Self {
            http,
            key_id,
            key_secret,
            qr_ttl_secs,
        }
    }
}

#[async_trait]
impl ProviderClient for RazorpayClient {
    async fn create_charge(&self, req: &ChargeRequest) -> anyhow::Result<ChargeResponse> {
        // Amounts go to Razorpay in paise.
        let paise = (req.amount * 100.0).round() as i64;
        let close_by = shared::util::now_millis() / 1000 + self.qr_ttl_secs;
        let body = serde_json::json!({
            "type": "upi_qr",
            "usage": "single_use",
            "fixed_amount": true,
            "payment_amount": paise,
            "description": req.description,
            "close_by": close_by,
            "notes": { "user_id": req.user_id.to_string() },
        });

        let resp = self
            .http
            .post(QR_CODE_API)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let payload: Value = resp.json().await?;

        let qr_id = payload["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("QR create response missing id"))?
            .to_string();
        let image_url = payload["image_url"].as_str().map(str::to_string);

        Ok(ChargeResponse {
            provider_ref: qr_id,
            pay_url: image_url,
        })
    }
}

/// Verify the raw-body HMAC. Constant-time via `Mac::verify_slice`.
pub fn verify_signature(webhook_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(decoded) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = match Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&decoded).is_ok()
}

/// Authenticate and classify a webhook delivery.
pub fn parse_webhook(
    webhook_secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<SettlementEvent, ReconcileError> {
    let signature = signature.ok_or(ReconcileError::SignatureInvalid)?;
    if !verify_signature(webhook_secret, body, signature) {
        return Err(ReconcileError::SignatureInvalid);
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;
    let event = payload["event"]
        .as_str()
        .ok_or_else(|| ReconcileError::MalformedPayload("missing event field".into()))?
        .to_string();

    if event != SETTLED_EVENT {
        return Ok(SettlementEvent {
            provider: PaymentProvider::Razorpay,
            provider_ref: String::new(),
            kind: EventKind::Intermediate { event },
            amount: 0.0,
            raw: payload,
        });
    }

    let qr_id = payload["payload"]["qr_code"]["entity"]["id"]
        .as_str()
        .ok_or_else(|| ReconcileError::MalformedPayload("credited event missing qr id".into()))?
        .to_string();
    // Captured amount in paise.
    let paise = payload["payload"]["payment"]["entity"]["amount"]
        .as_i64()
        .ok_or_else(|| ReconcileError::MalformedPayload("credited event missing amount".into()))?;

    Ok(SettlementEvent {
        provider: PaymentProvider::Razorpay,
        provider_ref: qr_id,
        kind: EventKind::Settled,
        amount: paise as f64,
        raw: payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn credited_body() -> Vec<u8> {
        serde_json::json!({
            "event": "qr_code.credited",
            "payload": {
                "qr_code": { "entity": { "id": "qr_abc123" } },
                "payment": { "entity": { "amount": 15000, "id": "pay_x1" } }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn valid_signature_and_credited_event_settle() {
        let body = credited_body();
        let sig = sign("whsec", &body);
        let event = parse_webhook("whsec", Some(&sig), &body).unwrap();
        assert!(matches!(event.kind, EventKind::Settled));
        assert_eq!(event.provider_ref, "qr_abc123");
        assert_eq!(event.amount, 15000.0);
    }

    #[test]
    fn bad_signature_is_rejected_before_parsing() {
        let body = credited_body();
        let err = parse_webhook("whsec", Some("deadbeef"), &body).unwrap_err();
        assert!(matches!(err, ReconcileError::SignatureInvalid));
        assert!(matches!(
            parse_webhook("whsec", None, &body).unwrap_err(),
            ReconcileError::SignatureInvalid
        ));
    }

    #[test]
    fn signature_from_wrong_secret_is_rejected() {
        let body = credited_body();
        let sig = sign("other-secret", &body);
        assert!(matches!(
            parse_webhook("whsec", Some(&sig), &body).unwrap_err(),
            ReconcileError::SignatureInvalid
        ));
    }

    #[test]
    fn payment_captured_is_intermediate() {
        let body = serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "amount": 15000 } } }
        })
        .to_string()
        .into_bytes();
        let sig = sign("whsec", &body);
        let event = parse_webhook("whsec", Some(&sig), &body).unwrap();
        assert!(matches!(event.kind, EventKind::Intermediate { .. }));
    }

    #[test]
    fn garbage_body_is_malformed() {
        let body = b"not json".to_vec();
        let sig = sign("whsec", &body);
        assert!(matches!(
            parse_webhook("whsec", Some(&sig), &body).unwrap_err(),
            ReconcileError::MalformedPayload(_)
        ));
    }
}
