use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt;

use super::*;
use crate::core::Config;
use crate::db::repository::payment::{self, NewPayment};
use crate::db::repository::user;
use crate::notify::test_support::RecordingNotifier;
use shared::models::{PaymentProvider, PaymentStatus};

const WEBHOOK_SECRET: &str = "whsec_test";
const CALLBACK_SECRET: &str = "cb_test";

async fn test_state() -> (ServerState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vend-test.db");

    let mut config = Config::with_overrides(db_path.to_str().unwrap(), 0);
    config.razorpay.webhook_secret = WEBHOOK_SECRET.into();
    config.oxapay.callback_secret = CALLBACK_SECRET.into();
    config.usd_to_inr_rate = 90.0;

    let state = ServerState::initialize_with_notifier(&config, Arc::new(RecordingNotifier::default()))
        .await
        .unwrap();
    (state, dir)
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

async fn seed_payment(state: &ServerState, user_id: i64, provider: PaymentProvider, provider_ref: &str) {
    user::upsert(&state.db.pool, user_id, None, None).await.unwrap();
    payment::insert(
        &state.db.pool,
        NewPayment {
            user_id,
            provider,
            requested_credits: 100,
            provider_amount: if provider == PaymentProvider::Oxapay { 5.0 } else { 100.0 },
            provider_ref: Some(provider_ref.to_string()),
            pay_url: None,
            status: PaymentStatus::Pending,
            expires_at: Some(shared::util::now_millis() + 300_000),
        },
    )
    .await
    .unwrap();
}

async fn ack_of(response: axum::response::Response) -> serde_json::Value {
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (state, _dir) = test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = ack_of(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn signed_razorpay_credited_webhook_settles() {
    let (state, _dir) = test_state().await;
    seed_payment(&state, 90, PaymentProvider::Razorpay, "qr_hook").await;
    let app = create_router(state.clone());

    let body = serde_json::json!({
        "event": "qr_code.credited",
        "payload": {
            "qr_code": { "entity": { "id": "qr_hook" } },
            "payment": { "entity": { "amount": 10000 } }
        }
    })
    .to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/razorpay")
                .header("x-razorpay-signature", sign(body.as_bytes()))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let ack = ack_of(response).await;
    assert_eq!(ack["ok"], true);

    let u = user::find_by_id(&state.db.pool, 90).await.unwrap().unwrap();
    assert_eq!(u.balance, 100);
}

#[tokio::test]
async fn unsigned_razorpay_webhook_is_acked_but_rejected() {
    let (state, _dir) = test_state().await;
    seed_payment(&state, 91, PaymentProvider::Razorpay, "qr_nosig").await;
    let app = create_router(state.clone());

    let body = serde_json::json!({
        "event": "qr_code.credited",
        "payload": {
            "qr_code": { "entity": { "id": "qr_nosig" } },
            "payment": { "entity": { "amount": 10000 } }
        }
    })
    .to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/razorpay")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let ack = ack_of(response).await;
    assert_eq!(ack["ok"], false);

    let u = user::find_by_id(&state.db.pool, 91).await.unwrap().unwrap();
    assert_eq!(u.balance, 0);
}

#[tokio::test]
async fn oxapay_callback_requires_the_path_secret() {
    let (state, _dir) = test_state().await;
    seed_payment(&state, 92, PaymentProvider::Oxapay, "track_92").await;
    let app = create_router(state.clone());

    let body = serde_json::json!({ "track_id": "track_92", "status": "paid", "amount": 5.0 });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/oxapay/wrong-secret")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let ack = ack_of(response).await;
    assert_eq!(ack["ok"], false);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/webhooks/oxapay/{CALLBACK_SECRET}"))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let ack = ack_of(response).await;
    assert_eq!(ack["ok"], true);

    // 5 USD at rate 90
    let u = user::find_by_id(&state.db.pool, 92).await.unwrap().unwrap();
    assert_eq!(u.balance, 450);
}

#[tokio::test]
async fn duplicate_webhook_deliveries_credit_once() {
    let (state, _dir) = test_state().await;
    seed_payment(&state, 93, PaymentProvider::Razorpay, "qr_dup").await;
    let app = create_router(state.clone());

    let body = serde_json::json!({
        "event": "qr_code.credited",
        "payload": {
            "qr_code": { "entity": { "id": "qr_dup" } },
            "payment": { "entity": { "amount": 10000 } }
        }
    })
    .to_string();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/razorpay")
                    .header("x-razorpay-signature", sign(body.as_bytes()))
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let ack = ack_of(response).await;
        assert_eq!(ack["ok"], true);
    }

    let u = user::find_by_id(&state.db.pool, 93).await.unwrap().unwrap();
    assert_eq!(u.balance, 100);
}
