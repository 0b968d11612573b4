use std::sync::Arc;

use super::*;
use crate::db::repository::payment::NewPayment;
use crate::db::test_support::{open_temp_db, seed_user};
use crate::notify::test_support::RecordingNotifier;
use shared::models::PaymentProvider;

const ADMIN: i64 = 900;

fn service(db: &DbService) -> (ReviewService, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    (ReviewService::new(db.clone(), notifier.clone()), notifier)
}

async fn manual_payment(db: &DbService, user_id: i64, credits: i64) -> i64 {
    payment::insert(
        &db.pool,
        NewPayment {
            user_id,
            provider: PaymentProvider::Manual,
            requested_credits: credits,
            provider_amount: credits as f64,
            provider_ref: None,
            pay_url: None,
            status: PaymentStatus::AwaitingProof,
            expires_at: None,
        },
    )
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn proof_then_approve_credits_the_request() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 60, 10).await;
    let id = manual_payment(&db, 60, 200).await;
    assert!(payment::submit_proof(&db.pool, id, "photo_1").await.unwrap());
    let (svc, notifier) = service(&db);

    let credited = svc.approve(id, ADMIN).await.unwrap();
    assert_eq!(credited, 200);

    let u = user::find_by_id(&db.pool, 60).await.unwrap().unwrap();
    assert_eq!(u.balance, 210);
    assert_eq!(notifier.user_message_count(), 1);

    let p = payment::find_by_id(&db.pool, id).await.unwrap().unwrap();
    assert_eq!(p.status, PaymentStatus::Approved);
    assert_eq!(p.reviewed_by, Some(ADMIN));
    assert_eq!(p.proof_ref.as_deref(), Some("photo_1"));
}

#[tokio::test]
async fn double_approve_credits_once() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 61, 0).await;
    let id = manual_payment(&db, 61, 100).await;
    assert!(payment::submit_proof(&db.pool, id, "photo").await.unwrap());
    let (svc, _) = service(&db);

    svc.approve(id, ADMIN).await.unwrap();
    assert!(matches!(
        svc.approve(id, ADMIN).await.unwrap_err(),
        ReviewError::AlreadyProcessed(PaymentStatus::Approved)
    ));

    let u = user::find_by_id(&db.pool, 61).await.unwrap().unwrap();
    assert_eq!(u.balance, 100);
}

#[tokio::test]
async fn reject_leaves_the_wallet_alone() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 62, 0).await;
    let id = manual_payment(&db, 62, 100).await;
    assert!(payment::submit_proof(&db.pool, id, "photo").await.unwrap());
    let (svc, notifier) = service(&db);

    svc.reject(id, ADMIN).await.unwrap();

    let u = user::find_by_id(&db.pool, 62).await.unwrap().unwrap();
    assert_eq!(u.balance, 0);
    assert_eq!(
        payment::status_of(&db.pool, id).await.unwrap(),
        Some(PaymentStatus::Rejected)
    );
    assert_eq!(notifier.user_message_count(), 1);

    // Rejecting again, or approving afterwards, reports the state.
    assert!(matches!(
        svc.reject(id, ADMIN).await.unwrap_err(),
        ReviewError::AlreadyProcessed(PaymentStatus::Rejected)
    ));
    assert!(matches!(
        svc.approve(id, ADMIN).await.unwrap_err(),
        ReviewError::AlreadyProcessed(PaymentStatus::Rejected)
    ));
}

#[tokio::test]
async fn unknown_payment_is_not_found() {
    let (db, _dir) = open_temp_db().await;
    let (svc, _) = service(&db);
    assert!(matches!(
        svc.approve(424242, ADMIN).await.unwrap_err(),
        ReviewError::NotFound
    ));
}
