use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::db::repository::payment::{self, NewPayment};
use crate::db::test_support::{open_temp_db, seed_user};
use crate::notify::test_support::RecordingNotifier;
use shared::models::PaymentProvider;

fn scheduler(db: &DbService) -> (Arc<ExpiryScheduler>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let s = Arc::new(ExpiryScheduler::new(
        db.clone(),
        notifier.clone(),
        Duration::from_millis(10),
        CancellationToken::new(),
    ));
    (s, notifier)
}

async fn pending_payment(db: &DbService, user_id: i64, ttl_ms: i64) -> i64 {
    payment::insert(
        &db.pool,
        NewPayment {
            user_id,
            provider: PaymentProvider::Razorpay,
            requested_credits: 100,
            provider_amount: 100.0,
            provider_ref: Some(format!("qr_{user_id}_{ttl_ms}")),
            pay_url: None,
            status: PaymentStatus::Pending,
            expires_at: Some(shared::util::now_millis() + ttl_ms),
        },
    )
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn pending_payment_expires_at_deadline() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 20, 0).await;
    let id = pending_payment(&db, 20, 60).await;
    let (sched, notifier) = scheduler(&db);

    sched.schedule(id, 20, shared::util::now_millis() + 60);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        payment::status_of(&db.pool, id).await.unwrap(),
        Some(PaymentStatus::Expired)
    );
    assert_eq!(notifier.user_message_count(), 1);
    assert_eq!(sched.active_timers(), 0);
}

#[tokio::test]
async fn approval_beats_the_timer() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 21, 0).await;
    let id = pending_payment(&db, 21, 80).await;
    let (sched, notifier) = scheduler(&db);

    sched.schedule(id, 21, shared::util::now_millis() + 80);
    assert!(payment::approve_if_open(&db.pool, id, None).await.unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The timer observed the terminal state and did nothing.
    assert_eq!(
        payment::status_of(&db.pool, id).await.unwrap(),
        Some(PaymentStatus::Approved)
    );
    assert_eq!(notifier.user_message_count(), 0);
}

#[tokio::test]
async fn cancelled_payment_stops_timer_silently() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 22, 0).await;
    let id = pending_payment(&db, 22, 5_000).await;
    let (sched, notifier) = scheduler(&db);

    sched.schedule(id, 22, shared::util::now_millis() + 5_000);
    assert!(payment::cancel_if_open(&db.pool, id).await.unwrap());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        payment::status_of(&db.pool, id).await.unwrap(),
        Some(PaymentStatus::Cancelled)
    );
    assert_eq!(notifier.user_message_count(), 0);
    assert_eq!(sched.active_timers(), 0);
}

#[tokio::test]
async fn restore_rearms_timers_for_pending_rows() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 23, 0).await;
    seed_user(&db, 24, 0).await;
    let a = pending_payment(&db, 23, 50).await;
    let b = pending_payment(&db, 24, 5_000).await;
    let (sched, _) = scheduler(&db);

    sched.restore().await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(
        payment::status_of(&db.pool, a).await.unwrap(),
        Some(PaymentStatus::Expired)
    );
    assert_eq!(
        payment::status_of(&db.pool, b).await.unwrap(),
        Some(PaymentStatus::Pending)
    );
}

#[tokio::test]
async fn sweep_expires_overdue_without_a_timer() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 25, 0).await;
    let id = pending_payment(&db, 25, -100).await;
    let (sched, notifier) = scheduler(&db);

    sched.sweep().await;

    assert_eq!(
        payment::status_of(&db.pool, id).await.unwrap(),
        Some(PaymentStatus::Expired)
    );
    assert_eq!(notifier.user_message_count(), 1);
}
