use std::sync::Arc;

use super::*;
use crate::db::repository::{discount, order, user};
use crate::db::test_support::{open_temp_db, seed_product, seed_stock, seed_user};
use crate::notify::test_support::RecordingNotifier;
use shared::models::StockStatus;

async fn service(db: &DbService) -> (PurchaseService, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    (
        PurchaseService::new(db.clone(), notifier.clone(), 3),
        notifier,
    )
}

#[tokio::test]
async fn discounted_purchase_debits_and_delivers() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 10, 100).await;
    let product_id = seed_product(&db, "Streaming Plus", 40).await;
    seed_stock(&db, product_id, 5).await;
    discount::replace_rules(&db.pool, product_id, &[(2, 10)])
        .await
        .unwrap();
    let (svc, _) = service(&db).await;

    let receipt = svc.purchase(10, product_id, 2).await.unwrap();

    // 2 x 40 at 10% off
    assert_eq!(receipt.total, 72);
    assert_eq!(receipt.quantity, 2);
    assert_eq!(receipt.delivered.len(), 2);

    let u = user::find_by_id(&db.pool, 10).await.unwrap().unwrap();
    assert_eq!(u.balance, 28);

    let o = order::find_by_id(&db.pool, receipt.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(o.quantity, 2);
    assert_eq!(o.total, 72);
    assert_eq!(o.delivered_payloads().len(), 2);

    let (sold,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM stock_item WHERE status = 'sold' AND buyer_id = 10")
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(sold, 2);
}

#[tokio::test]
async fn oldest_stock_sells_first() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 11, 1000).await;
    let product_id = seed_product(&db, "VPN", 10).await;
    let ids = seed_stock(&db, product_id, 3).await;
    let (svc, _) = service(&db).await;

    svc.purchase(11, product_id, 2).await.unwrap();

    let first = crate::db::repository::stock::find_by_id(&db.pool, ids[0])
        .await
        .unwrap()
        .unwrap();
    let last = crate::db::repository::stock::find_by_id(&db.pool, ids[2])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, StockStatus::Sold);
    assert_eq!(last.status, StockStatus::Available);
}

#[tokio::test]
async fn insufficient_balance_changes_nothing() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 12, 50).await;
    let product_id = seed_product(&db, "Music", 40).await;
    seed_stock(&db, product_id, 5).await;
    let (svc, _) = service(&db).await;

    let err = svc.purchase(12, product_id, 2).await.unwrap_err();
    assert!(matches!(
        err,
        PurchaseError::InsufficientBalance {
            balance: 50,
            required: 80
        }
    ));

    let u = user::find_by_id(&db.pool, 12).await.unwrap().unwrap();
    assert_eq!(u.balance, 50);
    let available = crate::db::repository::stock::count_available(&db.pool, product_id)
        .await
        .unwrap();
    assert_eq!(available, 5);
}

#[tokio::test]
async fn insufficient_stock_is_atomic() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 13, 1000).await;
    let product_id = seed_product(&db, "Cloud", 10).await;
    seed_stock(&db, product_id, 2).await;
    let (svc, _) = service(&db).await;

    let err = svc.purchase(13, product_id, 3).await.unwrap_err();
    assert!(matches!(
        err,
        PurchaseError::InsufficientStock { available: 2 }
    ));

    // Nothing flipped, nothing debited.
    let u = user::find_by_id(&db.pool, 13).await.unwrap().unwrap();
    assert_eq!(u.balance, 1000);
    let available = crate::db::repository::stock::count_available(&db.pool, product_id)
        .await
        .unwrap();
    assert_eq!(available, 2);
}

#[tokio::test]
async fn banned_user_is_denied() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 14, 1000).await;
    user::set_banned(&db.pool, 14, true).await.unwrap();
    let product_id = seed_product(&db, "Mail", 10).await;
    seed_stock(&db, product_id, 1).await;
    let (svc, _) = service(&db).await;

    assert!(matches!(
        svc.purchase(14, product_id, 1).await.unwrap_err(),
        PurchaseError::Banned
    ));
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 15, 100).await;
    let product_id = seed_product(&db, "Mail", 10).await;
    let (svc, _) = service(&db).await;

    assert!(matches!(
        svc.purchase(15, product_id, 0).await.unwrap_err(),
        PurchaseError::InvalidQuantity
    ));
}

#[tokio::test]
async fn low_stock_alert_fires_after_commit() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 16, 1000).await;
    let product_id = seed_product(&db, "Rare", 10).await;
    seed_stock(&db, product_id, 4).await;
    let (svc, notifier) = service(&db).await;

    svc.purchase(16, product_id, 1).await.unwrap();

    // 3 left == threshold
    assert_eq!(notifier.admin_message_count(), 1);
    let msg = notifier.admin_messages.lock().unwrap()[0].clone();
    assert!(msg.contains("Rare"));
}

/// Concurrent buyers can never oversell: with N units on the shelf the
/// successful quantity across all racers totals at most N.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchases_never_oversell() {
    let (db, _dir) = open_temp_db().await;
    let product_id = seed_product(&db, "Limited", 10).await;
    seed_stock(&db, product_id, 5).await;
    for uid in 100..110 {
        seed_user(&db, uid, 1000).await;
    }
    let (svc, _) = service(&db).await;

    let mut handles = Vec::new();
    for uid in 100..110 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            svc.purchase(uid, product_id, 1).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                assert_eq!(receipt.delivered.len(), 1);
                succeeded += 1;
            }
            Err(
                PurchaseError::InsufficientStock { .. }
                | PurchaseError::Conflict
                | PurchaseError::Store(_),
            ) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert!(succeeded <= 5, "oversold: {succeeded} sales for 5 units");

    let (sold,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stock_item WHERE status = 'sold'")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert!(sold <= 5);

    // Each sold unit has exactly one matching debit.
    let (debited,): (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(1000 - balance), 0) FROM user WHERE id BETWEEN 100 AND 109")
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(debited, sold * 10);
}
