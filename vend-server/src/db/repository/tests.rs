use super::*;
use crate::db::test_support::{open_temp_db, seed_product, seed_user};
use shared::models::{FlowState, PaymentProvider, PaymentStatus};

#[tokio::test]
async fn upsert_registers_once_and_refreshes_profile() {
    let (db, _dir) = open_temp_db().await;

    let u = user::upsert(&db.pool, 1, Some("alice"), Some("Alice"))
        .await
        .unwrap();
    assert_eq!(u.balance, 0);
    assert!(!u.banned);

    // Second contact keeps the wallet, updates the profile.
    user::credit_balance(&db.pool, 1, 50).await.unwrap();
    let u = user::upsert(&db.pool, 1, Some("alice_renamed"), Some("Alice"))
        .await
        .unwrap();
    assert_eq!(u.balance, 50);
    assert_eq!(u.username.as_deref(), Some("alice_renamed"));
}

#[tokio::test]
async fn banning_and_balance_adjustment() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 2, 40).await;

    user::set_banned(&db.pool, 2, true).await.unwrap();
    let u = user::find_by_id(&db.pool, 2).await.unwrap().unwrap();
    assert!(u.banned);

    assert!(user::adjust_balance(&db.pool, 2, -40).await.unwrap());
    assert!(!user::adjust_balance(&db.pool, 2, -1).await.unwrap());
    let u = user::find_by_id(&db.pool, 2).await.unwrap().unwrap();
    assert_eq!(u.balance, 0);
}

#[tokio::test]
async fn flow_state_round_trips_through_the_user_row() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 3, 0).await;

    let state = FlowState::AwaitingAmount {
        provider: PaymentProvider::Oxapay,
    };
    user::set_flow(&db.pool, 3, Some(&state)).await.unwrap();
    let u = user::find_by_id(&db.pool, 3).await.unwrap().unwrap();
    assert_eq!(u.flow(), Some(state));

    user::set_flow(&db.pool, 3, None).await.unwrap();
    let u = user::find_by_id(&db.pool, 3).await.unwrap().unwrap();
    assert_eq!(u.flow(), None);
}

#[tokio::test]
async fn product_lifecycle_edits() {
    let (db, _dir) = open_temp_db().await;
    let id = seed_product(&db, "Mail Basic", 20).await;

    product::rename(&db.pool, id, "Mail Plus").await.unwrap();
    product::set_price(&db.pool, id, 35).await.unwrap();
    product::set_enabled(&db.pool, id, false).await.unwrap();

    let p = product::find_by_id(&db.pool, id).await.unwrap().unwrap();
    assert_eq!(p.name, "Mail Plus");
    assert_eq!(p.unit_price, 35);
    assert!(!p.enabled);

    assert!(matches!(
        product::rename(&db.pool, 424242, "x").await.unwrap_err(),
        RepoError::NotFound(_)
    ));
}

#[tokio::test]
async fn order_history_is_newest_first() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 4, 0).await;
    let product_id = seed_product(&db, "VPN", 10).await;
    for n in 0..3i64 {
        sqlx::query(
            "INSERT INTO orders (id, user_id, product_id, product_name, quantity, total, delivered, created_at) \
             VALUES (?1, ?2, ?3, 'VPN', 1, 10, '[]', ?4)",
        )
        .bind(shared::util::snowflake_id())
        .bind(4i64)
        .bind(product_id)
        .bind(shared::util::now_millis() + n)
        .execute(&db.pool)
        .await
        .unwrap();
    }

    let orders = order::find_by_user(&db.pool, 4).await.unwrap();
    assert_eq!(orders.len(), 3);
    assert!(orders[0].created_at >= orders[2].created_at);
}

#[tokio::test]
async fn provider_reference_is_unique_per_provider() {
    let (db, _dir) = open_temp_db().await;
    seed_user(&db, 5, 0).await;

    let new = |r: &str| payment::NewPayment {
        user_id: 5,
        provider: PaymentProvider::Razorpay,
        requested_credits: 10,
        provider_amount: 10.0,
        provider_ref: Some(r.to_string()),
        pay_url: None,
        status: PaymentStatus::Pending,
        expires_at: None,
    };

    payment::insert(&db.pool, new("qr_unique")).await.unwrap();
    assert!(matches!(
        payment::insert(&db.pool, new("qr_unique")).await.unwrap_err(),
        RepoError::Duplicate(_)
    ));
}

#[tokio::test]
async fn audit_entries_are_recorded() {
    let (db, _dir) = open_temp_db().await;
    audit::record(
        &db.pool,
        audit::SYSTEM_ACTOR,
        "test_action",
        serde_json::json!({ "k": 1 }),
    )
    .await
    .unwrap();

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM audit_log WHERE action = 'test_action'")
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}
