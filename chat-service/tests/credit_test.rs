//! Credit ledger behavior: balances, debits, refunds, the premium pass and
//! the billing webhook.

mod common;

use chat_service::services::CreditLedger;
use common::spawn_app;
use service_core::error::AppError;
use service_core::utils::signature::generate_signature;
use uuid::Uuid;

const FREE_MODEL: &str = "google/gemini-2.5-flash";

#[tokio::test]
async fn credits_endpoint_returns_balance_and_plan() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("credits@example.com", 7, false).await;

    let response = app
        .client
        .get(format!("{}/ai/credits", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid JSON");
    assert_eq!(body["credits"], 7);
    assert_eq!(body["isPremium"], false);
}

#[tokio::test]
async fn completed_turn_debits_one_credit() {
    let app = spawn_app().await;
    let (user, token) = app.create_user("debit@example.com", 5, false).await;

    let events = app
        .chat(&token, FREE_MODEL, &Uuid::new_v4().to_string(), "hello")
        .await;

    assert_eq!(events.last().unwrap()["done"], true);
    assert_eq!(app.balance(&user.user_id).await, 4);
}

#[tokio::test]
async fn broke_user_gets_payment_required_before_any_stream() {
    let app = spawn_app().await;
    let (user, token) = app.create_user("broke@example.com", 0, false).await;

    let response = app
        .client
        .post(format!("{}/ai/chat", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "message": "hello",
            "model": FREE_MODEL,
            "conversationId": Uuid::new_v4().to_string(),
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 402);
    assert_eq!(app.balance(&user.user_id).await, 0);

    // Nothing was persisted for the rejected turn.
    let executions = app
        .db
        .list_executions(&user.user_id, None)
        .await
        .expect("Failed to list executions");
    assert!(executions.is_empty());
}

#[tokio::test]
async fn five_credits_buy_exactly_five_turns() {
    let app = spawn_app().await;
    let (user, token) = app.create_user("fiveturns@example.com", 5, false).await;

    for i in 0..5 {
        let events = app
            .chat(
                &token,
                FREE_MODEL,
                &Uuid::new_v4().to_string(),
                &format!("turn {}", i),
            )
            .await;
        assert_eq!(events.last().unwrap()["done"], true);
    }
    assert_eq!(app.balance(&user.user_id).await, 0);

    let response = app
        .client
        .post(format!("{}/ai/chat", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "message": "one more",
            "model": FREE_MODEL,
            "conversationId": Uuid::new_v4().to_string(),
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 402);
}

#[tokio::test]
async fn premium_user_is_never_debited() {
    let app = spawn_app().await;
    let (user, token) = app.create_user("premium@example.com", 3, true).await;

    let events = app
        .chat(&token, FREE_MODEL, &Uuid::new_v4().to_string(), "hello")
        .await;

    assert_eq!(events.last().unwrap()["done"], true);
    assert_eq!(app.balance(&user.user_id).await, 3);
}

#[tokio::test]
async fn premium_user_with_zero_credits_can_still_chat() {
    let app = spawn_app().await;
    let (user, token) = app.create_user("premium-zero@example.com", 0, true).await;

    let events = app
        .chat(&token, FREE_MODEL, &Uuid::new_v4().to_string(), "hello")
        .await;

    assert_eq!(events.last().unwrap()["done"], true);
    assert_eq!(app.balance(&user.user_id).await, 0);
}

#[tokio::test]
async fn concurrent_reservations_cannot_double_spend() {
    let app = spawn_app().await;
    let (user, _) = app.create_user("race@example.com", 1, false).await;

    let ledger = CreditLedger::new(app.db.clone());
    let (a, b) = tokio::join!(
        ledger.check_and_reserve(&user.user_id, 1),
        ledger.check_and_reserve(&user.user_id, 1),
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one reservation must win");

    let loser = if a.is_err() { a } else { b };
    assert!(matches!(loser, Err(AppError::PaymentRequired(_))));

    assert_eq!(app.balance(&user.user_id).await, 0);
}

#[tokio::test]
async fn refund_restores_the_reserved_amount() {
    let app = spawn_app().await;
    let (user, _) = app.create_user("refund@example.com", 2, false).await;

    let ledger = CreditLedger::new(app.db.clone());
    let reservation = ledger
        .check_and_reserve(&user.user_id, 1)
        .await
        .expect("reservation should succeed");
    assert_eq!(app.balance(&user.user_id).await, 1);

    ledger.refund(reservation).await.expect("refund failed");
    assert_eq!(app.balance(&user.user_id).await, 2);
}

#[tokio::test]
async fn webhook_grants_premium_and_credits() {
    let app = spawn_app().await;
    let (user, _) = app.create_user("upgrade@example.com", 1, false).await;

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "userId": user.user_id, "credits": 100 }
    })
    .to_string();
    let signature = generate_signature("test-webhook-secret", &body).unwrap();

    let response = app
        .client
        .post(format!("{}/billing/webhook", app.address))
        .header("x-webhook-signature", signature)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);

    let updated = app
        .db
        .find_user(&user.user_id)
        .await
        .unwrap()
        .expect("user should exist");
    assert!(updated.is_premium);
    assert_eq!(updated.credits, 101);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = spawn_app().await;
    let (user, _) = app.create_user("tampered@example.com", 1, false).await;

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "userId": user.user_id, "credits": 100 }
    })
    .to_string();

    let response = app
        .client
        .post(format!("{}/billing/webhook", app.address))
        .header("x-webhook-signature", "deadbeef")
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 401);

    let untouched = app.db.find_user(&user.user_id).await.unwrap().unwrap();
    assert!(!untouched.is_premium);
    assert_eq!(untouched.credits, 1);
}

#[tokio::test]
async fn webhook_ignores_unhandled_events() {
    let app = spawn_app().await;
    let (user, _) = app.create_user("noop@example.com", 1, false).await;

    let body = serde_json::json!({
        "event": "payment.refunded",
        "payload": { "userId": user.user_id, "credits": 100 }
    })
    .to_string();
    let signature = generate_signature("test-webhook-secret", &body).unwrap();

    let response = app
        .client
        .post(format!("{}/billing/webhook", app.address))
        .header("x-webhook-signature", signature)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);

    let untouched = app.db.find_user(&user.user_id).await.unwrap().unwrap();
    assert!(!untouched.is_premium);
    assert_eq!(untouched.credits, 1);
}
