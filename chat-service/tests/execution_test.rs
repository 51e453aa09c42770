//! Execution listing, retrieval and deletion.

mod common;

use common::spawn_app;
use uuid::Uuid;

const FREE_MODEL: &str = "google/gemini-2.5-flash";

#[tokio::test]
async fn listing_starts_empty() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("fresh@example.com", 5, false).await;

    let response = app
        .client
        .get(format!("{}/execution", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid JSON");
    assert_eq!(body["executions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn listing_orders_by_most_recent_activity() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("ordering@example.com", 10, false).await;
    let first = Uuid::new_v4().to_string();
    let second = Uuid::new_v4().to_string();

    app.chat(&token, FREE_MODEL, &first, "older conversation")
        .await;
    app.chat(&token, FREE_MODEL, &second, "newer conversation")
        .await;

    let body: serde_json::Value = app
        .client
        .get(format!("{}/execution", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let executions = body["executions"].as_array().unwrap();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0]["executionId"], second.as_str());
    assert_eq!(executions[1]["executionId"], first.as_str());

    // A new turn in the older conversation moves it back to the top.
    app.chat(&token, FREE_MODEL, &first, "follow-up").await;

    let body: serde_json::Value = app
        .client
        .get(format!("{}/execution", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let executions = body["executions"].as_array().unwrap();
    assert_eq!(executions[0]["executionId"], first.as_str());
}

#[tokio::test]
async fn listing_carries_type_and_title() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("shape@example.com", 5, false).await;
    let conversation_id = Uuid::new_v4().to_string();

    app.chat(&token, FREE_MODEL, &conversation_id, "what is rust")
        .await;

    let body: serde_json::Value = app
        .client
        .get(format!("{}/execution", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let execution = &body["executions"][0];
    assert_eq!(execution["type"], "CONVERSATION");
    assert_eq!(execution["title"], "what is rust");
    assert!(execution["createdAt"].is_string());
    assert!(execution["updatedAt"].is_string());
}

#[tokio::test]
async fn type_filter_narrows_the_listing() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("filter@example.com", 5, false).await;

    app.chat(&token, FREE_MODEL, &Uuid::new_v4().to_string(), "hi")
        .await;

    let body: serde_json::Value = app
        .client
        .get(format!("{}/execution?type=CONVERSATION", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["executions"].as_array().unwrap().len(), 1);

    let body: serde_json::Value = app
        .client
        .get(format!("{}/execution?type=APP_INVOCATION", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["executions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_type_filter_is_a_bad_request() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("badfilter@example.com", 5, false).await;

    let response = app
        .client
        .get(format!("{}/execution?type=BOGUS", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn listing_is_read_only() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("idempotent@example.com", 5, false).await;

    app.chat(&token, FREE_MODEL, &Uuid::new_v4().to_string(), "hi")
        .await;

    let mut snapshots = Vec::new();
    for _ in 0..3 {
        let body: serde_json::Value = app
            .client
            .get(format!("{}/execution", app.address))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        snapshots.push(body);
    }

    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);
}

#[tokio::test]
async fn users_only_see_their_own_executions() {
    let app = spawn_app().await;
    let (_, alice_token) = app.create_user("alice@example.com", 5, false).await;
    let (_, bob_token) = app.create_user("bob@example.com", 5, false).await;

    app.chat(&alice_token, FREE_MODEL, &Uuid::new_v4().to_string(), "hi")
        .await;

    let body: serde_json::Value = app
        .client
        .get(format!("{}/execution", app.address))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["executions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn fetching_a_foreign_conversation_is_forbidden() {
    let app = spawn_app().await;
    let (_, owner_token) = app.create_user("carol@example.com", 5, false).await;
    let (_, other_token) = app.create_user("dave@example.com", 5, false).await;
    let conversation_id = Uuid::new_v4().to_string();

    app.chat(&owner_token, FREE_MODEL, &conversation_id, "secret")
        .await;

    let response = app
        .client
        .get(format!("{}/ai/conversations/{}", app.address, conversation_id))
        .bearer_auth(&other_token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn fetching_a_missing_conversation_is_not_found() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("missing@example.com", 5, false).await;

    let response = app
        .client
        .get(format!(
            "{}/ai/conversations/{}",
            app.address,
            Uuid::new_v4()
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn deleting_a_conversation_removes_it_and_its_messages() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("deleter@example.com", 5, false).await;
    let conversation_id = Uuid::new_v4().to_string();

    app.chat(&token, FREE_MODEL, &conversation_id, "delete me")
        .await;

    let response = app
        .client
        .delete(format!("{}/ai/chat/{}", app.address, conversation_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 204);

    let response = app
        .client
        .get(format!("{}/ai/conversations/{}", app.address, conversation_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    // Messages go with the execution.
    let messages = app.db.list_messages(&conversation_id).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn deleting_a_foreign_conversation_is_forbidden() {
    let app = spawn_app().await;
    let (_, owner_token) = app.create_user("keeper@example.com", 5, false).await;
    let (_, other_token) = app.create_user("vandal@example.com", 5, false).await;
    let conversation_id = Uuid::new_v4().to_string();

    app.chat(&owner_token, FREE_MODEL, &conversation_id, "keep me")
        .await;

    let response = app
        .client
        .delete(format!("{}/ai/chat/{}", app.address, conversation_id))
        .bearer_auth(&other_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 403);

    let messages = app.db.list_messages(&conversation_id).await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn deleting_a_missing_conversation_is_not_found() {
    let app = spawn_app().await;
    let (_, token) = app.create_user("ghost@example.com", 5, false).await;

    let response = app
        .client
        .delete(format!("{}/ai/chat/{}", app.address, Uuid::new_v4()))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 404);
}
