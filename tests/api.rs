mod utils;

use serde_json::{Value, json};
use utils::TENANT;

#[tokio::test]
async fn test_missing_tenant_header_is_bad_request() {
    let app = utils::spawn_app().await;

    let response = app
        .client
        .get(format!("{}/webhooks", app.addr))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_invalid_subscription_is_rejected() {
    let app = utils::spawn_app().await;

    let response = app
        .post(
            "/webhooks",
            TENANT,
            json!({"endpoint": "ftp://example.com", "event_types": ["a.b"]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .post(
            "/webhooks",
            TENANT,
            json!({"endpoint": "https://example.com/hook", "event_types": []}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_secret_only_returned_at_creation() {
    let app = utils::spawn_app().await;
    let created = app
        .create_webhook(TENANT, "https://example.com/hook", &["a.b"])
        .await;
    let webhook_id = created["webhook_id"].as_str().unwrap();
    assert!(created["secret"].as_str().unwrap().starts_with("whsec_"));

    let fetched: Value = app
        .get(&format!("/webhooks/{webhook_id}"), TENANT)
        .await
        .json()
        .await
        .unwrap();
    assert!(fetched.get("secret").is_none());
    assert_eq!(fetched["status"], "enabled");

    let listed: Value = app.get("/webhooks", TENANT).await.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert!(listed[0].get("secret").is_none());

    // Reveal is off by default
    let response = app
        .get(&format!("/webhooks/{webhook_id}/secret"), TENANT)
        .await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn test_reveal_when_enabled() {
    let app = utils::spawn_app_with(|config| config.secrets.allow_reveal = true).await;
    let created = app
        .create_webhook(TENANT, "https://example.com/hook", &["a.b"])
        .await;
    let webhook_id = created["webhook_id"].as_str().unwrap();

    let response = app
        .get(&format!("/webhooks/{webhook_id}/secret"), TENANT)
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let revealed: Value = response.json().await.unwrap();
    assert_eq!(revealed["secret"], created["secret"]);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let app = utils::spawn_app().await;
    let created = app
        .create_webhook(TENANT, "https://example.com/hook", &["a.b"])
        .await;
    let webhook_id = created["webhook_id"].as_str().unwrap();

    let response = app.get(&format!("/webhooks/{webhook_id}"), "tenant-2").await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .get(&format!("/webhooks/{webhook_id}/events"), "tenant-2")
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let result: Value = app
        .post("/events", "tenant-2", json!({"event_type": "a.b", "data": {}}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["enqueued"], 0);
}

#[tokio::test]
async fn test_update_and_delete_webhook() {
    let app = utils::spawn_app().await;
    let created = app
        .create_webhook(TENANT, "https://example.com/hook", &["a.b"])
        .await;
    let webhook_id = created["webhook_id"].as_str().unwrap();

    let response = app
        .client
        .patch(format!("{}/webhooks/{webhook_id}", app.addr))
        .header("x-tenant-id", TENANT)
        .header("x-actor-id", "admin")
        .json(&json!({"status": "disabled"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["status"], "disabled");
    assert_eq!(updated["updated_by"], "admin");

    // Disabled subscriptions no longer match
    let result: Value = app
        .post("/events", TENANT, json!({"event_type": "a.b", "data": {}}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["enqueued"], 0);

    let response = app
        .client
        .delete(format!("{}/webhooks/{webhook_id}", app.addr))
        .header("x-tenant-id", TENANT)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = app.get(&format!("/webhooks/{webhook_id}"), TENANT).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_event_listing_validates_paging() {
    let app = utils::spawn_app().await;
    let created = app
        .create_webhook(TENANT, "https://example.com/hook", &["a.b"])
        .await;
    let webhook_id = created["webhook_id"].as_str().unwrap();

    let page: Value = app
        .get(&format!("/webhooks/{webhook_id}/events"), TENANT)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page, json!({"data": [], "cursor": null}));

    let response = app
        .get(&format!("/webhooks/{webhook_id}/events?limit=0"), TENANT)
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .get(&format!("/webhooks/{webhook_id}/events?cursor=garbage"), TENANT)
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .get(&format!("/webhooks/{webhook_id}/events/missing"), TENANT)
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_rotate_unknown_webhook_is_not_found() {
    let app = utils::spawn_app().await;

    let response = app
        .post("/webhooks/nope/secret/rotate", TENANT, json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_creator_comes_from_actor_header() {
    let app = utils::spawn_app().await;

    let response = app
        .client
        .post(format!("{}/webhooks", app.addr))
        .header("x-tenant-id", TENANT)
        .header("x-actor-id", "admin")
        .json(&json!({
            "endpoint": "https://example.com/hook",
            "event_types": ["a.b"],
            "created_by": "mallory",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["created_by"], "admin");
}
