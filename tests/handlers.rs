//! HTTP tests for the webhook and account endpoints

mod common;

use common::*;
use storefront::error::msg;

fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/stripe")
        .header("Content-Type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header(SIGNATURE_HEADER, sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

// ============ Webhooks ============

#[tokio::test]
async fn test_webhook_applies_checkout_completed() {
    let state = create_test_app_state();
    let order = {
        let conn = state.db.get().unwrap();
        create_test_order(&conn, "pi_123")
    };
    let app = test_app(state.clone());

    let body = checkout_completed_body("pi_123");
    let response = app
        .oneshot(webhook_request(&body, Some(&sign_body(&body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["received"], true);
    assert_eq!(json["outcome"], "applied");
    assert_eq!(json["order_id"], order.id.as_str());

    let conn = state.db.get().unwrap();
    let stored = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
}

#[tokio::test]
async fn test_webhook_applied_transition_is_audited() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        create_test_order(&conn, "pi_123");
    }

    let body = payment_intent_body("payment_intent.succeeded", "pi_123");
    let response = test_app(state.clone())
        .oneshot(webhook_request(&body, Some(&sign_body(&body))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let audit = state.audit.get().unwrap();
    assert_eq!(
        queries::count_audit_logs(&audit, AuditAction::ReconcileOrder.as_ref()).unwrap(),
        1
    );
}

#[tokio::test]
async fn test_webhook_unknown_order_is_acknowledged() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        create_test_order(&conn, "pi_123");
    }

    let body = payment_intent_body("payment_intent.succeeded", "pi_999");
    let response = test_app(state.clone())
        .oneshot(webhook_request(&body, Some(&sign_body(&body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["outcome"], "order_not_found");
    assert!(json.get("order_id").is_none());

    let conn = state.db.get().unwrap();
    let stored = queries::get_order_by_payment_intent(&conn, "pi_123")
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_webhook_unhandled_event_is_acknowledged() {
    let state = create_test_app_state();
    let body = r#"{"id":"evt_1","type":"customer.created","data":{"object":{}}}"#;

    let response = test_app(state)
        .oneshot(webhook_request(body, Some(&sign_body(body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["outcome"], "ignored");
}

#[tokio::test]
async fn test_webhook_missing_signature_returns_400() {
    let state = create_test_app_state();
    let body = payment_intent_body("payment_intent.succeeded", "pi_123");

    let response = test_app(state)
        .oneshot(webhook_request(&body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], msg::MISSING_SIGNATURE);
}

#[tokio::test]
async fn test_webhook_bad_signature_returns_400_without_writing() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        create_test_order(&conn, "pi_123");
    }

    let body = payment_intent_body("payment_intent.succeeded", "pi_123");
    let forged = WebhookVerifier::new("whsec_attacker")
        .sign(body.as_bytes(), now())
        .unwrap();

    let response = test_app(state.clone())
        .oneshot(webhook_request(&body, Some(&forged)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], msg::INVALID_SIGNATURE);

    let conn = state.db.get().unwrap();
    let stored = queries::get_order_by_payment_intent(&conn, "pi_123")
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_webhook_authentic_garbage_returns_400() {
    let state = create_test_app_state();
    let body = "{\"type\": 42}";

    let response = test_app(state)
        .oneshot(webhook_request(body, Some(&sign_body(body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], msg::INVALID_PAYLOAD);
}

#[tokio::test]
async fn test_webhook_without_secret_returns_500() {
    let state = create_test_app_state_with(TestStateOptions {
        webhook_secret: None,
        ..Default::default()
    });
    let body = payment_intent_body("payment_intent.succeeded", "pi_123");

    let response = test_app(state)
        .oneshot(webhook_request(&body, Some(&sign_body(&body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_webhook_storage_failure_returns_500_for_retry() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        conn.execute_batch("DROP TABLE orders").unwrap();
    }

    let body = payment_intent_body("payment_intent.succeeded", "pi_123");
    let response = test_app(state)
        .oneshot(webhook_request(&body, Some(&sign_body(&body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], msg::PERSISTENCE_FAILED);
    assert!(
        !json.to_string().contains("orders"),
        "storage details must not leak to the sender"
    );
}

#[tokio::test]
async fn test_webhook_redelivery_reports_unchanged() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        create_test_order(&conn, "pi_123");
    }
    let body = payment_intent_body("payment_intent.succeeded", "pi_123");
    let sig = sign_body(&body);

    let first = test_app(state.clone())
        .oneshot(webhook_request(&body, Some(&sig)))
        .await
        .unwrap();
    let second = test_app(state.clone())
        .oneshot(webhook_request(&body, Some(&sig)))
        .await
        .unwrap();

    assert_eq!(body_json(first).await["outcome"], "applied");
    assert_eq!(body_json(second).await["outcome"], "unchanged");

    let audit = state.audit.get().unwrap();
    assert_eq!(
        queries::count_audit_logs(&audit, AuditAction::ReconcileOrder.as_ref()).unwrap(),
        1,
        "only the applied transition is audited"
    );
}

// ============ Account ============

#[tokio::test]
async fn test_access_requires_session() {
    let state = create_test_app_state();

    let response = test_app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/me/access")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_rejects_foreign_token() {
    let state = create_test_app_state();
    let token = SessionVerifier::new("some-other-secret-entirely", None)
        .issue("u1", None, 3600)
        .unwrap();

    let response = test_app(state)
        .oneshot(authed_get("/me/access", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_first_user_access_bootstraps_admin() {
    let state = create_test_app_state();
    let token = session_token("first-user", Some("first@example.com"));

    let response = test_app(state.clone())
        .oneshot(authed_get("/me/access", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user_id"], "first-user");
    assert_eq!(json["role"], "admin");
    assert_eq!(json["source"], "bootstrap");
    assert_eq!(json["capabilities"]["manage_users"], true);

    let audit = state.audit.get().unwrap();
    assert_eq!(
        queries::count_audit_logs(&audit, AuditAction::BootstrapAdmin.as_ref()).unwrap(),
        1
    );

    // A second user gets the default role
    let token = session_token("second-user", None);
    let response = test_app(state)
        .oneshot(authed_get("/me/access", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["role"], "user");
    assert_eq!(json["source"], "default");
}

#[tokio::test]
async fn test_my_orders_lists_only_callers_orders() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        create_test_order(&conn, "pi_mine");
        queries::create_order(
            &conn,
            &CreateOrder {
                user_id: Some("someone-else".to_string()),
                stripe_payment_intent_id: Some("pi_theirs".to_string()),
                quantity: 1,
                ..Default::default()
            },
        )
        .unwrap();
    }

    let token = session_token("user-1", None);
    let response = test_app(state)
        .oneshot(authed_get("/me/orders", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let orders = json.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["stripe_payment_intent_id"], "pi_mine");
    assert_eq!(orders[0]["status"], "pending");
}

#[tokio::test]
async fn test_checkout_rejects_bad_quantity() {
    let state = create_test_app_state();
    let token = session_token("user-1", None);

    let response = test_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"price_id":"price_1","quantity":0}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_without_stripe_key_creates_no_order() {
    let state = create_test_app_state();
    let token = session_token("user-1", None);

    let response = test_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"price_id":"price_1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let conn = state.db.get().unwrap();
    assert!(queries::list_orders_for_user(&conn, "user-1").unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_provider_failure_leaves_no_order() {
    let state = create_test_app_state_with(TestStateOptions {
        stripe_secret_key: Some("sk_test_x"),
        // Nothing listens here: the session request fails to connect
        stripe_api_base: "http://127.0.0.1:9/v1",
        ..Default::default()
    });
    let token = session_token("user-1", None);

    let response = test_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"price_id":"price_1","quantity":2}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let conn = state.db.get().unwrap();
    assert!(
        queries::list_orders_for_user(&conn, "user-1").unwrap().is_empty(),
        "failed checkout must not leave a pending order behind"
    );
}

#[tokio::test]
async fn test_health() {
    let state = create_test_app_state();

    let response = test_app(state)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}
