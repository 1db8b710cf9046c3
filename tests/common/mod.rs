//! Test utilities and fixtures for storefront integration tests

#![allow(dead_code)]

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;

pub use axum::body::Body;
pub use axum::http::{Request, StatusCode};
pub use tower::ServiceExt;

pub use storefront::access::AccessResolver;
pub use storefront::config::StripeConfig;
pub use storefront::db::{AppState, DbPool, init_audit_db, init_db, queries};
pub use storefront::email::OrderEmailService;
pub use storefront::handlers;
pub use storefront::jwt::{Identity, SessionVerifier};
pub use storefront::models::*;
pub use storefront::payments::{SIGNATURE_HEADER, WebhookEvent, WebhookVerifier};

pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const SESSION_SECRET: &str = "test-session-secret-with-enough-bytes";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Single-connection in-memory pool. Each in-memory connection is its own
/// database, so the pool must never open a second one.
pub fn memory_pool(init: fn(&Connection) -> rusqlite::Result<()>) -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_secs(5))
        .build(manager)
        .unwrap();
    {
        let conn = pool.get().unwrap();
        init(&conn).unwrap();
    }
    pool
}

/// File-backed pool in the temp dir, for tests that need several
/// connections to the same database. Remove with [`remove_db_file`].
pub fn temp_file_pool() -> (DbPool, String) {
    let path = std::env::temp_dir()
        .join(format!("storefront-test-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    let pool = storefront::db::create_pool(&path).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    (pool, path)
}

pub fn remove_db_file(path: &str) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(format!("{}-wal", path));
    let _ = std::fs::remove_file(format!("{}-shm", path));
}

pub struct TestStateOptions {
    pub webhook_secret: Option<&'static str>,
    pub stripe_secret_key: Option<&'static str>,
    pub stripe_api_base: &'static str,
    pub operator_emails: Vec<String>,
    pub audit_log_enabled: bool,
}

impl Default for TestStateOptions {
    fn default() -> Self {
        Self {
            webhook_secret: Some(WEBHOOK_SECRET),
            stripe_secret_key: None,
            stripe_api_base: storefront::config::DEFAULT_STRIPE_API_BASE,
            operator_emails: vec![],
            audit_log_enabled: true,
        }
    }
}

/// Create an AppState for testing with in-memory databases
pub fn create_test_app_state() -> AppState {
    create_test_app_state_with(TestStateOptions::default())
}

pub fn create_test_app_state_with(opts: TestStateOptions) -> AppState {
    let http_client = reqwest::Client::new();

    AppState {
        db: memory_pool(init_db),
        audit: memory_pool(init_audit_db),
        audit_log_enabled: opts.audit_log_enabled,
        stripe: StripeConfig {
            secret_key: opts.stripe_secret_key.map(String::from),
            webhook_secret: opts.webhook_secret.map(String::from),
            api_base: opts.stripe_api_base.to_string(),
        },
        checkout_success_url: "http://localhost:3000/success".to_string(),
        checkout_cancel_url: "http://localhost:3000/cancel".to_string(),
        sessions: Arc::new(SessionVerifier::new(SESSION_SECRET, None)),
        access: Arc::new(AccessResolver::new(opts.operator_emails, Duration::ZERO)),
        // No API key: confirmation emails are disabled
        email_service: Arc::new(OrderEmailService::new(
            http_client.clone(),
            None,
            "orders@example.com".to_string(),
        )),
        http_client,
    }
}

/// Full router without rate limiting (oneshot requests carry no peer address)
pub fn test_app(state: AppState) -> Router {
    handlers::router(state.clone(), 0).with_state(state)
}

/// Create a pending order bound to a payment intent
pub fn create_test_order(conn: &Connection, payment_intent_id: &str) -> Order {
    queries::create_order(
        conn,
        &CreateOrder {
            user_id: Some("user-1".to_string()),
            customer_email: Some("buyer@example.com".to_string()),
            price_id: Some("price_test".to_string()),
            quantity: 1,
            stripe_payment_intent_id: Some(payment_intent_id.to_string()),
        },
    )
    .expect("Failed to create test order")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Signature header for `body` signed now with the test secret
pub fn sign_body(body: &str) -> String {
    WebhookVerifier::new(WEBHOOK_SECRET)
        .sign(body.as_bytes(), now())
        .unwrap()
}

pub fn checkout_completed_body(payment_intent_id: &str) -> String {
    serde_json::json!({
        "id": "evt_checkout",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "payment_intent": payment_intent_id,
            "customer_details": { "email": "buyer@example.com" }
        }}
    })
    .to_string()
}

pub fn payment_intent_body(kind: &str, payment_intent_id: &str) -> String {
    serde_json::json!({
        "id": "evt_pi",
        "type": kind,
        "data": { "object": { "id": payment_intent_id } }
    })
    .to_string()
}

pub fn session_token(user_id: &str, email: Option<&str>) -> String {
    SessionVerifier::new(SESSION_SECRET, None)
        .issue(user_id, email, 3600)
        .unwrap()
}

pub fn identity(user_id: &str, email: Option<&str>) -> Identity {
    Identity {
        user_id: user_id.to_string(),
        email: email.map(String::from),
    }
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
