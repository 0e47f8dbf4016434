//! Test utilities and fixtures for signal-billing integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub use signal_billing::config::{
    Config, GatewayFallback, RateLimitConfig, RazorpaySettings, StripeSettings,
};
pub use signal_billing::crypto::hmac_sha256_hex;
pub use signal_billing::db::{AppState, create_pool, init_db, queries};
pub use signal_billing::handlers;
pub use signal_billing::jwt::TokenKeys;
pub use signal_billing::models::User;
pub use signal_billing::store::{KeyValueStore, MemoryStore};

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const RAZORPAY_KEY_SECRET: &str = "rzp_key_secret";
pub const RAZORPAY_WEBHOOK_SECRET: &str = "rzp_webhook_secret";
pub const TEST_PASSWORD: &str = "hunter2hunter2";

/// Config with both gateways configured against `stripe_base` / `razorpay_base`
/// and rate limits high enough not to interfere.
pub fn test_config(stripe_base: &str, razorpay_base: &str) -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        dev_mode: true,
        database_path: String::new(),
        redis_url: None,
        store_timeout: Duration::from_secs(1),
        jwt_secret: Some("test-jwt-secret".into()),
        access_token_ttl: Duration::from_secs(30 * 60),
        frontend_url: "http://localhost:5173".into(),
        default_gateway: "stripe".into(),
        gateway_fallback: GatewayFallback::Reject,
        gateway_http_timeout: Duration::from_secs(5),
        stripe: StripeSettings {
            secret_key: "sk_test_123".into(),
            webhook_secret: STRIPE_WEBHOOK_SECRET.into(),
            price_id: "price_test_123".into(),
            api_base: stripe_base.into(),
        },
        razorpay: RazorpaySettings {
            key_id: "rzp_test_key".into(),
            key_secret: RAZORPAY_KEY_SECRET.into(),
            webhook_secret: RAZORPAY_WEBHOOK_SECRET.into(),
            plan_amount: 49900,
            currency: "INR".into(),
            api_base: razorpay_base.into(),
        },
        rate_limits: RateLimitConfig {
            auth_max: 1000,
            billing_max: 1000,
            window: Duration::from_secs(60),
        },
    }
}

/// Config whose gateways point nowhere; for tests that never reach a provider.
pub fn offline_config() -> Config {
    test_config("http://127.0.0.1:9", "http://127.0.0.1:9")
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_store(config, store.clone(), store)
    }

    /// Build the app around an arbitrary store. `memory` is kept for
    /// assertions and is unrelated to `store` when they differ.
    pub fn with_store(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("signals.db");
        let pool = create_pool(db_path.to_str().expect("utf-8 temp path"))
            .expect("Failed to create pool");
        {
            let conn = pool.get().expect("Failed to get connection");
            init_db(&conn).expect("Failed to initialize schema");
        }

        let tokens = TokenKeys::from_secret(b"test-jwt-secret", config.access_token_ttl);
        let state = AppState::new(&config, pool, store, tokens);
        let app = handlers::router(state.clone());

        Self {
            app,
            state,
            store: memory,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Register a user over HTTP and return its bearer token.
    pub async fn signup(&self, email: &str) -> String {
        let (status, body) = self
            .send(json_request(
                "POST",
                "/auth/signup",
                &serde_json::json!({ "email": email, "password": TEST_PASSWORD }),
                None,
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "signup failed: {}", body);
        body["access_token"]
            .as_str()
            .expect("access_token in signup response")
            .to_string()
    }

    pub fn user(&self, email: &str) -> User {
        let conn = self.state.db.get().expect("Failed to get connection");
        queries::get_user_by_email(&conn, email)
            .expect("query failed")
            .expect("user exists")
    }

    /// Make every write to `users` fail until [`allow_user_updates`] is called.
    ///
    /// [`allow_user_updates`]: TestApp::allow_user_updates
    pub fn block_user_updates(&self) {
        let conn = self.state.db.get().expect("Failed to get connection");
        conn.execute_batch(
            "CREATE TRIGGER block_user_updates BEFORE UPDATE ON users
             BEGIN SELECT RAISE(ABORT, 'database is read-only'); END;",
        )
        .expect("Failed to create trigger");
    }

    pub fn allow_user_updates(&self) {
        let conn = self.state.db.get().expect("Failed to get connection");
        conn.execute_batch("DROP TRIGGER block_user_updates")
            .expect("Failed to drop trigger");
    }

    pub async fn post_webhook(
        &self,
        provider: &str,
        payload: &[u8],
        signature: Option<(&str, String)>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/billing/{}/webhook", provider))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some((name, value)) = signature {
            builder = builder.header(name, value);
        }
        self.send(builder.body(Body::from(payload.to_vec())).unwrap())
            .await
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

// ============ Provider payloads and signatures ============

/// `stripe-signature` header value for `payload` signed now.
pub fn stripe_signature(payload: &[u8]) -> (&'static str, String) {
    stripe_signature_at(payload, chrono::Utc::now().timestamp(), STRIPE_WEBHOOK_SECRET)
}

pub fn stripe_signature_at(payload: &[u8], timestamp: i64, secret: &str) -> (&'static str, String) {
    let ts = timestamp.to_string();
    let sig = hmac_sha256_hex(secret.as_bytes(), &[ts.as_bytes(), b".", payload]);
    ("stripe-signature", format!("t={},v1={}", ts, sig))
}

pub fn razorpay_signature(payload: &[u8]) -> (&'static str, String) {
    (
        "x-razorpay-signature",
        hmac_sha256_hex(RAZORPAY_WEBHOOK_SECRET.as_bytes(), &[payload]),
    )
}

/// Signature the Razorpay widget returns for a captured payment.
pub fn razorpay_confirmation_signature(order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(
        RAZORPAY_KEY_SECRET.as_bytes(),
        &[order_id.as_bytes(), b"|", payment_id.as_bytes()],
    )
}

pub fn stripe_checkout_completed(event_id: &str, user_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": event_id,
        "object": "event",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "object": "checkout.session",
                "payment_status": "paid",
                "customer": "cus_test_1",
                "metadata": { "user_id": user_id }
            }
        }
    }))
    .unwrap()
}

pub fn razorpay_payment_captured(payment_id: &str, user_id: &str) -> Vec<u8> {
    razorpay_payment_event("payment.captured", payment_id, user_id)
}

/// Razorpay payment lifecycle event; every stage carries the same payment id.
pub fn razorpay_payment_event(event: &str, payment_id: &str, user_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "entity": "event",
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": "order_test_1",
                    "status": "captured",
                    "notes": { "user_id": user_id }
                }
            }
        }
    }))
    .unwrap()
}
