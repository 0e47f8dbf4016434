//! End-to-end purchase flows through the HTTP router

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn stripe_checkout_then_webhook_grants_access() {
    let stripe = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(body_string_contains("client_reference_id="))
        .and(body_string_contains("price_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_abc",
            "url": "https://checkout.stripe.test/pay/cs_test_abc"
        })))
        .expect(1)
        .mount(&stripe)
        .await;

    let app = TestApp::new(test_config(&stripe.uri(), "http://127.0.0.1:9"));
    let token = app.signup("trader@example.com").await;
    let user = app.user("trader@example.com");
    assert!(!user.is_paid);

    let (status, body) = app
        .send(post_request("/billing/create-checkout", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["gateway"], "stripe");
    assert_eq!(body["session_id"], "cs_test_abc");
    assert_eq!(body["checkout_url"], "https://checkout.stripe.test/pay/cs_test_abc");

    let payload = stripe_checkout_completed("evt_paid_1", &user.id.to_string());
    let (status, body) = app
        .post_webhook("stripe", &payload, Some(stripe_signature(&payload)))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "success");

    let (status, body) = app.send(get_request("/billing/status", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_paid"], true);
    assert_eq!(body["email"], "trader@example.com");
    assert_eq!(body["payment_gateway"], "stripe");

    let paid = app.user("trader@example.com");
    assert_eq!(paid.payment_gateway.as_deref(), Some("stripe"));
    assert_eq!(paid.customer_reference.as_deref(), Some("cus_test_1"));
    assert!(paid.paid_at.is_some());

    // Provider retry of the same event
    let (status, body) = app
        .post_webhook("stripe", &payload, Some(stripe_signature(&payload)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_processed");

    // Paid users cannot start another checkout
    let (status, body) = app
        .send(post_request("/billing/create-checkout", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Already subscribed");
}

#[tokio::test]
async fn razorpay_order_then_client_verification_grants_access() {
    let razorpay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(header_exists("authorization"))
        .and(body_string_contains("\"receipt\":\"order_user_"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_rzp_1",
            "amount": 49900,
            "currency": "INR",
            "status": "created"
        })))
        .expect(1)
        .mount(&razorpay)
        .await;

    let app = TestApp::new(test_config("http://127.0.0.1:9", &razorpay.uri()));
    let token = app.signup("india@example.com").await;

    let (status, body) = app
        .send(post_request(
            "/billing/create-checkout?gateway=razorpay",
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["gateway"], "razorpay");
    assert_eq!(body["order_id"], "order_rzp_1");
    assert_eq!(body["amount"], 49900);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["key_id"], "rzp_test_key");

    let signature = razorpay_confirmation_signature("order_rzp_1", "pay_rzp_1");
    let (status, body) = app
        .send(json_request(
            "POST",
            "/billing/razorpay/verify-payment",
            &json!({
                "razorpay_order_id": "order_rzp_1",
                "razorpay_payment_id": "pay_rzp_1",
                "razorpay_signature": signature
            }),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "success");
    assert_eq!(body["is_paid"], true);

    let (_, body) = app.send(get_request("/billing/status", Some(&token))).await;
    assert_eq!(body["is_paid"], true);
    assert_eq!(body["payment_gateway"], "razorpay");
}

#[tokio::test]
async fn webhook_after_client_verification_keeps_first_grant() {
    let app = TestApp::new(offline_config());
    let token = app.signup("both@example.com").await;
    let user = app.user("both@example.com");

    let signature = razorpay_confirmation_signature("order_1", "pay_1");
    let (status, _) = app
        .send(json_request(
            "POST",
            "/billing/razorpay/verify-payment",
            &json!({ "order_id": "order_1", "payment_id": "pay_1", "signature": signature }),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let first = app.user("both@example.com");

    // The provider's own webhook for the same payment arrives afterwards
    let payload = razorpay_payment_captured("pay_1", &user.id.to_string());
    let (status, body) = app
        .post_webhook("razorpay", &payload, Some(razorpay_signature(&payload)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let after = app.user("both@example.com");
    assert!(after.is_paid);
    assert_eq!(after.payment_gateway.as_deref(), Some("razorpay"));
    assert_eq!(after.paid_at, first.paid_at);
}

#[tokio::test]
async fn gateway_info_lists_configured_gateways() {
    let app = TestApp::new(offline_config());
    let (status, body) = app.send(get_request("/billing/gateway-info", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_gateway"], "stripe");
    assert_eq!(body["available_gateways"], json!(["razorpay", "stripe"]));
}

#[tokio::test]
async fn unpaid_status_reports_default_gateway() {
    let mut config = offline_config();
    config.default_gateway = "razorpay".into();
    let app = TestApp::new(config);
    let token = app.signup("new@example.com").await;

    let (status, body) = app.send(get_request("/billing/status", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_paid"], false);
    assert_eq!(body["payment_gateway"], "razorpay");
}
