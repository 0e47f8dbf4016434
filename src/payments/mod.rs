//! Payment gateway adapters and the router that drives them.
//!
//! Every provider implements [`PaymentGateway`]. Webhook handling always
//! verifies the signature over the raw request bytes first and only then
//! decodes the payload into a [`WebhookEvent`].

mod razorpay;
mod registry;
mod router;
mod stripe;

pub use razorpay::RazorpayGateway;
pub use registry::GatewayRegistry;
pub use router::{
    AckStatus, GatewayInfo, GatewayRouter, NormalizedCheckout, PaymentAck, WebhookAck,
};
pub use stripe::StripeGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Input to [`PaymentGateway::create_payment`]. The caller has already checked
/// that the user exists and is not paid.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub user_id: i64,
    pub email: String,
    /// Overrides the configured plan amount, in the smallest currency unit.
    pub amount: Option<i64>,
}

/// Provider-side payable object the client completes payment against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PaymentHandle {
    /// Hosted checkout page (Stripe).
    Redirect {
        session_id: String,
        checkout_url: String,
    },
    /// Order paid through a client-side widget keyed by `key_id` (Razorpay).
    Order {
        order_id: String,
        amount: i64,
        currency: String,
        key_id: String,
    },
}

impl PaymentHandle {
    pub fn transaction_id(&self) -> &str {
        match self {
            PaymentHandle::Redirect { session_id, .. } => session_id,
            PaymentHandle::Order { order_id, .. } => order_id,
        }
    }
}

/// Client-posted proof of payment. The `razorpay_*` aliases accept the field
/// names the Razorpay checkout widget hands back.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfirmation {
    #[serde(alias = "razorpay_order_id")]
    pub order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

/// A verified, decoded provider callback.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Provider-assigned id used for deduplication. Absent for payloads that
    /// carry no stable id.
    pub event_id: Option<String>,
    /// Provider event name as sent (`payment.captured`, `checkout.session.completed`).
    pub event_type: String,
    pub kind: EventKind,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Money was captured. `user_ref` is the user id we attached to the
    /// provider object at checkout; it is not trusted to be numeric.
    PaymentCompleted {
        user_ref: Option<String>,
        customer_reference: Option<String>,
    },
    PaymentFailed {
        user_ref: Option<String>,
    },
    Unrecognized,
}

/// Capability contract for one external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registry key and the `gateway` tag in checkout responses.
    fn name(&self) -> &'static str;

    /// True when the credentials needed for checkout are present.
    fn is_configured(&self) -> bool;

    /// Header carrying the webhook signature, lower-case.
    fn signature_header(&self) -> &'static str;

    /// Idempotency namespace for webhook event ids.
    fn webhook_namespace(&self) -> &'static str;

    /// Idempotency namespace for client confirmations, or `None` when the
    /// provider has no client confirmation step.
    fn confirmation_namespace(&self) -> Option<&'static str> {
        None
    }

    /// One outbound call to the provider. Failures are normalized to
    /// `GatewayUnconfigured` or `GatewayRequestFailed`.
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentHandle>;

    /// Pure check of a client-posted signature. Never errors.
    fn verify_client_confirmation(&self, confirmation: &ClientConfirmation) -> bool;

    /// Check `signature` against the raw, unparsed body. `false` when the
    /// webhook secret is not configured.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Decode a payload whose signature has already been verified.
    fn extract_event(&self, payload: &[u8]) -> Result<WebhookEvent>;
}

/// Build the outbound HTTP client shared by all adapters.
pub fn http_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout ({}); using defaults", e);
            reqwest::Client::new()
        })
}

/// Log an upstream failure and return the generic error clients see.
pub(crate) fn request_failed(
    provider: &str,
    detail: impl std::fmt::Display,
) -> crate::error::AppError {
    tracing::error!(provider, "payment provider request failed: {}", detail);
    crate::error::AppError::GatewayRequestFailed(format!(
        "Could not create a {} payment. Please try again later.",
        provider
    ))
}
