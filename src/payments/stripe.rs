use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{
    ClientConfirmation, EventKind, PaymentGateway, PaymentHandle, PaymentRequest, WebhookEvent,
    request_failed,
};
use crate::config::StripeSettings;
use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::error::{AppError, Result, msg};

pub const NAME: &str = "stripe";

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for timestamps from the future.
const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeCheckoutSession,
}

/// The fields of `data.object` we read. Non-session objects deserialize to
/// all-`None` and fall through to `Unrecognized`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StripeCheckoutSession {
    payment_status: Option<String>,
    customer: Option<String>,
    client_reference_id: Option<String>,
    metadata: Option<StripeMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StripeMetadata {
    user_id: Option<String>,
}

impl StripeCheckoutSession {
    fn user_ref(&self) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.user_id.clone())
            .or_else(|| self.client_reference_id.clone())
    }
}

/// Hosted Checkout adapter.
///
/// Checkout uses the configured Stripe Price (`STRIPE_PRICE_ID`), so a
/// per-request amount override is ignored.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    settings: StripeSettings,
    frontend_url: String,
}

impl StripeGateway {
    pub fn new(client: Client, settings: StripeSettings, frontend_url: &str) -> Self {
        Self {
            client,
            settings,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    /// Verify a `stripe-signature` header (`t=<ts>,v1=<hex>[,v1=<hex>...]`)
    /// against `now`. Any matching `v1` entry is accepted.
    fn verify_signature_at(&self, payload: &[u8], header: &str, now: i64) -> bool {
        if self.settings.webhook_secret.is_empty() {
            tracing::warn!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is not set");
            return false;
        }

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                candidates.push(s);
            }
        }

        let Some(timestamp_str) = timestamp else {
            return false;
        };
        let Ok(timestamp) = timestamp_str.parse::<i64>() else {
            return false;
        };
        if candidates.is_empty() {
            return false;
        }

        let age = now - timestamp;
        if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return false;
        }
        if age < -WEBHOOK_FUTURE_SKEW_SECS {
            tracing::warn!("Stripe webhook rejected: timestamp in the future (age={}s)", age);
            return false;
        }

        // Signed payload is "<ts>." followed by the body bytes, unmodified
        let expected = hmac_sha256_hex(
            self.settings.webhook_secret.as_bytes(),
            &[timestamp_str.as_bytes(), b".", payload],
        );

        candidates
            .iter()
            .any(|candidate| constant_time_eq(&expected, candidate))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_configured(&self) -> bool {
        !self.settings.secret_key.is_empty() && !self.settings.price_id.is_empty()
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    fn webhook_namespace(&self) -> &'static str {
        "stripe_event"
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentHandle> {
        if !self.is_configured() {
            return Err(AppError::GatewayUnconfigured(NAME.into()));
        }
        if request.amount.is_some() {
            tracing::debug!("Stripe checkout ignores amount override; using configured price");
        }

        let user_id = request.user_id.to_string();
        let success_url = format!(
            "{}/dashboard?payment=success&gateway=stripe",
            self.frontend_url
        );
        let cancel_url = format!("{}/dashboard?payment=cancelled", self.frontend_url);

        let response = self
            .client
            .post(format!(
                "{}/v1/checkout/sessions",
                self.settings.api_base.trim_end_matches('/')
            ))
            .basic_auth(&self.settings.secret_key, None::<&str>)
            .form(&[
                ("mode", "payment"),
                ("payment_method_types[0]", "card"),
                ("line_items[0][price]", self.settings.price_id.as_str()),
                ("line_items[0][quantity]", "1"),
                ("customer_email", request.email.as_str()),
                ("client_reference_id", user_id.as_str()),
                ("metadata[user_id]", user_id.as_str()),
                ("success_url", success_url.as_str()),
                ("cancel_url", cancel_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| request_failed(NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(request_failed(NAME, format!("{}: {}", status, error_text)));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| request_failed(NAME, format!("unreadable session response: {}", e)))?;

        let checkout_url = session
            .url
            .ok_or_else(|| request_failed(NAME, "session response has no url"))?;

        tracing::info!(user_id = request.user_id, session_id = %session.id, "Stripe checkout session created");

        Ok(PaymentHandle::Redirect {
            session_id: session.id,
            checkout_url,
        })
    }

    fn verify_client_confirmation(&self, _confirmation: &ClientConfirmation) -> bool {
        false
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        self.verify_signature_at(payload, signature, chrono::Utc::now().timestamp())
    }

    fn extract_event(&self, payload: &[u8]) -> Result<WebhookEvent> {
        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|_| AppError::BadRequest(msg::MALFORMED_WEBHOOK.into()))?;
        let event: StripeEvent = serde_json::from_value(raw.clone())
            .map_err(|_| AppError::BadRequest(msg::MALFORMED_WEBHOOK.into()))?;

        let session = &event.data.object;
        let kind = match event.event_type.as_str() {
            "checkout.session.completed"
                if matches!(
                    session.payment_status.as_deref(),
                    Some("paid") | Some("no_payment_required")
                ) =>
            {
                EventKind::PaymentCompleted {
                    user_ref: session.user_ref(),
                    customer_reference: session.customer.clone(),
                }
            }
            "checkout.session.async_payment_succeeded" => EventKind::PaymentCompleted {
                user_ref: session.user_ref(),
                customer_reference: session.customer.clone(),
            },
            "checkout.session.async_payment_failed" => EventKind::PaymentFailed {
                user_ref: session.user_ref(),
            },
            _ => EventKind::Unrecognized,
        };

        Ok(WebhookEvent {
            event_id: event.id,
            event_type: event.event_type,
            kind,
            raw,
        })
    }
}
