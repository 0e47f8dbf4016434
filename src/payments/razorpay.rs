use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    ClientConfirmation, EventKind, PaymentGateway, PaymentHandle, PaymentRequest, WebhookEvent,
    request_failed,
};
use crate::config::RazorpaySettings;
use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::error::{AppError, Result, msg};

pub const NAME: &str = "razorpay";

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: String,
    notes: OrderNotes,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct OrderNotes {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayEvent {
    event: String,
    #[serde(default)]
    payload: RazorpayPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RazorpayPayload {
    payment: Option<EntityWrapper>,
    order: Option<EntityWrapper>,
}

#[derive(Debug, Deserialize)]
struct EntityWrapper {
    entity: Entity,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Entity {
    id: Option<String>,
    customer_id: Option<String>,
    notes: Option<serde_json::Value>,
}

impl Entity {
    /// `notes` is an object when set and an empty array when not.
    fn user_ref(&self) -> Option<String> {
        match self.notes.as_ref()?.get("user_id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl RazorpayPayload {
    fn payment(&self) -> Option<&Entity> {
        self.payment.as_ref().map(|w| &w.entity)
    }

    fn order(&self) -> Option<&Entity> {
        self.order.as_ref().map(|w| &w.entity)
    }

    fn user_ref(&self) -> Option<String> {
        self.payment()
            .and_then(Entity::user_ref)
            .or_else(|| self.order().and_then(Entity::user_ref))
    }

    fn event_id(&self) -> Option<String> {
        self.payment()
            .and_then(|p| p.id.clone())
            .or_else(|| self.order().and_then(|o| o.id.clone()))
    }
}

/// Orders API adapter. The client completes payment in the Razorpay widget
/// and posts the signed ids back for verification.
#[derive(Debug, Clone)]
pub struct RazorpayGateway {
    client: Client,
    settings: RazorpaySettings,
}

impl RazorpayGateway {
    pub fn new(client: Client, settings: RazorpaySettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_configured(&self) -> bool {
        !self.settings.key_id.is_empty() && !self.settings.key_secret.is_empty()
    }

    fn signature_header(&self) -> &'static str {
        "x-razorpay-signature"
    }

    fn webhook_namespace(&self) -> &'static str {
        "razorpay_webhook"
    }

    fn confirmation_namespace(&self) -> Option<&'static str> {
        Some("razorpay_payment")
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentHandle> {
        if !self.is_configured() {
            return Err(AppError::GatewayUnconfigured(NAME.into()));
        }

        let body = CreateOrderRequest {
            amount: request.amount.unwrap_or(self.settings.plan_amount),
            currency: &self.settings.currency,
            receipt: format!("order_user_{}", request.user_id),
            notes: OrderNotes {
                user_id: Some(request.user_id.to_string()),
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/orders",
                self.settings.api_base.trim_end_matches('/')
            ))
            .basic_auth(&self.settings.key_id, Some(&self.settings.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed(NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(request_failed(NAME, format!("{}: {}", status, error_text)));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| request_failed(NAME, format!("unreadable order response: {}", e)))?;

        tracing::info!(user_id = request.user_id, order_id = %order.id, "Razorpay order created");

        Ok(PaymentHandle::Order {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key_id: self.settings.key_id.clone(),
        })
    }

    fn verify_client_confirmation(&self, confirmation: &ClientConfirmation) -> bool {
        if self.settings.key_secret.is_empty()
            || confirmation.order_id.is_empty()
            || confirmation.payment_id.is_empty()
            || confirmation.signature.is_empty()
        {
            return false;
        }

        let expected = hmac_sha256_hex(
            self.settings.key_secret.as_bytes(),
            &[
                confirmation.order_id.as_bytes(),
                b"|",
                confirmation.payment_id.as_bytes(),
            ],
        );
        constant_time_eq(&expected, &confirmation.signature)
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        if self.settings.webhook_secret.is_empty() {
            tracing::warn!("Razorpay webhook received but RAZORPAY_WEBHOOK_SECRET is not set");
            return false;
        }
        let expected = hmac_sha256_hex(self.settings.webhook_secret.as_bytes(), &[payload]);
        constant_time_eq(&expected, signature.trim())
    }

    fn extract_event(&self, payload: &[u8]) -> Result<WebhookEvent> {
        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|_| AppError::BadRequest(msg::MALFORMED_WEBHOOK.into()))?;
        let event: RazorpayEvent = serde_json::from_value(raw.clone())
            .map_err(|_| AppError::BadRequest(msg::MALFORMED_WEBHOOK.into()))?;

        let kind = match event.event.as_str() {
            "payment.captured" | "order.paid" => EventKind::PaymentCompleted {
                user_ref: event.payload.user_ref(),
                customer_reference: event
                    .payload
                    .payment()
                    .and_then(|p| p.customer_id.clone()),
            },
            "payment.failed" => EventKind::PaymentFailed {
                user_ref: event.payload.user_ref(),
            },
            _ => EventKind::Unrecognized,
        };

        Ok(WebhookEvent {
            event_id: event.payload.event_id(),
            event_type: event.event,
            kind,
            raw,
        })
    }
}
