use serde::Serialize;

use super::{
    ClientConfirmation, EventKind, GatewayRegistry, PaymentGateway, PaymentHandle, PaymentRequest,
    WebhookEvent,
};
use crate::db::DbPool;
use crate::db::queries::{self, MarkPaidOutcome};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::idempotency::{IdempotencyStore, payment_key, webhook_key};
use crate::models::User;

#[derive(Debug, Clone, Serialize)]
pub struct GatewayInfo {
    pub active_gateway: String,
    pub available_gateways: Vec<&'static str>,
}

/// Checkout result tagged with the gateway that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedCheckout {
    pub gateway: &'static str,
    #[serde(flatten)]
    pub handle: PaymentHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Success,
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub status: AckStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentAck {
    pub status: AckStatus,
    pub is_paid: bool,
}

/// Selects adapters, normalizes their output and reconciles provider
/// callbacks against the entitlement ledger.
#[derive(Clone)]
pub struct GatewayRouter {
    registry: GatewayRegistry,
    idempotency: IdempotencyStore,
    db: DbPool,
}

impl GatewayRouter {
    pub fn new(registry: GatewayRegistry, idempotency: IdempotencyStore, db: DbPool) -> Self {
        Self {
            registry,
            idempotency,
            db,
        }
    }

    pub fn registry(&self) -> &GatewayRegistry {
        &self.registry
    }

    pub fn gateway_info(&self) -> GatewayInfo {
        GatewayInfo {
            active_gateway: self.registry.default_name().to_string(),
            available_gateways: self.registry.available(),
        }
    }

    pub async fn create_checkout(
        &self,
        user: &User,
        requested_gateway: Option<&str>,
    ) -> Result<NormalizedCheckout> {
        if user.is_paid {
            return Err(AppError::AlreadySubscribed);
        }

        let gateway = self.registry.resolve(requested_gateway)?;
        let handle = gateway
            .create_payment(&PaymentRequest {
                user_id: user.id,
                email: user.email.clone(),
                amount: None,
            })
            .await?;

        Ok(NormalizedCheckout {
            gateway: gateway.name(),
            handle,
        })
    }

    /// Verify, decode, deduplicate and apply one provider callback.
    ///
    /// The idempotency key is claimed with a single set-if-absent before the
    /// effect runs, so concurrent deliveries of one event apply it once. It is
    /// kept for every event kind, and released only when applying the effect
    /// fails so the provider's retry can succeed.
    pub async fn handle_webhook(
        &self,
        provider: &str,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck> {
        let gateway = self
            .registry
            .get(provider)
            .cloned()
            .or_not_found(msg::UNKNOWN_GATEWAY)?;

        let Some(signature) = signature else {
            tracing::warn!(
                provider = gateway.name(),
                "webhook rejected: missing {} header",
                gateway.signature_header()
            );
            return Err(AppError::InvalidSignature);
        };

        if !gateway.verify_webhook_signature(payload, signature) {
            tracing::warn!(provider = gateway.name(), "webhook rejected: invalid signature");
            return Err(AppError::InvalidSignature);
        }

        let event = gateway.extract_event(payload)?;

        let key = event
            .event_id
            .as_deref()
            .map(|id| {
                webhook_key(gateway.webhook_namespace(), &event.event_type, id)
            });

        if let Some(key) = &key
            && !self.idempotency.claim(key).await?
        {
            tracing::info!(provider = gateway.name(), %key, "webhook already processed");
            return Ok(WebhookAck {
                status: AckStatus::AlreadyProcessed,
            });
        }

        if let Err(e) = self.apply_event(gateway.as_ref(), &event) {
            if let Some(key) = &key {
                self.release_after_failure(key).await;
            }
            return Err(e);
        }

        Ok(WebhookAck {
            status: AckStatus::Success,
        })
    }

    /// Client-confirmed payment verification, deduplicated on the provider
    /// payment id.
    pub async fn verify_payment(
        &self,
        user: &User,
        provider: &str,
        confirmation: &ClientConfirmation,
    ) -> Result<PaymentAck> {
        let gateway = self
            .registry
            .get(provider)
            .cloned()
            .or_not_found(msg::UNKNOWN_GATEWAY)?;

        let namespace = gateway
            .confirmation_namespace()
            .ok_or_else(|| AppError::BadRequest(msg::CONFIRMATION_NOT_SUPPORTED.into()))?;

        if confirmation.payment_id.trim().is_empty() {
            return Err(AppError::BadRequest(msg::PAYMENT_ID_REQUIRED.into()));
        }

        let key = payment_key(namespace, &confirmation.payment_id);

        if self.idempotency.is_processed(&key).await? {
            tracing::info!(provider = gateway.name(), %key, "payment already verified");
            return self.already_processed(user.id);
        }

        if !gateway.verify_client_confirmation(confirmation) {
            tracing::warn!(
                provider = gateway.name(),
                user_id = user.id,
                "payment verification rejected: invalid signature"
            );
            return Err(AppError::InvalidSignature);
        }

        if !self.idempotency.claim(&key).await? {
            return self.already_processed(user.id);
        }

        match self.grant(user.id, gateway.name(), None) {
            Ok(MarkPaidOutcome::UserNotFound) => {
                self.release_after_failure(&key).await;
                Err(AppError::NotFound(msg::USER_NOT_FOUND.into()))
            }
            Ok(_) => Ok(PaymentAck {
                status: AckStatus::Success,
                is_paid: true,
            }),
            Err(e) => {
                self.release_after_failure(&key).await;
                Err(e)
            }
        }
    }

    fn apply_event(&self, gateway: &dyn PaymentGateway, event: &WebhookEvent) -> Result<()> {
        match &event.kind {
            EventKind::PaymentCompleted {
                user_ref,
                customer_reference,
            } => {
                let Some(user_id) = user_ref.as_deref().and_then(|r| r.trim().parse::<i64>().ok())
                else {
                    tracing::info!(
                        provider = gateway.name(),
                        event_id = ?event.event_id,
                        "completed payment without a usable user reference; acknowledged"
                    );
                    return Ok(());
                };

                if self.grant(user_id, gateway.name(), customer_reference.as_deref())?
                    == MarkPaidOutcome::UserNotFound
                {
                    tracing::warn!(
                        provider = gateway.name(),
                        user_id,
                        "completed payment for unknown user; acknowledged"
                    );
                }
                Ok(())
            }
            EventKind::PaymentFailed { user_ref } => {
                tracing::info!(provider = gateway.name(), user_ref = ?user_ref, "payment failed");
                Ok(())
            }
            EventKind::Unrecognized => {
                tracing::debug!(
                    provider = gateway.name(),
                    event_type = %event.event_type,
                    payload = %event.raw,
                    "ignoring webhook event"
                );
                Ok(())
            }
        }
    }

    fn grant(
        &self,
        user_id: i64,
        gateway: &str,
        customer_reference: Option<&str>,
    ) -> Result<MarkPaidOutcome> {
        let mut conn = self.db.get()?;
        let outcome = queries::mark_paid(&mut conn, user_id, gateway, customer_reference)?;
        match outcome {
            MarkPaidOutcome::Granted => {
                tracing::info!(user_id, gateway, "entitlement granted");
            }
            MarkPaidOutcome::AlreadyPaid => {
                tracing::debug!(user_id, gateway, "user already paid");
            }
            MarkPaidOutcome::UserNotFound => {}
        }
        Ok(outcome)
    }

    fn already_processed(&self, user_id: i64) -> Result<PaymentAck> {
        let conn = self.db.get()?;
        let user = queries::get_user_by_id(&conn, user_id)?.or_not_found(msg::USER_NOT_FOUND)?;
        Ok(PaymentAck {
            status: AckStatus::AlreadyProcessed,
            is_paid: user.is_paid,
        })
    }

    async fn release_after_failure(&self, key: &str) {
        if let Err(e) = self.idempotency.release(key).await {
            tracing::error!(%key, "failed to release idempotency key: {}", e);
        }
    }
}
