use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::payments::{ClientConfirmation, GatewayInfo, NormalizedCheckout, PaymentAck, WebhookAck};
use crate::rate_limit;

#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    #[serde(default)]
    pub gateway: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BillingStatus {
    pub is_paid: bool,
    pub email: String,
    /// Gateway that granted access, or the active default for unpaid users.
    pub payment_gateway: String,
}

pub async fn gateway_info(State(state): State<AppState>) -> Json<GatewayInfo> {
    Json(state.gateways.gateway_info())
}

pub async fn create_checkout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<CheckoutQuery>,
) -> Result<Json<NormalizedCheckout>> {
    let checkout = state
        .gateways
        .create_checkout(&user, query.gateway.as_deref())
        .await?;

    tracing::info!(
        user_id = user.id,
        gateway = checkout.gateway,
        transaction_id = checkout.handle.transaction_id(),
        "checkout created"
    );

    Ok(Json(checkout))
}

/// Provider callback. Unauthenticated; trust comes from the signature header,
/// which is read verbatim and checked against the raw body bytes.
pub async fn webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = state
        .gateways
        .registry()
        .get(&provider)
        .and_then(|gateway| headers.get(gateway.signature_header()))
        .and_then(|v| v.to_str().ok());

    let ack = state
        .gateways
        .handle_webhook(&provider, &body, signature)
        .await?;
    Ok(Json(ack))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(provider): Path<String>,
    Json(confirmation): Json<ClientConfirmation>,
) -> Result<Json<PaymentAck>> {
    let ack = state
        .gateways
        .verify_payment(&user, &provider, &confirmation)
        .await?;
    Ok(Json(ack))
}

pub async fn status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<BillingStatus> {
    let payment_gateway = user
        .payment_gateway
        .clone()
        .unwrap_or_else(|| state.gateways.registry().default_name().to_string());

    Json(BillingStatus {
        is_paid: user.is_paid,
        email: user.email,
        payment_gateway,
    })
}

pub fn router(state: &AppState) -> Router<AppState> {
    let limited = Router::new()
        .route("/billing/create-checkout", post(create_checkout))
        .route("/billing/{provider}/verify-payment", post(verify_payment))
        .route_layer(middleware::from_fn_with_state(
            state.billing_limiter.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .merge(limited)
        .route("/billing/gateway-info", get(gateway_info))
        .route("/billing/status", get(status))
        .route("/billing/{provider}/webhook", post(webhook))
}
