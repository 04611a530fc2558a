use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::domain::{CheckoutOrder, PaymentStatus};
use crate::error::AppError;
use crate::handlers::auth::VerifiedWebhook;
use crate::handlers::cart::json_body;
use crate::middleware::auth::AuthenticatedUser;
use crate::services::{VerificationOutcome, WebhookEvent};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub reference: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerifiedResponse {
    pub order: CheckoutOrder,
    pub already_processed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwaitingConfirmationResponse {
    pub awaiting_confirmation: bool,
    pub payment_status: PaymentStatus,
    pub expires_at: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub order: CheckoutOrder,
}

#[utoipa::path(
    post,
    path = "/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed", body = PaymentVerifiedResponse),
        (status = 202, description = "Awaiting confirmation", body = AwaitingConfirmationResponse),
        (status = 402, description = "Payment failed, cancelled, refunded or expired"),
        (status = 404, description = "Order not found")
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = json_body(payload)?;
    let outcome = state
        .verification
        .verify(user.owner_id, &body.reference, Utc::now())
        .await?;

    let response = match outcome {
        VerificationOutcome::Paid {
            order,
            already_processed,
        } => (
            StatusCode::OK,
            Json(PaymentVerifiedResponse {
                order,
                already_processed,
            }),
        )
            .into_response(),
        VerificationOutcome::Awaiting {
            order,
            expires_at,
            remaining_seconds,
        } => (
            StatusCode::ACCEPTED,
            Json(AwaitingConfirmationResponse {
                awaiting_confirmation: true,
                payment_status: order.payment_status,
                expires_at,
                remaining_seconds,
                order,
            }),
        )
            .into_response(),
    };

    Ok(response)
}

#[utoipa::path(
    post,
    path = "/payments/webhook",
    params(("x-paystack-signature" = String, Header, description = "Hex HMAC-SHA512 of the body")),
    responses(
        (status = 200, description = "Event received"),
        (status = 400, description = "Body is not a valid event"),
        (status = 401, description = "Signature verification failed")
    ),
    tag = "Payments"
)]
pub async fn paystack_webhook(State(state): State<AppState>, webhook: VerifiedWebhook) -> Response {
    let event = match serde_json::from_slice::<WebhookEvent>(&webhook.body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Unparsable webhook body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid webhook payload", "status": 400 })),
            )
                .into_response();
        }
    };

    match state.webhooks.process(&event).await {
        Ok(outcome) => {
            tracing::info!(event = %event.event, outcome = ?outcome, "Webhook processed");
        }
        Err(e) => {
            // Storage failures are still acknowledged with 200.
            tracing::error!(
                event = %event.event,
                reference = ?event.data.reference,
                recoverable = e.is_recoverable(),
                "Webhook processing failed: {}",
                e
            );
        }
    }

    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}
