use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{CheckoutOrder, CheckoutOrderItem};
use crate::error::AppError;
use crate::handlers::cart::json_body;
use crate::middleware::auth::AuthenticatedUser;
use crate::services::CheckoutRequest;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order: CheckoutOrder,
    pub items: Vec<CheckoutOrderItem>,
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub order: CheckoutOrder,
    pub items: Vec<CheckoutOrderItem>,
}

#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Pending order created", body = CheckoutResponse),
        (status = 400, description = "Empty cart or invalid selection"),
        (status = 503, description = "Payment gateway unavailable")
    ),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let request = json_body(payload)?;
    let result = state.checkout.start(user.owner_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order: result.order,
            items: result.items,
            authorization_url: result.authorization_url,
            reference: result.reference,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/orders/{reference}",
    params(("reference" = String, Path, description = "Gateway payment reference")),
    responses(
        (status = 200, description = "Order with its items", body = OrderResponse),
        (status = 404, description = "Order not found")
    ),
    tag = "Checkout"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(reference): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let (order, items) = state.checkout.order(user.owner_id, &reference).await?;
    Ok(Json(OrderResponse { order, items }))
}
