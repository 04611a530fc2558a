use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::IF_MATCH, HeaderMap},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::cart::CartItemInput;
use crate::domain::{CartState, ConflictMode};
use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::services::CartCommand;
use crate::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const STRICT_CONFLICT_HEADER: &str = "x-cart-strict-conflict";

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    /// Zero or less removes the item.
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncCartRequest {
    pub items: Vec<CartItemInput>,
}

/// Unwrap a JSON body, reporting malformed input as a 400.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// The cart version presented in `If-Match`. Accepts `3`, `"3"` and `W/"3"`.
pub fn expected_version(headers: &HeaderMap) -> Result<i64, AppError> {
    let raw = headers
        .get(IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Validation("If-Match header with the cart version is required".to_string())
        })?;

    let token = raw.trim();
    let token = token.strip_prefix("W/").unwrap_or(token).trim_matches('"');
    token
        .parse::<i64>()
        .ok()
        .filter(|v| *v >= 1)
        .ok_or_else(|| AppError::Validation("If-Match must be a positive cart version".to_string()))
}

pub fn conflict_mode(headers: &HeaderMap) -> Result<ConflictMode, AppError> {
    let Some(raw) = headers.get(STRICT_CONFLICT_HEADER) else {
        return Ok(ConflictMode::Strict);
    };

    match raw.to_str().map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Ok("true") | Ok("1") => Ok(ConflictMode::Strict),
        Ok("false") | Ok("0") => Ok(ConflictMode::Lenient),
        _ => Err(AppError::Validation(format!(
            "{} must be true or false",
            STRICT_CONFLICT_HEADER
        ))),
    }
}

pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[utoipa::path(
    get,
    path = "/cart",
    responses(
        (status = 200, description = "Current cart", body = CartState),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<CartState>, AppError> {
    Ok(Json(state.carts.view(user.owner_id).await?))
}

#[utoipa::path(
    post,
    path = "/cart/items",
    request_body = CartItemInput,
    params(
        ("If-Match" = i64, Header, description = "Current cart version"),
        ("Idempotency-Key" = Option<String>, Header, description = "Client retry key")
    ),
    responses(
        (status = 200, description = "Item stored", body = CartState),
        (status = 400, description = "Invalid item"),
        (status = 409, description = "Stale cart version", body = CartState)
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<CartItemInput>, JsonRejection>,
) -> Result<Json<CartState>, AppError> {
    let item = json_body(payload)?;
    let command = CartCommand::Create {
        item,
        expected_version: expected_version(&headers)?,
        idempotency_key: idempotency_key(&headers),
    };

    Ok(Json(state.carts.handle(user.owner_id, command).await?))
}

#[utoipa::path(
    patch,
    path = "/cart/items/{item_id}",
    request_body = UpdateQuantityRequest,
    params(
        ("item_id" = Uuid, Path, description = "Cart item id"),
        ("If-Match" = i64, Header, description = "Current cart version"),
        ("X-Cart-Strict-Conflict" = Option<bool>, Header, description = "Reject stale versions (default true)")
    ),
    responses(
        (status = 200, description = "Quantity updated", body = CartState),
        (status = 404, description = "Item not in cart"),
        (status = 409, description = "Stale cart version", body = CartState)
    ),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Result<Json<UpdateQuantityRequest>, JsonRejection>,
) -> Result<Json<CartState>, AppError> {
    let body = json_body(payload)?;
    let command = CartCommand::UpdateQuantity {
        item_id,
        quantity: body.quantity,
        expected_version: expected_version(&headers)?,
        mode: conflict_mode(&headers)?,
        idempotency_key: idempotency_key(&headers),
    };

    Ok(Json(state.carts.handle(user.owner_id, command).await?))
}

#[utoipa::path(
    delete,
    path = "/cart/items/{item_id}",
    params(
        ("item_id" = Uuid, Path, description = "Cart item id"),
        ("If-Match" = i64, Header, description = "Current cart version")
    ),
    responses(
        (status = 200, description = "Item removed", body = CartState),
        (status = 404, description = "Item not in cart"),
        (status = 409, description = "Stale cart version", body = CartState)
    ),
    tag = "Cart"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<CartState>, AppError> {
    let command = CartCommand::Delete {
        item_id,
        expected_version: expected_version(&headers)?,
        mode: conflict_mode(&headers)?,
        idempotency_key: idempotency_key(&headers),
    };

    Ok(Json(state.carts.handle(user.owner_id, command).await?))
}

#[utoipa::path(
    post,
    path = "/cart/sync",
    request_body = SyncCartRequest,
    responses(
        (status = 200, description = "Cart merged", body = CartState),
        (status = 400, description = "Invalid item")
    ),
    tag = "Cart"
)]
pub async fn sync_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<SyncCartRequest>, JsonRejection>,
) -> Result<Json<CartState>, AppError> {
    let body = json_body(payload)?;
    let command = CartCommand::Sync { items: body.items };
    Ok(Json(state.carts.handle(user.owner_id, command).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn parses_if_match_forms() {
        assert_eq!(expected_version(&headers(&[("if-match", "3")])).unwrap(), 3);
        assert_eq!(expected_version(&headers(&[("if-match", "\"4\"")])).unwrap(), 4);
        assert_eq!(expected_version(&headers(&[("if-match", "W/\"5\"")])).unwrap(), 5);
        assert!(expected_version(&headers(&[])).is_err());
        assert!(expected_version(&headers(&[("if-match", "abc")])).is_err());
        assert!(expected_version(&headers(&[("if-match", "0")])).is_err());
    }

    #[test]
    fn strict_conflict_defaults_to_strict() {
        assert_eq!(conflict_mode(&headers(&[])).unwrap(), ConflictMode::Strict);
        assert_eq!(
            conflict_mode(&headers(&[(STRICT_CONFLICT_HEADER, "false")])).unwrap(),
            ConflictMode::Lenient
        );
        assert!(conflict_mode(&headers(&[(STRICT_CONFLICT_HEADER, "maybe")])).is_err());
    }

    #[test]
    fn blank_idempotency_key_is_absent() {
        assert_eq!(idempotency_key(&headers(&[(IDEMPOTENCY_KEY_HEADER, "  ")])), None);
        assert_eq!(
            idempotency_key(&headers(&[(IDEMPOTENCY_KEY_HEADER, "k-1")])).as_deref(),
            Some("k-1")
        );
    }
}
