use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::cart::CartState;
use crate::ports::RepositoryError;

/// Postgres SQLSTATE for a missing relation.
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {message}")]
    Database {
        code: Option<String>,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cart version conflict")]
    Conflict(Box<CartState>),

    #[error("Duplicate: {0}")]
    DuplicateConflict(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database { .. } | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::DuplicateConflict(_) => StatusCode::CONFLICT,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Database {
                code: Some(code), ..
            } if code == UNDEFINED_TABLE => {
                "Database schema is missing; run `marketplace-core db migrate`".to_string()
            }
            AppError::Database { .. } => "Database error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::VersionConflict(state) => AppError::Conflict(state),
            RepositoryError::Duplicate(what) => AppError::DuplicateConflict(what),
            RepositoryError::Database { code, message } => AppError::Database { code, message },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let AppError::Database { code, message } = &self {
            tracing::error!(sqlstate = ?code, "Storage failure: {}", message);
        }

        let body = match self {
            AppError::Conflict(state) => json!({
                "error": "Cart version conflict",
                "status": status.as_u16(),
                "items": state.items,
                "cartVersion": state.version,
            }),
            other => json!({
                "error": other.public_message(),
                "status": status.as_u16(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Outcome classification for the best-effort parts of the payment flow.
///
/// `Recoverable` failures are logged and the flow continues with state left
/// as it was. `Fatal` failures reject the operation they occurred in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("recoverable: {0}")]
    Recoverable(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl FlowError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FlowError::Recoverable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Order not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_payment_required_status_code() {
        let error = AppError::PaymentRequired("Payment failed".to_string());
        assert_eq!(error.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_forbidden_status_code() {
        let error = AppError::Forbidden("anon".to_string());
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_missing_table_message_points_to_migration() {
        let error = AppError::Database {
            code: Some(UNDEFINED_TABLE.to_string()),
            message: "relation \"carts\" does not exist".to_string(),
        };
        assert!(error.public_message().contains("db migrate"));
    }

    #[test]
    fn test_repository_not_found_maps_to_404() {
        let error: AppError = RepositoryError::NotFound("cart item".to_string()).into();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_repository_duplicate_maps_to_409() {
        let error: AppError =
            RepositoryError::Duplicate("checkout_orders_paystack_reference_key".to_string())
                .into();
        assert!(matches!(error, AppError::DuplicateConflict(_)));

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 409);
        assert!(body.get("cartVersion").is_none());
    }

    #[tokio::test]
    async fn test_conflict_response_carries_cart_state() {
        let error = AppError::Conflict(Box::new(CartState::new(Vec::new(), 4)));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["cartVersion"], 4);
        assert!(body["items"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_flow_error_classification() {
        assert!(FlowError::Recoverable("gateway timeout".into()).is_recoverable());
        assert!(!FlowError::Fatal("amount mismatch".into()).is_recoverable());
    }
}
