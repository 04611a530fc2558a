use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Extractor that verifies the `x-paystack-signature` header against the raw
/// request body using HMAC-SHA512 keyed with the gateway secret.
pub struct VerifiedWebhook {
    pub body: Vec<u8>,
}

impl VerifiedWebhook {
    /// Constant-time check of a hex signature over `body`.
    pub fn verify_signature(
        secret: Option<&str>,
        body: &[u8],
        signature_header: &str,
    ) -> Result<(), AuthError> {
        let secret = secret.ok_or(AuthError::MissingSecret)?;

        let expected_signature = hex::decode(signature_header.trim())
            .map_err(|_| AuthError::InvalidSignatureFormat)?;

        let mut mac =
            HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::MissingSecret)?;
        mac.update(body);

        mac.verify_slice(&expected_signature)
            .map_err(|_| AuthError::SignatureMismatch)
    }
}

#[async_trait]
impl FromRequest<crate::AppState> for VerifiedWebhook {
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &crate::AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or(AuthError::MissingSignature)?;

        let body_bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
            .await
            .map_err(|_| AuthError::BodyReadError)?
            .to_vec();

        Self::verify_signature(state.webhook_secret.as_deref(), &body_bytes, &signature)?;

        Ok(VerifiedWebhook { body: body_bytes })
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingSignature,
    MissingSecret,
    InvalidSignatureFormat,
    SignatureMismatch,
    BodyReadError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, "Missing x-paystack-signature header")
            }
            AuthError::MissingSecret => {
                (StatusCode::UNAUTHORIZED, "Webhook secret is not configured")
            }
            AuthError::InvalidSignatureFormat => {
                (StatusCode::UNAUTHORIZED, "Invalid signature format")
            }
            AuthError::SignatureMismatch => {
                (StatusCode::UNAUTHORIZED, "Signature verification failed")
            }
            AuthError::BodyReadError => (StatusCode::BAD_REQUEST, "Failed to read request body"),
        };

        tracing::warn!("Webhook authentication failed: {:?}", self);
        (
            status,
            Json(json!({ "error": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}
