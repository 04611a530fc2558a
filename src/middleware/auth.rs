use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

/// The owner a request acts for, resolved through the configured
/// identity provider.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub owner_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let owner_id = state.identity.authenticate(&parts.headers).await.map_err(|e| {
            tracing::debug!("Authentication failed: {}", e);
            AppError::from(e)
        })?;

        Ok(Self { owner_id })
    }
}
