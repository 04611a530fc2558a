//! Outbound payment gateway port and its Paystack implementation.

use async_trait::async_trait;
use thiserror::Error;

pub mod client;

pub use client::PaystackClient;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Unexpected HTTP status {status} from gateway")]
    UnexpectedStatus { status: u16 },
    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Result of `GET /transaction/verify/{reference}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayVerification {
    pub success: bool,
    pub status: String,
    pub reference: String,
    /// Minor units (kobo, cents).
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct InitializeTransaction {
    pub email: String,
    /// Minor units.
    pub amount: i64,
    pub reference: String,
    pub currency: String,
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError>;

    async fn initialize(
        &self,
        request: &InitializeTransaction,
    ) -> Result<InitializedTransaction, GatewayError>;
}
