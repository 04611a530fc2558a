use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::{
    GatewayError, GatewayVerification, InitializeTransaction, InitializedTransaction,
    PaymentGateway,
};
use crate::config::GatewayConfig;

/// Paystack wraps every payload in `{status, message, data}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    currency: String,
    gateway_response: Option<String>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

/// HTTP client for the Paystack transaction API
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PaystackClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_circuit_breaker(config, 3, 60)
    }

    pub fn with_circuit_breaker(
        config: &GatewayConfig,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        PaystackClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, GatewayError>>,
    {
        match self.circuit_breaker.call(call).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "Paystack circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::UnexpectedStatus {
            status: status.as_u16(),
        });
    }

    let envelope = response.json::<Envelope<T>>().await?;
    if !envelope.status {
        return Err(GatewayError::InvalidResponse(
            envelope
                .message
                .unwrap_or_else(|| "request was not successful".to_string()),
        ));
    }

    envelope
        .data
        .ok_or_else(|| GatewayError::InvalidResponse("missing data".to_string()))
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        let client = self.client.clone();
        let secret = self.secret_key.clone();
        let reference = reference.to_string();

        self.guarded(async move {
            let response = client.get(&url).bearer_auth(&secret).send().await?;

            if response.status() == StatusCode::NOT_FOUND {
                return Err(GatewayError::TransactionNotFound(reference));
            }

            let data = read_envelope::<VerifyData>(response).await?;
            tracing::debug!(
                reference = %data.reference,
                status = %data.status,
                gateway_response = ?data.gateway_response,
                "Paystack verification response"
            );

            Ok(GatewayVerification {
                success: data.status == "success",
                status: data.status,
                reference: data.reference,
                amount: data.amount,
                currency: data.currency,
            })
        })
        .await
    }

    async fn initialize(
        &self,
        request: &InitializeTransaction,
    ) -> Result<InitializedTransaction, GatewayError> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let client = self.client.clone();
        let secret = self.secret_key.clone();
        let body = serde_json::to_value(InitializeBody {
            email: &request.email,
            amount: request.amount,
            reference: &request.reference,
            currency: &request.currency,
            callback_url: request.callback_url.as_deref(),
            metadata: request.metadata.clone(),
        })
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        self.guarded(async move {
            let response = client
                .post(&url)
                .bearer_auth(&secret)
                .json(&body)
                .send()
                .await?;

            let data = read_envelope::<InitializeData>(response).await?;
            Ok(InitializedTransaction {
                authorization_url: data.authorization_url,
                access_code: data.access_code,
                reference: data.reference,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: String) -> GatewayConfig {
        GatewayConfig {
            secret_key: "sk_test_abc".to_string(),
            base_url,
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = PaystackClient::new(&config("https://api.paystack.co/".to_string()));
        assert_eq!(client.base_url, "https://api.paystack.co");
    }

    #[test]
    fn test_circuit_breaker_state() {
        let client = PaystackClient::new(&config("https://api.paystack.co".to_string()));
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_verify_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/transaction/verify/MKT-ABC")
            .match_header("authorization", "Bearer sk_test_abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":true,"message":"Verification successful","data":{
                    "status":"success","reference":"MKT-ABC","amount":125050,
                    "currency":"NGN","gateway_response":"Successful"}}"#,
            )
            .create_async()
            .await;

        let client = PaystackClient::new(&config(server.url()));
        let verification = client.verify("MKT-ABC").await.unwrap();

        assert!(verification.success);
        assert_eq!(verification.amount, 125050);
        assert_eq!(verification.currency, "NGN");
    }

    #[tokio::test]
    async fn test_verify_abandoned_is_not_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/transaction/verify/MKT-ABC")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":true,"message":"ok","data":{
                    "status":"abandoned","reference":"MKT-ABC","amount":125050,
                    "currency":"NGN","gateway_response":null}}"#,
            )
            .create_async()
            .await;

        let client = PaystackClient::new(&config(server.url()));
        let verification = client.verify("MKT-ABC").await.unwrap();
        assert!(!verification.success);
        assert_eq!(verification.status, "abandoned");
    }

    #[tokio::test]
    async fn test_verify_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/transaction/verify/UNKNOWN")
            .with_status(404)
            .create_async()
            .await;

        let client = PaystackClient::new(&config(server.url()));
        let result = client.verify("UNKNOWN").await;
        assert!(matches!(result, Err(GatewayError::TransactionNotFound(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_unexpected_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/transaction/verify/MKT-ABC")
            .with_status(502)
            .create_async()
            .await;

        let client = PaystackClient::new(&config(server.url()));
        let result = client.verify("MKT-ABC").await;
        assert!(matches!(
            result,
            Err(GatewayError::UnexpectedStatus { status: 502 })
        ));
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/transaction/verify/.*".into()))
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = PaystackClient::with_circuit_breaker(&config(server.url()), 3, 30);
        for _ in 0..3 {
            let _ = client.verify("MKT-ABC").await;
        }

        let result = client.verify("MKT-ABC").await;
        assert!(matches!(result, Err(GatewayError::CircuitBreakerOpen(_))));
        assert_eq!(client.circuit_state(), "open");
    }

    #[tokio::test]
    async fn test_initialize_returns_authorization_url() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/transaction/initialize")
            .match_header("authorization", "Bearer sk_test_abc")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "amount": 500000,
                "reference": "MKT-NEW",
                "currency": "NGN"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":true,"message":"Authorization URL created","data":{
                    "authorization_url":"https://checkout.paystack.com/abc",
                    "access_code":"abc","reference":"MKT-NEW"}}"#,
            )
            .create_async()
            .await;

        let client = PaystackClient::new(&config(server.url()));
        let initialized = client
            .initialize(&InitializeTransaction {
                email: "buyer@example.com".to_string(),
                amount: 500000,
                reference: "MKT-NEW".to_string(),
                currency: "NGN".to_string(),
                callback_url: None,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert_eq!(
            initialized.authorization_url,
            "https://checkout.paystack.com/abc"
        );
        assert_eq!(initialized.reference, "MKT-NEW");
    }
}
