#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use marketplace_core::adapters::{InMemoryCartRepository, InMemoryOrderRepository};
use marketplace_core::config::{CheckoutConfig, Config, GatewayConfig, LogFormat};
use marketplace_core::identity::{Claims, JwtIdentityProvider};
use marketplace_core::paystack::{
    GatewayError, GatewayVerification, InitializeTransaction, InitializedTransaction,
    PaymentGateway,
};
use marketplace_core::{create_app, AppState};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const PAYSTACK_SECRET: &str = "sk_test_webhook_secret";

/// What the fake gateway answers on `verify`.
#[derive(Debug, Clone)]
pub enum GatewayMode {
    /// Reports success for the given minor-unit amount and currency.
    Success { amount: i64, currency: String },
    Pending,
    Unavailable,
}

pub struct FakeGateway {
    mode: Mutex<GatewayMode>,
    fail_initialize: bool,
    pub verify_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new(mode: GatewayMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            fail_initialize: false,
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_initialize() -> Self {
        Self {
            fail_initialize: true,
            ..Self::new(GatewayMode::Pending)
        }
    }

    pub fn set_mode(&self, mode: GatewayMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            GatewayMode::Success { amount, currency } => Ok(GatewayVerification {
                success: true,
                status: "success".to_string(),
                reference: reference.to_string(),
                amount,
                currency,
            }),
            GatewayMode::Pending => Ok(GatewayVerification {
                success: false,
                status: "ongoing".to_string(),
                reference: reference.to_string(),
                amount: 0,
                currency: "NGN".to_string(),
            }),
            GatewayMode::Unavailable => Err(GatewayError::UnexpectedStatus { status: 502 }),
        }
    }

    async fn initialize(
        &self,
        request: &InitializeTransaction,
    ) -> Result<InitializedTransaction, GatewayError> {
        if self.fail_initialize {
            return Err(GatewayError::CircuitBreakerOpen("test".to_string()));
        }
        Ok(InitializedTransaction {
            authorization_url: format!("https://checkout.paystack.test/{}", request.reference),
            access_code: "access_code_test".to_string(),
            reference: request.reference.clone(),
        })
    }
}

pub fn test_config() -> Config {
    Config {
        server_port: 3000,
        database_url: "postgres://localhost:5432/marketplace_test".to_string(),
        database_max_connections: 5,
        gateway: GatewayConfig {
            secret_key: PAYSTACK_SECRET.to_string(),
            ..GatewayConfig::default()
        },
        checkout: CheckoutConfig::default(),
        auth_jwt_secret: JWT_SECRET.to_string(),
        log_format: LogFormat::Pretty,
        log_request_body: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub carts: InMemoryCartRepository,
    pub orders: InMemoryOrderRepository,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub fn new(gateway: FakeGateway) -> Self {
        Self::with_config(test_config(), gateway)
    }

    pub fn with_config(config: Config, gateway: FakeGateway) -> Self {
        let carts = InMemoryCartRepository::new();
        let orders = InMemoryOrderRepository::new();
        let gateway = Arc::new(gateway);

        let state = AppState::new(
            &config,
            Arc::new(carts.clone()),
            Arc::new(orders.clone()),
            gateway.clone(),
            Arc::new(JwtIdentityProvider::new(&config.auth_jwt_secret)),
        );

        Self {
            router: create_app(state),
            carts,
            orders,
            gateway,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn bearer(owner: Uuid) -> String {
    let claims = Claims {
        sub: owner.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        role: Some("authenticated".to_string()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn item_json(product_id: Uuid, size: Option<&str>, quantity: i32) -> serde_json::Value {
    serde_json::json!({
        "productId": product_id,
        "name": "Linen Shirt",
        "price": "4500.00",
        "size": size,
        "quantity": quantity,
    })
}
