pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod identity;
pub mod middleware;
pub mod paystack;
pub mod ports;
pub mod pricing;
pub mod schemas;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::health::DependencyChecker;
use crate::identity::IdentityProvider;
use crate::paystack::PaymentGateway;
use crate::ports::{CartRepository, OrderRepository};
use crate::services::{
    CartReconciler, CartService, CheckoutService, VerificationService, WebhookProcessor,
};

#[derive(Clone)]
pub struct AppState {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub verification: VerificationService,
    pub webhooks: WebhookProcessor,
    pub identity: Arc<dyn IdentityProvider>,
    /// Key for webhook signatures; `None` rejects every delivery.
    pub webhook_secret: Option<String>,
    pub dependencies: Vec<Arc<dyn DependencyChecker>>,
    pub log_request_body: bool,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services over the given ports.
    pub fn new(
        config: &Config,
        carts: Arc<dyn CartRepository>,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let reconciler = CartReconciler::new(carts.clone());

        Self {
            carts: CartService::new(carts.clone()),
            checkout: CheckoutService::new(
                carts,
                orders.clone(),
                gateway.clone(),
                config.checkout.clone(),
            ),
            verification: VerificationService::new(
                orders.clone(),
                gateway,
                reconciler.clone(),
                config.gateway.payment_window(),
            ),
            webhooks: WebhookProcessor::new(orders, reconciler),
            identity,
            webhook_secret: config.gateway.webhook_secret().map(str::to_string),
            dependencies: Vec::new(),
            log_request_body: config.log_request_body,
            start_time: Instant::now(),
        }
    }

    pub fn with_dependency(mut self, checker: Arc<dyn DependencyChecker>) -> Self {
        self.dependencies.push(checker);
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/cart", get(handlers::cart::get_cart))
        .route("/cart/items", post(handlers::cart::add_item))
        .route(
            "/cart/items/:item_id",
            patch(handlers::cart::update_item).delete(handlers::cart::delete_item),
        )
        .route("/cart/sync", post(handlers::cart::sync_cart))
        .route("/checkout", post(handlers::checkout::create_checkout))
        .route("/orders/:reference", get(handlers::checkout::get_order))
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route("/payments/webhook", post(handlers::payments::paystack_webhook))
        .merge(schemas::swagger_ui())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
