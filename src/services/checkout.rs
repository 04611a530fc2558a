//! Checkout initiation and owner-scoped order lookup.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::CheckoutConfig;
use crate::domain::order::to_minor_units;
use crate::domain::{
    CheckoutOrder, CheckoutOrderItem, CheckoutSelection, FailureGuard, NewCheckoutOrder,
    NewCheckoutOrderItem,
};
use crate::error::AppError;
use crate::paystack::{InitializeTransaction, PaymentGateway};
use crate::ports::{CartRepository, OrderRepository};
use crate::pricing::price_selection;
use crate::validation::{self, ValidationError, SELECTED_KEYS_MAX};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Cart selection keys to buy; empty buys the whole cart.
    #[serde(default)]
    pub selected_keys: Vec<String>,
    pub email: String,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub billing_address: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub order: CheckoutOrder,
    pub items: Vec<CheckoutOrderItem>,
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    carts: Arc<dyn CartRepository>,
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    config: CheckoutConfig,
}

/// `MKT-` followed by 24 uppercase hex characters.
pub fn generate_reference() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("MKT-{}", hex[..24].to_uppercase())
}

impl CheckoutService {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            carts,
            orders,
            gateway,
            config,
        }
    }

    pub async fn start(
        &self,
        owner_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutResult, AppError> {
        let email = request.email.trim().to_lowercase();
        validation::validate_email(&email)?;
        if request.selected_keys.len() > SELECTED_KEYS_MAX {
            return Err(ValidationError::new(
                "selectedKeys",
                format!("must contain at most {} keys", SELECTED_KEYS_MAX),
            )
            .into());
        }
        if !request.shipping_address.is_object() {
            return Err(ValidationError::new("shippingAddress", "must be an object").into());
        }

        let cart = self
            .carts
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(|| AppError::Validation("cart is empty".to_string()))?;
        let snapshot = self.carts.snapshot(cart.id).await?;

        let selection = CheckoutSelection::from_keys(request.selected_keys);
        if let Some(missing) = selection_gap(&selection, &snapshot) {
            return Err(AppError::Validation(format!(
                "selected item {} is not in the cart",
                missing
            )));
        }
        let selected = selection.select(&snapshot);
        if selected.is_empty() {
            return Err(AppError::Validation("cart is empty".to_string()));
        }
        // Store the concrete keys bought so items added later survive reconciliation.
        let selection = CheckoutSelection::from_keys(selected.iter().map(|i| i.key.clone()));

        let totals = price_selection(&selected, &self.config);
        let amount = to_minor_units(&totals.total)
            .ok_or_else(|| AppError::Internal("order total out of range".to_string()))?;

        let reference = generate_reference();
        let (order, items) = self
            .orders
            .create(NewCheckoutOrder {
                id: Uuid::new_v4(),
                owner_id,
                order_number: None,
                reference: reference.clone(),
                currency: self.config.currency.clone(),
                totals,
                email: Some(email.clone()),
                shipping_address: request.shipping_address,
                billing_address: request.billing_address,
                selection,
                items: selected.into_iter().map(NewCheckoutOrderItem::from).collect(),
            })
            .await?;

        let initialized = self
            .gateway
            .initialize(&InitializeTransaction {
                email,
                amount,
                reference: reference.clone(),
                currency: order.currency.clone(),
                callback_url: self.config.callback_url.clone(),
                metadata: json!({
                    "orderId": order.id,
                    "orderNumber": order.order_number,
                }),
            })
            .await;

        match initialized {
            Ok(transaction) => Ok(CheckoutResult {
                order,
                items,
                authorization_url: transaction.authorization_url,
                reference,
            }),
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    reference = %reference,
                    "Gateway initialization failed: {}",
                    e
                );
                if let Err(mark) = self
                    .orders
                    .mark_failed(order.id, FailureGuard::UnlessPaid)
                    .await
                {
                    tracing::error!(order_id = %order.id, "Could not fail order: {}", mark);
                }
                Err(AppError::ServiceUnavailable(
                    "payment gateway is unavailable".to_string(),
                ))
            }
        }
    }

    pub async fn order(
        &self,
        owner_id: Uuid,
        reference: &str,
    ) -> Result<(CheckoutOrder, Vec<CheckoutOrderItem>), AppError> {
        validation::validate_reference(reference)?;
        let order = self
            .orders
            .find_by_owner_and_reference(owner_id, reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {}", reference)))?;
        let items = self.orders.items(order.id).await?;
        Ok((order, items))
    }

    /// Operator lookup without owner scoping.
    pub async fn order_by_reference(
        &self,
        reference: &str,
    ) -> Result<(CheckoutOrder, Vec<CheckoutOrderItem>), AppError> {
        validation::validate_reference(reference)?;
        let order = self
            .orders
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {}", reference)))?;
        let items = self.orders.items(order.id).await?;
        Ok((order, items))
    }
}

fn selection_gap(
    selection: &CheckoutSelection,
    snapshot: &[crate::domain::CartLineItem],
) -> Option<String> {
    selection
        .keys()
        .find(|key| !snapshot.iter().any(|item| &item.key == *key))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_format() {
        let reference = generate_reference();
        assert!(reference.starts_with("MKT-"));
        assert_eq!(reference.len(), 28);
        assert!(reference[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert!(validation::validate_reference(&reference).is_ok());
    }
}
