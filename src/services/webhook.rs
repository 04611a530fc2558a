//! Gateway-pushed charge events.
//!
//! Deliveries may be duplicated or arrive out of order. Every write is
//! guarded on "not already paid", so a late failure never undoes a payment
//! and a repeated success never reconciles twice.

use serde::Deserialize;
use std::sync::Arc;

use crate::domain::{CheckoutOrder, FailureGuard, PaymentStatus};
use crate::error::FlowError;
use crate::ports::{OrderRepository, RepositoryError};
use crate::services::reconciliation::CartReconciler;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    pub reference: Option<String>,
    pub status: Option<String>,
    /// Minor units.
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeEvent {
    Succeeded,
    Failed,
    Other,
}

impl WebhookEvent {
    pub fn charge_event(&self) -> ChargeEvent {
        let status = self.data.status.as_deref().unwrap_or_default();
        match self.event.as_str() {
            "charge.success" => ChargeEvent::Succeeded,
            "charge.failed" | "charge.abandoned" | "charge.reversed" => ChargeEvent::Failed,
            e if e.starts_with("charge.")
                && matches!(status, "failed" | "abandoned" | "reversed") =>
            {
                ChargeEvent::Failed
            }
            _ => ChargeEvent::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Ignored,
    UnknownReference,
    MarkedPaid { reconciled: usize },
    AlreadyPaid,
    AmountMismatch,
    MarkedFailed,
}

#[derive(Clone)]
pub struct WebhookProcessor {
    orders: Arc<dyn OrderRepository>,
    reconciler: CartReconciler,
}

fn storage(err: RepositoryError) -> FlowError {
    FlowError::Fatal(err.to_string())
}

impl WebhookProcessor {
    pub fn new(orders: Arc<dyn OrderRepository>, reconciler: CartReconciler) -> Self {
        Self { orders, reconciler }
    }

    pub async fn process(&self, event: &WebhookEvent) -> Result<WebhookOutcome, FlowError> {
        let kind = event.charge_event();
        if kind == ChargeEvent::Other {
            tracing::debug!(event = %event.event, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        }

        let Some(reference) = event.data.reference.as_deref().filter(|r| !r.is_empty()) else {
            return Ok(WebhookOutcome::UnknownReference);
        };
        let Some(order) = self
            .orders
            .find_by_reference(reference)
            .await
            .map_err(storage)?
        else {
            tracing::info!(reference, event = %event.event, "Webhook for unknown reference");
            return Ok(WebhookOutcome::UnknownReference);
        };

        match kind {
            ChargeEvent::Succeeded => self.succeeded(order, &event.data).await,
            _ => self.failed(order, &event.event).await,
        }
    }

    async fn succeeded(
        &self,
        order: CheckoutOrder,
        data: &WebhookData,
    ) -> Result<WebhookOutcome, FlowError> {
        if order.payment_status == PaymentStatus::Paid {
            return Ok(WebhookOutcome::AlreadyPaid);
        }

        let matches = match (data.amount, data.currency.as_deref()) {
            (Some(amount), Some(currency)) => order.matches_payment(amount, currency),
            _ => false,
        };
        if !matches {
            tracing::warn!(
                order_id = %order.id,
                reference = %order.paystack_reference,
                expected = ?order.total_minor_units(),
                paid = ?data.amount,
                currency = ?data.currency,
                "Webhook amount mismatch; failing order"
            );
            self.orders
                .mark_failed(order.id, FailureGuard::UnlessPaid)
                .await
                .map_err(storage)?;
            return Ok(WebhookOutcome::AmountMismatch);
        }

        match self.orders.mark_paid(order.id).await.map_err(storage)? {
            Some(paid) => {
                tracing::info!(
                    order_id = %paid.id,
                    reference = %paid.paystack_reference,
                    "Webhook confirmed payment; order paid"
                );
                let reconciled = self.reconciler.run(&paid).await;
                Ok(WebhookOutcome::MarkedPaid { reconciled })
            }
            None => Ok(WebhookOutcome::AlreadyPaid),
        }
    }

    async fn failed(&self, order: CheckoutOrder, event: &str) -> Result<WebhookOutcome, FlowError> {
        match self
            .orders
            .mark_failed(order.id, FailureGuard::UnlessPaid)
            .await
            .map_err(storage)?
        {
            Some(failed) => {
                tracing::info!(
                    order_id = %failed.id,
                    reference = %failed.paystack_reference,
                    event,
                    "Webhook reported failed charge; order failed"
                );
                Ok(WebhookOutcome::MarkedFailed)
            }
            None => Ok(WebhookOutcome::AlreadyPaid),
        }
    }
}
