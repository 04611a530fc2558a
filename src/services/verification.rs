//! Client-polled payment verification.
//!
//! The payment window is evaluated lazily on each poll. A pending order past
//! its window is failed before the gateway is consulted; otherwise the order
//! is only marked paid when the gateway reports success for exactly the
//! order's amount and currency.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{CheckoutOrder, FailureGuard, PaymentStatus};
use crate::error::{AppError, FlowError};
use crate::paystack::{GatewayVerification, PaymentGateway};
use crate::ports::OrderRepository;
use crate::services::reconciliation::CartReconciler;
use crate::validation;

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Paid {
        order: CheckoutOrder,
        already_processed: bool,
    },
    Awaiting {
        order: CheckoutOrder,
        expires_at: DateTime<Utc>,
        remaining_seconds: i64,
    },
}

#[derive(Clone)]
pub struct VerificationService {
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: CartReconciler,
    window: Duration,
}

impl VerificationService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: CartReconciler,
        window: Duration,
    ) -> Self {
        Self {
            orders,
            gateway,
            reconciler,
            window,
        }
    }

    pub async fn verify(
        &self,
        owner_id: Uuid,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, AppError> {
        let reference = reference.trim();
        validation::validate_reference(reference)?;

        let order = self
            .orders
            .find_by_owner_and_reference(owner_id, reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {}", reference)))?;

        if order.payment_status == PaymentStatus::Paid {
            return Ok(already_paid(order));
        }
        if order.payment_status.is_terminal_failure() {
            return Err(payment_required(&order));
        }

        if order.is_expired(now, self.window) {
            return self.expire(order).await;
        }

        match self.confirm(&order).await {
            Ok(verification) if verification.success => {
                self.settle(order, &verification, now).await
            }
            Ok(verification) => {
                tracing::info!(
                    order_id = %order.id,
                    reference = %order.paystack_reference,
                    gateway_status = %verification.status,
                    "Payment not yet successful"
                );
                Ok(self.awaiting(order, now))
            }
            Err(reason) => {
                tracing::warn!(
                    order_id = %order.id,
                    reference = %order.paystack_reference,
                    "Gateway verification unavailable: {}",
                    reason
                );
                Ok(self.awaiting(order, now))
            }
        }
    }

    /// Gateway failures never fail a poll; they are all recoverable.
    async fn confirm(&self, order: &CheckoutOrder) -> Result<GatewayVerification, FlowError> {
        self.gateway
            .verify(&order.paystack_reference)
            .await
            .map_err(|e| FlowError::Recoverable(e.to_string()))
    }

    async fn expire(&self, order: CheckoutOrder) -> Result<VerificationOutcome, AppError> {
        match self.orders.mark_failed(order.id, FailureGuard::OnlyPending).await? {
            Some(failed) => {
                tracing::info!(
                    order_id = %failed.id,
                    reference = %failed.paystack_reference,
                    "Payment window expired; order failed"
                );
                Err(AppError::PaymentRequired(
                    "Payment window expired".to_string(),
                ))
            }
            None => {
                // Another writer moved the order first.
                let current = self.reload(&order).await?;
                if current.payment_status == PaymentStatus::Paid {
                    Ok(already_paid(current))
                } else {
                    Err(payment_required(&current))
                }
            }
        }
    }

    async fn settle(
        &self,
        order: CheckoutOrder,
        verification: &GatewayVerification,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, AppError> {
        if !order.matches_payment(verification.amount, &verification.currency) {
            tracing::warn!(
                order_id = %order.id,
                reference = %order.paystack_reference,
                expected = ?order.total_minor_units(),
                paid = verification.amount,
                currency = %verification.currency,
                "Paid amount does not match order; leaving pending"
            );
            return Ok(self.awaiting(order, now));
        }

        match self.orders.mark_paid(order.id).await? {
            Some(paid) => {
                tracing::info!(
                    order_id = %paid.id,
                    reference = %paid.paystack_reference,
                    "Payment verified; order paid"
                );
                self.reconciler.run(&paid).await;
                Ok(VerificationOutcome::Paid {
                    order: paid,
                    already_processed: false,
                })
            }
            None => Ok(already_paid(self.reload(&order).await?)),
        }
    }

    async fn reload(&self, order: &CheckoutOrder) -> Result<CheckoutOrder, AppError> {
        self.orders
            .find_by_reference(&order.paystack_reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {}", order.paystack_reference)))
    }

    fn awaiting(&self, order: CheckoutOrder, now: DateTime<Utc>) -> VerificationOutcome {
        VerificationOutcome::Awaiting {
            expires_at: order.expires_at(self.window),
            remaining_seconds: order.remaining_seconds(now, self.window),
            order,
        }
    }
}

fn already_paid(order: CheckoutOrder) -> VerificationOutcome {
    VerificationOutcome::Paid {
        order,
        already_processed: true,
    }
}

fn payment_required(order: &CheckoutOrder) -> AppError {
    AppError::PaymentRequired(format!("Payment {}", order.payment_status))
}
