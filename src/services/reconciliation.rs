//! Removes purchased line items from the owner's cart once payment is
//! confirmed. Shared by the verification and webhook paths.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{CheckoutOrder, CheckoutSelection};
use crate::error::FlowError;
use crate::ports::CartRepository;

#[derive(Clone)]
pub struct CartReconciler {
    carts: Arc<dyn CartRepository>,
}

impl CartReconciler {
    pub fn new(carts: Arc<dyn CartRepository>) -> Self {
        Self { carts }
    }

    /// Delete the selected rows (every row for an empty selection) and bump
    /// the cart version once. Returns how many rows were removed.
    ///
    /// When none of the selected rows are still in the cart nothing is
    /// written and the version is left as is, so clients holding the
    /// current token are not forced into a conflict.
    pub async fn reconcile(
        &self,
        owner_id: Uuid,
        selection: &CheckoutSelection,
    ) -> Result<usize, FlowError> {
        let Some(cart) = self
            .carts
            .find_by_owner(owner_id)
            .await
            .map_err(|e| FlowError::Recoverable(e.to_string()))?
        else {
            return Ok(0);
        };

        let snapshot = self
            .carts
            .snapshot(cart.id)
            .await
            .map_err(|e| FlowError::Recoverable(e.to_string()))?;

        let purchased: Vec<Uuid> = selection.select(&snapshot).iter().map(|i| i.id).collect();
        if purchased.is_empty() {
            return Ok(0);
        }

        let version = self
            .carts
            .remove_items(cart.id, &purchased)
            .await
            .map_err(|e| FlowError::Recoverable(e.to_string()))?;

        tracing::info!(
            cart_id = %cart.id,
            removed = purchased.len(),
            version,
            "Cart reconciled after payment"
        );
        Ok(purchased.len())
    }

    /// Best-effort reconciliation for a freshly paid order; never fails.
    pub async fn run(&self, order: &CheckoutOrder) -> usize {
        match self.reconcile(order.owner_id, &order.selection()).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    reference = %order.paystack_reference,
                    "Cart reconciliation failed: {}",
                    e
                );
                0
            }
        }
    }
}
