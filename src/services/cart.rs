//! Cart commands dispatched through a single entry point.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::cart::CartItemInput;
use crate::domain::{CartState, ConflictMode, NewCartItem};
use crate::error::AppError;
use crate::ports::CartRepository;
use crate::validation;

/// Every cart mutation a client can request.
#[derive(Debug, Clone)]
pub enum CartCommand {
    /// Insert-or-replace by natural key.
    Create {
        item: CartItemInput,
        expected_version: i64,
        idempotency_key: Option<String>,
    },
    UpdateQuantity {
        item_id: Uuid,
        quantity: i32,
        expected_version: i64,
        mode: ConflictMode,
        idempotency_key: Option<String>,
    },
    Delete {
        item_id: Uuid,
        expected_version: i64,
        mode: ConflictMode,
        idempotency_key: Option<String>,
    },
    /// Merge a client-held cart (e.g. after sign-in).
    Sync { items: Vec<CartItemInput> },
}

#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartRepository>,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartRepository>) -> Self {
        Self { carts }
    }

    /// Current items and version, creating the cart when absent.
    pub async fn view(&self, owner_id: Uuid) -> Result<CartState, AppError> {
        let cart = self.carts.get_or_create(owner_id).await?;
        let items = self.carts.snapshot(cart.id).await?;
        Ok(CartState::new(items, cart.version))
    }

    pub async fn handle(&self, owner_id: Uuid, command: CartCommand) -> Result<CartState, AppError> {
        match command {
            CartCommand::Create {
                item,
                expected_version,
                idempotency_key,
            } => {
                let item = NewCartItem::try_from(item)?;
                let key = checked_key(idempotency_key.as_deref())?;

                let cart = self.carts.get_or_create(owner_id).await?;
                Ok(self
                    .carts
                    .upsert_item(cart.id, expected_version, &item, key)
                    .await?)
            }
            CartCommand::UpdateQuantity {
                item_id,
                quantity,
                expected_version,
                mode,
                idempotency_key,
            } => {
                let key = checked_key(idempotency_key.as_deref())?;
                self.set_quantity(owner_id, item_id, quantity, expected_version, mode, key)
                    .await
            }
            CartCommand::Delete {
                item_id,
                expected_version,
                mode,
                idempotency_key,
            } => {
                let key = checked_key(idempotency_key.as_deref())?;
                self.set_quantity(owner_id, item_id, 0, expected_version, mode, key)
                    .await
            }
            CartCommand::Sync { items } => {
                let items = items
                    .into_iter()
                    .map(NewCartItem::try_from)
                    .collect::<Result<Vec<_>, _>>()?;

                let cart = self.carts.get_or_create(owner_id).await?;
                Ok(self.carts.sync_items(cart.id, &items).await?)
            }
        }
    }

    async fn set_quantity(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        expected_version: i64,
        mode: ConflictMode,
        idempotency_key: Option<&str>,
    ) -> Result<CartState, AppError> {
        let cart = self.carts.get_or_create(owner_id).await?;
        Ok(self
            .carts
            .update_item_quantity(
                cart.id,
                item_id,
                expected_version,
                quantity,
                mode,
                idempotency_key,
            )
            .await?)
    }
}

fn checked_key(key: Option<&str>) -> Result<Option<&str>, AppError> {
    match key {
        Some(k) => {
            validation::validate_idempotency_key(k)?;
            Ok(Some(k))
        }
        None => Ok(None),
    }
}
