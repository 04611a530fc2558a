//! In-process implementations of the storage ports.
//!
//! Each store sits behind one async mutex, so every mutation observes and
//! bumps the version atomically, mirroring the row lock the Postgres adapters
//! take.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::cart::merge_incoming;
use crate::domain::{
    Cart, CartLineItem, CartState, CheckoutOrder, CheckoutOrderItem, ConflictMode, FailureGuard,
    NewCartItem, NewCheckoutOrder, PaymentStatus,
};
use crate::ports::{CartRepository, OrderRepository, RepositoryError, RepositoryResult};

#[derive(Default)]
struct CartStore {
    carts: HashMap<Uuid, Cart>,
    by_owner: HashMap<Uuid, Uuid>,
    items: HashMap<Uuid, Vec<CartLineItem>>,
    idempotency_keys: HashSet<(Uuid, String)>,
}

impl CartStore {
    fn version(&self, cart_id: Uuid) -> RepositoryResult<i64> {
        self.carts
            .get(&cart_id)
            .map(|c| c.version)
            .ok_or_else(|| RepositoryError::NotFound(format!("cart {}", cart_id)))
    }

    fn state(&self, cart_id: Uuid, version: i64) -> CartState {
        CartState::new(self.items.get(&cart_id).cloned().unwrap_or_default(), version)
    }

    fn replay(&self, cart_id: Uuid, current: i64, key: Option<&str>) -> Option<CartState> {
        key.filter(|k| self.idempotency_keys.contains(&(cart_id, k.to_string())))
            .map(|_| self.state(cart_id, current))
    }

    fn bump(&mut self, cart_id: Uuid) -> RepositoryResult<i64> {
        let cart = self
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("cart {}", cart_id)))?;
        cart.version += 1;
        cart.updated_at = Utc::now();
        Ok(cart.version)
    }

    fn record(&mut self, cart_id: Uuid, key: Option<&str>) {
        if let Some(key) = key {
            self.idempotency_keys.insert((cart_id, key.to_string()));
        }
    }
}

/// Cart store held in process memory.
#[derive(Clone, Default)]
pub struct InMemoryCartRepository {
    store: Arc<Mutex<CartStore>>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn get_or_create(&self, owner_id: Uuid) -> RepositoryResult<Cart> {
        let mut store = self.store.lock().await;
        if let Some(cart) = store.by_owner.get(&owner_id).and_then(|id| store.carts.get(id)) {
            return Ok(cart.clone());
        }

        let cart = Cart {
            id: Uuid::new_v4(),
            owner_id,
            version: 1,
            updated_at: Utc::now(),
        };
        store.by_owner.insert(owner_id, cart.id);
        store.carts.insert(cart.id, cart.clone());
        store.items.insert(cart.id, Vec::new());
        Ok(cart)
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> RepositoryResult<Option<Cart>> {
        let store = self.store.lock().await;
        Ok(store
            .by_owner
            .get(&owner_id)
            .and_then(|id| store.carts.get(id))
            .cloned())
    }

    async fn snapshot(&self, cart_id: Uuid) -> RepositoryResult<Vec<CartLineItem>> {
        let store = self.store.lock().await;
        Ok(store.items.get(&cart_id).cloned().unwrap_or_default())
    }

    async fn upsert_item(
        &self,
        cart_id: Uuid,
        expected_version: i64,
        item: &NewCartItem,
        idempotency_key: Option<&str>,
    ) -> RepositoryResult<CartState> {
        let mut store = self.store.lock().await;
        let current = store.version(cart_id)?;

        if let Some(state) = store.replay(cart_id, current, idempotency_key) {
            return Ok(state);
        }
        if expected_version != current {
            return Err(RepositoryError::VersionConflict(Box::new(
                store.state(cart_id, current),
            )));
        }

        let key = item.selection_key();
        let now = Utc::now();
        let items = store.items.entry(cart_id).or_default();
        let position = items.iter().position(|i| i.selection_key() == key);
        match (position, item.removes()) {
            (Some(idx), true) => {
                items.remove(idx);
            }
            (None, true) => {}
            (Some(idx), false) => {
                let existing = &mut items[idx];
                let replacement = CartLineItem {
                    id: existing.id,
                    created_at: existing.created_at,
                    ..CartLineItem::from_new(cart_id, item, now)
                };
                *existing = replacement;
            }
            (None, false) => items.push(CartLineItem::from_new(cart_id, item, now)),
        }

        let version = store.bump(cart_id)?;
        store.record(cart_id, idempotency_key);
        Ok(store.state(cart_id, version))
    }

    async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        expected_version: i64,
        quantity: i32,
        mode: ConflictMode,
        idempotency_key: Option<&str>,
    ) -> RepositoryResult<CartState> {
        let mut store = self.store.lock().await;
        let current = store.version(cart_id)?;

        if let Some(state) = store.replay(cart_id, current, idempotency_key) {
            return Ok(state);
        }
        if !mode.admits(expected_version, current) {
            return Err(RepositoryError::VersionConflict(Box::new(
                store.state(cart_id, current),
            )));
        }

        let items = store.items.entry(cart_id).or_default();
        let idx = items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("cart item {}", item_id)))?;
        if quantity <= 0 {
            items.remove(idx);
        } else {
            items[idx].quantity = quantity;
            items[idx].updated_at = Utc::now();
        }

        let version = store.bump(cart_id)?;
        store.record(cart_id, idempotency_key);
        Ok(store.state(cart_id, version))
    }

    async fn sync_items(
        &self,
        cart_id: Uuid,
        items: &[NewCartItem],
    ) -> RepositoryResult<CartState> {
        let mut store = self.store.lock().await;
        store.version(cart_id)?;

        let now = Utc::now();
        let existing = store.items.entry(cart_id).or_default();
        for incoming in merge_incoming(items.to_vec()) {
            let key = incoming.selection_key();
            match existing.iter_mut().find(|i| i.selection_key() == key) {
                Some(row) => {
                    row.quantity = row.quantity.max(incoming.quantity);
                    row.protection = row.protection || incoming.protection;
                    row.updated_at = now;
                }
                None => existing.push(CartLineItem::from_new(cart_id, &incoming, now)),
            }
        }

        let version = store.bump(cart_id)?;
        Ok(store.state(cart_id, version))
    }

    async fn remove_items(&self, cart_id: Uuid, item_ids: &[Uuid]) -> RepositoryResult<i64> {
        let mut store = self.store.lock().await;
        store.version(cart_id)?;

        if let Some(items) = store.items.get_mut(&cart_id) {
            items.retain(|i| !item_ids.contains(&i.id));
        }
        store.bump(cart_id)
    }
}

#[derive(Default)]
struct OrderStore {
    orders: HashMap<Uuid, CheckoutOrder>,
    by_reference: HashMap<String, Uuid>,
    items: HashMap<Uuid, Vec<CheckoutOrderItem>>,
}

/// Checkout orders held in process memory.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    store: Arc<Mutex<OrderStore>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an order's status without the transition guards. Seeds
    /// gateway-side states (cancelled, refunded) no flow here writes.
    pub async fn set_status(&self, reference: &str, status: PaymentStatus) -> RepositoryResult<()> {
        let mut store = self.store.lock().await;
        let id = *store
            .by_reference
            .get(reference)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", reference)))?;
        if let Some(order) = store.orders.get_mut(&id) {
            order.payment_status = status;
            order.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(
        &self,
        order: NewCheckoutOrder,
    ) -> RepositoryResult<(CheckoutOrder, Vec<CheckoutOrderItem>)> {
        let mut store = self.store.lock().await;
        if store.by_reference.contains_key(&order.reference) {
            return Err(RepositoryError::Duplicate(
                "checkout_orders_paystack_reference_key".to_string(),
            ));
        }

        let (order, items) = order.into_records(Utc::now());
        store
            .by_reference
            .insert(order.paystack_reference.clone(), order.id);
        store.orders.insert(order.id, order.clone());
        store.items.insert(order.id, items.clone());
        Ok((order, items))
    }

    async fn find_by_owner_and_reference(
        &self,
        owner_id: Uuid,
        reference: &str,
    ) -> RepositoryResult<Option<CheckoutOrder>> {
        Ok(self
            .find_by_reference(reference)
            .await?
            .filter(|o| o.owner_id == owner_id))
    }

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<CheckoutOrder>> {
        let store = self.store.lock().await;
        Ok(store
            .by_reference
            .get(reference)
            .and_then(|id| store.orders.get(id))
            .cloned())
    }

    async fn items(&self, order_id: Uuid) -> RepositoryResult<Vec<CheckoutOrderItem>> {
        let store = self.store.lock().await;
        Ok(store.items.get(&order_id).cloned().unwrap_or_default())
    }

    async fn mark_paid(&self, order_id: Uuid) -> RepositoryResult<Option<CheckoutOrder>> {
        let mut store = self.store.lock().await;
        let order = store
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", order_id)))?;
        if order.payment_status == PaymentStatus::Paid {
            return Ok(None);
        }

        let now = Utc::now();
        order.payment_status = PaymentStatus::Paid;
        order.paid_at = Some(now);
        order.updated_at = now;
        Ok(Some(order.clone()))
    }

    async fn mark_failed(
        &self,
        order_id: Uuid,
        guard: FailureGuard,
    ) -> RepositoryResult<Option<CheckoutOrder>> {
        let mut store = self.store.lock().await;
        let order = store
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", order_id)))?;
        if !guard.allows(order.payment_status) {
            return Ok(None);
        }

        order.payment_status = PaymentStatus::Failed;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }
}
