//! Storage ports for the cart and checkout flow.
//!
//! Every cart mutation is a single atomic operation at this boundary: the
//! adapter checks the idempotency key, compares the version token, applies the
//! change and bumps the version in one unit, so callers never compose
//! read-modify-write sequences themselves.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Cart, CartLineItem, CartState, CheckoutOrder, CheckoutOrderItem, ConflictMode, FailureGuard,
    NewCartItem, NewCheckoutOrder,
};

/// Postgres SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The presented version token is stale; carries the current state.
    #[error("cart version conflict (current version {})", .0.version)]
    VersionConflict(Box<CartState>),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("database error: {message}")]
    Database {
        code: Option<String>,
        message: String,
    },
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row".to_string()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned());
                if code.as_deref() == Some(UNIQUE_VIOLATION) {
                    RepositoryError::Duplicate(
                        db.constraint().unwrap_or("unique constraint").to_string(),
                    )
                } else {
                    RepositoryError::Database {
                        code,
                        message: db.message().to_string(),
                    }
                }
            }
            other => RepositoryError::Database {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Return the owner's cart, creating it at version 1 when absent.
    async fn get_or_create(&self, owner_id: Uuid) -> RepositoryResult<Cart>;

    async fn find_by_owner(&self, owner_id: Uuid) -> RepositoryResult<Option<Cart>>;

    /// Line items of the cart, each resolved to its selection key.
    async fn snapshot(&self, cart_id: Uuid) -> RepositoryResult<Vec<CartLineItem>>;

    /// Insert-or-replace by natural key (delete when quantity <= 0).
    async fn upsert_item(
        &self,
        cart_id: Uuid,
        expected_version: i64,
        item: &NewCartItem,
        idempotency_key: Option<&str>,
    ) -> RepositoryResult<CartState>;

    /// Set the quantity of one item by id (delete when quantity <= 0).
    async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        expected_version: i64,
        quantity: i32,
        mode: ConflictMode,
        idempotency_key: Option<&str>,
    ) -> RepositoryResult<CartState>;

    /// Merge client-held items: max quantity, OR protection, one version bump.
    async fn sync_items(&self, cart_id: Uuid, items: &[NewCartItem])
        -> RepositoryResult<CartState>;

    /// Delete the given rows and bump the version once. Returns the new version.
    async fn remove_items(&self, cart_id: Uuid, item_ids: &[Uuid]) -> RepositoryResult<i64>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(
        &self,
        order: NewCheckoutOrder,
    ) -> RepositoryResult<(CheckoutOrder, Vec<CheckoutOrderItem>)>;

    async fn find_by_owner_and_reference(
        &self,
        owner_id: Uuid,
        reference: &str,
    ) -> RepositoryResult<Option<CheckoutOrder>>;

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<CheckoutOrder>>;

    async fn items(&self, order_id: Uuid) -> RepositoryResult<Vec<CheckoutOrderItem>>;

    /// Compare-and-set to `paid`. `None` when the order was already paid.
    async fn mark_paid(&self, order_id: Uuid) -> RepositoryResult<Option<CheckoutOrder>>;

    /// Compare-and-set to `failed`. `None` when the guard rejected the write.
    async fn mark_failed(
        &self,
        order_id: Uuid,
        guard: FailureGuard,
    ) -> RepositoryResult<Option<CheckoutOrder>>;
}
