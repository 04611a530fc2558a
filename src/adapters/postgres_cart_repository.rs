//! Postgres implementation of CartRepository.
//!
//! Every mutation locks the cart row with `SELECT ... FOR UPDATE`, so the
//! idempotency lookup, the version comparison, the item write and the version
//! bump all happen inside one transaction against a stable version.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::models::{CartItemRow, CartRow};
use crate::domain::cart::merge_incoming;
use crate::domain::{Cart, CartLineItem, CartState, ConflictMode, NewCartItem};
use crate::ports::{CartRepository, RepositoryError, RepositoryResult};

const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, name, slug, price, original_price, \
     image, variation_id, color, size, quantity, protection, created_at, updated_at";

type PgTx = Transaction<'static, Postgres>;

/// Postgres-backed cart store.
#[derive(Clone)]
pub struct PostgresCartRepository {
    pool: PgPool,
}

impl PostgresCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn load_snapshot<'e, E>(executor: E, cart_id: Uuid) -> RepositoryResult<Vec<CartLineItem>>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM cart_items WHERE cart_id = $1 ORDER BY created_at, id",
        CART_ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, CartItemRow>(&sql)
        .bind(cart_id)
        .fetch_all(executor)
        .await?;

    Ok(rows.into_iter().map(CartItemRow::into_domain).collect())
}

async fn lock_version(tx: &mut PgTx, cart_id: Uuid) -> RepositoryResult<i64> {
    sqlx::query_scalar::<_, i64>("SELECT version FROM carts WHERE id = $1 FOR UPDATE")
        .bind(cart_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("cart {}", cart_id)))
}

async fn bump_version(tx: &mut PgTx, cart_id: Uuid) -> RepositoryResult<i64> {
    let version = sqlx::query_scalar::<_, i64>(
        "UPDATE carts SET version = version + 1, updated_at = NOW() WHERE id = $1 RETURNING version",
    )
    .bind(cart_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(version)
}

async fn key_seen(tx: &mut PgTx, cart_id: Uuid, key: &str) -> RepositoryResult<bool> {
    let seen = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM cart_idempotency_keys WHERE cart_id = $1 AND idempotency_key = $2)",
    )
    .bind(cart_id)
    .bind(key)
    .fetch_one(&mut **tx)
    .await?;
    Ok(seen)
}

async fn record_key(
    tx: &mut PgTx,
    cart_id: Uuid,
    key: &str,
    item_id: Option<Uuid>,
) -> RepositoryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO cart_idempotency_keys (cart_id, idempotency_key, item_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (cart_id, idempotency_key) DO NOTHING
        "#,
    )
    .bind(cart_id)
    .bind(key)
    .bind(item_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Replays a known key against the current state, `None` for a fresh key.
async fn replay(
    tx: &mut PgTx,
    cart_id: Uuid,
    current: i64,
    key: Option<&str>,
) -> RepositoryResult<Option<CartState>> {
    let Some(key) = key else {
        return Ok(None);
    };
    if !key_seen(tx, cart_id, key).await? {
        return Ok(None);
    }

    tracing::debug!(cart_id = %cart_id, idempotency_key = key, "Replaying idempotent cart write");
    let items = load_snapshot(&mut **tx, cart_id).await?;
    Ok(Some(CartState::new(items, current)))
}

async fn version_conflict(tx: &mut PgTx, cart_id: Uuid, current: i64) -> RepositoryError {
    match load_snapshot(&mut **tx, cart_id).await {
        Ok(items) => RepositoryError::VersionConflict(Box::new(CartState::new(items, current))),
        Err(e) => e,
    }
}

async fn insert_item(tx: &mut PgTx, cart_id: Uuid, item: &NewCartItem) -> RepositoryResult<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO cart_items (
            id, cart_id, product_id, name, slug, price, original_price, image,
            variation_id, color, size, quantity, protection
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(cart_id)
    .bind(item.product_id)
    .bind(&item.name)
    .bind(&item.slug)
    .bind(&item.price)
    .bind(&item.original_price)
    .bind(&item.image)
    .bind(&item.variation_id)
    .bind(&item.color)
    .bind(&item.size)
    .bind(item.quantity)
    .bind(item.protection)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

/// Replace the row holding `item`'s natural key. Legacy NULL color/size rows
/// match their `default` form and are normalized on write.
async fn replace_item(
    tx: &mut PgTx,
    cart_id: Uuid,
    item: &NewCartItem,
) -> RepositoryResult<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE cart_items
        SET name = $6, slug = $7, price = $8, original_price = $9, image = $10,
            color = $4, size = $5, quantity = $11, protection = $12, updated_at = NOW()
        WHERE cart_id = $1 AND product_id = $2 AND variation_id = $3
          AND COALESCE(color, 'default') = $4 AND COALESCE(size, 'default') = $5
        RETURNING id
        "#,
    )
    .bind(cart_id)
    .bind(item.product_id)
    .bind(&item.variation_id)
    .bind(&item.color)
    .bind(&item.size)
    .bind(&item.name)
    .bind(&item.slug)
    .bind(&item.price)
    .bind(&item.original_price)
    .bind(&item.image)
    .bind(item.quantity)
    .bind(item.protection)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(id)
}

async fn merge_item(
    tx: &mut PgTx,
    cart_id: Uuid,
    item: &NewCartItem,
) -> RepositoryResult<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE cart_items
        SET quantity = GREATEST(quantity, $6), protection = protection OR $7, updated_at = NOW()
        WHERE cart_id = $1 AND product_id = $2 AND variation_id = $3
          AND color = $4 AND size = $5
        RETURNING id
        "#,
    )
    .bind(cart_id)
    .bind(item.product_id)
    .bind(&item.variation_id)
    .bind(&item.color)
    .bind(&item.size)
    .bind(item.quantity)
    .bind(item.protection)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(id)
}

async fn delete_by_key(tx: &mut PgTx, cart_id: Uuid, item: &NewCartItem) -> RepositoryResult<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items
        WHERE cart_id = $1 AND product_id = $2 AND variation_id = $3
          AND COALESCE(color, 'default') = $4 AND COALESCE(size, 'default') = $5
        "#,
    )
    .bind(cart_id)
    .bind(item.product_id)
    .bind(&item.variation_id)
    .bind(&item.color)
    .bind(&item.size)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

async fn commit_state(mut tx: PgTx, cart_id: Uuid, version: i64) -> RepositoryResult<CartState> {
    let items = load_snapshot(&mut *tx, cart_id).await?;
    tx.commit().await?;
    Ok(CartState::new(items, version))
}

#[async_trait]
impl CartRepository for PostgresCartRepository {
    async fn get_or_create(&self, owner_id: Uuid) -> RepositoryResult<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, owner_id, version)
            VALUES ($1, $2, 1)
            ON CONFLICT (owner_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        self.find_by_owner(owner_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("cart for owner {}", owner_id)))
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> RepositoryResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT id, owner_id, version, updated_at FROM carts WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CartRow::into_domain))
    }

    async fn snapshot(&self, cart_id: Uuid) -> RepositoryResult<Vec<CartLineItem>> {
        load_snapshot(&self.pool, cart_id).await
    }

    async fn upsert_item(
        &self,
        cart_id: Uuid,
        expected_version: i64,
        item: &NewCartItem,
        idempotency_key: Option<&str>,
    ) -> RepositoryResult<CartState> {
        let mut tx = self.pool.begin().await?;
        let current = lock_version(&mut tx, cart_id).await?;

        if let Some(state) = replay(&mut tx, cart_id, current, idempotency_key).await? {
            tx.commit().await?;
            return Ok(state);
        }
        if expected_version != current {
            return Err(version_conflict(&mut tx, cart_id, current).await);
        }

        let item_id = if item.removes() {
            delete_by_key(&mut tx, cart_id, item).await?;
            None
        } else {
            match replace_item(&mut tx, cart_id, item).await? {
                Some(id) => Some(id),
                None => Some(insert_item(&mut tx, cart_id, item).await?),
            }
        };

        let version = bump_version(&mut tx, cart_id).await?;
        if let Some(key) = idempotency_key {
            record_key(&mut tx, cart_id, key, item_id).await?;
        }

        tracing::info!(cart_id = %cart_id, version, key = %item.selection_key(), "Cart item upserted");
        commit_state(tx, cart_id, version).await
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
        let mut tx = self.pool.begin().await?;
        let current = lock_version(&mut tx, cart_id).await?;

        if let Some(state) = replay(&mut tx, cart_id, current, idempotency_key).await? {
            tx.commit().await?;
            return Ok(state);
        }
        if !mode.admits(expected_version, current) {
            return Err(version_conflict(&mut tx, cart_id, current).await);
        }

        let exists = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM cart_items WHERE id = $1 AND cart_id = $2 FOR UPDATE",
        )
        .bind(item_id)
        .bind(cart_id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound(format!("cart item {}", item_id)));
        }

        if quantity <= 0 {
            sqlx::query("DELETE FROM cart_items WHERE id = $1")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = NOW() WHERE id = $1")
                .bind(item_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
        }

        let version = bump_version(&mut tx, cart_id).await?;
        if let Some(key) = idempotency_key {
            record_key(&mut tx, cart_id, key, Some(item_id)).await?;
        }

        tracing::info!(cart_id = %cart_id, item_id = %item_id, quantity, version, "Cart item quantity set");
        commit_state(tx, cart_id, version).await
    }

    async fn sync_items(
        &self,
        cart_id: Uuid,
        items: &[NewCartItem],
    ) -> RepositoryResult<CartState> {
        let mut tx = self.pool.begin().await?;
        lock_version(&mut tx, cart_id).await?;

        let backfilled = sqlx::query(
            r#"
            UPDATE cart_items
            SET color = COALESCE(color, 'default'), size = COALESCE(size, 'default')
            WHERE cart_id = $1 AND (color IS NULL OR size IS NULL)
            "#,
        )
        .bind(cart_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if backfilled > 0 {
            tracing::debug!(cart_id = %cart_id, rows = backfilled, "Backfilled legacy selection columns");
        }

        let incoming = merge_incoming(items.to_vec());
        for item in &incoming {
            if merge_item(&mut tx, cart_id, item).await?.is_none() {
                insert_item(&mut tx, cart_id, item).await?;
            }
        }

        let version = bump_version(&mut tx, cart_id).await?;
        tracing::info!(cart_id = %cart_id, merged = incoming.len(), version, "Cart synced");
        commit_state(tx, cart_id, version).await
    }

    async fn remove_items(&self, cart_id: Uuid, item_ids: &[Uuid]) -> RepositoryResult<i64> {
        let mut tx = self.pool.begin().await?;
        lock_version(&mut tx, cart_id).await?;

        let removed = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND id = ANY($2)")
            .bind(cart_id)
            .bind(item_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let version = bump_version(&mut tx, cart_id).await?;
        tx.commit().await?;

        tracing::info!(cart_id = %cart_id, removed, version, "Cart items removed");
        Ok(version)
    }
}
