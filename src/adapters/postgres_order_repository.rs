//! Postgres implementation of OrderRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{CheckoutOrderItemRow, CheckoutOrderRow};
use crate::domain::{CheckoutOrder, CheckoutOrderItem, FailureGuard, NewCheckoutOrder};
use crate::ports::{OrderRepository, RepositoryResult};

const ORDER_COLUMNS: &str = "id, owner_id, order_number, paystack_reference, payment_status, \
     currency, subtotal, shipping_fee, tax, protection_fee, total, item_count, email, \
     shipping_address, billing_address, checkout_selection, paid_at, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, name, slug, image, variation_id, \
     color, size, quantity, unit_price, original_unit_price, line_total, created_at";

/// Postgres-backed checkout order repository.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create(
        &self,
        order: NewCheckoutOrder,
    ) -> RepositoryResult<(CheckoutOrder, Vec<CheckoutOrderItem>)> {
        let (order, items) = order.into_records(Utc::now());
        let mut tx = self.pool.begin().await?;

        let insert_order = format!(
            r#"
            INSERT INTO checkout_orders (
                id, owner_id, order_number, paystack_reference, payment_status, currency,
                subtotal, shipping_fee, tax, protection_fee, total, item_count, email,
                shipping_address, billing_address, checkout_selection, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        let stored = sqlx::query_as::<_, CheckoutOrderRow>(&insert_order)
            .bind(order.id)
            .bind(order.owner_id)
            .bind(&order.order_number)
            .bind(&order.paystack_reference)
            .bind(order.payment_status.as_str())
            .bind(&order.currency)
            .bind(&order.subtotal)
            .bind(&order.shipping_fee)
            .bind(&order.tax)
            .bind(&order.protection_fee)
            .bind(&order.total)
            .bind(order.item_count)
            .bind(&order.email)
            .bind(&order.shipping_address)
            .bind(&order.billing_address)
            .bind(&order.checkout_selection)
            .bind(order.created_at)
            .fetch_one(&mut *tx)
            .await?
            .into_domain()?;

        let insert_item = format!(
            r#"
            INSERT INTO checkout_order_items (
                id, order_id, product_id, name, slug, image, variation_id, color, size,
                quantity, unit_price, original_unit_price, line_total, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            ORDER_ITEM_COLUMNS
        );
        let mut stored_items = Vec::with_capacity(items.len());
        for item in &items {
            let row = sqlx::query_as::<_, CheckoutOrderItemRow>(&insert_item)
                .bind(item.id)
                .bind(item.order_id)
                .bind(item.product_id)
                .bind(&item.name)
                .bind(&item.slug)
                .bind(&item.image)
                .bind(&item.variation_id)
                .bind(&item.color)
                .bind(&item.size)
                .bind(item.quantity)
                .bind(&item.unit_price)
                .bind(&item.original_unit_price)
                .bind(&item.line_total)
                .bind(item.created_at)
                .fetch_one(&mut *tx)
                .await?;
            stored_items.push(row.into_domain());
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %stored.id,
            reference = %stored.paystack_reference,
            items = stored_items.len(),
            "Checkout order created"
        );
        Ok((stored, stored_items))
    }

    async fn find_by_owner_and_reference(
        &self,
        owner_id: Uuid,
        reference: &str,
    ) -> RepositoryResult<Option<CheckoutOrder>> {
        let sql = format!(
            "SELECT {} FROM checkout_orders WHERE owner_id = $1 AND paystack_reference = $2",
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, CheckoutOrderRow>(&sql)
            .bind(owner_id)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CheckoutOrderRow::into_domain).transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<CheckoutOrder>> {
        let sql = format!(
            "SELECT {} FROM checkout_orders WHERE paystack_reference = $1",
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, CheckoutOrderRow>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CheckoutOrderRow::into_domain).transpose()
    }

    async fn items(&self, order_id: Uuid) -> RepositoryResult<Vec<CheckoutOrderItem>> {
        let sql = format!(
            "SELECT {} FROM checkout_order_items WHERE order_id = $1 ORDER BY created_at, id",
            ORDER_ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, CheckoutOrderItemRow>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(CheckoutOrderItemRow::into_domain).collect())
    }

    async fn mark_paid(&self, order_id: Uuid) -> RepositoryResult<Option<CheckoutOrder>> {
        let sql = format!(
            r#"
            UPDATE checkout_orders
            SET payment_status = 'paid', paid_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND payment_status <> 'paid'
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, CheckoutOrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CheckoutOrderRow::into_domain).transpose()
    }

    async fn mark_failed(
        &self,
        order_id: Uuid,
        guard: FailureGuard,
    ) -> RepositoryResult<Option<CheckoutOrder>> {
        let condition = match guard {
            FailureGuard::OnlyPending => "payment_status = 'pending'",
            FailureGuard::UnlessPaid => "payment_status <> 'paid'",
        };
        let sql = format!(
            r#"
            UPDATE checkout_orders
            SET payment_status = 'failed', updated_at = NOW()
            WHERE id = $1 AND {}
            RETURNING {}
            "#,
            condition, ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, CheckoutOrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CheckoutOrderRow::into_domain).transpose()
    }
}
