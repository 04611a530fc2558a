//! Row types for SQLx. Converted to domain records at the adapter boundary.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::cart::{normalize_selection, SelectionKey};
use crate::domain::{Cart, CartLineItem, CheckoutOrder, CheckoutOrderItem, PaymentStatus};
use crate::ports::RepositoryError;

#[derive(Debug, FromRow)]
pub struct CartRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl CartRow {
    pub fn into_domain(self) -> Cart {
        Cart {
            id: self.id,
            owner_id: self.owner_id,
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

/// Legacy rows may hold NULL color or size.
#[derive(Debug, FromRow)]
pub struct CartItemRow {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub price: BigDecimal,
    pub original_price: Option<BigDecimal>,
    pub image: Option<String>,
    pub variation_id: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub quantity: i32,
    pub protection: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItemRow {
    pub fn into_domain(self) -> CartLineItem {
        let key = SelectionKey::new(
            self.product_id,
            self.variation_id.as_deref(),
            self.color.as_deref(),
            self.size.as_deref(),
        );
        CartLineItem {
            id: self.id,
            cart_id: self.cart_id,
            key: key.to_string(),
            product_id: self.product_id,
            name: self.name,
            slug: self.slug,
            price: self.price,
            original_price: self.original_price,
            image: self.image,
            variation_id: key.variation_id,
            color: key.color,
            size: key.size,
            quantity: self.quantity,
            protection: self.protection,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CheckoutOrderRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub order_number: Option<String>,
    pub paystack_reference: String,
    pub payment_status: String,
    pub currency: String,
    pub subtotal: BigDecimal,
    pub shipping_fee: BigDecimal,
    pub tax: BigDecimal,
    pub protection_fee: BigDecimal,
    pub total: BigDecimal,
    pub item_count: i32,
    pub email: Option<String>,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
    pub checkout_selection: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutOrderRow {
    pub fn into_domain(self) -> Result<CheckoutOrder, RepositoryError> {
        let payment_status = self
            .payment_status
            .parse::<PaymentStatus>()
            .map_err(|message| RepositoryError::Database {
                code: None,
                message,
            })?;

        Ok(CheckoutOrder {
            id: self.id,
            owner_id: self.owner_id,
            order_number: self
                .order_number
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| CheckoutOrder::derive_order_number(self.id)),
            paystack_reference: self.paystack_reference,
            payment_status,
            currency: self.currency,
            subtotal: self.subtotal,
            shipping_fee: self.shipping_fee,
            tax: self.tax,
            protection_fee: self.protection_fee,
            total: self.total,
            item_count: self.item_count,
            email: self.email,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            checkout_selection: self.checkout_selection.unwrap_or_default(),
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct CheckoutOrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub image: Option<String>,
    pub variation_id: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub original_unit_price: Option<BigDecimal>,
    pub line_total: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl CheckoutOrderItemRow {
    pub fn into_domain(self) -> CheckoutOrderItem {
        CheckoutOrderItem {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            name: self.name,
            slug: self.slug,
            image: self.image,
            variation_id: normalize_selection(self.variation_id.as_deref()),
            color: normalize_selection(self.color.as_deref()),
            size: normalize_selection(self.size.as_deref()),
            quantity: self.quantity,
            unit_price: self.unit_price,
            original_unit_price: self.original_unit_price,
            line_total: self.line_total,
            created_at: self.created_at,
        }
    }
}
