//! Cart domain types.
//!
//! Rows coming out of storage are normalized here once: absent variation,
//! color or size values collapse to [`DEFAULT_SELECTION`] so that the natural
//! key of a line item is always fully populated.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::validation::{self, ValidationError};

/// Sentinel used for an absent variation, color or size.
pub const DEFAULT_SELECTION: &str = "default";

pub const SELECTION_PART_MAX_LEN: usize = 64;
pub const ITEM_NAME_MAX_LEN: usize = 255;
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 128;

/// Collapse a missing or blank selection component to the sentinel.
pub fn normalize_selection(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => DEFAULT_SELECTION.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Natural key of a line item within a cart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectionKey {
    pub product_id: Uuid,
    pub variation_id: String,
    pub color: String,
    pub size: String,
}

impl SelectionKey {
    pub fn new(
        product_id: Uuid,
        variation_id: Option<&str>,
        color: Option<&str>,
        size: Option<&str>,
    ) -> Self {
        Self {
            product_id,
            variation_id: normalize_selection(variation_id),
            color: normalize_selection(color),
            size: normalize_selection(size),
        }
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.product_id, self.variation_id, self.color, self.size
        )
    }
}

/// A persisted cart line item, resolved to its selection key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    /// `product_id-variation-color-size`
    pub key: String,
    pub product_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    #[schema(value_type = String)]
    pub price: BigDecimal,
    #[schema(value_type = Option<String>)]
    pub original_price: Option<BigDecimal>,
    pub image: Option<String>,
    pub variation_id: String,
    pub color: String,
    pub size: String,
    pub quantity: i32,
    pub protection: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLineItem {
    pub fn selection_key(&self) -> SelectionKey {
        SelectionKey::new(
            self.product_id,
            Some(&self.variation_id),
            Some(&self.color),
            Some(&self.size),
        )
    }

    /// Build a fresh row for `cart_id` from a validated payload.
    pub fn from_new(cart_id: Uuid, item: &NewCartItem, now: DateTime<Utc>) -> Self {
        let key = item.selection_key();
        Self {
            id: Uuid::new_v4(),
            cart_id,
            key: key.to_string(),
            product_id: item.product_id,
            name: item.name.clone(),
            slug: item.slug.clone(),
            price: item.price.clone(),
            original_price: item.original_price.clone(),
            image: item.image.clone(),
            variation_id: key.variation_id,
            color: key.color,
            size: key.size,
            quantity: item.quantity,
            protection: item.protection,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Items plus the version they were read at.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    pub items: Vec<CartLineItem>,
    #[serde(rename = "cartVersion")]
    pub version: i64,
}

impl CartState {
    pub fn new(items: Vec<CartLineItem>, version: i64) -> Self {
        Self { items, version }
    }
}

/// How an item-targeted mutation treats a stale version token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMode {
    /// Any mismatch is a conflict.
    Strict,
    /// A stale token is tolerated; the stored version is used as the basis.
    Lenient,
}

impl ConflictMode {
    pub fn admits(self, expected: i64, current: i64) -> bool {
        match self {
            ConflictMode::Strict => expected == current,
            ConflictMode::Lenient => true,
        }
    }
}

/// Cart item payload as sent by clients.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    pub product_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    #[schema(value_type = String)]
    pub price: BigDecimal,
    #[schema(value_type = Option<String>)]
    pub original_price: Option<BigDecimal>,
    pub image: Option<String>,
    pub variation_id: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub quantity: i32,
    #[serde(default)]
    pub protection: bool,
}

/// A validated, normalized cart item ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    pub product_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub price: BigDecimal,
    pub original_price: Option<BigDecimal>,
    pub image: Option<String>,
    pub variation_id: String,
    pub color: String,
    pub size: String,
    pub quantity: i32,
    pub protection: bool,
}

impl NewCartItem {
    pub fn selection_key(&self) -> SelectionKey {
        SelectionKey::new(
            self.product_id,
            Some(&self.variation_id),
            Some(&self.color),
            Some(&self.size),
        )
    }

    pub fn removes(&self) -> bool {
        self.quantity <= 0
    }
}

impl TryFrom<CartItemInput> for NewCartItem {
    type Error = ValidationError;

    fn try_from(input: CartItemInput) -> Result<Self, Self::Error> {
        let name = validation::sanitize_string(&input.name);
        validation::validate_required("name", &name)?;
        validation::validate_max_len("name", &name, ITEM_NAME_MAX_LEN)?;
        validation::validate_non_negative_amount("price", &input.price)?;
        if let Some(original) = &input.original_price {
            validation::validate_non_negative_amount("originalPrice", original)?;
        }

        let variation_id = normalize_selection(input.variation_id.as_deref());
        let color = normalize_selection(input.color.as_deref());
        let size = normalize_selection(input.size.as_deref());
        validation::validate_selection_part("variationId", &variation_id)?;
        validation::validate_selection_part("color", &color)?;
        validation::validate_selection_part("size", &size)?;

        Ok(Self {
            product_id: input.product_id,
            name,
            slug: input.slug.filter(|s| !s.trim().is_empty()),
            price: input.price,
            original_price: input.original_price,
            image: input.image.filter(|s| !s.trim().is_empty()),
            variation_id,
            color,
            size,
            quantity: input.quantity,
            protection: input.protection,
        })
    }
}

/// Fold a client-held item list onto itself so that each natural key appears
/// once, using the same max/OR rule as a server-side merge.
pub fn merge_incoming(items: Vec<NewCartItem>) -> Vec<NewCartItem> {
    let mut merged: Vec<NewCartItem> = Vec::with_capacity(items.len());
    for item in items.into_iter().filter(|i| !i.removes()) {
        let key = item.selection_key();
        match merged.iter_mut().find(|m| m.selection_key() == key) {
            Some(existing) => merge_into(existing, &item),
            None => merged.push(item),
        }
    }
    merged
}

/// Apply the sync merge rule: quantity is the max, protection is the OR.
pub fn merge_into(existing: &mut NewCartItem, incoming: &NewCartItem) {
    existing.quantity = existing.quantity.max(incoming.quantity);
    existing.protection = existing.protection || incoming.protection;
}
