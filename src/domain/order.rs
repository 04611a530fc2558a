//! Checkout order domain entity.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::cart::CartLineItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Statuses verification refuses to act on.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// Which statuses a failure write is allowed to overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureGuard {
    /// Only a still-pending order (payment window expiry).
    OnlyPending,
    /// Anything except an already-paid order (gateway-reported failure).
    UnlessPaid,
}

impl FailureGuard {
    pub fn allows(self, status: PaymentStatus) -> bool {
        match self {
            FailureGuard::OnlyPending => status == PaymentStatus::Pending,
            FailureGuard::UnlessPaid => status != PaymentStatus::Paid,
        }
    }
}

/// The set of cart selection keys an order was created from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutSelection(BTreeSet<String>);

impl CheckoutSelection {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            keys.into_iter()
                .map(Into::into)
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }

    /// Parse the comma-joined form stored on the order.
    pub fn parse(raw: &str) -> Self {
        Self::from_keys(raw.split(','))
    }

    pub fn serialize(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Items of `snapshot` this selection covers; an empty selection covers all.
    pub fn select<'a>(&self, snapshot: &'a [CartLineItem]) -> Vec<&'a CartLineItem> {
        snapshot
            .iter()
            .filter(|item| self.is_empty() || self.contains(&item.key))
            .collect()
    }
}

/// Convert a major-unit amount to gateway minor units (kobo, cents).
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    (amount.clone() * BigDecimal::from(100)).round(0).to_i64()
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    #[schema(value_type = String)]
    pub subtotal: BigDecimal,
    #[schema(value_type = String)]
    pub shipping_fee: BigDecimal,
    #[schema(value_type = String)]
    pub tax: BigDecimal,
    #[schema(value_type = String)]
    pub protection_fee: BigDecimal,
    #[schema(value_type = String)]
    pub total: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrder {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub order_number: String,
    pub paystack_reference: String,
    pub payment_status: PaymentStatus,
    pub currency: String,
    #[schema(value_type = String)]
    pub subtotal: BigDecimal,
    #[schema(value_type = String)]
    pub shipping_fee: BigDecimal,
    #[schema(value_type = String)]
    pub tax: BigDecimal,
    #[schema(value_type = String)]
    pub protection_fee: BigDecimal,
    #[schema(value_type = String)]
    pub total: BigDecimal,
    pub item_count: i32,
    pub email: Option<String>,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    #[schema(value_type = Option<Object>)]
    pub billing_address: Option<serde_json::Value>,
    pub checkout_selection: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutOrder {
    /// Display number derived from the id when none was stored.
    pub fn derive_order_number(id: Uuid) -> String {
        let hex: String = id.simple().to_string().chars().take(8).collect();
        format!("#{}", hex.to_uppercase())
    }

    pub fn selection(&self) -> CheckoutSelection {
        CheckoutSelection::parse(&self.checkout_selection)
    }

    pub fn expires_at(&self, window: Duration) -> DateTime<Utc> {
        self.created_at + window
    }

    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now >= self.expires_at(window)
    }

    /// Seconds left in the payment window, floored at zero.
    pub fn remaining_seconds(&self, now: DateTime<Utc>, window: Duration) -> i64 {
        (self.expires_at(window) - now).num_seconds().max(0)
    }

    pub fn total_minor_units(&self) -> Option<i64> {
        to_minor_units(&self.total)
    }

    /// Exact match of a gateway-reported amount (minor units) and currency.
    pub fn matches_payment(&self, amount: i64, currency: &str) -> bool {
        self.total_minor_units() == Some(amount) && self.currency == currency
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub image: Option<String>,
    pub variation_id: String,
    pub color: String,
    pub size: String,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: BigDecimal,
    #[schema(value_type = Option<String>)]
    pub original_unit_price: Option<BigDecimal>,
    #[schema(value_type = String)]
    pub line_total: BigDecimal,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to persist a pending order and its item snapshot.
#[derive(Debug, Clone)]
pub struct NewCheckoutOrder {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub order_number: Option<String>,
    pub reference: String,
    pub currency: String,
    pub totals: OrderTotals,
    pub email: Option<String>,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
    pub selection: CheckoutSelection,
    pub items: Vec<NewCheckoutOrderItem>,
}

impl NewCheckoutOrder {
    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Materialize the rows this order will be stored as.
    pub fn into_records(self, now: DateTime<Utc>) -> (CheckoutOrder, Vec<CheckoutOrderItem>) {
        let item_count = self.item_count();
        let order = CheckoutOrder {
            id: self.id,
            owner_id: self.owner_id,
            order_number: self
                .order_number
                .unwrap_or_else(|| CheckoutOrder::derive_order_number(self.id)),
            paystack_reference: self.reference,
            payment_status: PaymentStatus::Pending,
            currency: self.currency,
            subtotal: self.totals.subtotal,
            shipping_fee: self.totals.shipping_fee,
            tax: self.totals.tax,
            protection_fee: self.totals.protection_fee,
            total: self.totals.total,
            item_count,
            email: self.email,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            checkout_selection: self.selection.serialize(),
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        // Offset creation stamps so display order follows snapshot order.
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| CheckoutOrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                product_id: item.product_id,
                name: item.name,
                slug: item.slug,
                image: item.image,
                variation_id: item.variation_id,
                color: item.color,
                size: item.size,
                quantity: item.quantity,
                line_total: item.unit_price.clone() * BigDecimal::from(item.quantity),
                unit_price: item.unit_price,
                original_unit_price: item.original_unit_price,
                created_at: now + Duration::microseconds(idx as i64),
            })
            .collect();

        (order, items)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckoutOrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub image: Option<String>,
    pub variation_id: String,
    pub color: String,
    pub size: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub original_unit_price: Option<BigDecimal>,
}

impl From<&CartLineItem> for NewCheckoutOrderItem {
    fn from(item: &CartLineItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name.clone(),
            slug: item.slug.clone(),
            image: item.image.clone(),
            variation_id: item.variation_id.clone(),
            color: item.color.clone(),
            size: item.size.clone(),
            quantity: item.quantity,
            unit_price: item.price.clone(),
            original_unit_price: item.original_price.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(total: &str, created_at: DateTime<Utc>) -> CheckoutOrder {
        let id = Uuid::new_v4();
        CheckoutOrder {
            id,
            owner_id: Uuid::new_v4(),
            order_number: CheckoutOrder::derive_order_number(id),
            paystack_reference: "MKT-REF".to_string(),
            payment_status: PaymentStatus::Pending,
            currency: "NGN".to_string(),
            subtotal: total.parse().unwrap(),
            shipping_fee: BigDecimal::from(0),
            tax: BigDecimal::from(0),
            protection_fee: BigDecimal::from(0),
            total: total.parse().unwrap(),
            item_count: 1,
            email: None,
            shipping_address: serde_json::json!({}),
            billing_address: None,
            checkout_selection: String::new(),
            paid_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn order_number_is_hash_prefixed_uppercase_hex() {
        let id = Uuid::parse_str("3f2a9b1c-0000-4000-8000-000000000000").unwrap();
        assert_eq!(CheckoutOrder::derive_order_number(id), "#3F2A9B1C");
    }

    #[test]
    fn converts_to_minor_units() {
        assert_eq!(to_minor_units(&"1250.50".parse().unwrap()), Some(125050));
        assert_eq!(to_minor_units(&"10".parse().unwrap()), Some(1000));
    }

    #[test]
    fn payment_match_requires_amount_and_currency() {
        let o = order("1250.50", Utc::now());
        assert!(o.matches_payment(125050, "NGN"));
        assert!(!o.matches_payment(125000, "NGN"));
        assert!(!o.matches_payment(125050, "USD"));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let created = Utc::now();
        let o = order("10", created);
        let window = Duration::minutes(2);
        assert!(!o.is_expired(created + Duration::seconds(119), window));
        assert!(o.is_expired(created + window, window));
        assert_eq!(o.remaining_seconds(created + Duration::seconds(30), window), 90);
        assert_eq!(o.remaining_seconds(created + Duration::minutes(5), window), 0);
    }

    #[test]
    fn selection_round_trips_and_selects() {
        let selection = CheckoutSelection::parse(" b-key, a-key ,,");
        assert_eq!(selection.serialize(), "a-key,b-key");
        assert_eq!(selection.len(), 2);
        assert!(CheckoutSelection::parse("").is_empty());
    }

    #[test]
    fn failure_guards() {
        assert!(FailureGuard::OnlyPending.allows(PaymentStatus::Pending));
        assert!(!FailureGuard::OnlyPending.allows(PaymentStatus::Failed));
        assert!(FailureGuard::UnlessPaid.allows(PaymentStatus::Failed));
        assert!(!FailureGuard::UnlessPaid.allows(PaymentStatus::Paid));
    }

    #[test]
    fn status_parses_from_storage() {
        assert_eq!("paid".parse::<PaymentStatus>(), Ok(PaymentStatus::Paid));
        assert!("settled".parse::<PaymentStatus>().is_err());
        assert!(PaymentStatus::Refunded.is_terminal_failure());
        assert!(!PaymentStatus::Pending.is_terminal_failure());
    }
}
