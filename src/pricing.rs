//! Order totals for a checkout selection.

use bigdecimal::BigDecimal;

use crate::config::CheckoutConfig;
use crate::domain::{CartLineItem, OrderTotals};

/// Price the selected items: flat shipping, tax on the subtotal rounded to
/// two places, protection charged per protected unit.
pub fn price_selection(items: &[&CartLineItem], config: &CheckoutConfig) -> OrderTotals {
    let zero = BigDecimal::from(0);

    let subtotal = items.iter().fold(zero.clone(), |acc, item| {
        acc + item.price.clone() * BigDecimal::from(item.quantity)
    });

    let protected_units: i64 = items
        .iter()
        .filter(|item| item.protection)
        .map(|item| i64::from(item.quantity))
        .sum();
    let protection_fee = config.protection_fee.clone() * BigDecimal::from(protected_units);

    let tax = (subtotal.clone() * config.tax_rate.clone()).round(2);
    let shipping_fee = if items.is_empty() {
        zero
    } else {
        config.shipping_fee.clone()
    };

    let total = subtotal.clone() + shipping_fee.clone() + tax.clone() + protection_fee.clone();

    OrderTotals {
        subtotal,
        shipping_fee,
        tax,
        protection_fee,
        total,
    }
}
