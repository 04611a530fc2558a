//! Framework-agnostic cart and checkout entities.

pub mod cart;
pub mod order;

pub use cart::{Cart, CartLineItem, CartState, ConflictMode, NewCartItem, SelectionKey};
pub use order::{
    CheckoutOrder, CheckoutOrderItem, CheckoutSelection, FailureGuard, NewCheckoutOrder,
    NewCheckoutOrderItem, OrderTotals, PaymentStatus,
};
