pub mod cart;
pub mod checkout;
pub mod reconciliation;
pub mod verification;
pub mod webhook;

pub use cart::{CartCommand, CartService};
pub use checkout::{CheckoutRequest, CheckoutResult, CheckoutService};
pub use reconciliation::CartReconciler;
pub use verification::{VerificationOutcome, VerificationService};
pub use webhook::{WebhookEvent, WebhookOutcome, WebhookProcessor};
