use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::domain::cart::CartItemInput;
use crate::domain::{CartLineItem, CartState, CheckoutOrder, CheckoutOrderItem, PaymentStatus};
use crate::handlers::{self, cart, checkout, payments};
use crate::health::HealthResponse;
use crate::services::CheckoutRequest;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace Core API",
        description = "Versioned carts, checkout orders and Paystack payment reconciliation"
    ),
    paths(
        handlers::health,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::delete_item,
        cart::sync_cart,
        checkout::create_checkout,
        checkout::get_order,
        payments::verify_payment,
        payments::paystack_webhook,
    ),
    components(schemas(
        HealthResponse,
        CartItemInput,
        CartLineItem,
        CartState,
        cart::UpdateQuantityRequest,
        cart::SyncCartRequest,
        CheckoutRequest,
        CheckoutOrder,
        CheckoutOrderItem,
        PaymentStatus,
        checkout::CheckoutResponse,
        checkout::OrderResponse,
        payments::VerifyPaymentRequest,
        payments::PaymentVerifiedResponse,
        payments::AwaitingConfirmationResponse,
    )),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Cart", description = "Versioned cart mutations"),
        (name = "Checkout", description = "Order creation and lookup"),
        (name = "Payments", description = "Payment verification and gateway webhooks")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_payment_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/payments/verify"));
        assert!(doc.paths.paths.contains_key("/cart/items/{item_id}"));
    }
}
