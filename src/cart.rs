use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::order::OrderItem;

/// Product snapshot carried by each cart line at checkout time.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CartProduct {
    /// Decimal price as a string to avoid floating-point issues, e.g. "49.99"
    pub price: String,
    pub seller_id: Uuid,
    #[serde(default)]
    pub allow_shipping: bool,
    #[serde(default)]
    pub local_pickup_only: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub product: CartProduct,
}

/// A cart that passed every checkout precondition, with its money already
/// fixed in integer cents.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCart {
    pub seller_id: Uuid,
    pub total_cents: i64,
    pub items: Vec<OrderItem>,
}

/// Validate a cart and compute its total.
///
/// Rejections mirror the checkout contract: carts spanning several sellers,
/// carts with nothing to ship, and pickup-only carts never reach Stripe.
/// The total is summed as exact decimals first and rounded to cents once,
/// half-up, so repeated per-line rounding can never drift the charge by a
/// cent.
/// Convert integer cents to the decimal-dollar representation stored on
/// order rows (`99.98` for `9998`).
pub fn cents_to_dollars(cents: i64) -> BigDecimal {
    (BigDecimal::from(cents) / BigDecimal::from(100)).with_scale(2)
}

pub fn validate_cart(items: &[CartItemRequest]) -> Result<ValidatedCart, AppError> {
    if items.is_empty() {
        return Err(AppError::BadRequest(
            "Invalid request: Missing items or userId".to_string(),
        ));
    }

    let seller_id = items[0].product.seller_id;
    if items.iter().any(|item| item.product.seller_id != seller_id) {
        return Err(AppError::BadRequest(
            "Checkout with items from multiple sellers is not yet supported. \
             Please create separate orders."
                .to_string(),
        ));
    }

    if items.iter().all(|item| item.product.local_pickup_only) {
        return Err(AppError::BadRequest(
            "No payment needed for local transactions.".to_string(),
        ));
    }

    if !items.iter().any(|item| item.product.allow_shipping) {
        return Err(AppError::BadRequest(
            "No shippable items found in cart.".to_string(),
        ));
    }

    let mut total = BigDecimal::from(0);
    let mut manifest = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity < 1 {
            return Err(AppError::BadRequest(format!(
                "Invalid quantity {} for product {}",
                item.quantity, item.product_id
            )));
        }
        let price = BigDecimal::from_str(&item.product.price).map_err(|e| {
            AppError::BadRequest(format!("Invalid price '{}': {}", item.product.price, e))
        })?;
        total += price * BigDecimal::from(item.quantity);
        manifest.push(OrderItem {
            product_id: item.product_id,
            quantity: item.quantity,
        });
    }

    let total_cents = (total * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()
        .ok_or_else(|| AppError::BadRequest("Cart total out of range".to_string()))?;

    Ok(ValidatedCart {
        seller_id,
        total_cents,
        items: manifest,
    })
}
