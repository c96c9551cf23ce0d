use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::orders;

/// Order lifecycle. Transitions are monotonic and single-directional;
/// `Released` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingDelivery,
    Delivered,
    Released,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::PendingDelivery => "pending_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Released => "released",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_delivery" => Some(OrderStatus::PendingDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "released" => Some(OrderStatus::Released),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::PendingDelivery, OrderStatus::Delivered)
                | (OrderStatus::PendingDelivery, OrderStatus::Cancelled)
                | (OrderStatus::Delivered, OrderStatus::Released)
                | (OrderStatus::Delivered, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an order manifest. This is the shape serialized into the
/// PaymentIntent's `orderItems` metadata and into the `items` jsonb column,
/// so the field casing matches the checkout wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(rename = "productId")]
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_amount: BigDecimal,
    pub payment_intent_id: String,
    pub status: String,
    pub items: Value,
    pub seller_stripe_account_id: String,
    pub platform_fee_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::parse(&self.status)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_amount: BigDecimal,
    pub payment_intent_id: String,
    pub status: String,
    pub items: Value,
    pub seller_stripe_account_id: String,
    pub platform_fee_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::PendingDelivery,
            OrderStatus::Delivered,
            OrderStatus::Released,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn delivery_then_release_is_the_happy_path() {
        assert!(OrderStatus::PendingDelivery.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Released));
    }

    #[test]
    fn release_requires_delivery_first() {
        assert!(!OrderStatus::PendingDelivery.can_transition_to(OrderStatus::Released));
    }

    #[test]
    fn released_is_terminal() {
        for next in [
            OrderStatus::PendingDelivery,
            OrderStatus::Delivered,
            OrderStatus::Released,
            OrderStatus::Cancelled,
        ] {
            assert!(!OrderStatus::Released.can_transition_to(next));
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn no_backwards_transitions() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::PendingDelivery));
    }

    #[test]
    fn order_item_uses_metadata_casing() {
        let item = OrderItem {
            product_id: Uuid::nil(),
            quantity: 2,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "productId": "00000000-0000-0000-0000-000000000000",
                "quantity": 2
            })
        );
    }
}
