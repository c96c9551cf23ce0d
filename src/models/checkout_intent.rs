use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::checkout_intents;

/// Draft of an in-flight checkout, written when the PaymentIntent is
/// created. The webhook handler reconciles `payment_intent.succeeded`
/// against this row; the PaymentIntent metadata is only a fallback for the
/// crash window between the Stripe call and this insert.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = checkout_intents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CheckoutIntent {
    pub id: Uuid,
    pub payment_intent_id: String,
    pub user_id: Uuid,
    pub seller_id: Uuid,
    pub seller_stripe_account_id: String,
    pub total_amount: BigDecimal,
    pub platform_fee_cents: i64,
    pub items: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = checkout_intents)]
pub struct NewCheckoutIntent {
    pub id: Uuid,
    pub payment_intent_id: String,
    pub user_id: Uuid,
    pub seller_id: Uuid,
    pub seller_stripe_account_id: String,
    pub total_amount: BigDecimal,
    pub platform_fee_cents: i64,
    pub items: Value,
}
