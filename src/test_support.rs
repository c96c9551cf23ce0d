//! Helpers for handler tests that must never reach a real database or
//! Stripe: the pool is lazy (nothing connects until a query runs) and the
//! Stripe keys are dummies.

use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

use crate::config::StripeConfig;
use crate::db::DbPool;

pub fn unchecked_pool() -> DbPool {
    let manager =
        ConnectionManager::<PgConnection>::new("postgres://localhost:1/unreachable_test_db");
    Pool::builder().build_unchecked(manager)
}

pub fn test_stripe_config() -> StripeConfig {
    StripeConfig {
        client: stripe::Client::new("sk_test_dummy"),
        webhook_secret: "whsec_test_secret".to_string(),
        platform_fee_bps: 500,
        request_timeout: Duration::from_secs(5),
        base_url: "http://localhost:3000".to_string(),
    }
}
