pub mod checkout_intent;
pub mod order;
pub mod seller_account;
pub mod stripe_event;
pub mod user;
