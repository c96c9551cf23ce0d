use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::seller_accounts;

/// A marketplace participant's link to their Stripe connected account.
///
/// Rows are created and updated only by the webhook handler when Stripe
/// reports the account state; the checkout and release handlers read them.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = seller_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SellerAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_account_id: String,
    pub payouts_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = seller_accounts)]
pub struct NewSellerAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_account_id: String,
    pub payouts_enabled: bool,
}
