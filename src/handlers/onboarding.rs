use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use stripe::{Account, AccountLink, AccountLinkType, AccountType, CreateAccount, CreateAccountLink};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::StripeConfig;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::seller_account::SellerAccount;
use crate::models::user::User;
use crate::schema::{seller_accounts, users};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StripeOnboardRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StripeOnboardResponse {
    pub account_link: String,
    pub account_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayoutStatusResponse {
    pub connected: bool,
    pub payouts_enabled: bool,
    pub stripe_account_id: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /api/stripe-onboard
///
/// Starts Express onboarding for a seller. The created account carries the
/// marketplace user id in its metadata; that is the only link the webhook
/// has when `account.updated` arrives, so it is set here and nowhere else.
/// No seller_accounts row is written: that table is owned by the webhook
/// handler and only materializes once Stripe reports payouts enabled.
#[utoipa::path(
    post,
    path = "/api/stripe-onboard",
    request_body = StripeOnboardRequest,
    responses(
        (status = 200, description = "Onboarding link created", body = StripeOnboardResponse),
        (status = 400, description = "Missing userId"),
        (status = 404, description = "Unknown user"),
        (status = 500, description = "Stripe failure"),
    ),
    tag = "onboarding"
)]
pub async fn stripe_onboard(
    pool: web::Data<DbPool>,
    stripe: web::Data<StripeConfig>,
    body: web::Json<StripeOnboardRequest>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = body.into_inner().user_id else {
        return Err(AppError::BadRequest("Missing userId".to_string()));
    };

    let user = {
        let pool = pool.clone();
        web::block(move || {
            let mut conn = pool.get()?;
            let user: Option<User> = users::table
                .find(user_id)
                .select(User::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<_, AppError>(user)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
    };
    let user = user.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut params = CreateAccount::new();
    params.type_ = Some(AccountType::Express);
    params.email = Some(&user.email);
    params.metadata = Some(HashMap::from([(
        "userId".to_string(),
        user.id.to_string(),
    )]));

    let account = stripe
        .timed(Account::create(&stripe.client, params))
        .await?;

    let return_to = format!("{}/sell", stripe.base_url);
    let mut link_params =
        CreateAccountLink::new(account.id.clone(), AccountLinkType::AccountOnboarding);
    link_params.refresh_url = Some(&return_to);
    link_params.return_url = Some(&return_to);

    let link = stripe
        .timed(AccountLink::create(&stripe.client, link_params))
        .await?;

    log::info!(
        "Created Express account {} for user {}; onboarding link issued",
        account.id,
        user.id
    );

    Ok(HttpResponse::Ok().json(StripeOnboardResponse {
        account_link: link.url,
        account_id: account.id.to_string(),
    }))
}

/// GET /api/sellers/{user_id}/payout-status
///
/// Lets the seller dashboard poll whether onboarding has completed. A
/// missing row simply means Stripe has not reported the account enabled
/// yet.
#[utoipa::path(
    get,
    path = "/api/sellers/{user_id}/payout-status",
    params(
        ("user_id" = Uuid, Path, description = "Seller's user id"),
    ),
    responses(
        (status = 200, description = "Payout status", body = PayoutStatusResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "onboarding"
)]
pub async fn payout_status(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();

    let account = {
        let pool = pool.clone();
        web::block(move || {
            let mut conn = pool.get()?;
            let account: Option<SellerAccount> = seller_accounts::table
                .filter(seller_accounts::user_id.eq(user_id))
                .select(SellerAccount::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<_, AppError>(account)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
    };

    let response = match account {
        Some(account) => PayoutStatusResponse {
            connected: true,
            payouts_enabled: account.payouts_enabled,
            stripe_account_id: Some(account.stripe_account_id),
        },
        None => PayoutStatusResponse {
            connected: false,
            payouts_enabled: false,
            stripe_account_id: None,
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_stripe_config, unchecked_pool};
    use actix_web::{test, App};

    #[actix_web::test]
    async fn missing_user_id_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unchecked_pool()))
                .app_data(web::Data::new(test_stripe_config()))
                .route("/api/stripe-onboard", web::post().to(stripe_onboard)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/stripe-onboard")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing userId");
    }
}
