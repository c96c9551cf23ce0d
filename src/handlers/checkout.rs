use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use stripe::{CreatePaymentIntent, Currency, PaymentIntent};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cart::{self, CartItemRequest};
use crate::config::StripeConfig;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::checkout_intent::NewCheckoutIntent;
use crate::models::seller_account::SellerAccount;
use crate::schema::{checkout_intents, seller_accounts};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentIntentRequest {
    #[serde(default)]
    pub items: Vec<CartItemRequest>,
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub seller_stripe_account_id: String,
}

// ── Handler ──────────────────────────────────────────────────────────────────

/// POST /api/create-payment-intent
///
/// Validates the cart, resolves the seller's connected account, and creates
/// a PaymentIntent for the total with the platform fee and order manifest
/// recorded in its metadata. Funds stay on the platform account until the
/// buyer confirms delivery; the transfer to the seller happens in the
/// release handler.
#[utoipa::path(
    post,
    path = "/api/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = CreatePaymentIntentResponse),
        (status = 400, description = "Cart failed validation"),
        (status = 500, description = "Seller not payment-ready or Stripe failure"),
    ),
    tag = "checkout"
)]
pub async fn create_payment_intent(
    pool: web::Data<DbPool>,
    stripe: web::Data<StripeConfig>,
    body: web::Json<CreatePaymentIntentRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    let Some(user_id) = body.user_id else {
        return Err(AppError::BadRequest(
            "Invalid request: Missing items or userId".to_string(),
        ));
    };

    // Every rejection happens before any call to Stripe.
    let validated = cart::validate_cart(&body.items)?;

    let seller = {
        let pool = pool.clone();
        let seller_id = validated.seller_id;
        web::block(move || {
            let mut conn = pool.get()?;
            let account = seller_accounts::table
                .filter(seller_accounts::user_id.eq(seller_id))
                .select(SellerAccount::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<_, AppError>(account)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
    };

    let seller = match seller {
        Some(account) if account.payouts_enabled && !account.stripe_account_id.is_empty() => {
            account
        }
        _ => {
            log::error!(
                "Could not find payout-ready Stripe account for seller {}",
                validated.seller_id
            );
            return Err(AppError::SellerNotReady);
        }
    };

    let platform_fee_cents = stripe.platform_fee_cents(validated.total_cents);
    let items_json = serde_json::to_value(&validated.items)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut params = CreatePaymentIntent::new(validated.total_cents, Currency::USD);
    params.metadata = Some(HashMap::from([
        ("userId".to_string(), user_id.to_string()),
        ("sellerId".to_string(), validated.seller_id.to_string()),
        (
            "sellerStripeAccountId".to_string(),
            seller.stripe_account_id.clone(),
        ),
        (
            "platformFeeCents".to_string(),
            platform_fee_cents.to_string(),
        ),
        ("orderItems".to_string(), items_json.to_string()),
    ]));

    let intent = stripe
        .timed(PaymentIntent::create(&stripe.client, params))
        .await?;

    let client_secret = intent.client_secret.clone().ok_or_else(|| {
        AppError::Internal("PaymentIntent was created without a client secret".to_string())
    })?;

    // Record the draft so the webhook can reconcile against a local row
    // instead of round-tripped metadata. A failure here is not fatal: the
    // metadata fallback still reconstructs the order.
    let draft = NewCheckoutIntent {
        id: Uuid::new_v4(),
        payment_intent_id: intent.id.to_string(),
        user_id,
        seller_id: validated.seller_id,
        seller_stripe_account_id: seller.stripe_account_id.clone(),
        total_amount: cart::cents_to_dollars(validated.total_cents),
        platform_fee_cents,
        items: items_json,
    };
    let draft_result: Result<(), AppError> = web::block({
        let pool = pool.clone();
        move || {
            let mut conn = pool.get()?;
            diesel::insert_into(checkout_intents::table)
                .values(&draft)
                .on_conflict(checkout_intents::payment_intent_id)
                .do_nothing()
                .execute(&mut conn)?;
            Ok(())
        }
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))
    .and_then(|r| r);
    if let Err(e) = draft_result {
        log::error!(
            "Failed to record checkout intent for {}: {}",
            intent.id,
            e
        );
    }

    Ok(HttpResponse::Ok().json(CreatePaymentIntentResponse {
        client_secret,
        payment_intent_id: intent.id.to_string(),
        seller_stripe_account_id: seller.stripe_account_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_stripe_config, unchecked_pool};
    use actix_web::{test, App};

    fn app_routes() -> actix_web::Scope {
        web::scope("/api").route(
            "/create-payment-intent",
            web::post().to(create_payment_intent),
        )
    }

    #[actix_web::test]
    async fn missing_user_id_is_rejected_before_any_io() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unchecked_pool()))
                .app_data(web::Data::new(test_stripe_config()))
                .service(app_routes()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/create-payment-intent")
            .set_json(serde_json::json!({
                "items": [{
                    "product_id": Uuid::new_v4(),
                    "quantity": 1,
                    "product": {
                        "price": "10.00",
                        "seller_id": Uuid::new_v4(),
                        "allow_shipping": true
                    }
                }]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn multi_seller_cart_is_rejected_with_specific_error() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unchecked_pool()))
                .app_data(web::Data::new(test_stripe_config()))
                .service(app_routes()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/create-payment-intent")
            .set_json(serde_json::json!({
                "userId": Uuid::new_v4(),
                "items": [
                    {
                        "product_id": Uuid::new_v4(),
                        "quantity": 1,
                        "product": {
                            "price": "10.00",
                            "seller_id": Uuid::new_v4(),
                            "allow_shipping": true
                        }
                    },
                    {
                        "product_id": Uuid::new_v4(),
                        "quantity": 1,
                        "product": {
                            "price": "5.00",
                            "seller_id": Uuid::new_v4(),
                            "allow_shipping": true
                        }
                    }
                ]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("multiple sellers"));
    }

    #[actix_web::test]
    async fn empty_cart_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unchecked_pool()))
                .app_data(web::Data::new(test_stripe_config()))
                .service(app_routes()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/create-payment-intent")
            .set_json(serde_json::json!({ "userId": Uuid::new_v4(), "items": [] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}
