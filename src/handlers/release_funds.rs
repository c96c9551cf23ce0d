use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use stripe::{CreateTransfer, Currency, PaymentIntent, Transfer};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::StripeConfig;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::schema::{orders, seller_accounts};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFundsRequest {
    pub payment_intent_id: Option<String>,
    pub seller_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFundsResponse {
    pub success: bool,
    pub transfer_id: String,
}

// ── Handler ──────────────────────────────────────────────────────────────────

/// POST /api/release-funds
///
/// Buyer-confirmed escrow release: transfers the held charge, minus the
/// platform fee recorded at charge time, to the seller's connected account
/// and marks the order released. The transfer destination and amount come
/// from the store and from Stripe respectively, never from the caller.
#[utoipa::path(
    post,
    path = "/api/release-funds",
    request_body = ReleaseFundsRequest,
    responses(
        (status = 200, description = "Funds transferred", body = ReleaseFundsResponse),
        (status = 400, description = "Missing parameters or order not eligible"),
        (status = 404, description = "Order or seller account not found"),
        (status = 500, description = "Stripe failure"),
    ),
    tag = "payments"
)]
pub async fn release_funds(
    pool: web::Data<DbPool>,
    stripe: web::Data<StripeConfig>,
    body: web::Json<ReleaseFundsRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let (Some(payment_intent_id), Some(seller_id)) = (body.payment_intent_id, body.seller_id)
    else {
        return Err(AppError::BadRequest(
            "Missing paymentIntentId or sellerId".to_string(),
        ));
    };

    let intent_id: stripe::PaymentIntentId = payment_intent_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid paymentIntentId".to_string()))?;

    let (order, seller_account_id) = {
        let pool = pool.clone();
        let payment_intent_id = payment_intent_id.clone();
        web::block(move || {
            let mut conn = pool.get()?;
            let order: Option<Order> = orders::table
                .filter(orders::payment_intent_id.eq(&payment_intent_id))
                .select(Order::as_select())
                .first(&mut conn)
                .optional()?;
            let seller_account_id: Option<String> = seller_accounts::table
                .filter(seller_accounts::user_id.eq(seller_id))
                .select(seller_accounts::stripe_account_id)
                .first(&mut conn)
                .optional()?;
            Ok::<_, AppError>((order, seller_account_id))
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
    };

    let order = order.ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    let seller_account_id = seller_account_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::NotFound("Could not find seller's Stripe account.".to_string()))?;

    match order.status() {
        Some(OrderStatus::Delivered) => {}
        _ => {
            return Err(AppError::BadRequest(
                "Order not eligible for release".to_string(),
            ));
        }
    }

    // The destination is whatever the order recorded at payment time; a
    // caller naming some other seller must not be able to redirect funds.
    if order.seller_stripe_account_id != seller_account_id {
        return Err(AppError::BadRequest(
            "Seller does not match this order".to_string(),
        ));
    }

    // Stripe is ground truth for the held amount; the client never supplies
    // an amount on this path.
    let intent = stripe
        .timed(PaymentIntent::retrieve(&stripe.client, &intent_id, &[]))
        .await?;
    let total_cents = intent.amount;
    let fee_cents = order.platform_fee_cents;
    let transfer_cents = total_cents - fee_cents;
    if transfer_cents <= 0 {
        log::error!(
            "Refusing release for {}: amount {} minus fee {} is not positive",
            payment_intent_id,
            total_cents,
            fee_cents
        );
        return Err(AppError::Internal(
            "Computed transfer amount is not positive".to_string(),
        ));
    }

    let mut params = CreateTransfer::new(Currency::USD, order.seller_stripe_account_id.clone());
    params.amount = Some(transfer_cents);
    // Linking the transfer to the original charge keeps Stripe's ledger
    // tied to the held funds instead of the platform's general balance.
    params.source_transaction = intent.latest_charge.as_ref().map(|charge| charge.id());

    let transfer = stripe
        .timed(Transfer::create(&stripe.client, params))
        .await?;
    let transfer_id = transfer.id.to_string();

    let update_result: Result<usize, AppError> = web::block({
        let pool = pool.clone();
        let payment_intent_id = payment_intent_id.clone();
        move || {
            let mut conn = pool.get()?;
            let updated = diesel::update(
                orders::table
                    .filter(orders::payment_intent_id.eq(&payment_intent_id))
                    .filter(orders::status.eq(OrderStatus::Delivered.as_str())),
            )
            .set(orders::status.eq(OrderStatus::Released.as_str()))
            .execute(&mut conn)?;
            Ok(updated)
        }
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))
    .and_then(|r| r);

    match update_result {
        Ok(1) => {
            log::info!(
                "Released {} cents to {} for payment {} (transfer {})",
                transfer_cents,
                order.seller_stripe_account_id,
                payment_intent_id,
                transfer_id
            );
        }
        Ok(_) | Err(_) => {
            // Funds have moved but the local row did not advance. This is
            // the partial-failure state that needs a human: reversing a
            // transfer has its own failure modes, so no automatic
            // compensation is attempted.
            log::error!(
                "ALERT: transfer {} for payment {} succeeded but order status \
                 update did not; manual reconciliation required",
                transfer_id,
                payment_intent_id
            );
        }
    }

    Ok(HttpResponse::Ok().json(ReleaseFundsResponse {
        success: true,
        transfer_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_stripe_config, unchecked_pool};
    use actix_web::{test, App};

    async fn post_release(body: serde_json::Value) -> actix_web::dev::ServiceResponse {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unchecked_pool()))
                .app_data(web::Data::new(test_stripe_config()))
                .route("/api/release-funds", web::post().to(release_funds)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/release-funds")
            .set_json(body)
            .to_request();
        test::call_service(&app, req).await
    }

    #[actix_web::test]
    async fn missing_payment_intent_id_is_rejected() {
        let resp = post_release(serde_json::json!({ "sellerId": Uuid::new_v4() })).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing paymentIntentId or sellerId");
    }

    #[actix_web::test]
    async fn missing_seller_id_is_rejected() {
        let resp =
            post_release(serde_json::json!({ "paymentIntentId": "pi_123456789" })).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn malformed_payment_intent_id_is_rejected() {
        let resp = post_release(serde_json::json!({
            "paymentIntentId": "not a stripe id",
            "sellerId": Uuid::new_v4()
        }))
        .await;
        assert_eq!(resp.status(), 400);
    }
}
