use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse};
use diesel::prelude::*;
use serde_json::json;
use stripe::{Event, EventObject, Webhook};
use uuid::Uuid;

use crate::cart;
use crate::config::StripeConfig;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::checkout_intent::CheckoutIntent;
use crate::models::order::{NewOrder, OrderItem, OrderStatus};
use crate::models::seller_account::NewSellerAccount;
use crate::models::stripe_event::NewStripeWebhookEvent;
use crate::schema::{checkout_intents, orders, seller_accounts, stripe_webhook_events, users};

/// POST /api/stripe-webhook
///
/// Entry point for Stripe's notification channel. The signature is checked
/// before any field of the payload is trusted; the event id is then claimed
/// in the processed-event ledger so at-least-once delivery collapses to
/// exactly-once processing. A store failure during processing returns 500,
/// which makes Stripe redeliver. That is safe because replays are deduplicated
/// here and the order insert is keyed on the PaymentIntent id.
#[utoipa::path(
    post,
    path = "/api/stripe-webhook",
    request_body(content = String, description = "Raw Stripe webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed or ignored"),
        (status = 400, description = "Signature verification failed"),
        (status = 500, description = "Persistence failure; Stripe will redeliver"),
    ),
    tag = "webhooks"
)]
pub async fn stripe_event_handler(
    pool: web::Data<DbPool>,
    stripe: web::Data<StripeConfig>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?
        .to_string();

    let payload = std::str::from_utf8(&body)
        .map_err(|_| AppError::BadRequest("Webhook body is not valid UTF-8".to_string()))?;

    let event = match Webhook::construct_event(payload, &signature, &stripe.webhook_secret) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("Webhook signature verification failed: {}", e);
            return Err(AppError::BadRequest(format!("Webhook Error: {}", e)));
        }
    };

    let event_id = event.id.to_string();
    let event_type = event.type_.to_string();

    if claim_event(&pool, &event, &event_id, &event_type).await? {
        log::info!("Webhook event {} already processed; acknowledging", event_id);
        return Ok(HttpResponse::Ok().json(json!({ "received": true })));
    }

    match process_event(&pool, &stripe, &event).await {
        Ok(()) => {
            mark_processed(&pool, &event_id).await?;
            Ok(HttpResponse::Ok().json(json!({ "received": true })))
        }
        Err(e) => {
            log::error!(
                "Failed to process webhook event {} ({}): {}",
                event_id,
                event_type,
                e
            );
            // The ledger row keeps `processed = false` so redelivery gets
            // another attempt; the error is recorded for operators.
            if let Err(record_err) = record_failure(&pool, &event_id, &e.to_string()).await {
                log::error!(
                    "Failed to record webhook failure for {}: {}",
                    event_id,
                    record_err
                );
            }
            Err(e)
        }
    }
}

/// Claim the event id in the ledger. Returns true when the event was
/// already fully processed (replay) and must only be acknowledged.
async fn claim_event(
    pool: &web::Data<DbPool>,
    event: &Event,
    event_id: &str,
    event_type: &str,
) -> Result<bool, AppError> {
    let claim = NewStripeWebhookEvent {
        id: Uuid::new_v4(),
        stripe_event_id: event_id.to_string(),
        event_type: event_type.to_string(),
        payload: serde_json::to_value(event).unwrap_or_default(),
    };
    let pool = pool.clone();
    web::block(move || {
        let mut conn = pool.get()?;
        let processed: bool = diesel::select(diesel::dsl::exists(
            stripe_webhook_events::table
                .filter(stripe_webhook_events::stripe_event_id.eq(&claim.stripe_event_id))
                .filter(stripe_webhook_events::processed.eq(true)),
        ))
        .get_result(&mut conn)?;
        if processed {
            return Ok::<bool, AppError>(true);
        }
        diesel::insert_into(stripe_webhook_events::table)
            .values(&claim)
            .on_conflict(stripe_webhook_events::stripe_event_id)
            .do_nothing()
            .execute(&mut conn)?;
        Ok(false)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

async fn mark_processed(pool: &web::Data<DbPool>, event_id: &str) -> Result<(), AppError> {
    let pool = pool.clone();
    let event_id = event_id.to_string();
    web::block(move || {
        let mut conn = pool.get()?;
        diesel::update(stripe_webhook_events::table)
            .filter(stripe_webhook_events::stripe_event_id.eq(&event_id))
            .set(stripe_webhook_events::processed.eq(true))
            .execute(&mut conn)?;
        Ok::<(), AppError>(())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

async fn record_failure(
    pool: &web::Data<DbPool>,
    event_id: &str,
    error: &str,
) -> Result<(), AppError> {
    let pool = pool.clone();
    let event_id = event_id.to_string();
    let error = error.to_string();
    web::block(move || {
        let mut conn = pool.get()?;
        diesel::update(stripe_webhook_events::table)
            .filter(stripe_webhook_events::stripe_event_id.eq(&event_id))
            .set(stripe_webhook_events::processing_error.eq(Some(&error)))
            .execute(&mut conn)?;
        Ok::<(), AppError>(())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

async fn process_event(
    pool: &web::Data<DbPool>,
    stripe: &StripeConfig,
    event: &Event,
) -> Result<(), AppError> {
    match event.type_.to_string().as_str() {
        "account.updated" => {
            if let EventObject::Account(account) = &event.data.object {
                handle_account_updated(pool, account).await
            } else {
                Ok(())
            }
        }
        "payment_intent.succeeded" => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                handle_payment_succeeded(pool, stripe, intent).await
            } else {
                Ok(())
            }
        }
        "payment_intent.payment_failed" => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                handle_payment_failed(pool, intent).await
            } else {
                Ok(())
            }
        }
        other => {
            log::info!("Unhandled webhook event type {}", other);
            Ok(())
        }
    }
}

/// Stripe reports a connected account changed. Once payouts are enabled,
/// link the account to the marketplace user carried in its metadata.
async fn handle_account_updated(
    pool: &web::Data<DbPool>,
    account: &stripe::Account,
) -> Result<(), AppError> {
    if !account.payouts_enabled.unwrap_or(false) {
        log::info!(
            "Account {} not fully onboarded yet (payouts not enabled); skipping",
            account.id
        );
        return Ok(());
    }

    let Some(user_id_raw) = account
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.get("userId"))
        .cloned()
    else {
        // Data-integrity fault: without the metadata link there is nothing
        // to update, and redelivery would see the same payload again.
        log::error!(
            "No userId in account metadata for account {}; cannot link seller",
            account.id
        );
        return Ok(());
    };

    let Ok(user_id) = Uuid::parse_str(&user_id_raw) else {
        log::error!(
            "Malformed userId '{}' in metadata for account {}",
            user_id_raw,
            account.id
        );
        return Ok(());
    };

    let stripe_account_id = account.id.to_string();
    let linked = {
        let pool = pool.clone();
        let stripe_account_id = stripe_account_id.clone();
        web::block(move || {
            let mut conn = pool.get()?;
            let known: bool = diesel::select(diesel::dsl::exists(
                users::table.filter(users::id.eq(user_id)),
            ))
            .get_result(&mut conn)?;
            if !known {
                return Ok::<bool, AppError>(false);
            }
            diesel::insert_into(seller_accounts::table)
                .values(&NewSellerAccount {
                    id: Uuid::new_v4(),
                    user_id,
                    stripe_account_id: stripe_account_id.clone(),
                    payouts_enabled: true,
                })
                .on_conflict(seller_accounts::user_id)
                .do_update()
                .set((
                    seller_accounts::stripe_account_id.eq(&stripe_account_id),
                    seller_accounts::payouts_enabled.eq(true),
                ))
                .execute(&mut conn)?;
            Ok(true)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
    };

    if linked {
        log::info!(
            "Linked seller {} to Stripe account {} with payouts enabled",
            user_id,
            stripe_account_id
        );
    } else {
        // Unknown identity: acknowledge without writing so a mistyped or
        // foreign metadata value cannot create an orphaned seller record.
        log::error!(
            "User {} from Stripe account {} metadata is not a known identity; skipping upsert",
            user_id,
            stripe_account_id
        );
    }
    Ok(())
}

#[derive(Debug)]
enum IngestOutcome {
    Created(Uuid),
    Duplicate,
    Unrecoverable,
}

/// A payment completed. Materialize the order, preferring the local
/// checkout draft and falling back to the PaymentIntent metadata.
async fn handle_payment_succeeded(
    pool: &web::Data<DbPool>,
    stripe: &StripeConfig,
    intent: &stripe::PaymentIntent,
) -> Result<(), AppError> {
    let payment_intent_id = intent.id.to_string();
    let amount_cents = intent.amount;
    let parsed = parse_intent_metadata(&intent.metadata);
    let fallback_fee_cents = stripe.platform_fee_cents(amount_cents);

    let outcome = {
        let pool = pool.clone();
        let payment_intent_id = payment_intent_id.clone();
        web::block(move || {
            let mut conn = pool.get()?;

            let draft: Option<CheckoutIntent> = checkout_intents::table
                .filter(checkout_intents::payment_intent_id.eq(&payment_intent_id))
                .select(CheckoutIntent::as_select())
                .first(&mut conn)
                .optional()?;

            let total_amount = cart::cents_to_dollars(amount_cents);

            let (user_id, seller_stripe_account_id, platform_fee_cents, items) = match &draft {
                Some(draft) => {
                    if draft.total_amount.with_scale(2) != total_amount {
                        log::warn!(
                            "Draft total {} disagrees with charged amount {} for {}; \
                             using the processor amount",
                            draft.total_amount,
                            total_amount,
                            payment_intent_id
                        );
                    }
                    (
                        draft.user_id,
                        draft.seller_stripe_account_id.clone(),
                        draft.platform_fee_cents,
                        draft.items.clone(),
                    )
                }
                None => {
                    let Some(parsed) = parsed else {
                        return Ok::<IngestOutcome, AppError>(IngestOutcome::Unrecoverable);
                    };
                    // The draft is gone (crash window at intake); resolve
                    // the payout destination from metadata or the store.
                    let destination = match parsed.seller_stripe_account_id {
                        Some(destination) => destination,
                        None => {
                            let Some(seller_id) = parsed.seller_id else {
                                return Ok(IngestOutcome::Unrecoverable);
                            };
                            let destination: Option<String> = seller_accounts::table
                                .filter(seller_accounts::user_id.eq(seller_id))
                                .select(seller_accounts::stripe_account_id)
                                .first(&mut conn)
                                .optional()?;
                            match destination {
                                Some(destination) => destination,
                                None => return Ok(IngestOutcome::Unrecoverable),
                            }
                        }
                    };
                    let items = serde_json::to_value(&parsed.items)
                        .map_err(|e| AppError::Internal(e.to_string()))?;
                    (
                        parsed.user_id,
                        destination,
                        parsed.platform_fee_cents.unwrap_or(fallback_fee_cents),
                        items,
                    )
                }
            };

            let order_id = Uuid::new_v4();
            conn.transaction::<_, AppError, _>(|conn| {
                let inserted = diesel::insert_into(orders::table)
                    .values(&NewOrder {
                        id: order_id,
                        user_id,
                        total_amount,
                        payment_intent_id: payment_intent_id.clone(),
                        status: OrderStatus::PendingDelivery.to_string(),
                        items,
                        seller_stripe_account_id,
                        platform_fee_cents,
                    })
                    .on_conflict(orders::payment_intent_id)
                    .do_nothing()
                    .execute(conn)?;

                // The draft is consumed either way.
                diesel::delete(
                    checkout_intents::table
                        .filter(checkout_intents::payment_intent_id.eq(&payment_intent_id)),
                )
                .execute(conn)?;

                if inserted == 0 {
                    Ok(IngestOutcome::Duplicate)
                } else {
                    Ok(IngestOutcome::Created(order_id))
                }
            })
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
    };

    match outcome {
        IngestOutcome::Created(order_id) => {
            log::info!(
                "Created order {} for payment {} ({} cents)",
                order_id,
                payment_intent_id,
                amount_cents
            );
        }
        IngestOutcome::Duplicate => {
            log::info!(
                "Order for payment {} already exists; skipping insert",
                payment_intent_id
            );
        }
        IngestOutcome::Unrecoverable => {
            // No draft and no usable metadata: the order cannot be
            // reconstructed from this event alone. Acknowledge and flag
            // for out-of-band investigation.
            log::error!(
                "Payment {} succeeded but no checkout draft or usable metadata exists; \
                 order NOT created",
                payment_intent_id
            );
        }
    }
    Ok(())
}

/// A payment failed; drop the draft so it cannot be mistaken for a live
/// checkout later.
async fn handle_payment_failed(
    pool: &web::Data<DbPool>,
    intent: &stripe::PaymentIntent,
) -> Result<(), AppError> {
    let payment_intent_id = intent.id.to_string();
    let removed = {
        let pool = pool.clone();
        let payment_intent_id = payment_intent_id.clone();
        web::block(move || {
            let mut conn = pool.get()?;
            let removed = diesel::delete(
                checkout_intents::table
                    .filter(checkout_intents::payment_intent_id.eq(&payment_intent_id)),
            )
            .execute(&mut conn)?;
            Ok::<usize, AppError>(removed)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??
    };
    log::warn!(
        "Payment {} failed; removed {} checkout draft(s)",
        payment_intent_id,
        removed
    );
    Ok(())
}

#[derive(Debug, PartialEq)]
struct IntentMetadata {
    user_id: Uuid,
    seller_id: Option<Uuid>,
    seller_stripe_account_id: Option<String>,
    platform_fee_cents: Option<i64>,
    items: Vec<OrderItem>,
}

/// Parse the order snapshot embedded in PaymentIntent metadata at intake
/// time. Returns None when the buyer or the manifest is missing, the two
/// fields without which an order cannot exist.
fn parse_intent_metadata(metadata: &HashMap<String, String>) -> Option<IntentMetadata> {
    let user_id = Uuid::parse_str(metadata.get("userId")?).ok()?;
    let items: Vec<OrderItem> = serde_json::from_str(metadata.get("orderItems")?).ok()?;
    if items.is_empty() {
        return None;
    }
    Some(IntentMetadata {
        user_id,
        seller_id: metadata
            .get("sellerId")
            .and_then(|raw| Uuid::parse_str(raw).ok()),
        seller_stripe_account_id: metadata.get("sellerStripeAccountId").cloned(),
        platform_fee_cents: metadata
            .get("platformFeeCents")
            .and_then(|raw| raw.parse().ok()),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_stripe_config, unchecked_pool};
    use actix_web::{test as web_test, App};

    fn metadata(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn metadata_without_user_id_is_unusable() {
        let m = metadata(&[(
            "orderItems",
            r#"[{"productId":"11111111-1111-1111-1111-111111111111","quantity":1}]"#,
        )]);
        assert_eq!(parse_intent_metadata(&m), None);
    }

    #[test]
    fn metadata_without_manifest_is_unusable() {
        let m = metadata(&[("userId", "11111111-1111-1111-1111-111111111111")]);
        assert_eq!(parse_intent_metadata(&m), None);
        let m = metadata(&[
            ("userId", "11111111-1111-1111-1111-111111111111"),
            ("orderItems", "[]"),
        ]);
        assert_eq!(parse_intent_metadata(&m), None);
    }

    #[test]
    fn full_metadata_round_trips() {
        let m = metadata(&[
            ("userId", "11111111-1111-1111-1111-111111111111"),
            ("sellerId", "22222222-2222-2222-2222-222222222222"),
            ("sellerStripeAccountId", "acct_123"),
            ("platformFeeCents", "500"),
            (
                "orderItems",
                r#"[{"productId":"33333333-3333-3333-3333-333333333333","quantity":2}]"#,
            ),
        ]);
        let parsed = parse_intent_metadata(&m).unwrap();
        assert_eq!(
            parsed.user_id,
            Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap()
        );
        assert_eq!(
            parsed.seller_id,
            Some(Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap())
        );
        assert_eq!(parsed.seller_stripe_account_id.as_deref(), Some("acct_123"));
        assert_eq!(parsed.platform_fee_cents, Some(500));
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].quantity, 2);
    }

    #[test]
    fn malformed_fee_is_ignored_not_fatal() {
        let m = metadata(&[
            ("userId", "11111111-1111-1111-1111-111111111111"),
            ("platformFeeCents", "five hundred"),
            (
                "orderItems",
                r#"[{"productId":"33333333-3333-3333-3333-333333333333","quantity":1}]"#,
            ),
        ]);
        let parsed = parse_intent_metadata(&m).unwrap();
        assert_eq!(parsed.platform_fee_cents, None);
    }

    #[actix_web::test]
    async fn tampered_signature_is_rejected_without_touching_the_store() {
        // The pool is lazy and unreachable; any store access would panic
        // the worker and fail the request with a 500 instead of 400.
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(unchecked_pool()))
                .app_data(web::Data::new(test_stripe_config()))
                .route(
                    "/api/stripe-webhook",
                    web::post().to(stripe_event_handler),
                ),
        )
        .await;

        let req = web_test::TestRequest::post()
            .uri("/api/stripe-webhook")
            .insert_header(("Stripe-Signature", "t=1700000000,v1=deadbeef"))
            .set_payload(r#"{"id":"evt_test","type":"account.updated"}"#)
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn missing_signature_header_is_rejected() {
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(unchecked_pool()))
                .app_data(web::Data::new(test_stripe_config()))
                .route(
                    "/api/stripe-webhook",
                    web::post().to(stripe_event_handler),
                ),
        )
        .await;

        let req = web_test::TestRequest::post()
            .uri("/api/stripe-webhook")
            .set_payload("{}")
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}
