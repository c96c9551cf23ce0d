use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::schema::orders;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Decimal dollars as a string, e.g. "99.98"
    pub total_amount: String,
    pub payment_intent_id: String,
    pub status: String,
    pub items: Value,
    pub seller_stripe_account_id: String,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount.to_string(),
            payment_intent_id: order.payment_intent_id,
            status: order.status,
            items: order.items,
            seller_stripe_account_id: order.seller_stripe_account_id,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersParams {
    /// Filter to one buyer's orders.
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListOrdersResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDeliveryRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmDeliveryResponse {
    pub id: Uuid,
    pub status: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /api/orders/{id}
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let order = web::block(move || {
        let mut conn = pool.get()?;
        let order: Option<Order> = orders::table
            .find(order_id)
            .select(Order::as_select())
            .first(&mut conn)
            .optional()?;
        Ok::<_, AppError>(order)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    match order {
        Some(order) => Ok(HttpResponse::Ok().json(OrderResponse::from(order))),
        None => Err(AppError::NotFound("Order not found".to_string())),
    }
}

/// GET /api/orders
///
/// Paginated order history, newest first, optionally scoped to one buyer.
#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("userId" = Option<Uuid>, Query, description = "Filter by buyer"),
        ("page" = Option<i64>, Query, description = "Page number (1-based, default 1)"),
        ("limit" = Option<i64>, Query, description = "Items per page (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    pool: web::Data<DbPool>,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, 100);
    let offset = (page - 1) * limit;
    let user_id = params.user_id;

    let result = web::block(move || {
        let mut conn = pool.get()?;

        let total: i64 = match user_id {
            Some(user_id) => orders::table
                .filter(orders::user_id.eq(user_id))
                .count()
                .get_result(&mut conn)?,
            None => orders::table.count().get_result(&mut conn)?,
        };

        let mut query = orders::table.select(Order::as_select()).into_boxed();
        if let Some(user_id) = user_id {
            query = query.filter(orders::user_id.eq(user_id));
        }
        let rows: Vec<Order> = query
            .order(orders::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load(&mut conn)?;

        Ok::<_, AppError>(ListOrdersResponse {
            items: rows.into_iter().map(OrderResponse::from).collect(),
            total,
            page,
            limit,
        })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(result))
}

/// POST /api/orders/{id}/confirm-delivery
///
/// The buyer confirms the goods arrived. The update is guarded on the
/// current status so replays and concurrent confirmations cannot move an
/// order backwards or skip ahead.
#[utoipa::path(
    post,
    path = "/api/orders/{id}/confirm-delivery",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = ConfirmDeliveryRequest,
    responses(
        (status = 200, description = "Order marked delivered", body = ConfirmDeliveryResponse),
        (status = 400, description = "Order not awaiting delivery"),
        (status = 404, description = "Order not found for this buyer"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn confirm_delivery(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    body: web::Json<ConfirmDeliveryRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let Some(user_id) = body.into_inner().user_id else {
        return Err(AppError::BadRequest("Missing userId".to_string()));
    };

    let order_id_response = web::block(move || {
        let mut conn = pool.get()?;

        let order: Option<Order> = orders::table
            .find(order_id)
            .filter(orders::user_id.eq(user_id))
            .select(Order::as_select())
            .first(&mut conn)
            .optional()?;
        let Some(order) = order else {
            return Err(AppError::NotFound("Order not found".to_string()));
        };

        let eligible = order
            .status()
            .map(|status| status.can_transition_to(OrderStatus::Delivered))
            .unwrap_or(false);
        if !eligible {
            return Err(AppError::BadRequest(
                "Order not eligible for delivery confirmation".to_string(),
            ));
        }

        let updated = diesel::update(
            orders::table
                .find(order_id)
                .filter(orders::status.eq(OrderStatus::PendingDelivery.as_str())),
        )
        .set(orders::status.eq(OrderStatus::Delivered.as_str()))
        .execute(&mut conn)?;
        if updated == 0 {
            // Lost the race with another confirmation or a cancellation.
            return Err(AppError::BadRequest(
                "Order not eligible for delivery confirmation".to_string(),
            ));
        }

        Ok(order.id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(ConfirmDeliveryResponse {
        id: order_id_response,
        status: OrderStatus::Delivered.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::unchecked_pool;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn confirm_delivery_without_user_id_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unchecked_pool()))
                .route(
                    "/api/orders/{id}/confirm-delivery",
                    web::post().to(confirm_delivery),
                ),
        )
        .await;
        let req = test::TestRequest::post()
            .uri(&format!(
                "/api/orders/{}/confirm-delivery",
                Uuid::new_v4()
            ))
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}
