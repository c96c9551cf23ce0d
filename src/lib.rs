pub mod cart;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod schema;

#[cfg(test)]
pub mod test_support;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use config::StripeConfig;
pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) {
    let mut conn = pool.get().expect("Failed to get DB connection for migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run database migrations");
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::checkout::create_payment_intent,
        handlers::stripe_webhook::stripe_event_handler,
        handlers::release_funds::release_funds,
        handlers::onboarding::stripe_onboard,
        handlers::onboarding::payout_status,
        handlers::orders::get_order,
        handlers::orders::list_orders,
        handlers::orders::confirm_delivery,
    ),
    components(schemas(
        cart::CartItemRequest,
        cart::CartProduct,
        handlers::checkout::CreatePaymentIntentRequest,
        handlers::checkout::CreatePaymentIntentResponse,
        handlers::release_funds::ReleaseFundsRequest,
        handlers::release_funds::ReleaseFundsResponse,
        handlers::onboarding::StripeOnboardRequest,
        handlers::onboarding::StripeOnboardResponse,
        handlers::onboarding::PayoutStatusResponse,
        handlers::orders::OrderResponse,
        handlers::orders::ListOrdersResponse,
        handlers::orders::ConfirmDeliveryRequest,
        handlers::orders::ConfirmDeliveryResponse,
    )),
    tags(
        (name = "checkout", description = "Cart validation and payment intents"),
        (name = "webhooks", description = "Stripe event ingestion"),
        (name = "payments", description = "Escrow release"),
        (name = "onboarding", description = "Seller payout onboarding"),
        (name = "orders", description = "Order history and delivery confirmation"),
    )
)]
pub struct ApiDoc;

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    pool: DbPool,
    stripe: StripeConfig,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(stripe.clone()))
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .route(
                        "/create-payment-intent",
                        web::post().to(handlers::checkout::create_payment_intent),
                    )
                    .route(
                        "/stripe-webhook",
                        web::post().to(handlers::stripe_webhook::stripe_event_handler),
                    )
                    .route(
                        "/release-funds",
                        web::post().to(handlers::release_funds::release_funds),
                    )
                    .route(
                        "/stripe-onboard",
                        web::post().to(handlers::onboarding::stripe_onboard),
                    )
                    .route(
                        "/sellers/{user_id}/payout-status",
                        web::get().to(handlers::onboarding::payout_status),
                    )
                    .route("/orders", web::get().to(handlers::orders::list_orders))
                    .route("/orders/{id}", web::get().to(handlers::orders::get_order))
                    .route(
                        "/orders/{id}/confirm-delivery",
                        web::post().to(handlers::orders::confirm_delivery),
                    ),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
