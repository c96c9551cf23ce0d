use actix_web::HttpResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// The seller referenced by the cart has no payout-ready account.
    /// Configuration class, not transient: retrying will not help until
    /// the seller finishes onboarding.
    #[error("Could not find seller payment information.")]
    SellerNotReady,

    #[error("Stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Stripe request timed out")]
    StripeTimeout,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<diesel::result::Error> for AppError {
    fn from(e: diesel::result::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::BadRequest(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": self.to_string()
            })),
            AppError::NotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": self.to_string()
            })),
            // Surfaced verbatim so the checkout UI can tell the buyer the
            // seller is not set up yet, per the original flow.
            AppError::SellerNotReady => HttpResponse::InternalServerError().json(
                serde_json::json!({
                    "error": self.to_string()
                }),
            ),
            AppError::Stripe(_)
            | AppError::StripeTimeout
            | AppError::Database(_)
            | AppError::Internal(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal server error"
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;

    #[test]
    fn bad_request_returns_400() {
        let resp = AppError::BadRequest("nope".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_returns_404() {
        let resp = AppError::NotFound("Order not found".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn seller_not_ready_returns_500_with_reason() {
        let err = AppError::SellerNotReady;
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(err.to_string(), "Could not find seller payment information.");
    }

    #[test]
    fn database_error_returns_500() {
        let err = AppError::Database("connection refused".to_string());
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn timeout_returns_500() {
        assert_eq!(
            AppError::StripeTimeout.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn diesel_not_found_maps_to_database() {
        let err: AppError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[test]
    fn bad_request_display() {
        assert_eq!(
            AppError::BadRequest("No shippable items found in cart.".to_string()).to_string(),
            "No shippable items found in cart."
        );
    }
}
