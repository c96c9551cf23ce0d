use std::env;
use std::time::Duration;

use stripe::Client;

use crate::errors::AppError;

/// Stripe integration configuration, read once at startup and shared with
/// every handler through `web::Data`.
#[derive(Clone)]
pub struct StripeConfig {
    pub client: Client,
    pub webhook_secret: String,
    /// Platform fee in basis points (e.g. 500 = 5%). Zero is a valid
    /// deployment.
    pub platform_fee_bps: u32,
    /// Upper bound on any single request to Stripe. A hung call fails
    /// closed instead of hanging the handler.
    pub request_timeout: Duration,
    /// Where Stripe sends sellers back after onboarding.
    pub base_url: String,
}

impl StripeConfig {
    pub fn from_env() -> Self {
        let secret_key = env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set");
        let webhook_secret =
            env::var("STRIPE_WEBHOOK_SECRET").expect("STRIPE_WEBHOOK_SECRET must be set");
        let platform_fee_bps: u32 = env::var("PLATFORM_FEE_BPS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .expect("PLATFORM_FEE_BPS must be a valid number");
        let timeout_secs: u64 = env::var("STRIPE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .expect("STRIPE_TIMEOUT_SECS must be a valid number");
        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Self {
            client: Client::new(secret_key),
            webhook_secret,
            platform_fee_bps,
            request_timeout: Duration::from_secs(timeout_secs),
            base_url,
        }
    }

    /// Platform fee in cents for a total in cents, rounded half-up.
    ///
    /// The same value is embedded in the PaymentIntent at charge time and
    /// reused at release time, so charge and transfer can never disagree
    /// by a cent.
    pub fn platform_fee_cents(&self, total_cents: i64) -> i64 {
        (total_cents * self.platform_fee_bps as i64 + 5_000) / 10_000
    }

    /// Run a Stripe call under the configured timeout.
    pub async fn timed<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: std::future::Future<Output = Result<T, stripe::StripeError>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::StripeTimeout),
        }
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("webhook_secret", &"[REDACTED]")
            .field("platform_fee_bps", &self.platform_fee_bps)
            .field("request_timeout", &self.request_timeout)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_bps(bps: u32) -> StripeConfig {
        StripeConfig {
            client: Client::new("sk_test_dummy"),
            webhook_secret: "whsec_dummy".to_string(),
            platform_fee_bps: bps,
            request_timeout: Duration::from_secs(30),
            base_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn five_percent_fee_rounds_half_up() {
        // 9998 * 5% = 499.9 -> 500
        assert_eq!(config_with_bps(500).platform_fee_cents(9998), 500);
    }

    #[test]
    fn zero_fee_deployment() {
        assert_eq!(config_with_bps(0).platform_fee_cents(9998), 0);
    }

    #[test]
    fn fee_rounds_up_on_exact_half() {
        // 9990 * 2.5% = 249.75 -> 250; 200 * 2.5% = 5 exactly
        assert_eq!(config_with_bps(250).platform_fee_cents(9990), 250);
        assert_eq!(config_with_bps(250).platform_fee_cents(200), 5);
        // 100 * 0.5% = 0.5 -> 1 (half-up, not banker's)
        assert_eq!(config_with_bps(50).platform_fee_cents(100), 1);
    }

    #[test]
    fn fee_plus_transfer_equals_total() {
        let config = config_with_bps(500);
        for total in [1, 99, 100, 9998, 10_000, 123_456_789] {
            let fee = config.platform_fee_cents(total);
            let transfer = total - fee;
            assert_eq!(fee + transfer, total);
            assert!(fee >= 0 && fee <= total);
        }
    }
}
