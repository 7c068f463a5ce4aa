//! Billing error types

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by the billing crate.
///
/// The variants map onto the HTTP surface: signature, payload, and request
/// validation failures are terminal 400s the provider must not retry;
/// Stripe and database failures are 500s so the provider's automatic retry
/// can succeed once the downstream recovers.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Webhook signature missing required parts, stale, or not matching the body
    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    /// Recognized event kind whose payload does not have the required shape
    #[error("malformed webhook payload: {0}")]
    WebhookPayload(String),

    /// No price id supplied and no server default configured
    #[error("no price id supplied and STRIPE_PRICE_ID is not configured")]
    MissingPriceId,

    /// Price reference that is not a Stripe price id
    #[error("invalid price id: {0}")]
    InvalidPriceId(String),

    /// Checkout initiation request that cannot be turned into a session
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(e: stripe::StripeError) -> Self {
        BillingError::StripeApi(e.to_string())
    }
}
