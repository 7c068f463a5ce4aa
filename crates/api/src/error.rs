//! API error types and response mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use slotpulse_billing::BillingError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by route handlers.
///
/// The status code is the retry contract with Stripe: 400 means the
/// request can never succeed (do not retry), 500 means a transient
/// downstream failure (redeliver later).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            // Terminal for the request: the caller (or Stripe) must not retry
            BillingError::WebhookSignatureInvalid
            | BillingError::WebhookPayload(_)
            | BillingError::MissingPriceId
            | BillingError::InvalidPriceId(_)
            | BillingError::InvalidRequest(_) => ApiError::BadRequest(e.to_string()),

            // Transient: a retry may succeed once the downstream recovers
            BillingError::Database(_) => ApiError::Database(e.to_string()),
            BillingError::StripeApi(_) | BillingError::Config(_) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failures_are_terminal_400() {
        let err: ApiError = BillingError::WebhookSignatureInvalid.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_failures_are_retryable_500() {
        let err: ApiError = BillingError::Database("connection refused".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_failures_are_400() {
        for e in [
            BillingError::MissingPriceId,
            BillingError::InvalidPriceId("prod_1".to_string()),
            BillingError::InvalidRequest("quantity".to_string()),
            BillingError::WebhookPayload("bad".to_string()),
        ] {
            let err: ApiError = e.into();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn provider_failures_are_500() {
        let err: ApiError = BillingError::StripeApi("rate limited".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
