//! Checkout initiation and Stripe webhook endpoints
//!
//! The webhook handler passes the raw body string through untouched:
//! signature verification runs over the exact bytes received, so nothing
//! here may parse or re-serialize the payload first.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use slotpulse_billing::{CheckoutMode, CheckoutParams, WebhookOutcome};
use slotpulse_shared::{PlanTier, PlanType};

use crate::error::ApiError;
use crate::state::AppState;

/// Plan options a caller may attach to a checkout.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlanOptions {
    pub plan_type: Option<PlanType>,
    pub plan_tier: Option<PlanTier>,
    pub early_notice_minutes: Option<u32>,
    pub channels: Option<Vec<String>>,
}

/// Request body for POST /api/checkout/session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Owner of the subscription; ignored when the server pins one
    pub pro_id: Option<String>,
    /// Stripe price; falls back to the server default
    pub price_id: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u64,
    #[serde(default)]
    pub mode: CheckoutMode,
    #[serde(default)]
    pub plan: Option<PlanOptions>,
}

fn default_quantity() -> u64 {
    1
}

/// Response for POST /api/checkout/session
#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    /// Provider-hosted checkout page
    pub url: String,
}

/// Create a Stripe checkout session and return its hosted URL
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, ApiError> {
    let plan = req.plan.unwrap_or_default();

    let params = CheckoutParams {
        pro_id: req.pro_id,
        price_id: req.price_id,
        quantity: req.quantity,
        mode: req.mode,
        plan_type: plan.plan_type,
        plan_tier: plan.plan_tier,
        early_notice_minutes: plan.early_notice_minutes,
        channels: plan.channels,
    };

    let session = state.billing.checkout.create_session(params).await?;

    let url = session.url.ok_or_else(|| {
        tracing::error!(session_id = %session.id, "Checkout session created without a URL");
        ApiError::Internal("Checkout session has no URL".to_string())
    })?;

    Ok(Json(CreateCheckoutResponse { url }))
}

/// Acknowledgment body for the webhook endpoint.
///
/// Always `received: true` on 2xx; `skipped`/`ignored` annotate events
/// that were accepted but intentionally not applied.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<WebhookOutcome> for WebhookAck {
    fn from(outcome: WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Processed { .. } => Self {
                received: true,
                skipped: None,
                ignored: None,
                reason: None,
            },
            WebhookOutcome::Skipped { reason } => Self {
                received: true,
                skipped: Some(true),
                ignored: None,
                reason: Some(reason.to_string()),
            },
            WebhookOutcome::Duplicate => Self {
                received: true,
                skipped: Some(true),
                ignored: None,
                reason: Some("event already processed".to_string()),
            },
            WebhookOutcome::Ignored { kind } => Self {
                received: true,
                skipped: None,
                ignored: Some(true),
                reason: Some(format!("unhandled event type {}", kind)),
            },
        }
    }
}

/// Handle Stripe webhook events
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    // Reject before touching the secret or body
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Stripe webhook rejected");
            ApiError::from(e)
        })?;

    tracing::info!(
        event_type = %event.kind.as_str(),
        event_id = %event.id,
        "Stripe webhook event verified"
    );

    // Detached task: if Stripe drops the connection mid-delivery, the
    // reconciliation write still runs to completion instead of being
    // cancelled with the request future.
    let billing = state.billing.clone();
    let outcome = tokio::spawn(async move { billing.webhooks.handle_event(event).await })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Webhook task failed");
            ApiError::Internal("webhook processing failed".to_string())
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "Webhook handling error");
            ApiError::from(e)
        })?;

    Ok(Json(WebhookAck::from(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_request_applies_documented_defaults() {
        let req: CreateCheckoutRequest =
            serde_json::from_str(r#"{"price_id":"price_123"}"#).unwrap();
        assert_eq!(req.quantity, 1);
        assert_eq!(req.mode, CheckoutMode::Payment);
        assert!(req.pro_id.is_none());
        assert!(req.plan.is_none());
    }

    #[test]
    fn checkout_request_parses_full_body() {
        let req: CreateCheckoutRequest = serde_json::from_str(
            r#"{
                "pro_id": "pro-1",
                "price_id": "price_123",
                "quantity": 2,
                "mode": "subscription",
                "plan": {
                    "plan_type": "last_minute",
                    "plan_tier": "premium",
                    "early_notice_minutes": 15,
                    "channels": ["email", "sms"]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(req.mode, CheckoutMode::Subscription);
        let plan = req.plan.unwrap();
        assert_eq!(plan.plan_tier, Some(PlanTier::Premium));
        assert_eq!(plan.early_notice_minutes, Some(15));
        assert_eq!(
            plan.channels,
            Some(vec!["email".to_string(), "sms".to_string()])
        );
    }

    #[test]
    fn processed_ack_is_bare_received() {
        let ack = WebhookAck::from(WebhookOutcome::Processed {
            pro_id: "pro-1".to_string(),
        });
        let body = serde_json::to_value(&ack).unwrap();
        assert_eq!(body, serde_json::json!({ "received": true }));
    }

    #[test]
    fn skipped_ack_carries_reason() {
        let ack = WebhookAck::from(WebhookOutcome::Skipped {
            reason: "missing owner reference",
        });
        let body = serde_json::to_value(&ack).unwrap();
        assert_eq!(body["received"], true);
        assert_eq!(body["skipped"], true);
        assert_eq!(body["reason"], "missing owner reference");
    }

    #[test]
    fn ignored_ack_names_the_kind() {
        let ack = WebhookAck::from(WebhookOutcome::Ignored {
            kind: "invoice.paid".to_string(),
        });
        let body = serde_json::to_value(&ack).unwrap();
        assert_eq!(body["ignored"], true);
        assert_eq!(body["reason"], "unhandled event type invoice.paid");
    }
}
