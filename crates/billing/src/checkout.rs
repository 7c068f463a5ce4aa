//! Stripe Checkout sessions
//!
//! Thin request builder for the hosted checkout flow. Whatever identifiers
//! this module places into the session's pass-through fields is exactly
//! what the webhook fact extractor reads back, so both sides share the
//! metadata key constants in [`crate::facts`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotpulse_shared::{PlanTier, PlanType};
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::facts::{
    METADATA_CHANNELS, METADATA_EARLY_NOTICE_MINUTES, METADATA_PLAN_TIER, METADATA_PLAN_TYPE,
    METADATA_PRO_ID,
};

/// Checkout mode: one-time payment or recurring subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    #[default]
    Payment,
    Subscription,
}

impl CheckoutMode {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "payment" => Some(Self::Payment),
            "subscription" => Some(Self::Subscription),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Subscription => "subscription",
        }
    }
}

/// Parameters for one checkout session.
#[derive(Debug, Clone, Default)]
pub struct CheckoutParams {
    /// Owner the session is opened for; overridden by a pinned server value
    pub pro_id: Option<String>,
    /// Price to charge; falls back to the configured default
    pub price_id: Option<String>,
    pub quantity: u64,
    pub mode: CheckoutMode,
    pub plan_type: Option<PlanType>,
    pub plan_tier: Option<PlanTier>,
    pub early_notice_minutes: Option<u32>,
    pub channels: Option<Vec<String>>,
}

/// Checkout service for creating Stripe checkout sessions
pub struct CheckoutService {
    stripe: StripeClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a hosted checkout session.
    ///
    /// The owner id is written into both pass-through fields
    /// (`client_reference_id` and `metadata.pro_id`) so the webhook side
    /// can recover it even if one field is dropped.
    pub async fn create_session(&self, params: CheckoutParams) -> BillingResult<CheckoutSession> {
        let config = self.stripe.config();

        let pro_id = resolve_pro_id(config.pinned_pro_id.as_deref(), params.pro_id.as_deref())?;
        let price_id = resolve_price_id(
            params.price_id.as_deref(),
            config.default_price_id.as_deref(),
        )?;

        if params.quantity == 0 {
            return Err(BillingError::InvalidRequest(
                "quantity must be a positive integer".to_string(),
            ));
        }

        let success_url = format!(
            "{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
            config.app_base_url
        );
        let cancel_url = format!("{}/billing/cancel", config.app_base_url);

        let metadata = build_metadata(&pro_id, &params);

        let mode = match params.mode {
            CheckoutMode::Payment => CheckoutSessionMode::Payment,
            CheckoutMode::Subscription => CheckoutSessionMode::Subscription,
        };

        let create = CreateCheckoutSession {
            mode: Some(mode),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id.clone()),
                quantity: Some(params.quantity),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            client_reference_id: Some(&pro_id),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), create).await?;

        tracing::info!(
            pro_id = %pro_id,
            session_id = %session.id,
            price_id = %price_id,
            mode = params.mode.as_str(),
            "Created checkout session"
        );

        Ok(session)
    }
}

/// Pick the owner id: a server-pinned value always wins over the caller's.
fn resolve_pro_id(pinned: Option<&str>, supplied: Option<&str>) -> BillingResult<String> {
    pinned
        .or(supplied)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            BillingError::InvalidRequest(
                "pro_id is required when no server-side owner is pinned".to_string(),
            )
        })
}

/// Pick the price id and reject anything that is not a Stripe price.
fn resolve_price_id(supplied: Option<&str>, configured: Option<&str>) -> BillingResult<String> {
    let price_id = supplied
        .or(configured)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(BillingError::MissingPriceId)?;

    if !price_id.starts_with("price_") {
        return Err(BillingError::InvalidPriceId(price_id.to_string()));
    }

    Ok(price_id.to_string())
}

/// Build the session metadata the fact extractor reads back.
fn build_metadata(pro_id: &str, params: &CheckoutParams) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(METADATA_PRO_ID.to_string(), pro_id.to_string());

    if let Some(plan_type) = params.plan_type {
        metadata.insert(METADATA_PLAN_TYPE.to_string(), plan_type.as_str().to_string());
    }
    if let Some(plan_tier) = params.plan_tier {
        metadata.insert(METADATA_PLAN_TIER.to_string(), plan_tier.as_str().to_string());
    }
    if let Some(minutes) = params.early_notice_minutes {
        metadata.insert(METADATA_EARLY_NOTICE_MINUTES.to_string(), minutes.to_string());
    }
    if let Some(channels) = &params.channels {
        // Serialized list; the extractor degrades gracefully if this is
        // ever hand-written as a plain string
        if let Ok(serialized) = serde_json::to_string(channels) {
            metadata.insert(METADATA_CHANNELS.to_string(), serialized);
        }
    }

    metadata
}

/// Exposes the metadata builder to cross-module tests so the
/// initiation/extraction join is tested against the real builder.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn metadata_for(pro_id: &str, params: &CheckoutParams) -> HashMap<String, String> {
        build_metadata(pro_id, params)
    }
}

/// Response for creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            url: session.url,
        }
    }
}
