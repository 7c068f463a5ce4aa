//! Stripe client wrapper and configuration

use std::sync::Arc;

use crate::error::{BillingError, BillingResult};

/// Stripe configuration loaded from the environment.
///
/// Missing required values fail at construction time, so a misconfigured
/// deployment dies at startup instead of rejecting live traffic.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: String,
    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: String,
    /// Server-side default price used when the caller supplies none
    pub default_price_id: Option<String>,
    /// Base URL for checkout success/cancel redirects
    pub app_base_url: String,
    /// When set, overrides the caller-supplied pro id on checkout initiation.
    /// Used in test deployments so every session carries a known owner.
    pub pinned_pro_id: Option<String>,
    /// Whether the webhook pipeline re-fetches the session from Stripe to
    /// recover email, price, and subscription details
    pub enrich_sessions: bool,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = require_env("STRIPE_SECRET_KEY")?;
        let webhook_secret = require_env("STRIPE_WEBHOOK_SECRET")?;
        let app_base_url = require_env("APP_BASE_URL")?;

        let default_price_id = optional_env("STRIPE_PRICE_ID");
        let pinned_pro_id = optional_env("PINNED_PRO_ID");
        let enrich_sessions = optional_env("WEBHOOK_ENRICH")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            secret_key,
            webhook_secret,
            default_price_id,
            app_base_url,
            pinned_pro_id,
            enrich_sessions,
        })
    }
}

fn require_env(name: &'static str) -> BillingResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(BillingError::Config(format!("{} must be set", name))),
    }
}

fn optional_env(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Shared Stripe client carrying its configuration.
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
