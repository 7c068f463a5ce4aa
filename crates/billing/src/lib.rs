// Billing crate clippy configuration
#![allow(clippy::too_many_arguments)] // Some Stripe operations require many parameters
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Slotpulse Billing Module
//!
//! Handles Stripe integration for pro subscriptions.
//!
//! ## Features
//!
//! - **Checkout**: Create hosted checkout sessions with plan metadata
//! - **Webhooks**: Verify, decode, and reconcile Stripe events
//! - **Subscriptions**: Idempotent activation keyed by pro id

pub mod checkout;
pub mod client;
pub mod error;
pub mod facts;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Checkout
pub use checkout::{CheckoutMode, CheckoutParams, CheckoutResponse, CheckoutService};

// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Facts
pub use facts::{CheckoutFacts, OwnerSource, ParseRule, PlanField, OWNER_SOURCES, PLAN_FIELDS};

// Subscriptions
pub use subscriptions::{SubscriptionRecord, SubscriptionService};

// Webhooks
pub use webhooks::{EventKind, WebhookEvent, WebhookHandler, WebhookOutcome};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::with_client(stripe, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::with_client(StripeClient::new(config), pool)
    }

    fn with_client(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            checkout: CheckoutService::new(stripe.clone()),
            subscriptions: SubscriptionService::new(pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool),
        }
    }
}
