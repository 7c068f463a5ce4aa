//! Application state

use std::sync::Arc;

use slotpulse_billing::{BillingResult, BillingService};
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
}

impl AppState {
    /// Construct state, building the billing service from the environment.
    ///
    /// Fails when Stripe credentials are missing so a misconfigured
    /// deployment dies at startup rather than at the first webhook.
    pub fn new(pool: PgPool, config: Config) -> BillingResult<Self> {
        let billing = Arc::new(BillingService::from_env(pool.clone())?);
        tracing::info!("Stripe billing service initialized");

        Ok(Self {
            pool,
            config,
            billing,
        })
    }
}
