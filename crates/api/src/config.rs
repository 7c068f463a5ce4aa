//! Server configuration

use anyhow::{bail, Context, Result};

/// API server configuration loaded from the environment.
///
/// Stripe credentials are loaded separately by the billing crate; this
/// covers the store connection and the listener. Missing required values
/// abort startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(v) if !v.trim().is_empty() => v,
            _ => bail!("DATABASE_URL must be set"),
        };

        let port = match std::env::var("PORT") {
            Ok(v) => v.parse::<u16>().context("PORT must be a valid port number")?,
            Err(_) => 3000,
        };

        Ok(Self { database_url, port })
    }
}
