//! Plan value types
//!
//! A pro's subscription carries a plan type (what kind of alerts they get)
//! and a tier (how much of it). Both round-trip through Stripe checkout
//! metadata as plain strings, so unknown values must survive parsing.

use serde::{Deserialize, Serialize};

/// Kind of alert plan a pro subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// Standard slot alerts
    #[default]
    Standard,
    /// Last-minute alerts with a configurable early-notice window
    LastMinute,
}

impl PlanType {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "last_minute" | "lastminute" | "last-minute" => Some(Self::LastMinute),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::LastMinute => "last_minute",
        }
    }
}

/// Plan tier, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Basic,
    Pro,
    Premium,
}

impl PlanTier {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "pro" => Some(Self::Pro),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Premium => "premium",
        }
    }
}
