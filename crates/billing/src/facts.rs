//! Checkout fact extraction
//!
//! Pulls the business identifiers out of a `checkout.session.completed`
//! payload: who the checkout was for, which plan they bought, and the
//! Stripe references needed to activate their subscription.
//!
//! The initiation endpoint writes the same metadata keys this module reads
//! (`METADATA_*` constants below). Keeping both sides on one set of
//! constants is what keeps the owner reference intact across the round
//! trip through Stripe.

use std::time::Duration;

use serde_json::Value;
use stripe::CheckoutSession;

use crate::checkout::CheckoutMode;
use crate::client::StripeClient;

/// Metadata key carrying the owner (pro) id. Also mirrored into the
/// session's `client_reference_id`.
pub const METADATA_PRO_ID: &str = "pro_id";
pub const METADATA_PLAN_TYPE: &str = "plan_type";
pub const METADATA_PLAN_TIER: &str = "plan_tier";
pub const METADATA_EARLY_NOTICE_MINUTES: &str = "early_notice_minutes";
pub const METADATA_CHANNELS: &str = "channels";

/// Where an owner reference may live in the session payload, in priority
/// order. First non-empty value wins.
///
/// Historical drafts of the webhook disagreed on this; the mapping is
/// versioned here instead of living in parallel handler copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerSource {
    /// Top-level `client_reference_id` pass-through field
    ClientReferenceId,
    /// A session metadata key
    MetadataKey(&'static str),
}

pub const OWNER_SOURCES: &[OwnerSource] = &[
    OwnerSource::ClientReferenceId,
    OwnerSource::MetadataKey(METADATA_PRO_ID),
];

/// How a plan metadata value is parsed out of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseRule {
    /// Taken as-is when non-empty
    Text,
    /// Parsed as a non-negative integer; unparsable values fall back
    NonNegativeInt,
    /// Parsed as a JSON string array; a parse failure degrades to the raw
    /// value as a single opaque channel, absence to no channels at all
    ChannelList,
}

/// One row of the plan defaulting table: metadata key, fallback value,
/// parse strategy.
#[derive(Debug, Clone, Copy)]
pub struct PlanField {
    pub key: &'static str,
    pub fallback: &'static str,
    pub parse: ParseRule,
}

pub const PLAN_TYPE_FIELD: PlanField = PlanField {
    key: METADATA_PLAN_TYPE,
    fallback: "standard",
    parse: ParseRule::Text,
};

pub const PLAN_TIER_FIELD: PlanField = PlanField {
    key: METADATA_PLAN_TIER,
    fallback: "basic",
    parse: ParseRule::Text,
};

pub const EARLY_NOTICE_FIELD: PlanField = PlanField {
    key: METADATA_EARLY_NOTICE_MINUTES,
    fallback: "60",
    parse: ParseRule::NonNegativeInt,
};

pub const CHANNELS_FIELD: PlanField = PlanField {
    key: METADATA_CHANNELS,
    fallback: "",
    parse: ParseRule::ChannelList,
};

/// The full defaulting table, in the order fields appear in checkout
/// metadata.
pub const PLAN_FIELDS: &[PlanField] = &[
    PLAN_TYPE_FIELD,
    PLAN_TIER_FIELD,
    EARLY_NOTICE_FIELD,
    CHANNELS_FIELD,
];

/// Facts extracted from one completed checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutFacts {
    /// Owner reference; `None` means the event is skipped, never rejected
    pub pro_id: Option<String>,
    pub session_id: Option<String>,
    pub mode: CheckoutMode,
    pub payment_status: Option<String>,
    pub plan_type: String,
    pub plan_tier: String,
    pub early_notice_minutes: i32,
    pub channels: Option<Vec<String>>,
    pub customer_email: Option<String>,
    pub price_id: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    /// Unix timestamp of the linked subscription's current period end
    pub current_period_end: Option<i64>,
}

/// Extract checkout facts from a `checkout.session.completed` payload.
///
/// Every field except the owner reference is defaultable; the owner is
/// resolved through [`OWNER_SOURCES`] and left as `None` when absent so
/// the caller can acknowledge-and-skip.
pub fn extract_facts(payload: &Value) -> CheckoutFacts {
    let metadata = payload.get("metadata");

    let pro_id = resolve_owner(payload);

    let session_id = non_empty_str(payload.get("id"));
    let mode = payload
        .get("mode")
        .and_then(Value::as_str)
        .and_then(CheckoutMode::from_str)
        .unwrap_or_default();
    let payment_status = non_empty_str(payload.get("payment_status"));

    let customer_email = non_empty_str(
        payload
            .get("customer_details")
            .and_then(|d| d.get("email")),
    )
    .or_else(|| non_empty_str(payload.get("customer_email")));

    // In webhook payloads the linked subscription is an unexpanded id
    let subscription_id = non_empty_str(payload.get("subscription"));

    CheckoutFacts {
        pro_id,
        session_id,
        mode,
        payment_status,
        plan_type: resolve_text(metadata, PLAN_TYPE_FIELD),
        plan_tier: resolve_text(metadata, PLAN_TIER_FIELD),
        early_notice_minutes: resolve_minutes(metadata, EARLY_NOTICE_FIELD),
        channels: resolve_channels(metadata, CHANNELS_FIELD),
        customer_email,
        price_id: None,
        subscription_id,
        subscription_status: None,
        current_period_end: None,
    }
}

/// Resolve the owner reference through the versioned source mapping.
pub fn resolve_owner(payload: &Value) -> Option<String> {
    for source in OWNER_SOURCES {
        let value = match source {
            OwnerSource::ClientReferenceId => non_empty_str(payload.get("client_reference_id")),
            OwnerSource::MetadataKey(key) => {
                non_empty_str(payload.get("metadata").and_then(|m| m.get(key)))
            }
        };
        if value.is_some() {
            return value;
        }
    }
    None
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn metadata_value<'a>(metadata: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    metadata.and_then(|m| m.get(key))
}

fn resolve_text(metadata: Option<&Value>, field: PlanField) -> String {
    debug_assert_eq!(field.parse, ParseRule::Text);
    non_empty_str(metadata_value(metadata, field.key)).unwrap_or_else(|| field.fallback.to_string())
}

fn resolve_minutes(metadata: Option<&Value>, field: PlanField) -> i32 {
    debug_assert_eq!(field.parse, ParseRule::NonNegativeInt);
    // Metadata values arrive as strings, but tolerate a bare number too
    let parsed = match metadata_value(metadata, field.key) {
        Some(Value::String(s)) => s.trim().parse::<i32>().ok(),
        Some(Value::Number(n)) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        _ => None,
    };
    match parsed {
        Some(v) if v >= 0 => v,
        _ => field.fallback.parse().unwrap_or(0),
    }
}

fn resolve_channels(metadata: Option<&Value>, field: PlanField) -> Option<Vec<String>> {
    debug_assert_eq!(field.parse, ParseRule::ChannelList);
    match metadata_value(metadata, field.key) {
        // Serialized list, the shape the initiation endpoint writes
        Some(Value::String(raw)) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            match serde_json::from_str::<Vec<String>>(raw) {
                Ok(list) if list.is_empty() => None,
                Ok(list) => Some(list),
                // Degrade: keep the raw value as one opaque channel
                Err(_) => Some(vec![raw.to_string()]),
            }
        }
        // Defensive: an actual array in the payload
        Some(Value::Array(items)) => {
            let list: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if list.is_empty() {
                None
            } else {
                Some(list)
            }
        }
        _ => None,
    }
}

/// Upper bound on the enrichment round trip to Stripe.
const ENRICH_TIMEOUT: Duration = Duration::from_secs(10);

/// Enrich facts by re-fetching the session from Stripe with line items,
/// subscription, and customer expanded.
///
/// Best effort: a timeout or API failure leaves the payload-derived facts
/// standing and never fails the webhook. The re-fetched object is only a
/// source of supplementary fields, never of the upsert key.
pub async fn enrich_from_stripe(stripe: &StripeClient, facts: &mut CheckoutFacts) {
    let Some(session_id) = facts.session_id.as_deref() else {
        return;
    };

    let parsed_id = match session_id.parse::<stripe::CheckoutSessionId>() {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Unparsable session id, skipping enrichment");
            return;
        }
    };

    let retrieve = CheckoutSession::retrieve(
        stripe.inner(),
        &parsed_id,
        &["line_items", "subscription", "customer"],
    );

    let session = match tokio::time::timeout(ENRICH_TIMEOUT, retrieve).await {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            tracing::warn!(session_id = %session_id, error = %e, "Session enrichment failed");
            return;
        }
        Err(_) => {
            tracing::warn!(session_id = %session_id, "Session enrichment timed out");
            return;
        }
    };

    if facts.customer_email.is_none() {
        facts.customer_email = session
            .customer_details
            .as_ref()
            .and_then(|d| d.email.clone());
    }

    facts.price_id = session
        .line_items
        .as_ref()
        .and_then(|items| items.data.first())
        .and_then(|item| item.price.as_ref())
        .map(|price| price.id.to_string())
        .or(facts.price_id.take());

    match session.subscription {
        Some(stripe::Expandable::Object(sub)) => {
            facts.subscription_id = Some(sub.id.to_string());
            facts.subscription_status = Some(subscription_status_str(sub.status).to_string());
            facts.current_period_end = Some(sub.current_period_end);
        }
        Some(stripe::Expandable::Id(id)) => {
            facts.subscription_id = Some(id.to_string());
        }
        None => {}
    }

    tracing::debug!(
        session_id = %session_id,
        has_email = facts.customer_email.is_some(),
        has_subscription = facts.subscription_id.is_some(),
        "Session facts enriched from Stripe"
    );
}

fn subscription_status_str(status: stripe::SubscriptionStatus) -> &'static str {
    use stripe::SubscriptionStatus as S;
    match status {
        S::Active => "active",
        S::PastDue => "past_due",
        S::Canceled => "canceled",
        S::Unpaid => "unpaid",
        S::Trialing => "trialing",
        S::Incomplete => "incomplete",
        S::IncompleteExpired => "incomplete_expired",
        S::Paused => "paused",
    }
}
