//! Stripe webhook handling
//!
//! Verifies inbound notification signatures, decodes the event envelope,
//! and applies the checkout-completed reconciliation. Unknown event kinds
//! are acknowledged and ignored: Stripe retries aggressively on non-2xx,
//! so only requests that are unauthenticated, structurally broken, or hit
//! a transient store failure may be rejected.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use sqlx::PgPool;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::facts::{enrich_from_stripe, extract_facts};
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// Allowed skew between the signed timestamp and our clock.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Recognized event kinds. Everything else is `Other` and gets
/// acknowledged without processing. New lifecycle kinds (renewal,
/// cancellation) slot in here when they grow business logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    Other(String),
}

impl EventKind {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::Other(s) => s,
        }
    }
}

/// A verified, decoded notification. Lives for one request only.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Stripe delivery id (`evt_...`), used for duplicate short-circuiting
    pub id: String,
    pub kind: EventKind,
    /// Event creation time, unix seconds
    pub created: i64,
    /// The event's `data.object`
    pub payload: Value,
}

/// What happened to an accepted event. The HTTP layer maps this onto the
/// acknowledgment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A subscription row was written
    Processed { pro_id: String },
    /// Recognized kind, but unusable (e.g. no owner reference anywhere);
    /// retrying cannot fix data missing since session creation
    Skipped { reason: &'static str },
    /// Unrecognized kind, acknowledged untouched
    Ignored { kind: String },
    /// This exact event id already reconciled successfully
    Duplicate,
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Verify the signature over the raw body and decode the event.
    ///
    /// The body must be the unparsed bytes as received; any prior
    /// parse/re-serialize invalidates the signature.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        verify_signature(payload, signature, &self.stripe.config().webhook_secret)?;
        decode_event(payload)
    }

    /// Handle a verified event.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<WebhookOutcome> {
        match &event.kind {
            EventKind::CheckoutSessionCompleted => self.handle_checkout_completed(event).await,
            EventKind::Other(kind) => {
                tracing::info!(
                    event_type = %kind,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - acknowledged and ignored"
                );
                Ok(WebhookOutcome::Ignored { kind: kind.clone() })
            }
        }
    }

    async fn handle_checkout_completed(&self, event: WebhookEvent) -> BillingResult<WebhookOutcome> {
        if !event.id.is_empty() && self.is_processed(&event.id).await? {
            tracing::info!(event_id = %event.id, "Duplicate webhook delivery, already reconciled");
            return Ok(WebhookOutcome::Duplicate);
        }

        let mut facts = extract_facts(&event.payload);

        let Some(pro_id) = facts.pro_id.clone() else {
            // Not an error: the owner was lost at session-creation time and
            // no number of provider retries will bring it back
            tracing::warn!(
                event_id = %event.id,
                session_id = ?facts.session_id,
                "Checkout completed without an owner reference, skipping"
            );
            return Ok(WebhookOutcome::Skipped {
                reason: "missing owner reference",
            });
        };

        if self.stripe.config().enrich_sessions {
            enrich_from_stripe(&self.stripe, &mut facts).await;
        }

        let subscriptions = SubscriptionService::new(self.pool.clone());
        subscriptions.activate_from_checkout(&pro_id, &facts).await?;

        self.record_event(&event, Some(pro_id.as_str())).await;

        tracing::info!(
            event_id = %event.id,
            pro_id = %pro_id,
            "Checkout completed, subscription reconciled"
        );

        Ok(WebhookOutcome::Processed { pro_id })
    }

    /// Whether this event id already reconciled successfully.
    async fn is_processed(&self, event_id: &str) -> BillingResult<bool> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM webhook_events WHERE stripe_event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Record a successfully processed event for duplicate short-circuiting
    /// and audit. Written only after the subscription upsert, so a failed
    /// attempt stays retryable. Failure here is logged, never surfaced;
    /// the upsert itself is already idempotent.
    async fn record_event(&self, event: &WebhookEvent, pro_id: Option<&str>) {
        if event.id.is_empty() {
            return;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (stripe_event_id, event_type, pro_id, received_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (stripe_event_id) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(event.kind.as_str())
        .bind(pro_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                event_id = %event.id,
                error = %e,
                "Failed to record processed webhook event"
            );
        }
    }
}

/// Verify a Stripe signature header against the raw payload.
///
/// Header format: `t=<unix seconds>,v1=<hex hmac>[,v0=...]`. The signed
/// message is `"{t}.{payload}"` and the key is the webhook secret with its
/// `whsec_` prefix stripped.
pub fn verify_signature(payload: &str, signature: &str, secret: &str) -> BillingResult<()> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            tracing::error!("System time error: {}", e);
            BillingError::WebhookSignatureInvalid
        })?
        .as_secs() as i64;

    verify_signature_at(payload, signature, secret, now)
}

fn verify_signature_at(
    payload: &str,
    signature: &str,
    secret: &str,
    now: i64,
) -> BillingResult<()> {
    // Parse the signature header: t=timestamp,v1=signature,v0=signature
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0].trim() {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::warn!("Missing timestamp in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::warn!("Missing v1 signature in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            now = now,
            diff = (now - timestamp).abs(),
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::warn!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Decode a verified body into a typed envelope.
///
/// Lenient on purpose: an unknown `type` decodes to `EventKind::Other`
/// with whatever `data.object` it carries. Only a recognized kind missing
/// its required object shape is a structural error.
pub fn decode_event(payload: &str) -> BillingResult<WebhookEvent> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| BillingError::WebhookPayload(format!("not valid JSON: {}", e)))?;

    let kind_str = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BillingError::WebhookPayload("missing event type".to_string()))?;

    let kind = EventKind::from_str(kind_str);

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let created = value.get("created").and_then(Value::as_i64).unwrap_or(0);

    let object = value.get("data").and_then(|d| d.get("object"));
    let payload = match &kind {
        EventKind::CheckoutSessionCompleted => object
            .filter(|o| o.is_object())
            .cloned()
            .ok_or_else(|| {
                BillingError::WebhookPayload(
                    "checkout.session.completed event missing data.object".to_string(),
                )
            })?,
        EventKind::Other(_) => object.cloned().unwrap_or(Value::Null),
    };

    Ok(WebhookEvent {
        id,
        kind,
        created,
        payload,
    })
}
