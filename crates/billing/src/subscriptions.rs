//! Subscription reconciliation
//!
//! The only write path to the `subscriptions` table. Every completed
//! checkout funnels into one idempotent upsert keyed by the pro id, so a
//! re-delivered or concurrently delivered event can never fork a second
//! row for the same owner.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::checkout::CheckoutMode;
use crate::error::BillingResult;
use crate::facts::CheckoutFacts;

/// A pro's subscription row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub pro_id: String,
    pub plan_type: String,
    pub plan_tier: String,
    pub early_notice_minutes: i32,
    pub channels: Option<Vec<String>>,
    pub stripe_session_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_subscription_status: Option<String>,
    pub status: String,
    pub current_period_end: Option<OffsetDateTime>,
    pub customer_email: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Record status written on completion, by checkout mode.
pub fn status_for_mode(mode: CheckoutMode) -> &'static str {
    match mode {
        CheckoutMode::Subscription => "active",
        CheckoutMode::Payment => "paid",
    }
}

/// Subscription store access. Owns the write path to `subscriptions`.
pub struct SubscriptionService {
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Activate (or refresh) a pro's subscription from checkout facts.
    ///
    /// Single atomic upsert with `pro_id` as the conflict key; last write
    /// wins on every field. The session id is stored but never used as a
    /// key: one row per pro is the invariant, regardless of how many
    /// checkout sessions or re-deliveries produced it.
    pub async fn activate_from_checkout(
        &self,
        pro_id: &str,
        facts: &CheckoutFacts,
    ) -> BillingResult<()> {
        let status = status_for_mode(facts.mode);

        let current_period_end = facts
            .current_period_end
            .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok());

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, pro_id, plan_type, plan_tier, early_notice_minutes, channels,
                stripe_session_id, stripe_subscription_id, stripe_subscription_status,
                status, current_period_end, customer_email, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW()
            )
            ON CONFLICT (pro_id) DO UPDATE SET
                plan_type = EXCLUDED.plan_type,
                plan_tier = EXCLUDED.plan_tier,
                early_notice_minutes = EXCLUDED.early_notice_minutes,
                channels = EXCLUDED.channels,
                stripe_session_id = EXCLUDED.stripe_session_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                stripe_subscription_status = EXCLUDED.stripe_subscription_status,
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                customer_email = EXCLUDED.customer_email,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(pro_id)
        .bind(&facts.plan_type)
        .bind(&facts.plan_tier)
        .bind(facts.early_notice_minutes)
        .bind(facts.channels.as_deref())
        .bind(facts.session_id.as_deref())
        .bind(facts.subscription_id.as_deref())
        .bind(facts.subscription_status.as_deref())
        .bind(status)
        .bind(current_period_end)
        .bind(facts.customer_email.as_deref())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            pro_id = %pro_id,
            status = %status,
            plan_type = %facts.plan_type,
            plan_tier = %facts.plan_tier,
            subscription_id = ?facts.subscription_id,
            "Subscription reconciled"
        );

        Ok(())
    }

    /// Fetch a pro's subscription, if any.
    pub async fn get_by_pro_id(&self, pro_id: &str) -> BillingResult<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT * FROM subscriptions WHERE pro_id = $1",
        )
        .bind(pro_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
