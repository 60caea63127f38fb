use crate::error::{Error, Result};
use bigdecimal::{BigDecimal, Signed};
use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Lifecycle states of a payment record. Transitions only move forward along
/// the edges in `allows`; terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    PaymentLinkCreated,
    PaymentLinkSent,
    Captured,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::PaymentLinkCreated => "payment_link_created",
            PaymentStatus::PaymentLinkSent => "payment_link_sent",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(PaymentStatus::Created),
            "payment_link_created" => Some(PaymentStatus::PaymentLinkCreated),
            "payment_link_sent" => Some(PaymentStatus::PaymentLinkSent),
            "captured" => Some(PaymentStatus::Captured),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// The full transition graph. Capture and failure are reachable from a
    /// freshly created payment or one whose payment link was delivered;
    /// refund only from a captured payment.
    pub fn allows(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Created, PaymentLinkCreated)
                | (PaymentLinkCreated, PaymentLinkSent)
                | (Created, Captured)
                | (PaymentLinkSent, Captured)
                | (Created, Failed)
                | (PaymentLinkSent, Failed)
                | (Captured, Refunded)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: String,
    pub gateway_payment_id: Option<String>,
    pub event_id: Uuid,
    pub attendee_id: Uuid,
    pub ticket_type_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub payment_link_id: Option<String>,
    pub payment_link_url: Option<String>,
    pub error_message: Option<String>,
    pub refund_id: Option<String>,
    pub refund_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a capture attempt: either this call performed the transition,
/// or an earlier call already did and this one is a harmless duplicate.
#[derive(Debug)]
pub enum CaptureOutcome {
    Transitioned(Payment),
    AlreadyCaptured(Payment),
}

impl CaptureOutcome {
    pub fn into_payment(self) -> Payment {
        match self {
            CaptureOutcome::Transitioned(p) | CaptureOutcome::AlreadyCaptured(p) => p,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CaptureOutcome::AlreadyCaptured(_))
    }
}

impl Payment {
    pub fn state(&self) -> Result<PaymentStatus> {
        PaymentStatus::parse(&self.status)
            .ok_or_else(|| Error::Internal(format!("unknown payment status '{}'", self.status)))
    }

    /// Local receipt passed to the gateway at order creation, e.g.
    /// RCP-20250601-X7K2M9QA.
    pub fn generate_receipt() -> String {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        format!("RCP-{}-{}", Utc::now().format("%Y%m%d"), suffix.to_uppercase())
    }

    pub async fn create(
        pool: &PgPool,
        order_id: &str,
        event_id: Uuid,
        attendee_id: Uuid,
        ticket_type_id: Uuid,
        amount: BigDecimal,
        currency: &str,
    ) -> Result<Self> {
        if !amount.is_positive() {
            return Err(Error::Validation(
                "payment amount must be greater than zero".to_string(),
            ));
        }

        let now = Utc::now();
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                id, order_id, event_id, attendee_id, ticket_type_id,
                amount, currency, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'created', $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(event_id)
        .bind(attendee_id)
        .bind(ticket_type_id)
        .bind(amount)
        .bind(currency)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(payment)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(payment)
    }

    pub async fn find_by_order_id(pool: &PgPool, order_id: &str) -> Result<Option<Self>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(pool)
            .await?;

        Ok(payment)
    }

    pub async fn find_by_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE event_id = $1 ORDER BY created_at DESC",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await?;

        Ok(payments)
    }

    pub async fn find_by_attendee(pool: &PgPool, attendee_id: Uuid) -> Result<Vec<Self>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE attendee_id = $1 ORDER BY created_at DESC",
        )
        .bind(attendee_id)
        .fetch_all(pool)
        .await?;

        Ok(payments)
    }

    pub async fn mark_link_created(
        pool: &PgPool,
        id: Uuid,
        link_id: &str,
        link_url: &str,
    ) -> Result<Self> {
        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'payment_link_created', payment_link_id = $2,
                payment_link_url = $3, updated_at = $4
            WHERE id = $1 AND status = 'created'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(link_id)
        .bind(link_url)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(payment) => Ok(payment),
            None => {
                let current = Self::find_by_id(pool, id)
                    .await?
                    .ok_or_else(|| Error::not_found("payment"))?;
                Err(Error::InvalidState(format!(
                    "cannot generate a payment link for a payment in status '{}'",
                    current.status
                )))
            }
        }
    }

    pub async fn mark_link_sent(pool: &PgPool, id: Uuid) -> Result<Self> {
        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'payment_link_sent', updated_at = $2
            WHERE id = $1 AND status = 'payment_link_created'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(payment) => Ok(payment),
            None => {
                let current = Self::find_by_id(pool, id)
                    .await?
                    .ok_or_else(|| Error::not_found("payment"))?;
                Err(Error::InvalidState(format!(
                    "cannot mark a payment link delivered in status '{}'",
                    current.status
                )))
            }
        }
    }

    /// Capture transition, keyed by order id. Precondition-gated so two
    /// racing confirmations (webhook vs. client verification) converge: the
    /// loser finds no matching row and is folded into an idempotent success
    /// when the row already carries the same gateway payment id.
    pub async fn capture(
        pool: &PgPool,
        order_id: &str,
        gateway_payment_id: &str,
        payment_method: Option<&str>,
    ) -> Result<CaptureOutcome> {
        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'captured', gateway_payment_id = $2,
                payment_method = $3, updated_at = $4
            WHERE order_id = $1 AND status IN ('created', 'payment_link_sent')
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(gateway_payment_id)
        .bind(payment_method)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        if let Some(payment) = updated {
            return Ok(CaptureOutcome::Transitioned(payment));
        }

        let current = Self::find_by_order_id(pool, order_id)
            .await?
            .ok_or_else(|| Error::not_found("payment"))?;

        match current.state()? {
            PaymentStatus::Captured
                if current.gateway_payment_id.as_deref() == Some(gateway_payment_id) =>
            {
                Ok(CaptureOutcome::AlreadyCaptured(current))
            }
            PaymentStatus::Captured => Err(Error::InvalidState(format!(
                "payment for order {} is already captured with a different gateway payment id",
                order_id
            ))),
            status => Err(Error::InvalidState(format!(
                "cannot capture payment for order {} in status '{}'",
                order_id, status
            ))),
        }
    }

    /// Failure transition. Only applies to a payment that is still pending;
    /// a captured, refunded or already-failed row is left untouched and
    /// `None` is returned.
    pub async fn mark_failed(
        pool: &PgPool,
        order_id: &str,
        message: &str,
    ) -> Result<Option<Self>> {
        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'failed', error_message = $2, updated_at = $3
            WHERE order_id = $1 AND status IN ('created', 'payment_link_sent')
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(message)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        Ok(updated)
    }

    pub async fn mark_refunded(
        pool: &PgPool,
        id: Uuid,
        refund_id: &str,
        refund_details: serde_json::Value,
    ) -> Result<Self> {
        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'refunded', refund_id = $2, refund_details = $3, updated_at = $4
            WHERE id = $1 AND status = 'captured'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(refund_id)
        .bind(refund_details)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(payment) => Ok(payment),
            None => {
                let current = Self::find_by_id(pool, id)
                    .await?
                    .ok_or_else(|| Error::not_found("payment"))?;
                Err(Error::InvalidState(format!(
                    "cannot refund payment in status '{}'",
                    current.status
                )))
            }
        }
    }
}
