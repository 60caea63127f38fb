use crate::error::{Error, Result};
use crate::models::{Attendee, AttendeeStatus, Event, Payment, PaymentStatus, TicketType};
use crate::models::payment::CaptureOutcome;
use crate::services::email::EmailService;
use crate::services::qr_token;
use crate::services::razorpay::{PaymentGateway, PaymentLinkRequest, RazorpayClient};
use bigdecimal::{BigDecimal, Signed};
use chrono::Utc;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Known webhook event kinds. Anything else is acknowledged and ignored
/// rather than failing the delivery.
#[derive(Debug)]
pub enum WebhookEvent {
    PaymentCaptured(WebhookPaymentEntity),
    PaymentFailed(WebhookPaymentEntity),
    Unhandled(String),
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWebhook {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let raw: RawWebhook = serde_json::from_slice(body)
            .map_err(|e| Error::Validation(format!("malformed webhook body: {}", e)))?;

        let entity = |payload: &serde_json::Value| -> Result<WebhookPaymentEntity> {
            let value = payload
                .pointer("/payment/entity")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            serde_json::from_value(value)
                .map_err(|e| Error::Validation(format!("malformed webhook payment entity: {}", e)))
        };

        match raw.event.as_str() {
            "payment.captured" => Ok(WebhookEvent::PaymentCaptured(entity(&raw.payload)?)),
            "payment.failed" => Ok(WebhookEvent::PaymentFailed(entity(&raw.payload)?)),
            other => Ok(WebhookEvent::Unhandled(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub enum WebhookOutcome {
    Captured(Payment),
    Failed(Option<Payment>),
    Ignored(String),
}

/// Converges the two capture triggers (the client verification call and
/// the gateway webhook) onto the same ledger transition, idempotently,
/// regardless of arrival order or duplication.
pub struct PaymentService {
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    email: Arc<EmailService>,
}

impl PaymentService {
    pub fn new(pool: PgPool) -> Result<Self> {
        Ok(Self {
            pool,
            gateway: Arc::new(RazorpayClient::from_env()?),
            email: EmailService::global(),
        })
    }

    /// Construct against an explicit gateway, e.g. a fake in tests.
    pub fn with_gateway(pool: PgPool, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            pool,
            gateway,
            email: EmailService::global(),
        }
    }

    pub fn with_email(mut self, email: Arc<EmailService>) -> Self {
        self.email = email;
        self
    }

    /// Create the local payment record and its gateway order. The gateway
    /// order id becomes the correlation key for everything that follows.
    pub async fn create_payment(
        &self,
        event_id: Uuid,
        attendee_id: Uuid,
        ticket_type_id: Uuid,
    ) -> Result<Payment> {
        let ticket_type = TicketType::find_by_id(&self.pool, ticket_type_id)
            .await?
            .ok_or_else(|| Error::not_found("ticket type"))?;
        if ticket_type.event_id != event_id {
            return Err(Error::Validation(
                "ticket type does not belong to this event".to_string(),
            ));
        }
        if ticket_type.is_free() {
            return Err(Error::Validation(
                "free ticket types do not require payment".to_string(),
            ));
        }

        let attendee = Attendee::find_by_id(&self.pool, attendee_id)
            .await?
            .ok_or_else(|| Error::not_found("attendee"))?;
        if attendee.event_id != event_id {
            return Err(Error::Validation(
                "attendee is not registered for this event".to_string(),
            ));
        }
        if attendee.state()? == AttendeeStatus::Cancelled {
            return Err(Error::InvalidState(
                "cannot create a payment for a cancelled attendee".to_string(),
            ));
        }

        let event = Event::find_by_id(&self.pool, event_id)
            .await?
            .ok_or_else(|| Error::not_found("event"))?;
        if event.is_cancelled() {
            return Err(Error::InvalidState(
                "cannot create a payment for a cancelled event".to_string(),
            ));
        }

        let receipt = Payment::generate_receipt();
        let notes = json!({
            "event_id": event_id,
            "attendee_id": attendee_id,
            "receipt": receipt,
        });

        let order = self
            .gateway
            .create_order(&ticket_type.price, &ticket_type.currency, &receipt, Some(notes))
            .await?;

        let payment = Payment::create(
            &self.pool,
            &order.id,
            event_id,
            attendee_id,
            ticket_type_id,
            ticket_type.price.clone(),
            &ticket_type.currency,
        )
        .await?;

        info!(
            "Created payment {} (order {}) for attendee {} on event {}",
            payment.id, payment.order_id, attendee_id, event_id
        );

        Ok(payment)
    }

    /// Generate a hosted payment link and email it to the attendee. Link
    /// generation moves the payment to `payment_link_created`; a delivered
    /// email moves it on to `payment_link_sent`.
    pub async fn create_payment_link(&self, payment_id: Uuid) -> Result<Payment> {
        let payment = Payment::find_by_id(&self.pool, payment_id)
            .await?
            .ok_or_else(|| Error::not_found("payment"))?;

        if payment.state()? != PaymentStatus::Created {
            return Err(Error::InvalidState(format!(
                "cannot generate a payment link for a payment in status '{}'",
                payment.status
            )));
        }

        let attendee = Attendee::find_by_id(&self.pool, payment.attendee_id)
            .await?
            .ok_or_else(|| Error::not_found("attendee"))?;
        let event = Event::find_by_id(&self.pool, payment.event_id)
            .await?
            .ok_or_else(|| Error::not_found("event"))?;

        let link = self
            .gateway
            .create_payment_link(PaymentLinkRequest {
                amount: payment.amount.clone(),
                currency: payment.currency.clone(),
                description: format!("Ticket for {}", event.title),
                reference_id: payment.order_id.clone(),
                customer_name: attendee.name.clone(),
                customer_email: attendee.email.clone(),
                customer_contact: attendee.phone.clone(),
            })
            .await?;

        let payment =
            Payment::mark_link_created(&self.pool, payment.id, &link.id, &link.short_url).await?;

        match self
            .email
            .send_payment_link(&attendee.email, &attendee.name, &event.title, &link.short_url)
            .await
        {
            Ok(()) => {
                let payment = Payment::mark_link_sent(&self.pool, payment.id).await?;
                info!(
                    "Payment link for order {} delivered to {}",
                    payment.order_id, attendee.email
                );
                Ok(payment)
            }
            Err(e) => {
                warn!(
                    "Payment link for order {} created but not delivered: {}",
                    payment.order_id, e
                );
                Ok(payment)
            }
        }
    }

    /// Client-submitted verification: check the payment signature, then run
    /// the shared settle path. An invalid signature never touches the ledger.
    pub async fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<Payment> {
        if !self
            .gateway
            .verify_payment_signature(order_id, payment_id, signature)?
        {
            warn!(
                "Rejected payment verification for order {}: signature mismatch",
                order_id
            );
            return Err(Error::InvalidSignature);
        }

        self.settle_capture(order_id, payment_id).await
    }

    /// Webhook-submitted confirmation: check the body HMAC, then dispatch
    /// the tagged event onto the same settle path the client trigger uses.
    pub async fn process_webhook(&self, body: &[u8], signature: &str) -> Result<WebhookOutcome> {
        if !self.gateway.verify_webhook_signature(body, signature)? {
            warn!("Rejected webhook delivery: signature mismatch");
            return Err(Error::InvalidWebhookSignature);
        }

        match WebhookEvent::parse(body)? {
            WebhookEvent::PaymentCaptured(entity) => {
                let order_id = entity.order_id.as_deref().ok_or_else(|| {
                    Error::Validation("webhook payment entity is missing order_id".to_string())
                })?;
                let payment = self.settle_capture(order_id, &entity.id).await?;
                Ok(WebhookOutcome::Captured(payment))
            }
            WebhookEvent::PaymentFailed(entity) => {
                let order_id = entity.order_id.as_deref().ok_or_else(|| {
                    Error::Validation("webhook payment entity is missing order_id".to_string())
                })?;
                let message = entity
                    .error_description
                    .unwrap_or_else(|| "payment failed at gateway".to_string());

                let updated = Payment::mark_failed(&self.pool, order_id, &message).await?;
                match &updated {
                    Some(payment) => {
                        info!("Payment for order {} marked failed via webhook", payment.order_id)
                    }
                    None => info!(
                        "Ignoring failure webhook for order {}: payment already settled",
                        order_id
                    ),
                }
                Ok(WebhookOutcome::Failed(updated))
            }
            WebhookEvent::Unhandled(kind) => {
                info!("Acknowledging unhandled webhook event '{}'", kind);
                Ok(WebhookOutcome::Ignored(kind))
            }
        }
    }

    /// The shared settle path. Fetches authoritative payment details from
    /// the gateway (a structurally valid signature is not proof of capture),
    /// then applies the precondition-gated capture transition. A duplicate
    /// confirmation converges on the same success without side effects.
    async fn settle_capture(&self, order_id: &str, payment_id: &str) -> Result<Payment> {
        let details = match self.gateway.fetch_payment(payment_id).await {
            Ok(details) => details,
            Err(Error::GatewayTimeout(msg)) => {
                // inconclusive: the gateway may have captured the payment.
                // Leave the row pending and let a retry or the webhook settle it.
                warn!(
                    "Gateway unreachable while confirming order {}; leaving payment pending",
                    order_id
                );
                return Err(Error::GatewayTimeout(msg));
            }
            Err(e) => {
                self.reject_capture(order_id, &e.to_string()).await;
                return Err(e);
            }
        };

        if let Some(remote_order) = details.order_id.as_deref() {
            if remote_order != order_id {
                let message = format!(
                    "gateway payment {} belongs to order {}, not {}",
                    payment_id, remote_order, order_id
                );
                self.reject_capture(order_id, &message).await;
                return Err(Error::Gateway(message));
            }
        }

        if details.status != "captured" && details.status != "authorized" {
            let message = details
                .error_description
                .unwrap_or_else(|| format!("gateway reports payment in state '{}'", details.status));
            self.reject_capture(order_id, &message).await;
            return Err(Error::Gateway(message));
        }

        match Payment::capture(&self.pool, order_id, payment_id, details.method.as_deref()).await? {
            CaptureOutcome::Transitioned(payment) => {
                info!(
                    "Payment captured for order {} (gateway payment {})",
                    order_id, payment_id
                );
                self.notify_captured(&payment);
                Ok(payment)
            }
            CaptureOutcome::AlreadyCaptured(payment) => {
                info!("Duplicate capture confirmation for order {} ignored", order_id);
                Ok(payment)
            }
        }
    }

    /// Record a definitive rejection. Only payments still pending move to
    /// `failed`; settled rows are left untouched.
    async fn reject_capture(&self, order_id: &str, message: &str) {
        match Payment::mark_failed(&self.pool, order_id, message).await {
            Ok(Some(_)) => warn!("Payment for order {} marked failed: {}", order_id, message),
            Ok(None) => info!(
                "Capture rejection for order {} ignored: payment no longer pending",
                order_id
            ),
            Err(e) => error!(
                "Failed to record payment failure for order {}: {}",
                order_id, e
            ),
        }
    }

    /// Refund a captured payment. Defaults to the full original amount and
    /// never exceeds it; the state machine enforces a single refund.
    pub async fn refund_payment(
        &self,
        payment_id: Uuid,
        amount: Option<BigDecimal>,
        reason: Option<String>,
    ) -> Result<Payment> {
        let payment = Payment::find_by_id(&self.pool, payment_id)
            .await?
            .ok_or_else(|| Error::not_found("payment"))?;

        if payment.state()? != PaymentStatus::Captured {
            return Err(Error::InvalidState(format!(
                "cannot refund payment in status '{}'",
                payment.status
            )));
        }

        let gateway_payment_id = payment
            .gateway_payment_id
            .as_deref()
            .ok_or_else(|| {
                Error::Internal("captured payment has no gateway payment id".to_string())
            })?;

        let refund_amount = amount.unwrap_or_else(|| payment.amount.clone());
        if !refund_amount.is_positive() {
            return Err(Error::Validation(
                "refund amount must be greater than zero".to_string(),
            ));
        }
        if refund_amount > payment.amount {
            return Err(Error::Validation(
                "refund amount cannot exceed the original payment amount".to_string(),
            ));
        }

        // gateway first; a failed remote refund must not corrupt local state
        let refund = self
            .gateway
            .refund_payment(gateway_payment_id, &refund_amount, reason.as_deref())
            .await?;

        let details = json!({
            "refund_id": refund.id,
            "amount": refund_amount.to_string(),
            "currency": payment.currency,
            "reason": reason,
            "gateway_status": refund.status,
            "refunded_at": Utc::now().to_rfc3339(),
        });

        let updated = Payment::mark_refunded(&self.pool, payment.id, &refund.id, details).await?;
        info!(
            "Refunded {} {} on payment {} (order {})",
            refund_amount, updated.currency, updated.id, updated.order_id
        );

        Ok(updated)
    }

    /// Best-effort post-capture notifications: payment confirmation plus the
    /// ticket email with its QR code. Failures are logged, never propagated.
    fn notify_captured(&self, payment: &Payment) {
        let pool = self.pool.clone();
        let email = self.email.clone();
        let payment = payment.clone();

        tokio::spawn(async move {
            let attendee = match Attendee::find_by_id(&pool, payment.attendee_id).await {
                Ok(Some(attendee)) => attendee,
                Ok(None) => return,
                Err(e) => {
                    error!(
                        "Failed to load attendee {} for payment notification: {}",
                        payment.attendee_id, e
                    );
                    return;
                }
            };
            let event_title = match Event::find_by_id(&pool, payment.event_id).await {
                Ok(Some(event)) => event.title,
                _ => "your event".to_string(),
            };

            if let Err(e) = email
                .send_payment_confirmation(
                    &attendee.email,
                    &attendee.name,
                    &event_title,
                    &payment.amount.to_string(),
                    &payment.currency,
                    &payment.order_id,
                )
                .await
            {
                error!(
                    "Failed to send payment confirmation for order {}: {}",
                    payment.order_id, e
                );
            }

            match qr_token::encode(
                attendee.id,
                attendee.event_id,
                attendee.verification_code.clone(),
            ) {
                Ok(ticket) => {
                    if let Err(e) = email
                        .send_ticket(&attendee.email, &attendee.name, &event_title, &ticket.image_svg)
                        .await
                    {
                        error!(
                            "Failed to send ticket email for order {}: {}",
                            payment.order_id, e
                        );
                    }
                }
                Err(e) => error!(
                    "Failed to render ticket QR for attendee {}: {}",
                    attendee.id, e
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_captured_event() {
        let body = serde_json::json!({
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_xyz789",
                        "order_id": "order_abc123",
                        "status": "captured",
                        "method": "upi"
                    }
                }
            }
        });

        match WebhookEvent::parse(body.to_string().as_bytes()).unwrap() {
            WebhookEvent::PaymentCaptured(entity) => {
                assert_eq!(entity.id, "pay_xyz789");
                assert_eq!(entity.order_id.as_deref(), Some("order_abc123"));
                assert_eq!(entity.method.as_deref(), Some("upi"));
            }
            other => panic!("expected captured event, got {:?}", other),
        }
    }

    #[test]
    fn parses_a_failed_event_with_its_error() {
        let body = serde_json::json!({
            "event": "payment.failed",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_bad",
                        "order_id": "order_abc123",
                        "error_description": "card declined"
                    }
                }
            }
        });

        match WebhookEvent::parse(body.to_string().as_bytes()).unwrap() {
            WebhookEvent::PaymentFailed(entity) => {
                assert_eq!(entity.error_description.as_deref(), Some("card declined"));
            }
            other => panic!("expected failed event, got {:?}", other),
        }
    }

    #[test]
    fn unknown_event_kinds_are_acknowledged_not_errors() {
        let body = serde_json::json!({
            "event": "refund.processed",
            "payload": { "refund": { "entity": { "id": "rfnd_1" } } }
        });

        match WebhookEvent::parse(body.to_string().as_bytes()).unwrap() {
            WebhookEvent::Unhandled(kind) => assert_eq!(kind, "refund.processed"),
            other => panic!("expected unhandled event, got {:?}", other),
        }
    }

    #[test]
    fn garbage_bodies_are_validation_errors() {
        assert!(matches!(
            WebhookEvent::parse(b"not json"),
            Err(Error::Validation(_))
        ));

        // captured event without a payment entity
        let body = serde_json::json!({ "event": "payment.captured", "payload": {} });
        assert!(matches!(
            WebhookEvent::parse(body.to_string().as_bytes()),
            Err(Error::Validation(_))
        ));
    }
}
