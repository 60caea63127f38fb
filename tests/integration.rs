use actix_web::{test, web, App};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use gatepass::models::{Attendee, Payment};
use gatepass::services::checkin::CheckInService;
use gatepass::services::email::{EmailMessage, EmailSender, EmailService};
use gatepass::services::razorpay::{
    to_minor_units, GatewayOrder, GatewayPayment, GatewayRefund, PaymentGateway, PaymentLink,
    PaymentLinkRequest,
};
use gatepass::services::{qr_token, AuthService, PaymentService};
use gatepass::Error;

const TEST_KEY_SECRET: &str = "test_key_secret";
const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";

async fn setup_test_db() -> Option<PgPool> {
    dotenv::from_filename(".env.test").ok();
    dotenv::dotenv().ok();

    if env::var("JWT_SECRET").is_err() {
        env::set_var("JWT_SECRET", "integration-test-secret-0123456789abcdef");
    }

    let database_url = match env::var("TEST_DATABASE_URL").or_else(|_| env::var("DATABASE_URL")) {
        Ok(url) => url,
        Err(_) => {
            println!("⏭️  Skipping test - TEST_DATABASE_URL/DATABASE_URL not set");
            return None;
        }
    };

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

fn unique_id() -> String {
    let uuid_str = Uuid::new_v4().simple().to_string();
    format!("{}_{}", std::process::id(), &uuid_str[..8])
}

fn sign(secret: &str, message: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// In-memory gateway. Signatures use the real HMAC scheme so tamper tests
/// exercise the same code path as production.
struct FakeGateway {
    payments: Mutex<HashMap<String, GatewayPayment>>,
    fetch_times_out: AtomicBool,
}

impl FakeGateway {
    fn new() -> Self {
        Self {
            payments: Mutex::new(HashMap::new()),
            fetch_times_out: AtomicBool::new(false),
        }
    }

    fn add_payment(&self, payment_id: &str, order_id: &str, status: &str, method: &str) {
        self.payments.lock().unwrap().insert(
            payment_id.to_string(),
            GatewayPayment {
                id: payment_id.to_string(),
                order_id: Some(order_id.to_string()),
                amount: 0,
                currency: "INR".to_string(),
                status: status.to_string(),
                method: Some(method.to_string()),
                email: None,
                contact: None,
                error_description: if status == "failed" {
                    Some("card declined".to_string())
                } else {
                    None
                },
            },
        );
    }

    fn set_fetch_times_out(&self, value: bool) {
        self.fetch_times_out.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount: &BigDecimal,
        currency: &str,
        receipt: &str,
        _notes: Option<serde_json::Value>,
    ) -> Result<GatewayOrder, Error> {
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(GatewayOrder {
            id: format!("order_{}", &suffix[..14]),
            amount: to_minor_units(amount)?,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: "created".to_string(),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, Error> {
        if self.fetch_times_out.load(Ordering::SeqCst) {
            return Err(Error::GatewayTimeout("connection timed out".to_string()));
        }

        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| Error::Gateway(format!("payment {} not found", payment_id)))
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: &BigDecimal,
        _reason: Option<&str>,
    ) -> Result<GatewayRefund, Error> {
        Ok(GatewayRefund {
            id: format!("rfnd_{}", &Uuid::new_v4().simple().to_string()[..14]),
            payment_id: payment_id.to_string(),
            amount: to_minor_units(amount)?,
            status: "processed".to_string(),
        })
    }

    async fn create_payment_link(
        &self,
        request: PaymentLinkRequest,
    ) -> Result<PaymentLink, Error> {
        Ok(PaymentLink {
            id: format!("plink_{}", &Uuid::new_v4().simple().to_string()[..14]),
            short_url: format!("https://rzp.io/l/{}", request.reference_id),
        })
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, Error> {
        let message = format!("{}|{}", order_id, payment_id);
        Ok(sign(TEST_KEY_SECRET, message.as_bytes()) == signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> Result<bool, Error> {
        Ok(sign(TEST_WEBHOOK_SECRET, body) == signature)
    }
}

/// Email sender that always fails, for asserting notification failures
/// never propagate into the primary operation.
struct FailingSender;

#[async_trait]
impl EmailSender for FailingSender {
    async fn send(&self, _message: EmailMessage) -> Result<(), Error> {
        Err(Error::Internal("SMTP connection refused".to_string()))
    }

    fn sender_name(&self) -> &'static str {
        "failing"
    }
}

async fn create_test_organizer(pool: &PgPool) -> Uuid {
    let organizer_id = Uuid::new_v4();
    let id = unique_id();

    sqlx::query(
        r#"
        INSERT INTO organizers (id, name, email, password_hash, created_at, updated_at)
        VALUES ($1, $2, $3, 'hashed_password', NOW(), NOW())
        "#,
    )
    .bind(organizer_id)
    .bind(format!("Test Organizer {}", id))
    .bind(format!("organizer_{}@example.com", id))
    .execute(pool)
    .await
    .expect("Failed to create test organizer");

    organizer_id
}

async fn create_test_event(pool: &PgPool, organizer_id: Uuid) -> Uuid {
    let event_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO events (
            id, organizer_id, title, description, location,
            start_time, end_time, status, created_at, updated_at
        )
        VALUES ($1, $2, $3, 'Test description', 'Test venue',
                NOW() + INTERVAL '1 day', NOW() + INTERVAL '1 day' + INTERVAL '3 hours',
                'published', NOW(), NOW())
        "#,
    )
    .bind(event_id)
    .bind(organizer_id)
    .bind(format!("Test Conference {}", unique_id()))
    .execute(pool)
    .await
    .expect("Failed to create test event");

    event_id
}

async fn create_test_ticket_type(pool: &PgPool, event_id: Uuid, price: &str) -> Uuid {
    let ticket_type_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO ticket_types (
            id, event_id, name, description, price, currency, quantity, created_at, updated_at
        )
        VALUES ($1, $2, $3, 'Standard entry', $4, 'INR', 100, NOW(), NOW())
        "#,
    )
    .bind(ticket_type_id)
    .bind(event_id)
    .bind(format!("General {}", unique_id()))
    .bind(BigDecimal::from_str(price).unwrap())
    .execute(pool)
    .await
    .expect("Failed to create test ticket type");

    ticket_type_id
}

async fn create_test_attendee(pool: &PgPool, event_id: Uuid, ticket_type_id: Uuid) -> Uuid {
    let attendee_id = Uuid::new_v4();
    let id = unique_id();

    sqlx::query(
        r#"
        INSERT INTO attendees (
            id, event_id, ticket_type_id, name, email, status,
            verification_code, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, 'registered', 'TESTCD', NOW(), NOW())
        "#,
    )
    .bind(attendee_id)
    .bind(event_id)
    .bind(ticket_type_id)
    .bind(format!("Attendee {}", id))
    .bind(format!("attendee_{}@example.com", id))
    .execute(pool)
    .await
    .expect("Failed to create test attendee");

    attendee_id
}

struct Fixture {
    event_id: Uuid,
    attendee_id: Uuid,
    ticket_type_id: Uuid,
}

async fn seed(pool: &PgPool, price: &str) -> Fixture {
    let organizer_id = create_test_organizer(pool).await;
    let event_id = create_test_event(pool, organizer_id).await;
    let ticket_type_id = create_test_ticket_type(pool, event_id, price).await;
    let attendee_id = create_test_attendee(pool, event_id, ticket_type_id).await;

    Fixture {
        event_id,
        attendee_id,
        ticket_type_id,
    }
}

fn webhook_body(event: &str, payment_id: &str, order_id: &str) -> Vec<u8> {
    let failed = event == "payment.failed";
    let status = if failed { "failed" } else { "captured" };
    let error_description = if failed { Some("card declined") } else { None };

    json!({
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "status": status,
                    "method": "upi",
                    "error_description": error_description,
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_payment_capture_and_refund_scenario() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "499.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    // create: one row per order, status created
    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .expect("payment creation should succeed");
    assert_eq!(payment.status, "created");
    assert!(payment.order_id.starts_with("order_"));
    assert!(payment.gateway_payment_id.is_none());

    // client submits a correct signature
    fake.add_payment("pay_xyz789", &payment.order_id, "captured", "upi");
    let signature = sign(
        TEST_KEY_SECRET,
        format!("{}|pay_xyz789", payment.order_id).as_bytes(),
    );

    let captured = service
        .verify_payment(&payment.order_id, "pay_xyz789", &signature)
        .await
        .expect("verification should succeed");
    assert_eq!(captured.status, "captured");
    assert_eq!(captured.gateway_payment_id.as_deref(), Some("pay_xyz789"));
    assert_eq!(captured.payment_method.as_deref(), Some("upi"));

    // idempotence: the same call again is the same success, not an error
    let again = service
        .verify_payment(&payment.order_id, "pay_xyz789", &signature)
        .await
        .expect("duplicate verification should succeed");
    assert_eq!(again.status, "captured");
    assert_eq!(again.gateway_payment_id.as_deref(), Some("pay_xyz789"));

    // refund with no amount refunds the full 499.00
    let refunded = service
        .refund_payment(captured.id, None, Some("event cancelled".to_string()))
        .await
        .expect("refund should succeed");
    assert_eq!(refunded.status, "refunded");
    assert!(refunded.refund_id.is_some());
    let details = refunded.refund_details.expect("refund details recorded");
    assert_eq!(details["amount"], "499.00");

    // second refund is rejected with no mutation
    let err = service
        .refund_payment(refunded.id, None, None)
        .await
        .expect_err("second refund must be rejected");
    assert!(matches!(err, Error::InvalidState(_)));

    let current = Payment::find_by_id(&pool, refunded.id).await.unwrap().unwrap();
    assert_eq!(current.status, "refunded");
}

#[tokio::test]
async fn test_tampered_signature_leaves_payment_untouched() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "250.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .unwrap();
    fake.add_payment("pay_tamper", &payment.order_id, "captured", "card");

    let mut signature = sign(
        TEST_KEY_SECRET,
        format!("{}|pay_tamper", payment.order_id).as_bytes(),
    );
    let last = signature.pop().unwrap();
    signature.push(if last == 'a' { 'b' } else { 'a' });

    let err = service
        .verify_payment(&payment.order_id, "pay_tamper", &signature)
        .await
        .expect_err("tampered signature must be rejected");
    assert!(matches!(err, Error::InvalidSignature));

    let current = Payment::find_by_id(&pool, payment.id).await.unwrap().unwrap();
    assert_eq!(current.status, "created");
    assert!(current.gateway_payment_id.is_none());
}

#[tokio::test]
async fn test_webhook_and_client_verification_converge() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "150.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .unwrap();
    fake.add_payment("pay_race", &payment.order_id, "captured", "netbanking");

    // webhook lands first
    let body = webhook_body("payment.captured", "pay_race", &payment.order_id);
    let webhook_signature = sign(TEST_WEBHOOK_SECRET, &body);
    service
        .process_webhook(&body, &webhook_signature)
        .await
        .expect("webhook processing should succeed");

    let after_webhook = Payment::find_by_id(&pool, payment.id).await.unwrap().unwrap();
    assert_eq!(after_webhook.status, "captured");

    // the late client verification converges on the same outcome
    let signature = sign(
        TEST_KEY_SECRET,
        format!("{}|pay_race", payment.order_id).as_bytes(),
    );
    let converged = service
        .verify_payment(&payment.order_id, "pay_race", &signature)
        .await
        .expect("late verification should converge");
    assert_eq!(converged.status, "captured");
    assert_eq!(converged.gateway_payment_id.as_deref(), Some("pay_race"));

    // duplicate webhook delivery is also safe
    service
        .process_webhook(&body, &webhook_signature)
        .await
        .expect("duplicate webhook should be acknowledged");
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "100.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .unwrap();

    let body = webhook_body("payment.captured", "pay_forged", &payment.order_id);
    let err = service
        .process_webhook(&body, "not-the-right-signature")
        .await
        .expect_err("forged webhook must be rejected");
    assert!(matches!(err, Error::InvalidWebhookSignature));

    let current = Payment::find_by_id(&pool, payment.id).await.unwrap().unwrap();
    assert_eq!(current.status, "created");
}

#[tokio::test]
async fn test_failure_webhook_marks_payment_failed_without_resurrection() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "320.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .unwrap();

    let body = webhook_body("payment.failed", "pay_declined", &payment.order_id);
    let signature = sign(TEST_WEBHOOK_SECRET, &body);
    service
        .process_webhook(&body, &signature)
        .await
        .expect("failure webhook should be processed");

    let failed = Payment::find_by_id(&pool, payment.id).await.unwrap().unwrap();
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.error_message.as_deref(), Some("card declined"));

    // a later valid confirmation cannot resurrect the failed payment
    fake.add_payment("pay_declined", &payment.order_id, "captured", "card");
    let verify_signature = sign(
        TEST_KEY_SECRET,
        format!("{}|pay_declined", payment.order_id).as_bytes(),
    );
    let err = service
        .verify_payment(&payment.order_id, "pay_declined", &verify_signature)
        .await
        .expect_err("capturing a failed payment must be rejected");
    assert!(matches!(err, Error::InvalidState(_)));

    let current = Payment::find_by_id(&pool, payment.id).await.unwrap().unwrap();
    assert_eq!(current.status, "failed");
}

#[tokio::test]
async fn test_gateway_rejection_fails_the_payment() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "75.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .unwrap();

    // signature is valid but the gateway says the payment failed
    fake.add_payment("pay_nofunds", &payment.order_id, "failed", "card");
    let signature = sign(
        TEST_KEY_SECRET,
        format!("{}|pay_nofunds", payment.order_id).as_bytes(),
    );

    let err = service
        .verify_payment(&payment.order_id, "pay_nofunds", &signature)
        .await
        .expect_err("gateway-rejected payment must not capture");
    assert!(matches!(err, Error::Gateway(_)));

    let current = Payment::find_by_id(&pool, payment.id).await.unwrap().unwrap();
    assert_eq!(current.status, "failed");
    assert!(current.error_message.is_some());
}

#[tokio::test]
async fn test_gateway_timeout_leaves_payment_pending() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "88.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .unwrap();

    fake.add_payment("pay_slow", &payment.order_id, "captured", "upi");
    fake.set_fetch_times_out(true);

    let signature = sign(
        TEST_KEY_SECRET,
        format!("{}|pay_slow", payment.order_id).as_bytes(),
    );
    let err = service
        .verify_payment(&payment.order_id, "pay_slow", &signature)
        .await
        .expect_err("inconclusive outcome must surface");
    assert!(matches!(err, Error::GatewayTimeout(_)));

    // the payment stays pending so a retry or the webhook can settle it
    let current = Payment::find_by_id(&pool, payment.id).await.unwrap().unwrap();
    assert_eq!(current.status, "created");

    fake.set_fetch_times_out(false);
    let settled = service
        .verify_payment(&payment.order_id, "pay_slow", &signature)
        .await
        .expect("retry after timeout should capture");
    assert_eq!(settled.status, "captured");
}

#[tokio::test]
async fn test_payment_link_lifecycle_reaches_capture() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "640.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .unwrap();

    // link generated, then delivered by email (log sender in tests)
    let linked = service
        .create_payment_link(payment.id)
        .await
        .expect("payment link should be created");
    assert_eq!(linked.status, "payment_link_sent");
    assert!(linked.payment_link_url.is_some());

    // a second link for the same payment is rejected
    let err = service
        .create_payment_link(payment.id)
        .await
        .expect_err("duplicate link generation must be rejected");
    assert!(matches!(err, Error::InvalidState(_)));

    // capture is reachable from payment_link_sent
    fake.add_payment("pay_vialink", &payment.order_id, "captured", "upi");
    let body = webhook_body("payment.captured", "pay_vialink", &payment.order_id);
    let signature = sign(TEST_WEBHOOK_SECRET, &body);
    service
        .process_webhook(&body, &signature)
        .await
        .expect("webhook capture from link state should succeed");

    let current = Payment::find_by_id(&pool, payment.id).await.unwrap().unwrap();
    assert_eq!(current.status, "captured");
}

#[tokio::test]
async fn test_refund_cannot_exceed_original_amount() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "200.00").await;

    let fake = Arc::new(FakeGateway::new());
    let service = PaymentService::with_gateway(pool.clone(), fake.clone());

    let payment = service
        .create_payment(fixture.event_id, fixture.attendee_id, fixture.ticket_type_id)
        .await
        .unwrap();
    fake.add_payment("pay_partial", &payment.order_id, "captured", "card");
    let signature = sign(
        TEST_KEY_SECRET,
        format!("{}|pay_partial", payment.order_id).as_bytes(),
    );
    let captured = service
        .verify_payment(&payment.order_id, "pay_partial", &signature)
        .await
        .unwrap();

    let err = service
        .refund_payment(
            captured.id,
            Some(BigDecimal::from_str("500.00").unwrap()),
            None,
        )
        .await
        .expect_err("over-refund must be rejected");
    assert!(matches!(err, Error::Validation(_)));

    // partial refunds within the original amount are accepted
    let refunded = service
        .refund_payment(
            captured.id,
            Some(BigDecimal::from_str("50.00").unwrap()),
            Some("goodwill".to_string()),
        )
        .await
        .expect("partial refund should succeed");
    assert_eq!(refunded.status, "refunded");
}

#[tokio::test]
async fn test_duplicate_check_in_is_idempotent() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "10.00").await;

    // a failing notification sender must not affect the check-in outcome
    let email = Arc::new(EmailService::with_sender(Arc::new(FailingSender)));
    let service = CheckInService::with_email(pool.clone(), email);

    let first = service
        .check_in(fixture.attendee_id, "staff-1")
        .await
        .expect("first check-in should succeed");
    assert!(!first.is_duplicate);
    assert!(first.attendee.check_in_time.is_some());
    assert_eq!(first.attendee.checked_in_by.as_deref(), Some("staff-1"));

    let second = service
        .check_in(fixture.attendee_id, "staff-2")
        .await
        .expect("duplicate check-in should succeed");
    assert!(second.is_duplicate);
    assert_eq!(second.attendee.check_in_time, first.attendee.check_in_time);
    assert_eq!(second.attendee.checked_in_by.as_deref(), Some("staff-1"));
}

#[tokio::test]
async fn test_cancelled_attendee_can_never_check_in() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "10.00").await;

    Attendee::cancel(&pool, fixture.attendee_id)
        .await
        .expect("cancellation should succeed");

    let service = CheckInService::new(pool.clone());
    for _ in 0..2 {
        let err = service
            .check_in(fixture.attendee_id, "staff-1")
            .await
            .expect_err("cancelled attendee must be rejected");
        assert!(matches!(err, Error::InvalidState(_)));
    }
}

#[tokio::test]
async fn test_expired_qr_token_never_touches_attendee_state() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "10.00").await;

    let stale = json!({
        "type": "ticket",
        "attendee_id": fixture.attendee_id,
        "event_id": fixture.event_id,
        "timestamp": (Utc::now() - Duration::hours(25)).timestamp(),
    });
    let token = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(stale.to_string())
    };

    let service = CheckInService::new(pool.clone());
    let err = service
        .check_in_from_token(&token, "scanner-1")
        .await
        .expect_err("stale token must be rejected");
    assert!(matches!(err, Error::ExpiredToken));

    let attendee = Attendee::find_by_id(&pool, fixture.attendee_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attendee.status, "registered");
    assert!(attendee.check_in_time.is_none());
}

#[actix_web::test]
async fn test_scan_endpoint_round_trip() {
    let Some(pool) = setup_test_db().await else { return };
    let fixture = seed(&pool, "10.00").await;
    let organizer_id = create_test_organizer(&pool).await;
    let token = AuthService::generate_token(organizer_id).expect("token generation");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .configure(gatepass::controllers::configure_routes),
    )
    .await;

    let ticket = qr_token::encode(fixture.attendee_id, fixture.event_id, Some("TESTCD".to_string()))
        .expect("ticket encoding");

    let req = test::TestRequest::post()
        .uri("/scan")
        .insert_header(("authorization", format!("Bearer {}", token)))
        .set_json(json!({ "qr_data": ticket.token }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success(), "scan should succeed");

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["is_duplicate"], false);
    assert_eq!(body["attendee"]["status"], "checked_in");

    // second scan of the same code reports a duplicate, not an error
    let req = test::TestRequest::post()
        .uri("/scan")
        .insert_header(("authorization", format!("Bearer {}", token)))
        .set_json(json!({ "qr_data": ticket.token }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["is_duplicate"], true);

    // garbage tokens are a 400, before any state is read
    let req = test::TestRequest::post()
        .uri("/scan")
        .insert_header(("authorization", format!("Bearer {}", token)))
        .set_json(json!({ "qr_data": "!!not-a-token!!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn test_organizer_registration_and_login() {
    let Some(pool) = setup_test_db().await else { return };

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .configure(gatepass::controllers::configure_routes),
    )
    .await;

    let email = format!("reg_{}@example.com", unique_id());
    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "name": "Registration Test",
            "email": email,
            "password": "password123",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success(), "registration should succeed");

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": email, "password": "password123" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success(), "login should succeed");

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["token"].as_str().is_some());

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": email, "password": "wrong-password" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);
}
