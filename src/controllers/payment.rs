use crate::controllers::require_event_owner;
use crate::error::Error;
use crate::middleware::AuthenticatedOrganizer;
use crate::models::Payment;
use crate::services::razorpay::GatewayHandle;
use crate::services::PaymentService;
use actix_web::{web, HttpRequest, HttpResponse};
use bigdecimal::BigDecimal;
use log::warn;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub event_id: Uuid,
    pub attendee_id: Uuid,
    pub ticket_type_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundPaymentRequest {
    pub amount: Option<BigDecimal>,
    pub reason: Option<String>,
}

/// Build the reconciliation service, preferring a gateway injected through
/// app data (tests) over one constructed from the environment.
fn payment_service(req: &HttpRequest, pool: &PgPool) -> Result<PaymentService, Error> {
    if let Some(handle) = req.app_data::<web::Data<GatewayHandle>>() {
        Ok(PaymentService::with_gateway(pool.clone(), handle.0.clone()))
    } else {
        PaymentService::new(pool.clone())
    }
}

pub async fn create_payment(
    pool: web::Data<PgPool>,
    body: web::Json<CreatePaymentRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let service = payment_service(&req, &pool)?;
    let payment = service
        .create_payment(body.event_id, body.attendee_id, body.ticket_type_id)
        .await?;

    let order_id = payment.order_id.clone();
    let amount = payment.amount.clone();
    let currency = payment.currency.clone();
    Ok(HttpResponse::Created().json(json!({
        "payment": payment,
        "order_id": order_id,
        "amount": amount,
        "currency": currency,
    })))
}

pub async fn verify_payment(
    pool: web::Data<PgPool>,
    body: web::Json<VerifyPaymentRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let service = payment_service(&req, &pool)?;
    let payment = service
        .verify_payment(&body.order_id, &body.payment_id, &body.signature)
        .await?;

    let status = payment.status.clone();
    Ok(HttpResponse::Ok().json(json!({
        "status": status,
        "payment": payment,
    })))
}

/// Gateway webhook entry. Signature failures are rejected so the sender
/// retries through its alerting; business-logic rejections are acknowledged
/// with 200 so the gateway does not redeliver them. Inconclusive outcomes
/// (gateway timeout, storage failure) return 5xx and are safe to redeliver.
pub async fn webhook(
    pool: web::Data<PgPool>,
    body: web::Bytes,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let signature = req
        .headers()
        .get("X-Razorpay-Signature")
        .or_else(|| req.headers().get("X-Signature"))
        .and_then(|value| value.to_str().ok())
        .ok_or(Error::InvalidWebhookSignature)?
        .to_string();

    let service = payment_service(&req, &pool)?;
    match service.process_webhook(&body, &signature).await {
        Ok(_) => Ok(HttpResponse::Ok().json(json!({ "received": true }))),
        Err(e @ Error::InvalidWebhookSignature) => Err(e),
        Err(e @ (Error::GatewayTimeout(_) | Error::Persistence(_) | Error::Internal(_))) => Err(e),
        Err(e) => {
            warn!("Webhook event rejected: {}", e);
            Ok(HttpResponse::Ok().json(json!({ "received": true })))
        }
    }
}

pub async fn create_payment_link(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    organizer: AuthenticatedOrganizer,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let payment_id = path.into_inner();
    let payment = Payment::find_by_id(&pool, payment_id)
        .await?
        .ok_or_else(|| Error::not_found("payment"))?;
    require_event_owner(&pool, payment.event_id, organizer.id).await?;

    let service = payment_service(&req, &pool)?;
    let payment = service.create_payment_link(payment_id).await?;

    let link_url = payment.payment_link_url.clone();
    Ok(HttpResponse::Ok().json(json!({
        "payment": payment,
        "payment_link_url": link_url,
    })))
}

pub async fn refund_payment(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<RefundPaymentRequest>,
    organizer: AuthenticatedOrganizer,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let payment_id = path.into_inner();
    let payment = Payment::find_by_id(&pool, payment_id)
        .await?
        .ok_or_else(|| Error::not_found("payment"))?;
    require_event_owner(&pool, payment.event_id, organizer.id).await?;

    let service = payment_service(&req, &pool)?;
    let body = body.into_inner();
    let payment = service
        .refund_payment(payment_id, body.amount, body.reason)
        .await?;

    let status = payment.status.clone();
    Ok(HttpResponse::Ok().json(json!({
        "status": status,
        "payment": payment,
    })))
}

pub async fn get_payment(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let payment = Payment::find_by_id(&pool, path.into_inner())
        .await?
        .ok_or_else(|| Error::not_found("payment"))?;
    require_event_owner(&pool, payment.event_id, organizer.id).await?;

    Ok(HttpResponse::Ok().json(payment))
}

pub async fn list_event_payments(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let event_id = path.into_inner();
    require_event_owner(&pool, event_id, organizer.id).await?;

    let payments = Payment::find_by_event(&pool, event_id).await?;
    Ok(HttpResponse::Ok().json(payments))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/payments").route(web::post().to(create_payment)))
        .service(web::resource("/payments/verify").route(web::post().to(verify_payment)))
        .service(web::resource("/payments/webhook").route(web::post().to(webhook)))
        .service(web::resource("/payments/{payment_id}").route(web::get().to(get_payment)))
        .service(
            web::resource("/payments/{payment_id}/link")
                .route(web::post().to(create_payment_link)),
        )
        .service(
            web::resource("/payments/{payment_id}/refund")
                .route(web::post().to(refund_payment)),
        )
        .service(
            web::resource("/events/{event_id}/payments")
                .route(web::get().to(list_event_payments)),
        );
}
