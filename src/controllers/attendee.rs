use crate::controllers::require_event_owner;
use crate::error::Error;
use crate::middleware::AuthenticatedOrganizer;
use crate::models::{Attendee, Event, RegisterAttendeeRequest};
use crate::services::checkin::CheckInResult;
use crate::services::{qr_token, CheckInService, EmailService};
use actix_web::{web, HttpResponse};
use log::error;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub qr_data: String,
}

pub async fn register_attendee(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<RegisterAttendeeRequest>,
) -> Result<HttpResponse, Error> {
    let event_id = path.into_inner();
    let event = Event::find_by_id(&pool, event_id)
        .await?
        .ok_or_else(|| Error::not_found("event"))?;
    if event.is_cancelled() {
        return Err(Error::InvalidState(
            "registration is closed for a cancelled event".to_string(),
        ));
    }

    let attendee = Attendee::create(&pool, event_id, body.into_inner()).await?;

    // best-effort ticket email; registration never waits on it
    let email = EmailService::global();
    let ticket_attendee = attendee.clone();
    let event_title = event.title.clone();
    tokio::spawn(async move {
        match qr_token::encode(
            ticket_attendee.id,
            ticket_attendee.event_id,
            ticket_attendee.verification_code.clone(),
        ) {
            Ok(ticket) => {
                if let Err(e) = email
                    .send_ticket(
                        &ticket_attendee.email,
                        &ticket_attendee.name,
                        &event_title,
                        &ticket.image_svg,
                    )
                    .await
                {
                    error!(
                        "Failed to send ticket email to attendee {}: {}",
                        ticket_attendee.id, e
                    );
                }
            }
            Err(e) => error!(
                "Failed to render ticket QR for attendee {}: {}",
                ticket_attendee.id, e
            ),
        }
    });

    Ok(HttpResponse::Created().json(attendee))
}

pub async fn list_attendees(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let event_id = path.into_inner();
    require_event_owner(&pool, event_id, organizer.id).await?;

    let attendees = Attendee::find_by_event(&pool, event_id).await?;
    Ok(HttpResponse::Ok().json(attendees))
}

pub async fn get_ticket(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let attendee = Attendee::find_by_id(&pool, path.into_inner())
        .await?
        .ok_or_else(|| Error::not_found("attendee"))?;

    let ticket = qr_token::encode(
        attendee.id,
        attendee.event_id,
        attendee.verification_code.clone(),
    )?;

    Ok(HttpResponse::Ok().json(json!({
        "attendee_id": attendee.id,
        "event_id": attendee.event_id,
        "token": ticket.token,
        "image_svg": ticket.image_svg,
    })))
}

pub async fn cancel_attendee(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let attendee_id = path.into_inner();
    let attendee = Attendee::find_by_id(&pool, attendee_id)
        .await?
        .ok_or_else(|| Error::not_found("attendee"))?;
    require_event_owner(&pool, attendee.event_id, organizer.id).await?;

    let attendee = Attendee::cancel(&pool, attendee_id).await?;
    Ok(HttpResponse::Ok().json(attendee))
}

/// Manual check-in: same semantics as a scan, minus the QR decode step.
pub async fn check_in(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let service = CheckInService::new(pool.get_ref().clone());
    let result = service
        .check_in(path.into_inner(), &organizer.id.to_string())
        .await?;

    check_in_response(&pool, result).await
}

pub async fn scan(
    pool: web::Data<PgPool>,
    body: web::Json<ScanRequest>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let service = CheckInService::new(pool.get_ref().clone());
    let (result, _payload) = service
        .check_in_from_token(&body.qr_data, &organizer.id.to_string())
        .await?;

    check_in_response(&pool, result).await
}

async fn check_in_response(pool: &PgPool, result: CheckInResult) -> Result<HttpResponse, Error> {
    let event = Event::find_by_id(pool, result.attendee.event_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "attendee": {
            "id": result.attendee.id,
            "name": result.attendee.name,
            "email": result.attendee.email,
            "status": result.attendee.status,
            "check_in_time": result.attendee.check_in_time,
            "checked_in_by": result.attendee.checked_in_by,
        },
        "event": event.map(|e| json!({
            "id": e.id,
            "title": e.title,
            "location": e.location,
            "start_time": e.start_time,
        })),
        "is_duplicate": result.is_duplicate,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/events/{event_id}/attendees")
            .route(web::post().to(register_attendee))
            .route(web::get().to(list_attendees)),
    )
    .service(web::resource("/attendees/{attendee_id}/ticket").route(web::get().to(get_ticket)))
    .service(
        web::resource("/attendees/{attendee_id}/cancel").route(web::post().to(cancel_attendee)),
    )
    .service(
        web::resource("/attendees/{attendee_id}/check-in").route(web::post().to(check_in)),
    )
    .service(web::resource("/scan").route(web::post().to(scan)));
}
