use crate::controllers::require_event_owner;
use crate::error::Error;
use crate::middleware::AuthenticatedOrganizer;
use crate::models::{CreateEventRequest, CreateTicketTypeRequest, Event, TicketType, UpdateEventRequest};
use actix_web::{web, HttpResponse};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create_event(
    pool: web::Data<PgPool>,
    body: web::Json<CreateEventRequest>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let event = Event::create(&pool, organizer.id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(event))
}

pub async fn get_event(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let event = Event::find_by_id(&pool, path.into_inner())
        .await?
        .ok_or_else(|| Error::not_found("event"))?;

    Ok(HttpResponse::Ok().json(event))
}

pub async fn my_events(
    pool: web::Data<PgPool>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let events = Event::find_by_organizer(&pool, organizer.id).await?;
    Ok(HttpResponse::Ok().json(events))
}

pub async fn update_event(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateEventRequest>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let event = require_event_owner(&pool, path.into_inner(), organizer.id).await?;
    let event = event.update(&pool, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(event))
}

pub async fn cancel_event(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let event = require_event_owner(&pool, path.into_inner(), organizer.id).await?;
    let event = event.cancel(&pool).await?;
    Ok(HttpResponse::Ok().json(event))
}

pub async fn create_ticket_type(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<CreateTicketTypeRequest>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let event = require_event_owner(&pool, path.into_inner(), organizer.id).await?;
    let ticket_type = TicketType::create(&pool, event.id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(ticket_type))
}

pub async fn list_ticket_types(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let event_id = path.into_inner();
    Event::find_by_id(&pool, event_id)
        .await?
        .ok_or_else(|| Error::not_found("event"))?;

    let ticket_types = TicketType::find_by_event(&pool, event_id).await?;
    Ok(HttpResponse::Ok().json(ticket_types))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/events").route(web::post().to(create_event)))
        .service(web::resource("/events/my").route(web::get().to(my_events)))
        .service(
            web::resource("/events/{event_id}")
                .route(web::get().to(get_event))
                .route(web::put().to(update_event)),
        )
        .service(web::resource("/events/{event_id}/cancel").route(web::post().to(cancel_event)))
        .service(
            web::resource("/events/{event_id}/ticket-types")
                .route(web::post().to(create_ticket_type))
                .route(web::get().to(list_ticket_types)),
        );
}
