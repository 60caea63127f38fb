pub mod attendee;
pub mod auth;
pub mod event;
pub mod payment;

use crate::error::{Error, Result};
use crate::models::Event;
use actix_web::web;
use sqlx::PgPool;
use uuid::Uuid;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    auth::configure(cfg);
    event::configure(cfg);
    attendee::configure(cfg);
    payment::configure(cfg);
}

/// Ownership gate shared by organizer-only routes.
pub async fn require_event_owner(
    pool: &PgPool,
    event_id: Uuid,
    organizer_id: Uuid,
) -> Result<Event> {
    let event = Event::find_by_id(pool, event_id)
        .await?
        .ok_or_else(|| Error::not_found("event"))?;

    if event.organizer_id != organizer_id {
        return Err(Error::Authorization(
            "you do not have access to this event".to_string(),
        ));
    }

    Ok(event)
}
