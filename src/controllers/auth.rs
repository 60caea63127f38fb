use crate::error::Error;
use crate::middleware::AuthenticatedOrganizer;
use crate::models::{LoginRequest, Organizer, RegisterOrganizerRequest};
use crate::services::AuthService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use sqlx::PgPool;

pub async fn register(
    pool: web::Data<PgPool>,
    body: web::Json<RegisterOrganizerRequest>,
) -> Result<HttpResponse, Error> {
    let service = AuthService::new(pool.get_ref().clone());
    let organizer = service.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(organizer))
}

pub async fn login(
    pool: web::Data<PgPool>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let service = AuthService::new(pool.get_ref().clone());
    let token = service.login(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "token": token })))
}

pub async fn me(
    pool: web::Data<PgPool>,
    organizer: AuthenticatedOrganizer,
) -> Result<HttpResponse, Error> {
    let organizer = Organizer::find_by_id(&pool, organizer.id)
        .await?
        .ok_or_else(|| Error::not_found("organizer"))?;

    Ok(HttpResponse::Ok().json(organizer))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/me", web::get().to(me)),
    );
}
