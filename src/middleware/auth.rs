use crate::services::AuthService;
use actix_web::{dev::Payload, error::ErrorUnauthorized, http, Error, FromRequest, HttpRequest};
use log::warn;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Extractor for routes that require an authenticated organizer.
#[derive(Clone, Debug)]
pub struct AuthenticatedOrganizer {
    pub id: Uuid,
}

impl FromRequest for AuthenticatedOrganizer {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>> + 'static>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();

        Box::pin(async move {
            let auth_header = req
                .headers()
                .get(http::header::AUTHORIZATION)
                .ok_or_else(|| {
                    warn!("Request to {} without authorization header", req.path());
                    ErrorUnauthorized("Authorization header required")
                })?;

            let auth_str = auth_header
                .to_str()
                .map_err(|_| ErrorUnauthorized("Invalid authorization header format"))?;

            let token = auth_str
                .strip_prefix("Bearer ")
                .ok_or_else(|| ErrorUnauthorized("Bearer token required"))?;

            if token.trim().is_empty() {
                return Err(ErrorUnauthorized("Token cannot be empty"));
            }

            match AuthService::verify_token(token) {
                Ok(organizer_id) => Ok(AuthenticatedOrganizer { id: organizer_id }),
                Err(e) => {
                    warn!("Token verification failed: {}", e);
                    Err(ErrorUnauthorized("Invalid or expired token"))
                }
            }
        })
    }
}
