use crate::error::{Error, Result};
use crate::models::{LoginRequest, Organizer, RegisterOrganizerRequest};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::env;
use uuid::Uuid;

const BCRYPT_COST: u32 = 10;
const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct AuthService {
    pool: PgPool,
}

impl AuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, req: RegisterOrganizerRequest) -> Result<Organizer> {
        if req.name.trim().is_empty() {
            return Err(Error::Validation("organizer name is required".to_string()));
        }
        if !req.email.contains('@') {
            return Err(Error::Validation("a valid email address is required".to_string()));
        }
        if req.password.len() < 8 {
            return Err(Error::Validation(
                "password must be at least 8 characters".to_string(),
            ));
        }

        if Organizer::find_by_email(&self.pool, req.email.trim())
            .await?
            .is_some()
        {
            return Err(Error::Validation("email is already registered".to_string()));
        }

        let password_hash = hash(&req.password, BCRYPT_COST)
            .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))?;

        let organizer =
            Organizer::create(&self.pool, req.name.trim(), req.email.trim(), &password_hash)
                .await?;

        info!("Registered organizer {} ({})", organizer.id, organizer.email);
        Ok(organizer)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<String> {
        let organizer = Organizer::find_by_email(&self.pool, req.email.trim())
            .await?
            .ok_or_else(|| Error::Authorization("invalid email or password".to_string()))?;

        let matches = verify(&req.password, &organizer.password_hash)
            .map_err(|e| Error::Internal(format!("password verification failed: {}", e)))?;
        if !matches {
            return Err(Error::Authorization("invalid email or password".to_string()));
        }

        Self::generate_token(organizer.id)
    }

    pub fn generate_token(organizer_id: Uuid) -> Result<String> {
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| Error::Internal("JWT_SECRET not set".to_string()))?;

        let now = Utc::now();
        let claims = Claims {
            sub: organizer_id.to_string(),
            exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("token generation failed: {}", e)))
    }

    pub fn verify_token(token: &str) -> Result<Uuid> {
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| Error::Internal("JWT_SECRET not set".to_string()))?;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| Error::Authorization("invalid or expired token".to_string()))?;

        Uuid::parse_str(&token_data.claims.sub)
            .map_err(|_| Error::Authorization("invalid token subject".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_secret() {
        if env::var("JWT_SECRET").is_err() {
            env::set_var("JWT_SECRET", "test-secret-at-least-32-characters-long");
        }
    }

    #[test]
    fn tokens_round_trip_to_the_same_organizer() {
        ensure_secret();
        let organizer_id = Uuid::new_v4();
        let token = AuthService::generate_token(organizer_id).unwrap();
        assert_eq!(AuthService::verify_token(&token).unwrap(), organizer_id);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        ensure_secret();
        let token = AuthService::generate_token(Uuid::new_v4()).unwrap();
        let tampered = format!("{}x", token);
        assert!(AuthService::verify_token(&tampered).is_err());
    }
}
