use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organizer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterOrganizerRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Organizer {
    pub async fn create(
        pool: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Self> {
        let now = Utc::now();
        let organizer = sqlx::query_as::<_, Organizer>(
            r#"
            INSERT INTO organizers (id, name, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(organizer)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let organizer = sqlx::query_as::<_, Organizer>("SELECT * FROM organizers WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(organizer)
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>> {
        let organizer = sqlx::query_as::<_, Organizer>("SELECT * FROM organizers WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?;

        Ok(organizer)
    }
}
