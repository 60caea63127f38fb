use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String, // published | draft | cancelled
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Event {
    pub async fn create(pool: &PgPool, organizer_id: Uuid, req: CreateEventRequest) -> Result<Self> {
        if req.title.trim().is_empty() {
            return Err(Error::Validation("event title is required".to_string()));
        }
        if req.end_time <= req.start_time {
            return Err(Error::Validation(
                "event end time must be after its start time".to_string(),
            ));
        }

        let now = Utc::now();
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                id, organizer_id, title, description, location,
                start_time, end_time, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'published', $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(organizer_id)
        .bind(req.title.trim())
        .bind(req.description)
        .bind(req.location)
        .bind(req.start_time)
        .bind(req.end_time)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(event)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(event)
    }

    pub async fn find_by_organizer(pool: &PgPool, organizer_id: Uuid) -> Result<Vec<Self>> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE organizer_id = $1 ORDER BY start_time",
        )
        .bind(organizer_id)
        .fetch_all(pool)
        .await?;

        Ok(events)
    }

    pub async fn update(&self, pool: &PgPool, req: UpdateEventRequest) -> Result<Self> {
        let start_time = req.start_time.unwrap_or(self.start_time);
        let end_time = req.end_time.unwrap_or(self.end_time);
        if end_time <= start_time {
            return Err(Error::Validation(
                "event end time must be after its start time".to_string(),
            ));
        }

        let event = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET title = $2, description = $3, location = $4,
                start_time = $5, end_time = $6, updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(req.title.as_deref().unwrap_or(&self.title))
        .bind(req.description.as_ref().or(self.description.as_ref()))
        .bind(req.location.as_ref().or(self.location.as_ref()))
        .bind(start_time)
        .bind(end_time)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        Ok(event)
    }

    pub async fn cancel(&self, pool: &PgPool) -> Result<Self> {
        let updated = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET status = 'cancelled', updated_at = $2
            WHERE id = $1 AND status != 'cancelled'
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        updated.ok_or_else(|| Error::InvalidState("event is already cancelled".to_string()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == "cancelled"
    }
}
