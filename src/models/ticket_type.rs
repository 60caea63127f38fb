use crate::error::{Error, Result};
use bigdecimal::{BigDecimal, Signed};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub currency: String,
    pub quantity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketTypeRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub currency: Option<String>,
    pub quantity: Option<i32>,
}

impl TicketType {
    pub async fn create(pool: &PgPool, event_id: Uuid, req: CreateTicketTypeRequest) -> Result<Self> {
        if req.name.trim().is_empty() {
            return Err(Error::Validation("ticket type name is required".to_string()));
        }
        if req.price.is_negative() {
            return Err(Error::Validation("ticket price cannot be negative".to_string()));
        }

        let now = Utc::now();
        let ticket_type = sqlx::query_as::<_, TicketType>(
            r#"
            INSERT INTO ticket_types (
                id, event_id, name, description, price, currency,
                quantity, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(req.name.trim())
        .bind(req.description)
        .bind(req.price)
        .bind(req.currency.unwrap_or_else(|| "INR".to_string()))
        .bind(req.quantity)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(ticket_type)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let ticket_type = sqlx::query_as::<_, TicketType>("SELECT * FROM ticket_types WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(ticket_type)
    }

    pub async fn find_by_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>> {
        let ticket_types = sqlx::query_as::<_, TicketType>(
            "SELECT * FROM ticket_types WHERE event_id = $1 ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await?;

        Ok(ticket_types)
    }

    pub fn is_free(&self) -> bool {
        !self.price.is_positive()
    }
}
